use base64::Engine;
use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::secp256k1::Secp256k1;
use bitcoin::Network;
use sha2::Digest;
use sha3::Keccak256;
use sp_core::crypto::{DeriveJunction, Pair as PairT};
use sp_core::{ecdsa, ed25519, sr25519};
use std::str::FromStr;

use crate::address::{encode_ss58, ethereum_address};
use crate::crypto::{self, ENCODING_TYPE, ENCODING_VERSION};
use crate::error::{KeyringError, Result};
use crate::suri::{extract_suri, is_hex};
use crate::types::{AccountJson, AccountMeta, EncryptionInfo, KeypairType, KeyringPairJson};

/// Unlocked secret material for one account
#[derive(Clone)]
pub enum SecretPair {
    Sr25519(sr25519::Pair),
    Ed25519(ed25519::Pair),
    Ecdsa(ecdsa::Pair),
    Ethereum(k256::ecdsa::SigningKey),
}

fn suri_error<E: std::fmt::Debug>(e: E) -> KeyringError {
    KeyringError::InvalidSuri(format!("{:?}", e))
}

fn bytes_of<T: AsRef<[u8]>>(value: &T) -> Vec<u8> {
    let bytes: &[u8] = value.as_ref();
    bytes.to_vec()
}

/// Split `//hard/soft` into junctions; numeric codes are encoded as integers
fn parse_junctions(path: &str) -> Result<Vec<DeriveJunction>> {
    let mut junctions = Vec::new();
    let mut rest = path;

    while !rest.is_empty() {
        let stripped = rest
            .strip_prefix('/')
            .ok_or_else(|| KeyringError::Derivation(path.to_string()))?;
        let (hard, body) = match stripped.strip_prefix('/') {
            Some(body) => (true, body),
            None => (false, stripped),
        };
        let end = body.find('/').unwrap_or(body.len());
        let code = &body[..end];
        if code.is_empty() {
            return Err(KeyringError::Derivation(path.to_string()));
        }

        let junction = if hard {
            DeriveJunction::from(format!("/{}", code))
        } else {
            DeriveJunction::from(code)
        };
        junctions.push(junction);
        rest = &body[end..];
    }

    Ok(junctions)
}

/// BIP32 derivation used by Ethereum accounts: `phrase/m/44'/60'/0'/0/0`
fn ethereum_from_suri(suri: &str) -> Result<k256::ecdsa::SigningKey> {
    let extracted = extract_suri(suri)?;
    let password = extracted.password.unwrap_or_default();

    let seed = if is_hex(&extracted.phrase, Some(256)) {
        hex::decode(&extracted.phrase[2..]).map_err(suri_error)?
    } else {
        let mnemonic = bip39::Mnemonic::parse_normalized(&extracted.phrase)
            .map_err(|_| KeyringError::InvalidMnemonic)?;
        mnemonic.to_seed(&password).to_vec()
    };

    let secp = Secp256k1::new();
    let master = Xpriv::new_master(Network::Bitcoin, &seed).map_err(suri_error)?;

    let derived = match extracted.derive_path.strip_prefix('/') {
        Some(path) => {
            let path = DerivationPath::from_str(path)
                .map_err(|_| KeyringError::Derivation(extracted.derive_path.clone()))?;
            master
                .derive_priv(&secp, &path)
                .map_err(|e| KeyringError::Derivation(e.to_string()))?
        }
        None => master,
    };

    k256::ecdsa::SigningKey::from_slice(&derived.private_key.secret_bytes()).map_err(suri_error)
}

impl SecretPair {
    pub fn from_suri(suri: &str, kind: KeypairType) -> Result<Self> {
        match kind {
            KeypairType::Sr25519 => sr25519::Pair::from_string(suri, None)
                .map(SecretPair::Sr25519)
                .map_err(suri_error),
            KeypairType::Ed25519 => ed25519::Pair::from_string(suri, None)
                .map(SecretPair::Ed25519)
                .map_err(suri_error),
            KeypairType::Ecdsa => ecdsa::Pair::from_string(suri, None)
                .map(SecretPair::Ecdsa)
                .map_err(suri_error),
            KeypairType::Ethereum => ethereum_from_suri(suri).map(SecretPair::Ethereum),
        }
    }

    /// Rebuild from the bytes produced by [`SecretPair::to_raw`]
    pub fn from_raw(kind: KeypairType, raw: &[u8]) -> Result<Self> {
        match kind {
            KeypairType::Sr25519 => sr25519::Pair::from_seed_slice(raw)
                .map(SecretPair::Sr25519)
                .map_err(suri_error),
            KeypairType::Ed25519 => ed25519::Pair::from_seed_slice(raw)
                .map(SecretPair::Ed25519)
                .map_err(suri_error),
            KeypairType::Ecdsa => ecdsa::Pair::from_seed_slice(raw)
                .map(SecretPair::Ecdsa)
                .map_err(suri_error),
            KeypairType::Ethereum => k256::ecdsa::SigningKey::from_slice(raw)
                .map(SecretPair::Ethereum)
                .map_err(suri_error),
        }
    }

    pub fn to_raw(&self) -> Vec<u8> {
        match self {
            SecretPair::Sr25519(pair) => pair.to_raw_vec(),
            SecretPair::Ed25519(pair) => pair.to_raw_vec(),
            SecretPair::Ecdsa(pair) => pair.to_raw_vec(),
            SecretPair::Ethereum(key) => key.to_bytes().to_vec(),
        }
    }

    pub fn kind(&self) -> KeypairType {
        match self {
            SecretPair::Sr25519(_) => KeypairType::Sr25519,
            SecretPair::Ed25519(_) => KeypairType::Ed25519,
            SecretPair::Ecdsa(_) => KeypairType::Ecdsa,
            SecretPair::Ethereum(_) => KeypairType::Ethereum,
        }
    }

    /// Address under the given SS58 prefix (ignored for Ethereum)
    pub fn address(&self, ss58_format: u16) -> Result<String> {
        let account_id = |public: Vec<u8>| -> Result<[u8; 32]> {
            public
                .try_into()
                .map_err(|_| KeyringError::InvalidAddress("public key is not 32 bytes".to_string()))
        };

        match self {
            SecretPair::Sr25519(pair) => Ok(encode_ss58(account_id(bytes_of(&pair.public()))?, ss58_format)),
            SecretPair::Ed25519(pair) => Ok(encode_ss58(account_id(bytes_of(&pair.public()))?, ss58_format)),
            SecretPair::Ecdsa(pair) => {
                // Substrate account ids for ecdsa keys are the blake2 hash of the compressed key
                let compressed = bytes_of(&pair.public());
                Ok(encode_ss58(sp_core::hashing::blake2_256(&compressed), ss58_format))
            }
            SecretPair::Ethereum(key) => {
                let uncompressed = key.verifying_key().to_encoded_point(false);
                ethereum_address(uncompressed.as_bytes())
            }
        }
    }

    pub fn derive(&self, path: &str) -> Result<Self> {
        if path.contains("///") {
            return Err(KeyringError::Derivation(path.to_string()));
        }
        let junctions = parse_junctions(path)?;
        let derive_error = |e| KeyringError::Derivation(format!("{}: {:?}", path, e));

        match self {
            SecretPair::Sr25519(pair) => pair
                .derive(junctions.into_iter(), None)
                .map(|(child, _)| SecretPair::Sr25519(child))
                .map_err(derive_error),
            SecretPair::Ed25519(pair) => pair
                .derive(junctions.into_iter(), None)
                .map(|(child, _)| SecretPair::Ed25519(child))
                .map_err(derive_error),
            SecretPair::Ecdsa(pair) => pair
                .derive(junctions.into_iter(), None)
                .map(|(child, _)| SecretPair::Ecdsa(child))
                .map_err(derive_error),
            SecretPair::Ethereum(_) => Err(KeyringError::Derivation(format!(
                "{}: ethereum accounts derive from the seed only",
                path
            ))),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        match self {
            SecretPair::Sr25519(pair) => Ok(bytes_of(&pair.sign(message))),
            SecretPair::Ed25519(pair) => Ok(bytes_of(&pair.sign(message))),
            SecretPair::Ecdsa(pair) => Ok(bytes_of(&pair.sign(message))),
            SecretPair::Ethereum(key) => {
                let digest = Keccak256::digest(message);
                let (signature, recovery_id) = key
                    .sign_prehash_recoverable(&digest)
                    .map_err(|e| KeyringError::Crypto(e.to_string()))?;
                let mut bytes = signature.to_bytes().to_vec();
                bytes.push(recovery_id.to_byte());
                Ok(bytes)
            }
        }
    }
}

/// A keyring account: address, metadata and (optionally) an encrypted secret.
///
/// Pairs loaded from storage start locked; `unlock` decrypts the secret
/// into memory until `lock` drops it again.
#[derive(Clone)]
pub struct KeyringPair {
    address: String,
    kind: KeypairType,
    meta: AccountMeta,
    encoded: Option<Vec<u8>>,
    secret: Option<SecretPair>,
}

impl std::fmt::Debug for KeyringPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringPair")
            .field("address", &self.address)
            .field("kind", &self.kind)
            .field("meta", &self.meta)
            .field("is_locked", &self.is_locked())
            .finish()
    }
}

impl KeyringPair {
    pub fn from_secret(secret: SecretPair, meta: AccountMeta, ss58_format: u16) -> Result<Self> {
        Ok(Self {
            address: secret.address(ss58_format)?,
            kind: secret.kind(),
            meta,
            encoded: None,
            secret: Some(secret),
        })
    }

    /// Account without a secret (external or hardware)
    pub fn watch_only(address: String, kind: KeypairType, meta: AccountMeta) -> Self {
        Self {
            address,
            kind,
            meta,
            encoded: None,
            secret: None,
        }
    }

    pub(crate) fn from_encoded(
        address: String,
        kind: KeypairType,
        meta: AccountMeta,
        encoded: Option<Vec<u8>>,
    ) -> Self {
        Self {
            address,
            kind,
            meta,
            encoded,
            secret: None,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn kind(&self) -> KeypairType {
        self.kind
    }

    pub fn meta(&self) -> &AccountMeta {
        &self.meta
    }

    pub(crate) fn set_meta(&mut self, meta: AccountMeta) {
        self.meta = meta;
    }

    pub(crate) fn encoded(&self) -> Option<&[u8]> {
        self.encoded.as_deref()
    }

    pub fn is_locked(&self) -> bool {
        self.secret.is_none()
    }

    pub fn has_secret(&self) -> bool {
        self.encoded.is_some() || self.secret.is_some()
    }

    /// Decrypt the stored secret with `password`
    pub fn unlock(&mut self, password: &str) -> Result<()> {
        let encoded = self
            .encoded
            .as_ref()
            .ok_or_else(|| KeyringError::NoSecret(self.address.clone()))?;
        let raw = crypto::decrypt(password, encoded)?;
        self.secret = Some(SecretPair::from_raw(self.kind, &raw)?);
        Ok(())
    }

    /// Drop the decrypted secret. Pairs that were never encrypted keep it,
    /// since it could not be recovered afterwards.
    pub fn lock(&mut self) {
        if self.encoded.is_some() {
            self.secret = None;
        }
    }

    /// Re-encrypt the unlocked secret under `password`
    pub fn encrypt(&mut self, password: &str) -> Result<()> {
        let secret = self.secret.as_ref().ok_or(KeyringError::Locked)?;
        self.encoded = Some(crypto::encrypt(password, &secret.to_raw())?);
        Ok(())
    }

    pub fn derive(&self, path: &str, meta: AccountMeta, ss58_format: u16) -> Result<KeyringPair> {
        let secret = self.secret.as_ref().ok_or(KeyringError::Locked)?;
        KeyringPair::from_secret(secret.derive(path)?, meta, ss58_format)
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.secret
            .as_ref()
            .ok_or(KeyringError::Locked)?
            .sign(message)
    }

    /// Encrypted backup; fails unless `password` decrypts the stored secret
    pub fn to_json(&self, password: &str) -> Result<KeyringPairJson> {
        let encoded = self
            .encoded
            .as_ref()
            .ok_or_else(|| KeyringError::NoSecret(self.address.clone()))?;
        let raw = crypto::decrypt(password, encoded)?;
        let reencrypted = crypto::encrypt(password, &raw)?;

        Ok(KeyringPairJson {
            address: self.address.clone(),
            encoded: base64::engine::general_purpose::STANDARD.encode(reencrypted),
            encoding: EncryptionInfo {
                content: vec!["pkcs8".to_string(), self.kind.to_string()],
                kind: ENCODING_TYPE.iter().map(|s| s.to_string()).collect(),
                version: ENCODING_VERSION.to_string(),
            },
            meta: self.meta.clone(),
        })
    }

    pub fn to_account_json(&self) -> AccountJson {
        AccountJson {
            address: self.address.clone(),
            kind: self.kind,
            meta: self.meta.clone(),
        }
    }
}
