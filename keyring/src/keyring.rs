use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

use crate::address::{is_ethereum_address, normalize_address};
use crate::crypto::{self, ENCODING_TYPE, ENCODING_VERSION};
use crate::error::{KeyringError, Result};
use crate::pair::{KeyringPair, SecretPair};
use crate::store::{KeyValueStore, Space};
use crate::types::{
    AccountJson, AccountMeta, BatchAccount, EncryptionInfo, KeypairType, KeyringPairJson,
    KeyringPairsJson,
};

/// Persisted account record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredAccount {
    address: String,
    #[serde(rename = "type")]
    kind: KeypairType,
    #[serde(default)]
    encoded: Option<String>,
    #[serde(default)]
    meta: AccountMeta,
}

fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

/// Account keyring.
///
/// Every account is keyed by its default-prefix address, so lookups with
/// an address encoded under any other SS58 prefix resolve to the same pair.
pub struct Keyring {
    ss58_format: u16,
    pairs: BTreeMap<String, KeyringPair>,
    store: Arc<dyn KeyValueStore>,
    accounts_tx: watch::Sender<Vec<AccountJson>>,
}

impl Keyring {
    /// Load all persisted accounts (locked)
    pub fn load(store: Arc<dyn KeyValueStore>, ss58_format: u16) -> Result<Self> {
        let mut pairs = BTreeMap::new();

        for stored in store.load_all::<StoredAccount>(Space::Accounts)? {
            let encoded = match stored.encoded {
                Some(ref encoded) => Some(
                    b64()
                        .decode(encoded)
                        .map_err(|e| KeyringError::InvalidJson(e.to_string()))?,
                ),
                None => None,
            };
            let address = normalize_address(&stored.address, ss58_format)?;
            let pair = KeyringPair::from_encoded(address.clone(), stored.kind, stored.meta, encoded);
            pairs.insert(address, pair);
        }

        tracing::info!("Keyring loaded with {} accounts", pairs.len());

        let (accounts_tx, _) = watch::channel(Vec::new());
        let keyring = Self {
            ss58_format,
            pairs,
            store,
            accounts_tx,
        };
        keyring.publish();
        Ok(keyring)
    }

    pub fn ss58_format(&self) -> u16 {
        self.ss58_format
    }

    /// Default-prefix form of `address`
    pub fn normalize(&self, address: &str) -> Result<String> {
        normalize_address(address, self.ss58_format)
    }

    pub fn get_pair(&self, address: &str) -> Option<&KeyringPair> {
        let address = self.normalize(address).ok()?;
        self.pairs.get(&address)
    }

    pub fn get_pair_mut(&mut self, address: &str) -> Option<&mut KeyringPair> {
        let address = self.normalize(address).ok()?;
        self.pairs.get_mut(&address)
    }

    pub fn get_pairs(&self) -> impl Iterator<Item = &KeyringPair> {
        self.pairs.values()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn accounts(&self) -> Vec<AccountJson> {
        self.pairs.values().map(KeyringPair::to_account_json).collect()
    }

    /// Watch channel carrying the full account list after every change
    pub fn subscribe(&self) -> watch::Receiver<Vec<AccountJson>> {
        self.accounts_tx.subscribe()
    }

    fn publish(&self) {
        self.accounts_tx.send_replace(self.accounts());
    }

    fn persist(&self, pair: &KeyringPair) -> Result<()> {
        let stored = StoredAccount {
            address: pair.address().to_string(),
            kind: pair.kind(),
            encoded: pair.encoded().map(|bytes| b64().encode(bytes)),
            meta: pair.meta().clone(),
        };
        self.store.put_json(Space::Accounts, pair.address(), &stored)
    }

    fn insert(&mut self, pair: KeyringPair) -> Result<String> {
        self.persist(&pair)?;
        let address = pair.address().to_string();
        self.pairs.insert(address.clone(), pair);
        self.publish();
        Ok(address)
    }

    /// Build a pair without adding it to the keyring
    pub fn create_from_uri(
        &self,
        suri: &str,
        meta: AccountMeta,
        kind: KeypairType,
    ) -> Result<KeyringPair> {
        let secret = SecretPair::from_suri(suri, kind)?;
        KeyringPair::from_secret(secret, meta, self.ss58_format)
    }

    /// Decode a backup without its password; the result is locked
    pub fn create_from_json(&self, json: &KeyringPairJson) -> Result<KeyringPair> {
        let kind = match json.encoding.content.get(1) {
            Some(kind) => kind.parse()?,
            None if is_ethereum_address(&json.address) => KeypairType::Ethereum,
            None => KeypairType::Sr25519,
        };
        let encoded = b64()
            .decode(&json.encoded)
            .map_err(|e| KeyringError::InvalidJson(e.to_string()))?;
        let address = self.normalize(&json.address)?;

        Ok(KeyringPair::from_encoded(
            address,
            kind,
            json.meta.clone(),
            Some(encoded),
        ))
    }

    /// Create, encrypt and store a pair from a secret uri
    pub fn add_uri(
        &mut self,
        suri: &str,
        password: &str,
        meta: AccountMeta,
        kind: KeypairType,
    ) -> Result<String> {
        let pair = self.create_from_uri(suri, meta, kind)?;
        self.add_pair(pair, password)
    }

    /// Encrypt an unlocked pair with `password` and store it locked
    pub fn add_pair(&mut self, mut pair: KeyringPair, password: &str) -> Result<String> {
        pair.encrypt(password)?;
        pair.lock();
        self.insert(pair)
    }

    pub fn add_external(&mut self, address: &str, mut meta: AccountMeta) -> Result<String> {
        let address = self.normalize(address)?;
        meta.set("isExternal", true);
        let kind = if is_ethereum_address(&address) {
            KeypairType::Ethereum
        } else {
            KeypairType::Sr25519
        };
        self.insert(KeyringPair::watch_only(address, kind, meta))
    }

    pub fn add_hardware(
        &mut self,
        address: &str,
        hardware_type: &str,
        mut meta: AccountMeta,
    ) -> Result<String> {
        let address = self.normalize(address)?;
        meta.set("isExternal", true);
        meta.set("isHardware", true);
        meta.set("hardwareType", hardware_type);
        let kind = if is_ethereum_address(&address) {
            KeypairType::Ethereum
        } else {
            KeypairType::Ed25519
        };
        self.insert(KeyringPair::watch_only(address, kind, meta))
    }

    /// Replace the metadata of an existing account
    pub fn save_account_meta(&mut self, address: &str, meta: AccountMeta) -> Result<()> {
        let pair = self.get_pair_mut(address).ok_or(KeyringError::PairNotFound)?;
        pair.set_meta(meta);
        let pair = pair.clone();
        self.persist(&pair)?;
        self.publish();
        Ok(())
    }

    /// Re-encrypt an unlocked account under a new password, then lock it
    pub fn encrypt_account(&mut self, address: &str, password: &str) -> Result<()> {
        let pair = self.get_pair_mut(address).ok_or(KeyringError::PairNotFound)?;
        pair.encrypt(password)?;
        pair.lock();
        let pair = pair.clone();
        self.persist(&pair)
    }

    pub fn forget_account(&mut self, address: &str) -> Result<()> {
        let address = self.normalize(address)?;
        if self.pairs.remove(&address).is_none() {
            return Err(KeyringError::PairNotFound);
        }
        self.store.delete(Space::Accounts, &address)?;
        self.publish();
        Ok(())
    }

    pub fn backup_account(&self, address: &str, password: &str) -> Result<KeyringPairJson> {
        self.get_pair(address)
            .ok_or(KeyringError::PairNotFound)?
            .to_json(password)
    }

    /// Export several accounts into one encrypted bundle
    pub fn backup_accounts(&self, addresses: &[String], password: &str) -> Result<KeyringPairsJson> {
        let mut accounts = Vec::with_capacity(addresses.len());
        let mut exports = Vec::with_capacity(addresses.len());

        for address in addresses {
            let json = self.backup_account(address, password)?;
            accounts.push(BatchAccount {
                address: json.address.clone(),
                meta: json.meta.clone(),
            });
            exports.push(json);
        }

        let plaintext = serde_json::to_vec(&exports)?;
        let encoded = crypto::encrypt(password, &plaintext)?;

        Ok(KeyringPairsJson {
            accounts,
            encoded: b64().encode(encoded),
            encoding: EncryptionInfo {
                content: vec!["batch-pkcs8".to_string()],
                kind: ENCODING_TYPE.iter().map(|s| s.to_string()).collect(),
                version: ENCODING_VERSION.to_string(),
            },
        })
    }

    /// Verify `password` against a backup and store the account
    pub fn restore_account(&mut self, json: &KeyringPairJson, password: &str) -> Result<String> {
        let mut pair = self.create_from_json(json)?;
        pair.unlock(password)?;
        self.add_pair(pair, password)
    }

    pub fn restore_accounts(&mut self, json: &KeyringPairsJson, password: &str) -> Result<Vec<String>> {
        let encoded = b64()
            .decode(&json.encoded)
            .map_err(|e| KeyringError::InvalidJson(e.to_string()))?;
        let plaintext = crypto::decrypt(password, &encoded)?;
        let exports: Vec<KeyringPairJson> = serde_json::from_slice(&plaintext)?;

        exports
            .iter()
            .map(|export| self.restore_account(export, password))
            .collect()
    }
}
