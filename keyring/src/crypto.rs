//! Password encryption for secrets at rest and in backups.
//!
//! Layout of an encoded secret: `salt (16) || nonce (12) || AES-256-GCM ciphertext`.
//! The key is derived from the password by iterated, salted SHA-256.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{KeyringError, Result};

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KDF_ROUNDS: u32 = 16_384;

/// Names recorded in the `encoding.type` field of exported JSON
pub const ENCODING_TYPE: [&str; 2] = ["sha256-iter", "aes-256-gcm"];
pub const ENCODING_VERSION: &str = "3";

fn derive_key(password: &str, salt: &[u8]) -> [u8; 32] {
    let mut digest: [u8; 32] = Sha256::new()
        .chain_update(salt)
        .chain_update(password.as_bytes())
        .finalize()
        .into();

    for _ in 1..KDF_ROUNDS {
        digest = Sha256::new()
            .chain_update(digest)
            .chain_update(salt)
            .finalize()
            .into();
    }

    digest
}

/// Encrypt `plaintext` with a fresh salt and nonce
pub fn encrypt(password: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut rng = rand::thread_rng();
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut nonce);

    let key = derive_key(password, &salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| KeyringError::Crypto(format!("{:?}", e)))?;

    let mut encoded = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    encoded.extend_from_slice(&salt);
    encoded.extend_from_slice(&nonce);
    encoded.extend_from_slice(&ciphertext);
    Ok(encoded)
}

/// Decrypt an encoded secret. Any authentication failure is reported as a
/// wrong password.
pub fn decrypt(password: &str, encoded: &[u8]) -> Result<Vec<u8>> {
    if encoded.len() <= SALT_LEN + NONCE_LEN {
        return Err(KeyringError::Crypto("encoded secret too short".to_string()));
    }

    let (salt, rest) = encoded.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let key = derive_key(password, salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| KeyringError::InvalidPassword)
}
