//! Address encoding and normalisation
//!
//! Substrate accounts are 32-byte account ids rendered as SS58 with the
//! keyring's default prefix. Ethereum accounts are EIP-55 checksummed hex.

use sha2::Digest;
use sha3::Keccak256;
use sp_core::crypto::{AccountId32, Ss58AddressFormat, Ss58Codec};

use crate::error::{KeyringError, Result};

pub fn encode_ss58(account_id: [u8; 32], prefix: u16) -> String {
    AccountId32::new(account_id).to_ss58check_with_version(Ss58AddressFormat::custom(prefix))
}

/// Decode an SS58 address of any prefix into its account id
pub fn decode_ss58(address: &str) -> Result<[u8; 32]> {
    let (account, _format) = AccountId32::from_ss58check_with_version(address)
        .map_err(|e| KeyringError::InvalidAddress(format!("{}: {:?}", address, e)))?;
    Ok(account.into())
}

pub fn is_ethereum_address(address: &str) -> bool {
    address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Derive an Ethereum address from an uncompressed (65-byte) secp256k1 key
pub fn ethereum_address(uncompressed: &[u8]) -> Result<String> {
    if uncompressed.len() != 65 {
        return Err(KeyringError::InvalidAddress(format!(
            "Invalid uncompressed pubkey length: {}",
            uncompressed.len()
        )));
    }

    // Keccak256 of the 64-byte public key (skip 0x04 prefix), last 20 bytes
    let hash = Keccak256::digest(&uncompressed[1..]);
    Ok(to_checksum_address(&hex::encode(&hash[12..])))
}

/// EIP-55 mixed-case checksum of a 40-digit hex address (with or without 0x)
pub fn to_checksum_address(address: &str) -> String {
    let lower = address.trim_start_matches("0x").to_lowercase();
    let hash = Keccak256::digest(lower.as_bytes());

    let checksummed: String = lower
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
            if c.is_ascii_alphabetic() && nibble >= 8 {
                c.to_ascii_uppercase()
            } else {
                c
            }
        })
        .collect();

    format!("0x{}", checksummed)
}

/// Canonical form used as the keyring lookup key
pub fn normalize_address(address: &str, prefix: u16) -> Result<String> {
    if is_ethereum_address(address) {
        return Ok(to_checksum_address(address));
    }
    Ok(encode_ss58(decode_ss58(address)?, prefix))
}
