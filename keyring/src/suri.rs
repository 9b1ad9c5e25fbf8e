//! Secret URI handling: `<phrase | 0xhex>[//hard][/soft][///password]`

use rand::RngCore;

use crate::error::{KeyringError, Result};
use crate::types::KeypairType;

pub const SEED_DEFAULT_LENGTH: usize = 12;
pub const SEED_LENGTHS: [usize; 5] = [12, 15, 18, 21, 24];

/// BIP44 path appended to seeds of `ethereum` accounts
pub const ETH_DERIVE_DEFAULT: &str = "/m/44'/60'/0'/0/0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedSuri {
    pub phrase: String,
    pub derive_path: String,
    pub password: Option<String>,
}

/// Split a suri into phrase, derivation path and optional password
pub fn extract_suri(suri: &str) -> Result<ExtractedSuri> {
    let (body, password) = match suri.find("///") {
        Some(pos) => (&suri[..pos], Some(suri[pos + 3..].to_string())),
        None => (suri, None),
    };

    let (phrase, derive_path) = match body.find('/') {
        Some(pos) => (&body[..pos], &body[pos..]),
        None => (body, ""),
    };

    let phrase = phrase.trim();
    if phrase.split(' ').any(|w| w.is_empty() && !phrase.is_empty()) {
        return Err(KeyringError::InvalidSuri(
            "phrase contains empty words".to_string(),
        ));
    }
    if !phrase
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '_')
    {
        return Err(KeyringError::InvalidSuri(
            "phrase contains invalid characters".to_string(),
        ));
    }

    Ok(ExtractedSuri {
        phrase: phrase.to_string(),
        derive_path: derive_path.to_string(),
        password,
    })
}

/// `0x`-prefixed hex, optionally of an exact bit length
pub fn is_hex(value: &str, bits: Option<usize>) -> bool {
    let Some(digits) = value.strip_prefix("0x") else {
        return false;
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }
    match bits {
        Some(bits) => digits.len() * 4 == bits,
        None => digits.len() % 2 == 0,
    }
}

/// Seed policy: 256-bit hex seeds or BIP39 mnemonics of an allowed length
pub fn validate_seed(phrase: &str) -> Result<()> {
    if phrase.starts_with("0x") {
        if !is_hex(phrase, Some(256)) {
            return Err(KeyringError::HexSeedLength);
        }
        return Ok(());
    }

    let words = phrase.split(' ').count();
    if !SEED_LENGTHS.contains(&words) {
        let allowed = SEED_LENGTHS
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(KeyringError::MnemonicLength(allowed));
    }

    bip39::Mnemonic::parse_normalized(phrase).map_err(|_| KeyringError::InvalidMnemonic)?;
    Ok(())
}

/// Apply the type-specific default derivation to a bare seed
pub fn get_suri(seed: &str, kind: KeypairType) -> String {
    match kind {
        KeypairType::Ethereum => format!("{}{}", seed, ETH_DERIVE_DEFAULT),
        _ => seed.to_string(),
    }
}

/// Generate an English BIP39 mnemonic with `words` words
pub fn generate_mnemonic(words: usize) -> Result<String> {
    if !SEED_LENGTHS.contains(&words) {
        let allowed = SEED_LENGTHS
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(KeyringError::MnemonicLength(allowed));
    }

    let mut entropy = vec![0u8; words * 4 / 3];
    rand::thread_rng().fill_bytes(&mut entropy);

    let mnemonic =
        bip39::Mnemonic::from_entropy(&entropy).map_err(|_| KeyringError::InvalidMnemonic)?;
    Ok(mnemonic.to_string())
}
