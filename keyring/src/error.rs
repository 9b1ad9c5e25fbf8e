use thiserror::Error;

pub type Result<T> = std::result::Result<T, KeyringError>;

/// Keyring failures. Display strings are surfaced verbatim to the popup,
/// so they are kept short and stable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyringError {
    #[error("Unable to find pair")]
    PairNotFound,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unable to decode using the supplied passphrase")]
    InvalidPassword,

    #[error("Password needed to unlock the account")]
    Locked,

    #[error("Account {0} has no secret key")]
    NoSecret(String),

    #[error("Hex seed needs to be 256-bits")]
    HexSeedLength,

    #[error("Mnemonic needs to contain {0} words")]
    MnemonicLength(String),

    #[error("Not a valid mnemonic seed")]
    InvalidMnemonic,

    #[error("Invalid secret uri: {0}")]
    InvalidSuri(String),

    #[error("Invalid derivation path: {0}")]
    Derivation(String),

    #[error("Unsupported key type: {0}")]
    UnsupportedType(String),

    #[error("Invalid backup: {0}")]
    InvalidJson(String),

    #[error("Encryption failed: {0}")]
    Crypto(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<rocksdb::Error> for KeyringError {
    fn from(e: rocksdb::Error) -> Self {
        KeyringError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for KeyringError {
    fn from(e: serde_json::Error) -> Self {
        KeyringError::InvalidJson(e.to_string())
    }
}
