use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::KeyringError;

/// Supported key types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeypairType {
    #[default]
    Sr25519,
    Ed25519,
    Ecdsa,
    Ethereum,
}

impl KeypairType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeypairType::Sr25519 => "sr25519",
            KeypairType::Ed25519 => "ed25519",
            KeypairType::Ecdsa => "ecdsa",
            KeypairType::Ethereum => "ethereum",
        }
    }

    /// MultiSignature variant index prepended to typed signatures
    pub fn signature_prefix(&self) -> Option<u8> {
        match self {
            KeypairType::Ed25519 => Some(0),
            KeypairType::Sr25519 => Some(1),
            KeypairType::Ecdsa => Some(2),
            KeypairType::Ethereum => None,
        }
    }
}

impl fmt::Display for KeypairType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeypairType {
    type Err = KeyringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sr25519" => Ok(KeypairType::Sr25519),
            "ed25519" => Ok(KeypairType::Ed25519),
            "ecdsa" => Ok(KeypairType::Ecdsa),
            "ethereum" => Ok(KeypairType::Ethereum),
            other => Err(KeyringError::UnsupportedType(other.to_string())),
        }
    }
}

/// Free-form account metadata (`name`, `genesisHash`, `isHidden`, ...).
///
/// Kept as a JSON object so fields written by newer popups survive a
/// round trip through the background.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountMeta(pub Map<String, Value>);

impl AccountMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Set `key` when `value` is present, otherwise leave it untouched
    pub fn set_opt(&mut self, key: &str, value: Option<impl Into<Value>>) {
        if let Some(value) = value {
            self.set(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    fn get_bool(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn name(&self) -> Option<&str> {
        self.get_str("name")
    }

    pub fn genesis_hash(&self) -> Option<&str> {
        self.get_str("genesisHash")
    }

    pub fn is_hidden(&self) -> bool {
        self.get_bool("isHidden")
    }

    pub fn is_external(&self) -> bool {
        self.get_bool("isExternal")
    }

    pub fn is_hardware(&self) -> bool {
        self.get_bool("isHardware")
    }

    /// Shallow merge, `other` wins
    pub fn merge(&mut self, other: AccountMeta) {
        for (key, value) in other.0 {
            self.0.insert(key, value);
        }
    }
}

/// Account as seen by the popup: address, type and flattened metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountJson {
    pub address: String,
    #[serde(rename = "type")]
    pub kind: KeypairType,
    #[serde(flatten)]
    pub meta: AccountMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptionInfo {
    pub content: Vec<String>,
    #[serde(rename = "type")]
    pub kind: Vec<String>,
    pub version: String,
}

/// Single-account encrypted backup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyringPairJson {
    pub address: String,
    /// base64 of the encrypted secret
    pub encoded: String,
    pub encoding: EncryptionInfo,
    #[serde(default)]
    pub meta: AccountMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchAccount {
    pub address: String,
    #[serde(default)]
    pub meta: AccountMeta,
}

/// Multi-account backup; `encoded` holds the encrypted list of
/// individual [`KeyringPairJson`] entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyringPairsJson {
    pub accounts: Vec<BatchAccount>,
    pub encoded: String,
    pub encoding: EncryptionInfo,
}
