use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize)]
pub struct ConfigFile {
    pub server: ServerConfig,
    #[serde(default)]
    pub keyring: KeyringConfig,
    #[serde(default)]
    pub signing: SigningConfig,
    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KeyringConfig {
    #[serde(default = "default_ss58_format")]
    pub ss58_format: u16,
    /// RocksDB directory; accounts live in memory only when unset
    #[serde(default)]
    pub storage_path: Option<String>,
}

impl Default for KeyringConfig {
    fn default() -> Self {
        Self {
            ss58_format: default_ss58_format(),
            storage_path: None,
        }
    }
}

fn default_ss58_format() -> u16 {
    42
}

#[derive(Debug, Deserialize, Clone)]
pub struct SigningConfig {
    #[serde(default = "default_password_expiry_mins")]
    pub password_expiry_mins: u64,
}

impl SigningConfig {
    pub fn password_expiry_ms(&self) -> u64 {
        self.password_expiry_mins * 60 * 1000
    }
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            password_expiry_mins: default_password_expiry_mins(),
        }
    }
}

fn default_password_expiry_mins() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct WindowConfig {
    #[serde(default = "default_extension_url")]
    pub extension_url: String,
    /// Program invoked with the full tab url, e.g. "xdg-open"
    #[serde(default)]
    pub open_command: Option<String>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            extension_url: default_extension_url(),
            open_command: None,
        }
    }
}

fn default_extension_url() -> String {
    "chrome-extension://wallet/index.html".to_string()
}

impl ConfigFile {
    pub fn load(path: &str) -> Result<Self> {
        let content =
            fs::read_to_string(path).context(format!("Failed to read config file: {}", path))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    pub fn validate(&self) -> Result<()> {
        if self.keyring.ss58_format > 16_383 {
            anyhow::bail!(
                "Invalid ss58_format: {}. Must be below 16384",
                self.keyring.ss58_format
            );
        }
        if self.signing.password_expiry_mins == 0 {
            anyhow::bail!("[signing] password_expiry_mins must be greater than 0");
        }
        if self.window.extension_url.contains('#') {
            anyhow::bail!("[window] extension_url must not contain a fragment");
        }
        Ok(())
    }
}
