pub mod address;
pub mod crypto;
pub mod error;
pub mod keyring;
pub mod pair;
pub mod store;
pub mod suri;
pub mod types;

// Re-export commonly used items
pub use address::{is_ethereum_address, normalize_address};
pub use error::{KeyringError, Result};
pub use keyring::Keyring;
pub use pair::{KeyringPair, SecretPair};
pub use store::{KeyValueStore, MemoryStore, RocksStore, Space};
pub use suri::{extract_suri, generate_mnemonic, get_suri, validate_seed, SEED_DEFAULT_LENGTH, SEED_LENGTHS};
pub use types::{
    AccountJson, AccountMeta, BatchAccount, EncryptionInfo, KeypairType, KeyringPairJson,
    KeyringPairsJson,
};
