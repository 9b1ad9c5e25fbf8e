//! Remembered unlocks for signing ("remember my password")

use std::collections::HashMap;
use std::sync::Arc;
use wallet_keyring::KeyringPair;

use crate::clock::Clock;

pub const PASSWORD_EXPIRY_MINS: u64 = 15;
pub const PASSWORD_EXPIRY_MS: u64 = PASSWORD_EXPIRY_MINS * 60 * 1000;

/// Address -> expiry timestamp. Keys are the keyring's default-prefix
/// address (`KeyringPair::address`), never the address a request carried.
pub struct PasswordCache {
    clock: Arc<dyn Clock>,
    expiry_ms: u64,
    entries: HashMap<String, u64>,
}

impl PasswordCache {
    pub fn new(clock: Arc<dyn Clock>, expiry_ms: u64) -> Self {
        Self {
            clock,
            expiry_ms,
            entries: HashMap::new(),
        }
    }

    /// Remaining unlock time for `pair`. An entry that has lapsed is dropped
    /// and the pair is locked again.
    pub fn refresh(&mut self, pair: &mut KeyringPair) -> u64 {
        let now = self.clock.now_ms();
        let expires_at = self.entries.get(pair.address()).copied().unwrap_or(0);

        if expires_at <= now {
            if expires_at > 0 {
                tracing::debug!("Cached unlock for {} expired", pair.address());
            }
            self.entries.remove(pair.address());
            pair.lock();
            return 0;
        }

        expires_at - now
    }

    pub fn remember(&mut self, address: &str) {
        let expires_at = self.clock.now_ms() + self.expiry_ms;
        self.entries.insert(address.to_string(), expires_at);
    }

    pub fn forget(&mut self, address: &str) {
        self.entries.remove(address);
    }
}
