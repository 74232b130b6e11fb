//! SHA-256 digests of the three state artifacts, persisted as a fourth file
//! so a tampered or partially-written artifact is detected on load rather
//! than silently deserialized.
//!
//! Grounded in `Data.py`'s `file_hash`/`compare_hash` pair, generalised from
//! a single hash-per-call into a small record covering all three artifacts
//! at once.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const ACCOUNTS_HASH_KEY: &str = "accounts";
pub const LEDGER_HASH_KEY: &str = "ledger";
pub const POOL_HASH_KEY: &str = "pool";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub accounts: String,
    pub ledger: String,
    pub pool: String,
}

impl Manifest {
    pub fn digest_matches(&self, key: &str, bytes: &[u8]) -> bool {
        let expected = match key {
            ACCOUNTS_HASH_KEY => &self.accounts,
            LEDGER_HASH_KEY => &self.ledger,
            POOL_HASH_KEY => &self.pool,
            _ => return false,
        };
        *expected == sha256_hex(bytes)
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
