//! `save`/`load` for the three state artifacts plus their manifest.

use std::fs;
use std::path::{Path, PathBuf};

use ferrochain_core::accounts::Accounts;
use ferrochain_core::chain::Chain;
use ferrochain_core::pool::Pool;
use log::warn;

use crate::error::{Error, Result};
use crate::manifest::{sha256_hex, Manifest, ACCOUNTS_HASH_KEY, LEDGER_HASH_KEY, POOL_HASH_KEY};

const ACCOUNTS_FILE: &str = "accounts.dat";
const LEDGER_FILE: &str = "ledger.dat";
const POOL_FILE: &str = "pool.dat";
const MANIFEST_FILE: &str = "manifest.dat";

/// A directory holding the three state artifacts and their manifest.
pub struct Store {
    dir: PathBuf,
}

impl Store {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { dir: data_dir.into() }
    }

    /// Serializes `accounts`/`chain`/`pool`, writes each atomically, then
    /// writes the manifest of their digests last — the manifest write is
    /// the commit point per spec.md §4.7, so a crash between an artifact
    /// write and the manifest write is indistinguishable from "nothing
    /// changed" on the next `load`.
    pub fn save(&self, accounts: &Accounts, chain: &Chain, pool: &Pool) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let accounts_bytes = bincode::serialize(accounts)?;
        let ledger_bytes = bincode::serialize(chain)?;
        let pool_bytes = bincode::serialize(pool)?;

        self.write_atomic(ACCOUNTS_FILE, &accounts_bytes)?;
        self.write_atomic(LEDGER_FILE, &ledger_bytes)?;
        self.write_atomic(POOL_FILE, &pool_bytes)?;

        let manifest = Manifest {
            accounts: sha256_hex(&accounts_bytes),
            ledger: sha256_hex(&ledger_bytes),
            pool: sha256_hex(&pool_bytes),
        };
        let manifest_bytes = bincode::serialize(&manifest)?;
        self.write_atomic(MANIFEST_FILE, &manifest_bytes)?;
        Ok(())
    }

    /// Loads the three artifacts, falling back to fresh empty state for any
    /// one of them whose on-disk digest no longer matches the manifest (or
    /// that is simply absent, e.g. first run) — tamper-evident per spec.md
    /// §4.7 and §7's `TamperDetected` error kind, surfaced here as a
    /// warning rather than a hard failure so a node can still come up.
    pub fn load(&self) -> (Accounts, Chain, Pool) {
        let manifest = self.read_manifest().unwrap_or_default();

        let accounts = self
            .load_artifact::<Accounts>(ACCOUNTS_FILE, ACCOUNTS_HASH_KEY, &manifest)
            .unwrap_or_default();
        let chain = self
            .load_artifact::<Chain>(LEDGER_FILE, LEDGER_HASH_KEY, &manifest)
            .unwrap_or_default();
        let pool = self
            .load_artifact::<Pool>(POOL_FILE, POOL_HASH_KEY, &manifest)
            .unwrap_or_default();

        (accounts, chain, pool)
    }

    fn read_manifest(&self) -> Option<Manifest> {
        let bytes = fs::read(self.path(MANIFEST_FILE)).ok()?;
        bincode::deserialize(&bytes).ok()
    }

    fn load_artifact<T: serde::de::DeserializeOwned>(
        &self,
        file: &str,
        key: &str,
        manifest: &Manifest,
    ) -> Option<T> {
        let bytes = fs::read(self.path(file)).ok()?;
        if !manifest.digest_matches(key, &bytes) {
            warn!("{file}: digest mismatch against manifest, reverting to fresh state");
            return None;
        }
        match bincode::deserialize(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("{file}: failed to deserialize despite matching digest: {e}");
                None
            }
        }
    }

    /// Writes `bytes` to a temp file in the same directory as `file`, then
    /// renames it into place. `rename` within one filesystem is atomic, so
    /// readers never observe a partially-written artifact.
    fn write_atomic(&self, file: &str, bytes: &[u8]) -> Result<()> {
        let target = self.path(file);
        let tmp = self.path(&format!("{file}.tmp"));
        fs::write(&tmp, bytes).map_err(Error::Io)?;
        fs::rename(&tmp, &target).map_err(Error::Io)?;
        Ok(())
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }
}

impl AsRef<Path> for Store {
    fn as_ref(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrochain_core::accounts::{Accounts as AccountsState, User};
    use ferrochain_core::types::{EncryptedPrivateKey, PublicKeyPem};

    fn sample_accounts() -> AccountsState {
        let mut accounts = AccountsState::new();
        accounts.add_user(User {
            username: "alice".into(),
            password_digest: ferrochain_crypto::password_digest("alice", "pw"),
            priv_key_encrypted: EncryptedPrivateKey(vec![1, 2, 3]),
            pub_key: PublicKeyPem("pk".into()),
        });
        accounts
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let accounts = sample_accounts();
        let chain = Chain::new();
        let pool = Pool::new();

        store.save(&accounts, &chain, &pool).unwrap();
        let (loaded_accounts, loaded_chain, loaded_pool) = store.load();

        assert_eq!(loaded_accounts.snapshot(), accounts.snapshot());
        assert_eq!(loaded_chain.len(), chain.len());
        assert_eq!(loaded_pool.snapshot().len(), pool.snapshot().len());
    }

    #[test]
    fn tampered_artifact_reverts_to_fresh_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        store.save(&sample_accounts(), &Chain::new(), &Pool::new()).unwrap();

        fs::write(dir.path().join(ACCOUNTS_FILE), b"corrupted").unwrap();

        let (accounts, _, _) = store.load();
        assert!(accounts.snapshot().is_empty());
    }

    #[test]
    fn missing_artifacts_load_as_fresh_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let (accounts, chain, pool) = store.load();
        assert!(accounts.snapshot().is_empty());
        assert_eq!(chain.len(), 0);
        assert!(pool.snapshot().is_empty());
    }
}
