//! The pending-transaction pool.
//!
//! An unordered set of transactions not yet included in any block, keyed by
//! their content hash. Ordering for block inclusion is imposed by the node
//! engine's selection strategy, not by the pool itself.

use crate::tx::Tx;
use crate::types::PublicKeyPem;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pool {
    txs: BTreeMap<String, Tx>,
    /// Hashes the rejection protocol has flagged invalid; consulted by the
    /// node engine's login-time auto-cancel sweep.
    invalid_flagged: HashSet<String>,
}

impl Pool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `tx`, failing if it isn't self-consistent. Idempotent by hash.
    pub fn add(&mut self, tx: Tx) -> crate::Result<()> {
        if !tx.is_valid() {
            return Err(crate::Error::InvalidTx);
        }
        if let Some(hash_hex) = tx.hash_hex() {
            self.txs.insert(hash_hex, tx);
            Ok(())
        } else {
            Err(crate::Error::InvalidTx)
        }
    }

    pub fn get(&self, hash: &str) -> Option<&Tx> {
        self.txs.get(hash)
    }

    pub fn pop(&mut self, hash: &str) -> Option<Tx> {
        self.txs.remove(hash)
    }

    /// Cancels a pooled tx, succeeding only if `pk` may cancel it.
    pub fn cancel(&mut self, hash: &str, pk: &PublicKeyPem) -> bool {
        match self.txs.get(hash) {
            Some(tx) if tx.cancellable_by(pk) => {
                self.txs.remove(hash);
                self.invalid_flagged.remove(hash);
                true
            }
            _ => false,
        }
    }

    pub fn by_account(&self, pk: &PublicKeyPem) -> Vec<&Tx> {
        self.txs
            .values()
            .filter(|tx| tx.sender_pk == *pk || tx.receiver_pk == *pk)
            .collect()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Tx> {
        self.txs.clone()
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// Marks `hash` invalid; the tx's own sender is expected to cancel it on
    /// next login. Used by the block-rejection protocol (§4.3).
    pub fn flag_invalid(&mut self, hash: &str) {
        self.invalid_flagged.insert(hash.to_string());
    }

    pub fn invalid_flagged_for(&self, pk: &PublicKeyPem) -> Vec<String> {
        self.invalid_flagged
            .iter()
            .filter(|hash| self.txs.get(*hash).is_some_and(|tx| tx.sender_pk == *pk))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::tx::TxKind;
    use ferrochain_crypto::{encode_public_key, generate_keypair};

    fn pem(sk: &ferrochain_crypto::SigningKey) -> PublicKeyPem {
        PublicKeyPem(encode_public_key(&sk.verifying_key()).unwrap())
    }

    fn signed_tx(sender: &ferrochain_crypto::SigningKey, receiver: &PublicKeyPem) -> Tx {
        let mut tx = Tx::new(
            TxKind::Normal,
            Amount::from_whole(1),
            Amount::from_micros(900_000),
            Amount::from_micros(100_000),
            pem(sender),
            receiver.clone(),
        );
        tx.sign(sender);
        tx
    }

    #[test]
    fn add_rejects_invalid_tx() {
        let sender = generate_keypair();
        let receiver = generate_keypair();
        let mut tx = signed_tx(&sender, &pem(&receiver));
        tx.fee = Amount::from_micros(999_000); // now unbalanced
        let mut pool = Pool::new();
        assert!(pool.add(tx).is_err());
    }

    #[test]
    fn add_is_idempotent_by_hash() {
        let sender = generate_keypair();
        let receiver = generate_keypair();
        let tx = signed_tx(&sender, &pem(&receiver));
        let mut pool = Pool::new();
        pool.add(tx.clone()).unwrap();
        pool.add(tx).unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn only_sender_can_cancel() {
        let sender = generate_keypair();
        let receiver = generate_keypair();
        let tx = signed_tx(&sender, &pem(&receiver));
        let hash = tx.hash_hex().unwrap();
        let mut pool = Pool::new();
        pool.add(tx).unwrap();

        assert!(!pool.cancel(&hash, &pem(&receiver)));
        assert!(pool.cancel(&hash, &pem(&sender)));
        assert!(pool.get(&hash).is_none());
    }

    #[test]
    fn by_account_finds_sender_and_receiver_txs() {
        let sender = generate_keypair();
        let receiver = generate_keypair();
        let tx = signed_tx(&sender, &pem(&receiver));
        let mut pool = Pool::new();
        pool.add(tx).unwrap();

        assert_eq!(pool.by_account(&pem(&sender)).len(), 1);
        assert_eq!(pool.by_account(&pem(&receiver)).len(), 1);
        assert_eq!(pool.by_account(&pem(&generate_keypair())).len(), 0);
    }
}
