//! Content-addressed, signed transactions.
//!
//! A transaction destroys no state by itself — it only becomes meaningful
//! once it sits inside a [`crate::block::Block`] that the ledger has
//! accepted. Until then it is an immutable, self-verifying record: its
//! `hash` is the SHA-256 of its own canonical field encoding, and its `sig`
//! is the sender's signature over that hash.

use crate::amount::Amount;
use crate::config::reward_value;
use crate::types::{Hash, PublicKeyPem};
use chrono::Utc;
use ferrochain_crypto::SigningKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxKind {
    Normal,
    Reward,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub kind: TxKind,
    pub input: Amount,
    pub output: Amount,
    pub fee: Amount,
    pub sender_pk: PublicKeyPem,
    pub receiver_pk: PublicKeyPem,
    pub created_at: String,
    pub hash: Option<Hash>,
    pub sig: Option<Vec<u8>>,
}

impl Tx {
    /// Builds an unsigned transaction. Call [`Tx::sign`] before pooling it.
    pub fn new(
        kind: TxKind,
        input: Amount,
        output: Amount,
        fee: Amount,
        sender_pk: PublicKeyPem,
        receiver_pk: PublicKeyPem,
    ) -> Self {
        Self {
            kind,
            input,
            output,
            fee,
            sender_pk,
            receiver_pk,
            created_at: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            hash: None,
            sig: None,
        }
    }

    /// Builds the self-signed 50-coin reward a new account receives on
    /// registration (`sender_pk == receiver_pk`).
    pub fn new_signup_reward(signing_key: &SigningKey, owner_pk: PublicKeyPem) -> Self {
        let mut tx = Self::new(
            TxKind::Reward,
            reward_value(),
            reward_value(),
            Amount::ZERO,
            owner_pk.clone(),
            owner_pk,
        );
        tx.sign(signing_key);
        tx
    }

    /// Builds the reward the third validator to tip quorum on a block owes
    /// its miner.
    pub fn new_validator_reward(
        signing_key: &SigningKey,
        validator_pk: PublicKeyPem,
        miner_pk: PublicKeyPem,
    ) -> Self {
        let mut tx = Self::new(
            TxKind::Reward,
            reward_value(),
            reward_value(),
            Amount::ZERO,
            validator_pk,
            miner_pk,
        );
        tx.sign(signing_key);
        tx
    }

    fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(match self.kind {
            TxKind::Normal => 0u8,
            TxKind::Reward => 1u8,
        });
        buf.extend_from_slice(&self.input.to_le_bytes());
        buf.extend_from_slice(&self.output.to_le_bytes());
        buf.extend_from_slice(&self.fee.to_le_bytes());
        buf.extend_from_slice(self.sender_pk.as_str().as_bytes());
        buf.extend_from_slice(self.receiver_pk.as_str().as_bytes());
        buf.extend_from_slice(self.created_at.as_bytes());
        buf
    }

    fn compute_hash(&self) -> Hash {
        ferrochain_crypto::hash256(&self.canonical_bytes())
    }

    /// Sets `hash` then signs it with `signing_key`, which must belong to
    /// `sender_pk`.
    pub fn sign(&mut self, signing_key: &SigningKey) {
        let hash = self.compute_hash();
        self.hash = Some(hash);
        self.sig = Some(ferrochain_crypto::sign(signing_key, &hash));
    }

    fn hash_is_valid(&self) -> bool {
        matches!(self.hash, Some(h) if h == self.compute_hash())
    }

    /// True iff `sig` verifies against `sender_pk` over `hash`.
    pub fn signed_by(&self, pk: &PublicKeyPem) -> bool {
        match (&self.hash, &self.sig) {
            (Some(hash), Some(sig)) => ferrochain_crypto::verify(pk.as_str(), hash, sig),
            _ => false,
        }
    }

    fn valid_input_output(&self) -> bool {
        self.input.is_positive()
            && self.output.is_positive()
            && self.output.checked_add(self.fee) == Some(self.input)
    }

    /// True iff the hash recomputes, the signature verifies, and the
    /// kind-specific amount rule holds.
    pub fn is_valid(&self) -> bool {
        if !self.hash_is_valid() {
            return false;
        }
        match self.kind {
            TxKind::Reward => {
                self.input == reward_value()
                    && self.output == reward_value()
                    && self.fee == Amount::ZERO
                    && self.signed_by(&self.sender_pk)
            }
            TxKind::Normal => self.signed_by(&self.sender_pk) && self.valid_input_output(),
        }
    }

    /// True iff this tx may be cancelled by the holder of `pk`: it must be
    /// NORMAL, sent by `pk`, and still validly signed.
    pub fn cancellable_by(&self, pk: &PublicKeyPem) -> bool {
        self.kind == TxKind::Normal && self.sender_pk == *pk && self.signed_by(pk)
    }

    pub fn hash_hex(&self) -> Option<String> {
        self.hash.as_ref().map(crate::types::hash_hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrochain_crypto::{encode_public_key, generate_keypair};

    fn pem(sk: &SigningKey) -> PublicKeyPem {
        PublicKeyPem(encode_public_key(&sk.verifying_key()).unwrap())
    }

    #[test]
    fn signed_normal_tx_is_valid() {
        let sender = generate_keypair();
        let receiver = generate_keypair();
        let mut tx = Tx::new(
            TxKind::Normal,
            Amount::from_whole(1),
            Amount::from_micros(900_000),
            Amount::from_micros(100_000),
            pem(&sender),
            pem(&receiver),
        );
        tx.sign(&sender);
        assert!(tx.is_valid());
    }

    #[test]
    fn mutating_any_field_after_signing_invalidates() {
        let sender = generate_keypair();
        let receiver = generate_keypair();
        let mut tx = Tx::new(
            TxKind::Normal,
            Amount::from_whole(1),
            Amount::from_micros(900_000),
            Amount::from_micros(100_000),
            pem(&sender),
            pem(&receiver),
        );
        tx.sign(&sender);
        assert!(tx.is_valid());

        tx.fee = Amount::from_micros(200_000);
        assert!(!tx.is_valid());
    }

    #[test]
    fn unbalanced_input_output_fee_is_invalid() {
        let sender = generate_keypair();
        let receiver = generate_keypair();
        let mut tx = Tx::new(
            TxKind::Normal,
            Amount::from_whole(1),
            Amount::from_whole(1), // output == input, fee should be 0 but isn't
            Amount::from_micros(100_000),
            pem(&sender),
            pem(&receiver),
        );
        tx.sign(&sender);
        assert!(!tx.is_valid());
    }

    #[test]
    fn reward_tx_must_be_self_addressed_fifty_coins() {
        let owner = generate_keypair();
        let tx = Tx::new_signup_reward(&owner, pem(&owner));
        assert!(tx.is_valid());
        assert_eq!(tx.input, reward_value());
    }

    #[test]
    fn only_sender_can_cancel_normal_tx() {
        let sender = generate_keypair();
        let receiver = generate_keypair();
        let mut tx = Tx::new(
            TxKind::Normal,
            Amount::from_whole(1),
            Amount::from_micros(900_000),
            Amount::from_micros(100_000),
            pem(&sender),
            pem(&receiver),
        );
        tx.sign(&sender);
        assert!(tx.cancellable_by(&pem(&sender)));
        assert!(!tx.cancellable_by(&pem(&receiver)));
    }

    #[test]
    fn reward_tx_is_never_cancellable() {
        let owner = generate_keypair();
        let tx = Tx::new_signup_reward(&owner, pem(&owner));
        assert!(!tx.cancellable_by(&pem(&owner)));
    }
}
