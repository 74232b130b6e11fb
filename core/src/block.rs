//! Blocks: ordered containers of transactions with a proof-of-work hash, a
//! miner signature, and a quorum of validator flags.
//!
//! A [`Block`] does not own its predecessor — [`crate::chain::Chain`] stores
//! blocks in an index-addressed `Vec`, so every operation that needs
//! linkage or maturity context (`is_ready`, `state`) takes the previous
//! block as a borrowed parameter instead of walking an owning back-pointer.

use crate::amount::Amount;
use crate::clock::Clock;
use crate::config::{
    DIFFICULTY_WIDEN_INTERVAL, INITIAL_DIFFICULTY_BUMP, LEADING_ZEROES, NEXT_CHAR_LIMIT_STEP,
    REQUIRED_FLAGS, TX_MAX, TX_MIN,
};
use crate::tx::{Tx, TxKind};
use crate::types::{hash_hex, Hash, PublicKeyPem};
use ferrochain_crypto::SigningKey;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockState {
    New,
    Ready,
    Mined,
    Validated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFlag {
    pub block_id: u64,
    pub validator_pk: PublicKeyPem,
    pub signature: Vec<u8>,
    /// `true` = accept, `false` = reject. See the rejection protocol below.
    pub accept: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: u64,
    pub previous_hash: Option<Hash>,
    pub txs: BTreeMap<String, Tx>,
    pub nonce: [u8; 32],
    pub difficulty_bump: u32,
    pub minted_at: i64,
    pub mined_at: Option<i64>,
    pub mined_by: Option<PublicKeyPem>,
    pub hash: Option<Hash>,
    pub signature: Option<Vec<u8>>,
    pub validation_flags: Vec<ValidationFlag>,
}

/// Outcome of appending a validation flag, distinguishing "nothing changed"
/// from the two quorum-tipping events the node engine must react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagOutcome {
    /// Flag recorded; quorum (in either direction) not yet reached.
    Recorded,
    /// This flag was the third accept: node engine must mint the miner's reward.
    AcceptQuorumReached,
    /// This flag was the third reject: node engine must return the block's
    /// txs to the pool and reset this block to NEW.
    RejectQuorumReached,
    /// Flag was not recorded (already flagged by this key, or caller is the miner).
    Rejected,
}

impl Block {
    /// Builds a fresh `NEW` block on top of `previous` (`None` for genesis).
    pub fn new_on_top_of(id: u64, previous_hash: Option<Hash>, clock: &dyn Clock) -> Self {
        let mut nonce = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce);
        Self {
            id,
            previous_hash,
            txs: BTreeMap::new(),
            nonce,
            difficulty_bump: INITIAL_DIFFICULTY_BUMP as u32,
            minted_at: clock.now_millis(),
            mined_at: None,
            mined_by: None,
            hash: None,
            signature: None,
            validation_flags: Vec::new(),
        }
    }

    pub fn genesis(clock: &dyn Clock) -> Self {
        Self::new_on_top_of(0, None, clock)
    }

    fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.id.to_le_bytes());
        match &self.previous_hash {
            Some(h) => buf.extend_from_slice(h),
            None => buf.push(0),
        }
        // BTreeMap iterates in key order, so this is deterministic across peers.
        for (hash_hex, _tx) in &self.txs {
            buf.extend_from_slice(hash_hex.as_bytes());
        }
        buf.extend_from_slice(&self.nonce);
        buf.extend_from_slice(&self.difficulty_bump.to_le_bytes());
        buf.extend_from_slice(&self.minted_at.to_le_bytes());
        buf.extend_from_slice(&self.mined_at.unwrap_or(0).to_le_bytes());
        if let Some(pk) = &self.mined_by {
            buf.extend_from_slice(pk.as_str().as_bytes());
        }
        buf
    }

    pub fn compute_hash(&self) -> Hash {
        ferrochain_crypto::hash256(&self.canonical_bytes())
    }

    /// Adds `tx` if it is valid and the block hasn't been mined yet.
    pub fn add_tx(&mut self, tx: Tx) -> bool {
        if tx.is_valid() && self.hash.is_none() {
            if let Some(hash_hex) = tx.hash_hex() {
                self.txs.insert(hash_hex, tx);
                return true;
            }
        }
        false
    }

    pub fn pop_tx(&mut self, tx_hash: &str) -> Option<Tx> {
        self.txs.remove(tx_hash)
    }

    pub fn get_tx(&self, tx_hash: &str) -> Option<&Tx> {
        self.txs.get(tx_hash)
    }

    pub fn tx_fees(&self) -> Amount {
        self.txs.values().map(|tx| tx.fee).sum()
    }

    pub fn txs_by_public_key(&self, pk: &PublicKeyPem) -> Vec<&Tx> {
        self.txs
            .values()
            .filter(|tx| tx.sender_pk == *pk || tx.receiver_pk == *pk)
            .collect()
    }

    fn conservation_holds(&self) -> bool {
        let total_in: Amount = self.txs.values().map(|tx| tx.input).sum();
        let total_out_plus_fee: Amount = self
            .txs
            .values()
            .map(|tx| tx.output + tx.fee)
            .sum();
        total_in == total_out_plus_fee
    }

    fn txs_are_valid(&self) -> bool {
        self.txs.values().all(|tx| tx.is_valid())
    }

    fn hash_is_valid(&self) -> bool {
        match (&self.hash, &self.signature, &self.mined_by) {
            (None, _, _) => true,
            (Some(hash), Some(sig), Some(miner_pk)) => {
                *hash == self.compute_hash()
                    && good_nonce(hash, self.difficulty_bump)
                    && ferrochain_crypto::verify(miner_pk.as_str(), hash, sig)
            }
            _ => false,
        }
    }

    /// Structural validity: hash (if present) checks out, transactions
    /// balance, and every transaction is itself valid. Does not check
    /// linkage to a previous block — see [`crate::chain::Chain::chain_is_valid`].
    pub fn block_is_valid(&self) -> bool {
        self.hash_is_valid() && self.conservation_holds() && self.txs_are_valid()
    }

    /// `READY` predicate: unmined, within the tx-count window, its
    /// predecessor (if any) is validated and matured, and it is otherwise
    /// structurally valid.
    pub fn is_ready(&self, previous: Option<&Block>, clock: &dyn Clock) -> bool {
        self.hash.is_none()
            && (TX_MIN..=TX_MAX).contains(&self.txs.len())
            && match previous {
                None => true,
                Some(prev) => {
                    let matured = prev
                        .mined_at
                        .map(|t| {
                            clock.now_millis() - t
                                >= crate::config::MATURITY_TIME.as_millis() as i64
                        })
                        .unwrap_or(false);
                    matured && prev.is_validated()
                }
            }
            && self.block_is_valid()
    }

    pub fn state(&self, previous: Option<&Block>, clock: &dyn Clock) -> BlockState {
        if self.hash.is_none() {
            if self.is_ready(previous, clock) {
                BlockState::Ready
            } else {
                BlockState::New
            }
        } else if self.is_validated() {
            BlockState::Validated
        } else {
            BlockState::Mined
        }
    }

    /// Distinct, verifying, non-miner flags of the given polarity.
    fn verified_flags(&self, accept: bool) -> Vec<&ValidationFlag> {
        let Some(hash) = &self.hash else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        self.validation_flags
            .iter()
            .filter(|f| {
                f.accept == accept
                    && Some(&f.validator_pk) != self.mined_by.as_ref()
                    && ferrochain_crypto::verify(f.validator_pk.as_str(), hash, &f.signature)
                    && seen.insert(&f.validator_pk)
            })
            .collect()
    }

    pub fn accept_count(&self) -> usize {
        self.verified_flags(true).len()
    }

    pub fn reject_count(&self) -> usize {
        self.verified_flags(false).len()
    }

    pub fn is_validated(&self) -> bool {
        self.hash_is_valid() && self.accept_count() >= REQUIRED_FLAGS
    }

    pub fn flagged_by(&self, pk: &PublicKeyPem) -> bool {
        self.verified_flags(true)
            .iter()
            .chain(self.verified_flags(false).iter())
            .any(|f| f.validator_pk == *pk)
    }

    /// Appends a validation flag from `validator_pk`, signed with
    /// `signing_key`. The caller must not be the block's miner and must not
    /// have already flagged this block.
    pub fn validate(
        &mut self,
        signing_key: &SigningKey,
        validator_pk: PublicKeyPem,
        accept: bool,
    ) -> crate::Result<FlagOutcome> {
        let Some(hash) = self.hash else {
            return Err(crate::Error::PreconditionUnmet);
        };
        if !self.block_is_valid() {
            return Err(crate::Error::InvalidBlock);
        }
        if Some(&validator_pk) == self.mined_by.as_ref() || self.flagged_by(&validator_pk) {
            return Ok(FlagOutcome::Rejected);
        }

        let signature = ferrochain_crypto::sign(signing_key, &hash);
        Ok(self.push_flag(ValidationFlag {
            block_id: self.id,
            validator_pk,
            signature,
            accept,
        }))
    }

    /// Records a flag that arrived already signed, from a peer over gossip,
    /// rather than being signed locally. Runs the same preconditions as
    /// [`Block::validate`] plus a signature check, since the signing key
    /// itself isn't available to authenticate the caller here.
    pub fn record_remote_flag(&mut self, flag: ValidationFlag) -> crate::Result<FlagOutcome> {
        let Some(hash) = self.hash else {
            return Err(crate::Error::PreconditionUnmet);
        };
        if !self.block_is_valid() {
            return Err(crate::Error::InvalidBlock);
        }
        if flag.block_id != self.id {
            return Ok(FlagOutcome::Rejected);
        }
        if Some(&flag.validator_pk) == self.mined_by.as_ref() || self.flagged_by(&flag.validator_pk) {
            return Ok(FlagOutcome::Rejected);
        }
        if !ferrochain_crypto::verify(flag.validator_pk.as_str(), &hash, &flag.signature) {
            return Ok(FlagOutcome::Rejected);
        }

        Ok(self.push_flag(flag))
    }

    fn push_flag(&mut self, flag: ValidationFlag) -> FlagOutcome {
        let accept = flag.accept;
        self.validation_flags.push(flag);

        if accept && self.accept_count() == REQUIRED_FLAGS {
            FlagOutcome::AcceptQuorumReached
        } else if !accept && self.reject_count() == REQUIRED_FLAGS {
            FlagOutcome::RejectQuorumReached
        } else {
            FlagOutcome::Recorded
        }
    }

    /// Drains every transaction out of the block, returning them. Used by
    /// the rejection protocol to return txs to the pool.
    pub fn drain_txs(&mut self) -> Vec<Tx> {
        std::mem::take(&mut self.txs).into_values().collect()
    }

    /// Resets a rejected block back to a fresh `NEW` state: clears its
    /// mining/validation state and draws a new nonce, but keeps its `id`
    /// and `previous_hash`.
    pub fn reset_to_new(&mut self, clock: &dyn Clock) {
        let mut nonce = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce);
        self.nonce = nonce;
        self.difficulty_bump = INITIAL_DIFFICULTY_BUMP as u32;
        self.minted_at = clock.now_millis();
        self.mined_at = None;
        self.mined_by = None;
        self.hash = None;
        self.signature = None;
        self.validation_flags.clear();
    }

    /// Brute-force proof-of-work search. Widens `difficulty_bump` by
    /// [`NEXT_CHAR_LIMIT_STEP`] every [`DIFFICULTY_WIDEN_INTERVAL`] of
    /// unsuccessful search instead of sleeping or otherwise pacing itself.
    ///
    /// Consumes `self` and returns it with `hash`/`signature`/`mined_by`
    /// set; the caller is expected to have already checked
    /// [`Block::is_ready`].
    pub fn mine(mut self, signing_key: &SigningKey, miner_pk: PublicKeyPem, clock: &dyn Clock) -> Self {
        self.mined_by = Some(miner_pk);
        self.mined_at = Some(clock.now_millis());
        let mut candidate = self.compute_hash();
        let mut window_start = clock.now_millis();

        while !good_nonce(&candidate, self.difficulty_bump) {
            rand::thread_rng().fill_bytes(&mut self.nonce);
            self.mined_at = Some(clock.now_millis());
            candidate = self.compute_hash();

            let now = clock.now_millis();
            if now - window_start >= DIFFICULTY_WIDEN_INTERVAL.as_millis() as i64 {
                self.difficulty_bump += NEXT_CHAR_LIMIT_STEP as u32;
                window_start = now;
            }
        }

        self.hash = Some(candidate);
        self.signature = Some(ferrochain_crypto::sign(signing_key, &candidate));
        self
    }

    pub fn hash_hex(&self) -> Option<String> {
        self.hash.as_ref().map(hash_hex)
    }
}

/// A digest is "good" iff its first [`LEADING_ZEROES`] raw bytes are each
/// ASCII `'0'` (`0x30`) and the byte immediately after them is
/// `<= difficulty_bump`.
pub fn good_nonce(hash: &Hash, difficulty_bump: u32) -> bool {
    if !hash[..LEADING_ZEROES].iter().all(|&b| b == b'0') {
        return false;
    }
    hash[LEADING_ZEROES] as u32 <= difficulty_bump
}
