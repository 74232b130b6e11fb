//! The node engine: the single mutable core every user-facing operation and
//! every gossip-inbox handler goes through.
//!
//! Grounded in `Node.py`'s `Node` class: `register`/`login`/`logout`,
//! `create_tx`/`cancel_tx`, `mine_block`, `validate_previous_block`,
//! `auto_fill_rewards`/`auto_fill_block`, and the wallet reconstruction in
//! `get_user_wallet`. The tri-valued `{SUCCESS, FAIL, INVALID}` contract
//! becomes `Result<NodeOutcome, Error>`: outright failures (bad password,
//! crypto errors) are `Err`, while "that request doesn't apply right now"
//! stays in-band as `Ok(NodeOutcome::Invalid)`.

use crate::accounts::{Accounts, User};
use crate::amount::Amount;
use crate::block::{Block, BlockState, FlagOutcome};
use crate::chain::Chain;
use crate::clock::Clock;
use crate::config::{reward_value, TX_MAX};
use crate::pool::Pool;
use crate::tx::{Tx, TxKind};
use crate::types::PublicKeyPem;
use ferrochain_crypto::SigningKey;
use log::{info, warn};
use std::collections::VecDeque;

const NOTIFICATION_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOutcome {
    Success,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
    pub at_millis: i64,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletView {
    pub incoming: Amount,
    pub outgoing: Amount,
    pub reserved: Amount,
    pub fees: Amount,
    pub available: Amount,
}

struct Session {
    username: String,
    signing_key: SigningKey,
    pub_key: PublicKeyPem,
}

pub struct Node {
    accounts: Accounts,
    chain: Chain,
    pool: Pool,
    clock: Box<dyn Clock>,
    session: Option<Session>,
    notifications: VecDeque<Notification>,
}

impl Node {
    /// Builds a node over already-loaded state, minting the genesis block
    /// if the chain is empty. The genesis block doubles as the first
    /// working block (no predecessor means no maturity check applies to
    /// it), matching the original system's single-block bootstrap.
    pub fn new(accounts: Accounts, mut chain: Chain, pool: Pool, clock: Box<dyn Clock>) -> Self {
        if chain.is_empty() {
            chain
                .add_block(Block::genesis(clock.as_ref()))
                .expect("an empty chain always accepts its own genesis block");
        }
        Self {
            accounts,
            chain,
            pool,
            clock,
            session: None,
            notifications: VecDeque::new(),
        }
    }

    pub fn accounts(&self) -> &Accounts {
        &self.accounts
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn notifications(&self) -> &VecDeque<Notification> {
        &self.notifications
    }

    /// The highest block id this node knows about, including its own unmined
    /// working tip. Compared across peers during startup sync to pick an
    /// authoritative source of catch-up blocks.
    pub fn head_id(&self) -> u64 {
        self.chain.len() as u64 - 1
    }

    pub fn current_user(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.username.as_str())
    }

    fn notify(&mut self, severity: Severity, message: impl Into<String>) {
        if self.notifications.len() == NOTIFICATION_CAPACITY {
            self.notifications.pop_front();
        }
        self.notifications.push_back(Notification {
            message: message.into(),
            at_millis: self.clock.now_millis(),
            severity,
        });
    }

    fn session(&self) -> crate::Result<&Session> {
        self.session.as_ref().ok_or(crate::Error::Unauthorized)
    }

    /// Appends a freshly minted empty block on top of the chain's tip.
    fn extend_working_block(&mut self) {
        let next_id = self.chain.len() as u64;
        let previous_hash = self.chain.tip_hash();
        let working = Block::new_on_top_of(next_id, previous_hash, self.clock.as_ref());
        self.chain
            .add_block(working)
            .expect("freshly built block always links to the current tip");
    }

    /// Registers a new account, mints its sign-up reward into the pool, and
    /// opportunistically fills reward txs into the working block.
    pub fn register(&mut self, username: &str, password: &str) -> crate::Result<NodeOutcome> {
        if self.accounts.user_exists(username) {
            return Ok(NodeOutcome::Invalid);
        }

        let signing_key = ferrochain_crypto::generate_keypair();
        let pub_key = PublicKeyPem(ferrochain_crypto::encode_public_key(&signing_key.verifying_key())?);
        let priv_key_encrypted =
            crate::types::EncryptedPrivateKey(ferrochain_crypto::encrypt_private_key(&signing_key, password));

        let user = User {
            username: username.to_string(),
            password_digest: ferrochain_crypto::password_digest(username, password),
            priv_key_encrypted,
            pub_key: pub_key.clone(),
        };
        if !self.accounts.add_user(user) {
            return Ok(NodeOutcome::Invalid);
        }

        let reward_tx = Tx::new_signup_reward(&signing_key, pub_key);
        self.pool.add(reward_tx)?;
        self.auto_fill_rewards();
        self.notify(Severity::Info, format!("registered new account '{username}'"));
        info!("registered new account '{username}'");
        Ok(NodeOutcome::Success)
    }

    /// Logs a user in, runs the validation sweep over mined-but-unvalidated
    /// blocks, and cancels any of the caller's own txs the rejection
    /// protocol flagged invalid.
    pub fn login(&mut self, username: &str, password: &str) -> crate::Result<NodeOutcome> {
        let Some(user) = self.accounts.get_user(username).cloned() else {
            return Ok(NodeOutcome::Invalid);
        };
        if !user.authorize(password) {
            return Err(crate::Error::Unauthorized);
        }

        let signing_key = ferrochain_crypto::decrypt_private_key(&user.priv_key_encrypted.0, password)?;
        self.session = Some(Session {
            username: username.to_string(),
            signing_key,
            pub_key: user.pub_key.clone(),
        });

        self.run_validation_sweep()?;
        self.auto_cancel_invalid_flagged();
        self.notify(Severity::Info, format!("'{username}' logged in"));
        Ok(NodeOutcome::Success)
    }

    pub fn logout(&mut self) -> NodeOutcome {
        if let Some(session) = self.session.take() {
            self.notify(Severity::Info, format!("'{}' logged out", session.username));
        }
        NodeOutcome::Success
    }

    /// Walks backward from the block below the empty working tip over
    /// contiguously-mined-but-unvalidated blocks, casting this session's
    /// validation flag on each.
    fn run_validation_sweep(&mut self) -> crate::Result<()> {
        // The working tip itself is always a fresh, unmined block; the
        // block that might need validating sits one slot below it.
        let mut idx = self.chain.len().saturating_sub(1);
        while idx > 0 {
            idx -= 1;
            let previous = if idx == 0 {
                None
            } else {
                self.chain.get_by_id((idx - 1) as u64)
            };
            let Some(block) = self.chain.get_by_id(idx as u64) else {
                break;
            };
            if block.state(previous, self.clock.as_ref()) != BlockState::Mined {
                break;
            }
            self.validate_block(idx as u64, true)?;
        }
        Ok(())
    }

    /// Casts a validation flag on block `id` for the logged-in session.
    /// Structurally valid blocks are accepted; structurally invalid ones are
    /// flagged as rejects regardless of `propose_accept`.
    fn validate_block(&mut self, id: u64, propose_accept: bool) -> crate::Result<NodeOutcome> {
        let (signing_key, validator_pk) = {
            let session = self.session()?;
            (session.signing_key.clone(), session.pub_key.clone())
        };
        let miner_pk = match self.chain.get_by_id(id) {
            Some(b) => b.mined_by.clone(),
            None => return Ok(NodeOutcome::Invalid),
        };
        let accept = propose_accept && self.chain.get_by_id(id).is_some_and(|b| b.block_is_valid());

        let Some(block) = self.chain.get_by_id_mut(id) else {
            return Ok(NodeOutcome::Invalid);
        };
        let outcome = match block.validate(&signing_key, validator_pk.clone(), accept) {
            Ok(outcome) => outcome,
            Err(crate::Error::PreconditionUnmet) => return Ok(NodeOutcome::Invalid),
            Err(crate::Error::InvalidBlock) => {
                self.notify(Severity::Warn, format!("block {id} failed structural validation"));
                return Ok(NodeOutcome::Invalid);
            }
            Err(e) => return Err(e),
        };

        match outcome {
            FlagOutcome::Rejected => Ok(NodeOutcome::Invalid),
            FlagOutcome::Recorded => Ok(NodeOutcome::Success),
            FlagOutcome::AcceptQuorumReached => {
                self.notify(Severity::Info, format!("block {id} reached validation quorum"));
                if let Some(miner_pk) = miner_pk {
                    let reward_tx = Tx::new_validator_reward(&signing_key, validator_pk, miner_pk);
                    self.pool.add(reward_tx)?;
                    self.auto_fill_rewards();
                }
                Ok(NodeOutcome::Success)
            }
            FlagOutcome::RejectQuorumReached => {
                self.handle_reject_quorum(id);
                Ok(NodeOutcome::Success)
            }
        }
    }

    /// Drains the rejected block's txs back to the pool (flagging the
    /// invalid ones for their creator to cancel on next login) and resets it
    /// to `NEW`. Deterministic from the flags now present on the block, so
    /// it applies the same whether reject quorum was reached by a flag this
    /// session just cast or one that arrived over gossip.
    fn handle_reject_quorum(&mut self, id: u64) {
        let block = self
            .chain
            .get_by_id_mut(id)
            .expect("id was just validated above");
        let returned_txs = block.drain_txs();
        block.reset_to_new(self.clock.as_ref());
        let mut invalidated = 0;
        for tx in returned_txs {
            let hash = tx.hash_hex();
            if tx.is_valid() {
                let _ = self.pool.add(tx);
            } else if let Some(hash) = hash {
                self.pool.flag_invalid(&hash);
                invalidated += 1;
            }
        }
        self.notify(
            Severity::Warn,
            format!("block {id} rejected by quorum, {invalidated} tx(s) flagged invalid"),
        );
    }

    /// Cancels any pool tx the rejection protocol flagged invalid that
    /// belongs to the logged-in session.
    fn auto_cancel_invalid_flagged(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let pk = session.pub_key.clone();
        for hash in self.pool.invalid_flagged_for(&pk) {
            self.pool.cancel(&hash, &pk);
            self.notify(Severity::Info, format!("cancelled invalid-flagged tx {hash}"));
        }
    }

    /// Creates and pools a normal transaction from the logged-in session to
    /// `receiver_pk`.
    pub fn create_tx(
        &mut self,
        output: Amount,
        fee: Amount,
        receiver_pk: PublicKeyPem,
    ) -> crate::Result<NodeOutcome> {
        let (signing_key, sender_pk) = {
            let session = self.session()?;
            (session.signing_key.clone(), session.pub_key.clone())
        };
        let Some(input) = output.checked_add(fee) else {
            return Ok(NodeOutcome::Invalid);
        };
        if self.wallet_view()?.available < input {
            return Ok(NodeOutcome::Invalid);
        }

        let mut tx = Tx::new(TxKind::Normal, input, output, fee, sender_pk, receiver_pk);
        tx.sign(&signing_key);
        self.pool.add(tx)?;
        Ok(NodeOutcome::Success)
    }

    /// Cancels a pooled tx, authorized only for its own sender.
    pub fn cancel_tx(&mut self, tx_hash: &str) -> crate::Result<NodeOutcome> {
        let pk = self.session()?.pub_key.clone();
        if self.pool.cancel(tx_hash, &pk) {
            Ok(NodeOutcome::Success)
        } else {
            Ok(NodeOutcome::Invalid)
        }
    }

    /// Mines the working block if it is `READY`, replaces it in the chain,
    /// and appends a fresh empty working block behind it.
    pub fn mine(&mut self) -> crate::Result<NodeOutcome> {
        let (signing_key, miner_pk) = {
            let session = self.session()?;
            (session.signing_key.clone(), session.pub_key.clone())
        };

        let tip_id = self.chain.len() as u64 - 1;
        let previous = self.chain.get_by_id(tip_id.wrapping_sub(1)).cloned();
        let Some(working) = self.chain.get_by_id(tip_id).cloned() else {
            return Ok(NodeOutcome::Invalid);
        };
        if !working.is_ready(previous.as_ref(), self.clock.as_ref()) {
            return Ok(NodeOutcome::Invalid);
        }

        let mined = working.mine(&signing_key, miner_pk.clone(), self.clock.as_ref());
        self.chain.add_mined_block(mined)?;
        self.extend_working_block();
        self.notify(Severity::Info, format!("mined block {tip_id}"));
        info!("mined block {tip_id}");
        Ok(NodeOutcome::Success)
    }

    /// Public entry to validate a specific mined block by id (used when a
    /// peer announces a validation-worthy block out of the login sweep's
    /// order).
    pub fn validate(&mut self, block_id: u64, accept: bool) -> crate::Result<NodeOutcome> {
        self.validate_block(block_id, accept)
    }

    /// Fills reward txs (signup/validator payouts) into the working block,
    /// up to `TX_MAX`. Grounded in `auto_fill_rewards`.
    pub fn auto_fill_rewards(&mut self) -> NodeOutcome {
        let tip_id = self.chain.len() as u64 - 1;
        let Some(block) = self.chain.get_by_id(tip_id) else {
            return NodeOutcome::Invalid;
        };
        if block.state(None, self.clock.as_ref()) > BlockState::Ready {
            return NodeOutcome::Invalid;
        }

        let mut rewards: Vec<Tx> = self
            .pool
            .snapshot()
            .into_values()
            .filter(|tx| tx.kind == TxKind::Reward)
            .collect();
        rewards.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let block = self
            .chain
            .get_by_id_mut(tip_id)
            .expect("tip_id was just read above");
        for tx in rewards {
            if block.txs.len() >= TX_MAX {
                break;
            }
            let Some(hash) = tx.hash_hex() else { continue };
            if let Some(tx) = self.pool.pop(&hash) {
                block.add_tx(tx);
            }
        }
        NodeOutcome::Success
    }

    /// Fills the working block with reward txs first, then normal txs
    /// ordered `(fee descending, created_at ascending)` so fee motivates
    /// inclusion without letting any single sender dominate selection.
    pub fn auto_fill_block(&mut self) -> NodeOutcome {
        self.auto_fill_rewards();

        let tip_id = self.chain.len() as u64 - 1;
        let Some(block) = self.chain.get_by_id(tip_id) else {
            return NodeOutcome::Invalid;
        };
        if block.state(None, self.clock.as_ref()) > BlockState::Ready {
            return NodeOutcome::Invalid;
        }

        let mut payments: Vec<Tx> = self
            .pool
            .snapshot()
            .into_values()
            .filter(|tx| tx.kind == TxKind::Normal)
            .collect();
        payments.sort_by(|a, b| b.fee.cmp(&a.fee).then_with(|| a.created_at.cmp(&b.created_at)));

        let block = self
            .chain
            .get_by_id_mut(tip_id)
            .expect("tip_id was just read above");
        for tx in payments {
            if block.txs.len() >= TX_MAX {
                break;
            }
            let Some(hash) = tx.hash_hex() else { continue };
            if let Some(tx) = self.pool.pop(&hash) {
                block.add_tx(tx);
            }
        }
        NodeOutcome::Success
    }

    /// Reconstructs the logged-in session's wallet view from committed and
    /// pooled transactions. Grounded in `get_user_wallet`.
    pub fn wallet_view(&self) -> crate::Result<WalletView> {
        let pk = self.session()?.pub_key.clone();
        Ok(self.wallet_view_for(&pk))
    }

    /// `wallet_view`'s computation, open to any public key rather than only
    /// the logged-in session. Used by the gossip inbox's NORMAL-tx balance
    /// check, which must evaluate an arbitrary sender's wallet.
    pub(crate) fn wallet_view_for(&self, pk: &PublicKeyPem) -> WalletView {
        let processed = self.chain.get_txs_by_public_key(pk);
        let pending = self.pool.by_account(pk);

        let incoming: Amount = processed
            .iter()
            .filter(|tx| tx.receiver_pk == *pk)
            .map(|tx| tx.output)
            .sum();
        let outgoing: Amount = processed
            .iter()
            .filter(|tx| tx.sender_pk == *pk && tx.kind == TxKind::Normal)
            .map(|tx| tx.input)
            .sum();
        let reserved: Amount = pending
            .iter()
            .filter(|tx| tx.sender_pk == *pk && tx.kind == TxKind::Normal)
            .map(|tx| tx.input)
            .sum();
        let fees = self.chain.get_tx_fees_by_public_key(pk);
        let available = incoming
            .checked_sub(outgoing)
            .and_then(|v| v.checked_sub(reserved))
            .map(|v| v + fees)
            .unwrap_or(Amount::ZERO);

        WalletView {
            incoming,
            outgoing,
            reserved,
            fees,
            available,
        }
    }

    /// Applies a user announced by a peer. Returns `true` if it was new.
    pub fn apply_remote_user(&mut self, user: User) -> bool {
        let added = self.accounts.add_user(user.clone());
        if added {
            info!("received and added new user: {}", user.username);
        } else {
            warn!("received and rejected duplicate user: {}", user.username);
        }
        added
    }

    /// Applies a tx announced by a peer. NORMAL txs are additionally subject
    /// to the sender's available balance; REWARD txs opportunistically fill
    /// the working block once pooled.
    pub fn apply_remote_tx(&mut self, tx: Tx) -> bool {
        if !tx.is_valid() {
            warn!("received and rejected invalid tx");
            return false;
        }
        match tx.kind {
            TxKind::Normal => {
                if self.wallet_view_for(&tx.sender_pk).available < tx.input {
                    warn!("received and rejected tx: sender has insufficient balance");
                    return false;
                }
                self.pool.add(tx).is_ok()
            }
            TxKind::Reward => {
                let added = self.pool.add(tx).is_ok();
                if added {
                    self.auto_fill_rewards();
                }
                added
            }
        }
    }

    /// Applies a mined block announced by a peer, removing any of its txs
    /// that were still sitting in this node's own pool on acceptance.
    pub fn apply_remote_block(&mut self, block: Block) -> bool {
        let tx_hashes: Vec<String> = block.txs.keys().cloned().collect();
        match self.chain.add_mined_block(block) {
            Ok(true) => {
                for hash in tx_hashes {
                    self.pool.pop(&hash);
                }
                true
            }
            Ok(false) | Err(_) => false,
        }
    }

    /// Applies a validation flag announced by a peer. Unlike the local
    /// `validate_block` path, a quorum tipped to `AcceptQuorumReached` here
    /// never mints a validator reward: minting requires signing with the
    /// validator's own private key, which this node doesn't hold for a
    /// remote validator's flag. A tip to `RejectQuorumReached`, by contrast,
    /// is a deterministic function of the flags now on the block, so it is
    /// applied here exactly as it would be locally.
    pub fn apply_remote_flag(
        &mut self,
        block_id: u64,
        validator_pk: PublicKeyPem,
        signature: Vec<u8>,
        accept: bool,
    ) -> bool {
        let Some(block) = self.chain.get_by_id_mut(block_id) else {
            return false;
        };
        let outcome = block.record_remote_flag(crate::block::ValidationFlag {
            block_id,
            validator_pk,
            signature,
            accept,
        });
        match outcome {
            Ok(FlagOutcome::Rejected) | Err(_) => false,
            Ok(FlagOutcome::Recorded) | Ok(FlagOutcome::AcceptQuorumReached) => true,
            Ok(FlagOutcome::RejectQuorumReached) => {
                self.handle_reject_quorum(block_id);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;

    fn fresh_node() -> (Node, TestClock) {
        let clock = TestClock::new(1_000_000);
        let node = Node::new(Accounts::new(), Chain::new(), Pool::new(), Box::new(clock.clone()));
        (node, clock)
    }

    #[test]
    fn register_mints_signup_reward_into_working_block() {
        let (mut node, _clock) = fresh_node();
        assert_eq!(node.register("alice", "pw").unwrap(), NodeOutcome::Success);
        assert_eq!(node.register("alice", "pw").unwrap(), NodeOutcome::Invalid);
        let tip = node.chain.get_by_id(node.chain.len() as u64 - 1).unwrap();
        assert_eq!(tip.txs.len(), 1);
    }

    #[test]
    fn login_requires_correct_password() {
        let (mut node, _clock) = fresh_node();
        node.register("alice", "pw").unwrap();
        assert!(node.login("alice", "wrong").is_err());
        assert_eq!(node.login("alice", "pw").unwrap(), NodeOutcome::Success);
        assert_eq!(node.login("nobody", "pw").unwrap(), NodeOutcome::Invalid);
    }

    #[test]
    fn create_tx_rejects_insufficient_balance() {
        let (mut node, _clock) = fresh_node();
        node.register("alice", "pw").unwrap();
        node.login("alice", "pw").unwrap();
        let receiver = ferrochain_crypto::generate_keypair();
        let receiver_pk =
            PublicKeyPem(ferrochain_crypto::encode_public_key(&receiver.verifying_key()).unwrap());
        let outcome = node
            .create_tx(Amount::from_whole(1000), Amount::ZERO, receiver_pk)
            .unwrap();
        assert_eq!(outcome, NodeOutcome::Invalid);
    }

    #[test]
    fn logout_clears_session_and_wallet_view_then_fails() {
        let (mut node, _clock) = fresh_node();
        node.register("alice", "pw").unwrap();
        node.login("alice", "pw").unwrap();
        assert_eq!(node.logout(), NodeOutcome::Success);
        assert!(node.wallet_view().is_err());
    }
}
