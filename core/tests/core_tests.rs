//! Cross-module scenarios exercising the account-based ledger end to end:
//! registration through mining, validation quorum, the rejection protocol's
//! tamper response, fair tx selection, and the inter-block maturity gate.

use ferrochain_core::amount::Amount;
use ferrochain_core::block::BlockState;
use ferrochain_core::clock::{Clock, SystemClock, TestClock};
use ferrochain_core::config::MATURITY_TIME;
use ferrochain_core::node::{Node, NodeOutcome};
use ferrochain_core::tx::{Tx, TxKind};
use ferrochain_core::types::PublicKeyPem;
use ferrochain_core::{accounts::Accounts, block::Block, chain::Chain, pool::Pool};

fn fresh_node() -> (Node, TestClock) {
    let clock = TestClock::new(1_700_000_000_000);
    let node = Node::new(
        Accounts::new(),
        Chain::new(),
        Pool::new(),
        Box::new(clock.clone()),
    );
    (node, clock)
}

fn register_five(node: &mut Node) {
    for i in 0..5 {
        assert_eq!(
            node.register(&format!("user{i}"), "pw").unwrap(),
            NodeOutcome::Success
        );
    }
}

#[test]
fn full_lifecycle_mines_and_reaches_validation_quorum() {
    let (mut node, _clock) = fresh_node();
    register_five(&mut node);

    node.login("user0", "pw").unwrap();
    assert_eq!(node.mine().unwrap(), NodeOutcome::Success);
    assert_eq!(node.chain().len(), 2); // genesis/first block, fresh working tip
    node.logout();

    for validator in ["user1", "user2", "user3"] {
        assert_eq!(node.login(validator, "pw").unwrap(), NodeOutcome::Success);
        node.logout();
    }

    let mined = node.chain().get_by_id(0).unwrap();
    assert_eq!(mined.accept_count(), 3);
    assert!(mined.is_validated());

    // The third validator's login minted a reward tx for the miner.
    assert!(node
        .pool()
        .snapshot()
        .values()
        .any(|tx| tx.kind == TxKind::Reward));
}

/// A structurally invalid block can never enter a chain: both
/// `Chain::add_mined_block` and `Node::apply_remote_block` gate on
/// `block_is_valid()`, so tamper detection happens at ingestion rather than
/// through the validator quorum. The reject-quorum path this test exercises
/// therefore models validators' *subjective* rejection of an already-valid
/// block (e.g. a policy dispute), not tamper recovery — see block.rs's
/// `third_reject_flag_reaches_reject_quorum` for the tamper-adjacent case of
/// a block that fails re-validation entirely.
#[test]
fn subjective_reject_quorum_resets_block_and_returns_its_txs() {
    let (mut setup, clock) = fresh_node();
    register_five(&mut setup);

    // Snapshot state before mining so the three validators log in while the
    // working block is still unmined — their login sweep has nothing to do.
    let pre_mine_accounts = setup.accounts().snapshot();
    let pre_mine_chain = setup.chain().clone();
    let pre_mine_pool = setup.pool().clone();

    let mut validators = Vec::new();
    for name in ["user1", "user2", "user3"] {
        let mut accounts = Accounts::new();
        for user in pre_mine_accounts.values() {
            accounts.add_user(user.clone());
        }
        let mut validator = Node::new(
            accounts,
            pre_mine_chain.clone(),
            pre_mine_pool.clone(),
            Box::new(clock.clone()),
        );
        assert_eq!(validator.login(name, "pw").unwrap(), NodeOutcome::Success);
        validators.push(validator);
    }

    setup.login("user0", "pw").unwrap();
    assert_eq!(setup.mine().unwrap(), NodeOutcome::Success);
    let mined_block = setup.chain().get_by_id(0).unwrap().clone();

    let mut outcomes = Vec::new();
    for validator in validators.iter_mut() {
        assert!(validator.apply_remote_block(mined_block.clone()));
        outcomes.push(validator.validate(0, false).unwrap());
    }
    assert_eq!(outcomes[0], NodeOutcome::Success);
    assert_eq!(outcomes[1], NodeOutcome::Success);
    assert_eq!(outcomes[2], NodeOutcome::Success);

    let reset = validators[2].chain().get_by_id(0).unwrap();
    assert!(reset.hash.is_none());
    assert_eq!(reset.state(None, &clock), BlockState::New);
    assert_eq!(validators[2].pool().len(), mined_block.txs.len());
}

#[test]
fn fair_selection_orders_normal_txs_by_fee_then_arrival() {
    let (mut node, _clock) = fresh_node();

    let mut hashes_by_fee = Vec::new();
    for i in 1..=12u64 {
        let sender = ferrochain_crypto::generate_keypair();
        let receiver = ferrochain_crypto::generate_keypair();
        let sender_pk = PublicKeyPem(ferrochain_crypto::encode_public_key(&sender.verifying_key()).unwrap());
        let receiver_pk =
            PublicKeyPem(ferrochain_crypto::encode_public_key(&receiver.verifying_key()).unwrap());
        let fee = Amount::from_micros(i * 1_000);
        let output = Amount::from_whole(1);
        let input = output.checked_add(fee).unwrap();
        let mut tx = Tx::new(TxKind::Normal, input, output, fee, sender_pk, receiver_pk);
        tx.sign(&sender);
        hashes_by_fee.push((i, tx.hash_hex().unwrap()));
        assert!(node.apply_remote_tx(tx));
    }

    assert_eq!(node.auto_fill_block(), NodeOutcome::Success);

    let block = node.chain().get_by_id(0).unwrap();
    assert_eq!(block.txs.len(), 10);

    // The two lowest-fee txs (i = 1, 2) must have been left behind in the pool.
    for (i, hash) in &hashes_by_fee {
        let in_block = block.txs.contains_key(hash);
        let in_pool = node.pool().get(hash).is_some();
        if *i <= 2 {
            assert!(in_pool && !in_block, "tx with fee {i} should still be pooled");
        } else {
            assert!(in_block && !in_pool, "tx with fee {i} should have been selected");
        }
    }
}

#[test]
fn mining_is_blocked_until_maturity_gate_passes() {
    let (mut node, clock) = fresh_node();
    register_five(&mut node);
    node.login("user0", "pw").unwrap();
    assert_eq!(node.mine().unwrap(), NodeOutcome::Success);
    node.logout();

    for validator in ["user1", "user2", "user3"] {
        node.login(validator, "pw").unwrap();
        node.logout();
    }
    assert!(node.chain().get_by_id(0).unwrap().is_validated());

    // Feed 5 more registrations to make the second working block minable.
    for i in 5..10 {
        node.register(&format!("user{i}"), "pw").unwrap();
    }
    node.login("user5", "pw").unwrap();

    // Not enough wall-clock time has passed since block 1's mined_at.
    assert_eq!(node.mine().unwrap(), NodeOutcome::Invalid);

    clock.advance(MATURITY_TIME.as_millis() as i64 + 1);
    assert_eq!(node.mine().unwrap(), NodeOutcome::Success);
}

#[test]
fn chain_all_txs_returns_the_full_accumulated_map() {
    let clock = SystemClock;
    let mut chain = Chain::new();
    chain.add_block(Block::genesis(&clock)).unwrap();
    assert!(chain.all_txs().is_empty());
}

/// Mining's timing band (10-20s) is only observable in real wall-clock time
/// and depends on this machine's SHA-256 throughput relative to the
/// original assessment hardware; run manually with `cargo test -- --ignored`.
#[test]
#[ignore]
fn mining_completes_within_a_reasonable_wall_clock_band() {
    let clock = SystemClock;
    let mut block = ferrochain_core::block::Block::new_on_top_of(1, None, &clock);
    for _ in 0..5 {
        let sender = ferrochain_crypto::generate_keypair();
        let receiver = ferrochain_crypto::generate_keypair();
        let sender_pk = PublicKeyPem(ferrochain_crypto::encode_public_key(&sender.verifying_key()).unwrap());
        let receiver_pk =
            PublicKeyPem(ferrochain_crypto::encode_public_key(&receiver.verifying_key()).unwrap());
        let mut tx = Tx::new(
            TxKind::Normal,
            Amount::from_whole(1),
            Amount::from_micros(900_000),
            Amount::from_micros(100_000),
            sender_pk,
            receiver_pk,
        );
        tx.sign(&sender);
        block.add_tx(tx);
    }
    let miner = ferrochain_crypto::generate_keypair();
    let miner_pk = PublicKeyPem(ferrochain_crypto::encode_public_key(&miner.verifying_key()).unwrap());
    let started = clock.now_millis();
    let mined = block.mine(&miner, miner_pk, &clock);
    let elapsed_secs = (mined.mined_at.unwrap() - started) / 1000;
    assert!((10..=20).contains(&elapsed_secs));
}
