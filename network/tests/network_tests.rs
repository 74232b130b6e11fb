//! End-to-end gossip scenarios: two real `GossipHandle`s talking over real
//! loopback TCP sockets, exercising wire framing, dispatch, and broadcast
//! together rather than mocking any of the three.

use std::sync::Arc;
use std::time::Duration;

use ferrochain_core::accounts::Accounts;
use ferrochain_core::amount::Amount;
use ferrochain_core::chain::Chain;
use ferrochain_core::clock::SystemClock;
use ferrochain_core::config::Config;
use ferrochain_core::node::Node;
use ferrochain_core::pool::Pool;
use ferrochain_core::tx::{Tx, TxKind};
use ferrochain_core::types::PublicKeyPem;
use ferrochain_network::{GossipHandle, GossipObject};
use tokio::sync::Mutex;

fn fresh_node() -> Arc<Mutex<Node>> {
    Arc::new(Mutex::new(Node::new(
        Accounts::new(),
        Chain::new(),
        Pool::new(),
        Box::new(SystemClock),
    )))
}

fn loopback_config(peers: Vec<String>) -> Config {
    Config {
        listen_port: 0,
        peers,
        startup_grace_secs: 0,
        ..Config::default()
    }
}

async fn wait_until<F: Fn() -> bool>(predicate: F, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if predicate() {
            return;
        }
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn a_broadcast_user_reaches_the_other_peer() {
    let node_a = fresh_node();
    let node_b = fresh_node();

    let handle_a = GossipHandle::start(node_a.clone(), loopback_config(Vec::new()))
        .await
        .unwrap();
    let peer_a = format!("127.0.0.1:{}", handle_a.local_addr.port());
    let handle_b = GossipHandle::start(node_b.clone(), loopback_config(vec![peer_a]))
        .await
        .unwrap();

    let user = {
        let mut node = node_b.lock().await;
        node.register("alice", "pw").unwrap();
        node.accounts().get_user("alice").unwrap().clone()
    };
    handle_b.broadcast(GossipObject::User(user)).await;

    wait_until(
        || matches!(node_a.try_lock(), Ok(n) if n.accounts().user_exists("alice")),
        "peer to receive the gossiped user",
    )
    .await;

    handle_a.shutdown();
    handle_b.shutdown();
}

#[tokio::test]
async fn an_invalid_tx_is_dropped_rather_than_pooled() {
    let node_a = fresh_node();
    let handle_a = GossipHandle::start(node_a.clone(), loopback_config(Vec::new()))
        .await
        .unwrap();
    let peer_a = format!("127.0.0.1:{}", handle_a.local_addr.port());

    let node_b = fresh_node();
    let handle_b = GossipHandle::start(node_b.clone(), loopback_config(vec![peer_a]))
        .await
        .unwrap();

    // An unsigned tx never passes `is_valid`, so it must never reach the pool.
    let tx = Tx::new(
        TxKind::Normal,
        Amount::from_whole(1),
        Amount::from_micros(900_000),
        Amount::from_micros(100_000),
        PublicKeyPem("sender".into()),
        PublicKeyPem("receiver".into()),
    );
    handle_b.broadcast(GossipObject::Tx(tx)).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(node_a.lock().await.pool().is_empty());

    handle_a.shutdown();
    handle_b.shutdown();
}
