//! Startup sync: a bounded, best-effort catch-up against the rest of the
//! configured peer set.
//!
//! Grounded in the distilled spec's §4.6 "Startup sync" paragraph (the
//! original system never implemented peer sync; this is the Rust port's own
//! addition). Received blocks are fed back through the normal inbox
//! dispatch so they receive full validation rather than being trusted
//! because they arrived during startup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ferrochain_core::config::Config;
use ferrochain_core::node::Node;
use log::info;
use tokio::sync::Mutex;

use crate::dispatch::PeerSummaries;
use crate::peer::{broadcast, send_to};
use crate::protocol::{GossipObject, NodeSyncRequest};

/// How often the summary-collection loop polls before its deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs the full startup sync procedure once: wait for listeners, request
/// summaries, pick the peer with the greatest `head_id`, and catch up on
/// blocks/usernames/tx hashes from it.
pub async fn run_startup_sync(node: Arc<Mutex<Node>>, config: Config, summaries: PeerSummaries, self_addr: String) {
    if config.peers.is_empty() {
        return;
    }

    tokio::time::sleep(config.startup_grace()).await;

    let request = GossipObject::NodeSyncRequest(NodeSyncRequest {
        block_id: None,
        username: None,
        tx_hash: None,
        peer_addr: self_addr.clone(),
    });
    broadcast(&config.peers, request, config.send_timeout()).await;

    collect_summaries_until_deadline(&summaries, config.peers.len(), config.startup_grace()).await;

    let snapshot: HashMap<String, crate::protocol::NodeSummary> = summaries.lock().await.clone();
    let own_head = node.lock().await.head_id();
    let Some(best) = snapshot.values().max_by_key(|s| s.head_id) else {
        return;
    };
    if best.head_id <= own_head {
        info!("startup sync: already at or ahead of every reporting peer");
        return;
    }
    info!(
        "startup sync: catching up from {} (head {} -> {})",
        best.peer_addr, own_head, best.head_id
    );

    catch_up_blocks(&config, best.peer_addr.clone(), &self_addr, own_head, best.head_id).await;
    catch_up_usernames(&node, &config, &self_addr, &snapshot).await;
    catch_up_tx_hashes(&node, &config, &self_addr, &snapshot).await;
}

async fn collect_summaries_until_deadline(summaries: &PeerSummaries, expected: usize, bound: Duration) {
    let deadline = tokio::time::Instant::now() + bound;
    loop {
        if summaries.lock().await.len() >= expected || tokio::time::Instant::now() >= deadline {
            return;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Requests every block in `(own_head, peer_head]` directly from
/// `peer_addr`. The peer answers by dialing back to `self_addr` with the
/// block itself, which lands on our own listener and flows through the
/// normal inbox dispatch path — nothing further to do here beyond making
/// the request.
async fn catch_up_blocks(config: &Config, peer_addr: String, self_addr: &str, own_head: u64, peer_head: u64) {
    for id in (own_head + 1)..=peer_head {
        let req = GossipObject::NodeSyncRequest(NodeSyncRequest {
            block_id: Some(id),
            username: None,
            tx_hash: None,
            peer_addr: self_addr.to_string(),
        });
        let _ = send_to(&peer_addr, &req, config.send_timeout()).await;
    }
}

async fn catch_up_usernames(
    node: &Arc<Mutex<Node>>,
    config: &Config,
    self_addr: &str,
    snapshot: &HashMap<String, crate::protocol::NodeSummary>,
) {
    let known: std::collections::HashSet<String> =
        node.lock().await.accounts().snapshot().into_keys().collect();
    let mut requested = std::collections::HashSet::new();
    for summary in snapshot.values() {
        for username in &summary.usernames {
            if known.contains(username) || !requested.insert(username.clone()) {
                continue;
            }
            let req = GossipObject::NodeSyncRequest(NodeSyncRequest {
                block_id: None,
                username: Some(username.clone()),
                tx_hash: None,
                peer_addr: self_addr.to_string(),
            });
            let _ = send_to(&summary.peer_addr, &req, config.send_timeout()).await;
        }
    }
}

async fn catch_up_tx_hashes(
    node: &Arc<Mutex<Node>>,
    config: &Config,
    self_addr: &str,
    snapshot: &HashMap<String, crate::protocol::NodeSummary>,
) {
    let known: std::collections::HashSet<String> = {
        let node = node.lock().await;
        node.chain()
            .all_txs()
            .into_keys()
            .chain(node.pool().snapshot().into_keys())
            .collect()
    };
    let mut requested = std::collections::HashSet::new();
    for summary in snapshot.values() {
        for hash in &summary.pool_tx_hashes {
            if known.contains(hash) || !requested.insert(hash.clone()) {
                continue;
            }
            let req = GossipObject::NodeSyncRequest(NodeSyncRequest {
                block_id: None,
                username: None,
                tx_hash: Some(hash.clone()),
                peer_addr: self_addr.to_string(),
            });
            let _ = send_to(&summary.peer_addr, &req, config.send_timeout()).await;
        }
    }
}
