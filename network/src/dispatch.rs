//! The inbox consumer: the single place gossiped objects are applied to the
//! shared [`Node`].
//!
//! Grounded in `Node.py`'s `__receive_objects` match arms (user/tx/block/
//! flag) plus the distilled spec's `NodeSummary`/`NodeSyncRequest` handling,
//! which the original never implemented in code. Handlers never propagate a
//! parse/validation failure upward — per §7, they log and drop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ferrochain_core::node::Node;
use log::{info, warn};
use tokio::sync::Mutex;

use crate::peer::send_to;
use crate::protocol::{GossipObject, NodeSummary, NodeSyncRequest};

/// Peer-reported summaries collected during sync, keyed by `peer_addr`.
/// Ephemeral network-layer bookkeeping; not part of the `Node`'s own state.
pub type PeerSummaries = Arc<Mutex<HashMap<String, NodeSummary>>>;

/// Applies one gossiped object to `node`, replying to the sender over a
/// fresh connection when the object calls for a response (sync requests).
pub async fn apply_object(
    node: &Arc<Mutex<Node>>,
    summaries: &PeerSummaries,
    send_timeout: Duration,
    self_addr: &str,
    obj: GossipObject,
) {
    match obj {
        GossipObject::User(user) => {
            let username = user.username.clone();
            let added = node.lock().await.apply_remote_user(user);
            if !added {
                warn!("received and rejected duplicate user: {username}");
            }
        }
        GossipObject::Tx(tx) => {
            node.lock().await.apply_remote_tx(tx);
        }
        GossipObject::Block(block) => {
            let id = block.id;
            if node.lock().await.apply_remote_block(block) {
                info!("received and accepted block {id}");
            }
        }
        GossipObject::ValidationFlag(flag) => {
            let accepted = node.lock().await.apply_remote_flag(
                flag.block_id,
                flag.validator_pk.clone(),
                flag.signature.clone(),
                flag.accept,
            );
            if !accepted {
                warn!(
                    "received and rejected validation flag for block {} from {}",
                    flag.block_id, flag.validator_pk
                );
            }
        }
        GossipObject::NodeSummary(summary) => {
            summaries
                .lock()
                .await
                .insert(summary.peer_addr.clone(), summary);
        }
        GossipObject::NodeSyncRequest(req) => {
            reply_to_sync_request(node, send_timeout, self_addr, req).await;
        }
    }
}

async fn reply_to_sync_request(
    node: &Arc<Mutex<Node>>,
    send_timeout: Duration,
    self_addr: &str,
    req: NodeSyncRequest,
) {
    let reply = {
        let node = node.lock().await;
        if req.is_summary_request() {
            Some(GossipObject::NodeSummary(NodeSummary {
                head_id: node.head_id(),
                pool_tx_hashes: node.pool().snapshot().into_keys().collect(),
                usernames: node.accounts().snapshot().into_keys().collect(),
                peer_addr: self_addr.to_string(),
            }))
        } else if let Some(id) = req.block_id {
            node.chain().get_by_id(id).map(|b| GossipObject::Block(b.clone()))
        } else if let Some(username) = &req.username {
            node.accounts()
                .get_user(username)
                .map(|u| GossipObject::User(u.clone()))
        } else if let Some(hash) = &req.tx_hash {
            node.chain()
                .all_txs()
                .get(hash)
                .cloned()
                .or_else(|| node.pool().get(hash).cloned())
                .map(GossipObject::Tx)
        } else {
            None
        }
    };

    let Some(reply) = reply else {
        return;
    };
    if let Err(e) = send_to(&req.peer_addr, &reply, send_timeout).await {
        warn!("failed to reply to sync request from {}: {e}", req.peer_addr);
    }
}
