//! Wires the listener, inbox, consumer, and startup sync together behind one
//! handle the CLI binary can hold for the life of the process.
//!
//! Realises §5's concurrency model: one listener task, one bounded inbox,
//! one consumer task that is the sole driver of dispatch against the shared
//! `Node` (itself behind a `tokio::sync::Mutex` every user-facing operation
//! also acquires, per the design note on running the single-writer
//! invariant over an async runtime rather than raw OS threads).

use std::net::SocketAddr;
use std::sync::Arc;

use ferrochain_core::config::Config;
use ferrochain_core::node::Node;
use log::info;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::dispatch::{apply_object, PeerSummaries};
use crate::listener::{spawn_listener, INBOX_CAPACITY};
use crate::peer::broadcast as broadcast_raw;
use crate::protocol::GossipObject;
use crate::sync::run_startup_sync;

pub struct GossipHandle {
    pub local_addr: SocketAddr,
    node: Arc<Mutex<Node>>,
    config: Config,
    summaries: PeerSummaries,
    listener: JoinHandle<()>,
    consumer: JoinHandle<()>,
}

impl GossipHandle {
    /// Binds the listener, starts the inbox consumer, and kicks off startup
    /// sync as a background task (it does not block startup).
    pub async fn start(node: Arc<Mutex<Node>>, config: Config) -> std::io::Result<Self> {
        let bind_addr = format!("0.0.0.0:{}", config.listen_port);
        let (inbox_tx, mut inbox_rx) = mpsc::channel::<GossipObject>(INBOX_CAPACITY);
        let (local_addr, listener) = spawn_listener(&bind_addr, inbox_tx).await?;

        let summaries: PeerSummaries = Arc::new(Mutex::new(std::collections::HashMap::new()));
        let self_addr = format!("127.0.0.1:{}", local_addr.port());

        let mut config = config;
        let dropped_self = config.peers.iter().filter(|p| is_self_addr(p, local_addr.port())).count();
        config.peers.retain(|p| !is_self_addr(p, local_addr.port()));
        if dropped_self > 0 {
            info!("dropped {dropped_self} self-referencing entr(ies) from the configured peer list");
        }

        let consumer = {
            let node = node.clone();
            let summaries = summaries.clone();
            let send_timeout = config.send_timeout();
            let self_addr = self_addr.clone();
            tokio::spawn(async move {
                while let Some(obj) = inbox_rx.recv().await {
                    apply_object(&node, &summaries, send_timeout, &self_addr, obj).await;
                }
            })
        };

        tokio::spawn(run_startup_sync(
            node.clone(),
            config.clone(),
            summaries.clone(),
            self_addr,
        ));

        info!("gossip service started on {local_addr}, {} configured peer(s)", config.peers.len());
        Ok(Self {
            local_addr,
            node,
            config,
            summaries,
            listener,
            consumer,
        })
    }

    /// Broadcasts `obj` to every configured peer. Called by the CLI after a
    /// local operation (`register`, `create_tx`, `mine`, `validate`) commits,
    /// matching the distilled spec's "produces ... broadcasts" operations.
    pub async fn broadcast(&self, obj: GossipObject) {
        broadcast_raw(&self.config.peers, obj, self.config.send_timeout()).await;
    }

    pub fn peer_summaries(&self) -> PeerSummaries {
        self.summaries.clone()
    }

    pub fn node(&self) -> Arc<Mutex<Node>> {
        self.node.clone()
    }

    /// Aborts the background listener and consumer tasks. Shutdown is
    /// otherwise cooperative per §5: these are daemon-style tasks that would
    /// simply end with the process.
    pub fn shutdown(&self) {
        self.listener.abort();
        self.consumer.abort();
    }
}

/// True iff `peer` names this node's own listener: either a loopback/
/// wildcard host on the bound port, or any host resolving to a socket
/// address whose port matches. spec.md §4.6 requires broadcasting to "each
/// configured peer != self"; without this filter a node listed as its own
/// peer would open a gossip connection to itself on every broadcast.
fn is_self_addr(peer: &str, local_port: u16) -> bool {
    if let Some((host, port)) = peer.rsplit_once(':') {
        if port.parse::<u16>() != Ok(local_port) {
            return false;
        }
        return matches!(host, "127.0.0.1" | "localhost" | "0.0.0.0" | "::1" | "[::1]");
    }
    false
}
