//! Outbound sends: one TCP connection per message per destination peer.
//!
//! Grounded in `SocketUtil.py`'s `send_object`/`broadcast`: connect, write
//! the framed object, wait for the short ACK, close. Every send is wrapped
//! in a caller-supplied timeout so a wedged peer drops out of a broadcast
//! instead of stalling the others.

use std::time::Duration;

use log::warn;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::protocol::{self, GossipObject, ACK};

/// Connects to `addr`, sends `obj` framed, and waits for the receiver's ACK,
/// the whole exchange bounded by `timeout`.
pub async fn send_to(addr: &str, obj: &GossipObject, timeout: Duration) -> Result<()> {
    tokio::time::timeout(timeout, send_to_inner(addr, obj))
        .await
        .map_err(|_| Error::Timeout)?
}

async fn send_to_inner(addr: &str, obj: &GossipObject) -> Result<()> {
    let mut stream = TcpStream::connect(addr).await?;
    protocol::write_frame(&mut stream, obj).await?;

    let mut ack = vec![0u8; ACK.len()];
    stream.read_exact(&mut ack).await?;
    Ok(())
}

/// Fans `obj` out to every peer in `peers` (already excluding self), one
/// short-lived task per destination. A failed send is logged and dropped;
/// it never blocks or fails the broadcast as a whole.
pub async fn broadcast(peers: &[String], obj: GossipObject, timeout: Duration) {
    let mut tasks = Vec::with_capacity(peers.len());
    for peer in peers {
        let peer = peer.clone();
        let obj = obj.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = send_to(&peer, &obj, timeout).await {
                warn!("broadcast to {peer} failed: {e}");
            }
        }));
    }
    for task in tasks {
        let _ = task.await;
    }
}
