//! Inbound side: one accept loop, one short-lived receiver task per
//! connection, all decoded objects funnelled onto a single bounded inbox.
//!
//! Grounded in `SocketUtil.py`'s `start_listening`/`receive_object`, and in
//! §5's concurrency model: the listener and its receiver tasks never touch
//! shared state directly, they only push onto the inbox the consumer task
//! drains.

use log::{info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::protocol::{self, GossipObject, ACK};

/// Bound on the inbox every receiver task and every local caller feeds.
pub const INBOX_CAPACITY: usize = 256;

/// Binds `addr` and spawns the accept loop. Returns the bound address (handy
/// when `addr` used port 0) and a handle to the background task.
pub async fn spawn_listener(
    addr: &str,
    inbox: mpsc::Sender<GossipObject>,
) -> std::io::Result<(std::net::SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!("gossip listener bound on {local_addr}");

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let inbox = inbox.clone();
                    tokio::spawn(async move {
                        if let Err(e) = receive_one(stream, inbox).await {
                            warn!("receive from {peer} failed: {e}");
                        }
                    });
                }
                Err(e) => warn!("accept failed: {e}"),
            }
        }
    });

    Ok((local_addr, handle))
}

async fn receive_one(mut stream: TcpStream, inbox: mpsc::Sender<GossipObject>) -> crate::error::Result<()> {
    let obj = protocol::read_frame(&mut stream).await?;
    stream.write_all(ACK).await?;

    if inbox.send(obj).await.is_err() {
        warn!("inbox consumer gone, dropping received object");
    }
    Ok(())
}
