//! Wire framing and the gossiped object schema.
//!
//! Grounded in `SocketUtil.py`'s framing: a fixed 64-byte, space-padded,
//! decimal-ASCII length header precedes an opaque payload, and the receiver
//! answers with a short ACK before the connection closes. The payload itself
//! is `bincode`-encoded here instead of `pickle`d, matching the
//! `serde`+`bincode` pairing `ferrochain-core` already uses for hashing.

use ferrochain_core::accounts::User;
use ferrochain_core::block::{Block, ValidationFlag};
use ferrochain_core::tx::Tx;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};

/// Length of the decimal-ASCII, space-padded header.
pub const HEADER_LEN: usize = 64;
/// Sent by the receiver once a full object has been read off the wire.
pub const ACK: &[u8] = b"Object received";
/// Refuses to allocate for a header claiming more than this many bytes.
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024 * 1024;

/// A snapshot of a peer's local state, exchanged during startup sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSummary {
    pub head_id: u64,
    pub pool_tx_hashes: Vec<String>,
    pub usernames: Vec<String>,
    pub peer_addr: String,
}

/// A targeted catch-up request. All three payload fields `None` means "send
/// me your `NodeSummary`"; otherwise exactly one of them is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSyncRequest {
    pub block_id: Option<u64>,
    pub username: Option<String>,
    pub tx_hash: Option<String>,
    pub peer_addr: String,
}

impl NodeSyncRequest {
    pub fn is_summary_request(&self) -> bool {
        self.block_id.is_none() && self.username.is_none() && self.tx_hash.is_none()
    }
}

/// Every object type that can cross the wire between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GossipObject {
    User(User),
    Tx(Tx),
    Block(Block),
    ValidationFlag(ValidationFlag),
    NodeSummary(NodeSummary),
    NodeSyncRequest(NodeSyncRequest),
}

/// Encodes `obj` and writes it as one framed message: header, payload.
/// Does not read the ACK; callers that need it use [`write_frame_and_ack`].
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, obj: &GossipObject) -> Result<()> {
    let payload = bincode::serialize(obj)?;
    let mut header = payload.len().to_string().into_bytes();
    header.resize(HEADER_LEN, b' ');
    writer.write_all(&header).await?;
    writer.write_all(&payload).await?;
    Ok(())
}

/// Reads one framed message off `reader`: the 64-byte header, then exactly
/// that many payload bytes.
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<GossipObject> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let header_str = std::str::from_utf8(&header)
        .map_err(|_| Error::BadHeader)?
        .trim();
    let len: usize = header_str.parse().map_err(|_| Error::BadHeader)?;
    if len > MAX_PAYLOAD_BYTES {
        return Err(Error::PayloadTooLarge);
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    let obj = bincode::deserialize(&payload)?;
    Ok(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrochain_core::amount::Amount;
    use ferrochain_core::tx::TxKind;
    use ferrochain_core::types::PublicKeyPem;

    #[tokio::test]
    async fn a_framed_tx_round_trips_over_an_in_memory_duplex() {
        let tx = Tx::new(
            TxKind::Normal,
            Amount::from_whole(1),
            Amount::from_micros(900_000),
            Amount::from_micros(100_000),
            PublicKeyPem("sender".into()),
            PublicKeyPem("receiver".into()),
        );
        let obj = GossipObject::Tx(tx.clone());

        let (mut client, mut server) = tokio::io::duplex(4096);
        write_frame(&mut client, &obj).await.unwrap();
        let received = read_frame(&mut server).await.unwrap();

        match received {
            GossipObject::Tx(got) => assert_eq!(got.created_at, tx.created_at),
            _ => panic!("expected a Tx variant"),
        }
    }

    #[tokio::test]
    async fn a_header_claiming_more_than_the_cap_is_rejected() {
        let mut header = (MAX_PAYLOAD_BYTES + 1).to_string().into_bytes();
        header.resize(HEADER_LEN, b' ');
        let (mut client, mut server) = tokio::io::duplex(HEADER_LEN + 16);
        client.write_all(&header).await.unwrap();
        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge));
    }

    #[test]
    fn summary_request_with_every_field_nil_is_detected() {
        let req = NodeSyncRequest {
            block_id: None,
            username: None,
            tx_hash: None,
            peer_addr: "127.0.0.1:5050".into(),
        };
        assert!(req.is_summary_request());
    }
}
