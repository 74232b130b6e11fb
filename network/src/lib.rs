//! Ferrochain Network Library
//!
//! The gossip layer: wire framing, the object schema peers exchange, the
//! inbound listener and inbox, the single-consumer dispatch that applies
//! gossiped objects to the shared [`ferrochain_core::node::Node`], and the
//! startup sync procedure that catches a rejoining node up on its peers.

pub mod dispatch;
pub mod error;
pub mod listener;
pub mod peer;
pub mod protocol;
pub mod service;
pub mod sync;

pub use error::{Error, Result};
pub use protocol::{GossipObject, NodeSummary, NodeSyncRequest};
pub use service::GossipHandle;
