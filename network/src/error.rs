//! Error types for the gossip layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame encoding error: {0}")]
    Codec(#[from] Box<bincode::ErrorKind>),

    #[error("peer sent a header that is not a valid length prefix")]
    BadHeader,

    #[error("peer sent a payload longer than the configured maximum")]
    PayloadTooLarge,

    #[error("send to peer timed out")]
    Timeout,

    #[error("core engine error: {0}")]
    Core(#[from] ferrochain_core::Error),
}

pub type Result<T> = core::result::Result<T, Error>;
