//! Error type for the persistence adapter.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Codec(#[from] Box<bincode::ErrorKind>),

    #[error("manifest digest mismatch for {0}")]
    TamperDetected(&'static str),

    #[error("core error: {0}")]
    Core(#[from] ferrochain_core::Error),
}

pub type Result<T> = core::result::Result<T, Error>;
