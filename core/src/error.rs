//! Error types for the **ferrochain** core crate.
//!
//! All high-level operations return [`crate::Result`], a convenient alias for
//! `core::result::Result<T, Error>`. The node engine additionally classifies
//! these into the tri-valued `{SUCCESS, FAIL, INVALID}` contract via
//! [`crate::node::NodeOutcome`] at its own boundary; `Error` itself stays a
//! flat, low-level enum so lower layers don't have to guess the
//! classification their caller wants.
//!
//! # Examples
//!
//! ```
//! use ferrochain_core::{Error, Result};
//!
//! fn demo_fn(fail: bool) -> Result<()> {
//!     if fail {
//!         Err(Error::PreconditionUnmet)
//!     } else {
//!         Ok(())
//!     }
//! }
//! ```

use thiserror::Error;

/// Core crate error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Transaction signature, hash, or amount rule failed.
    #[error("invalid transaction")]
    InvalidTx,

    /// Block linkage, hash, proof-of-work, or conservation rule failed.
    #[error("invalid block")]
    InvalidBlock,

    /// Password mismatch, or the caller does not control the relevant key.
    #[error("unauthorized")]
    Unauthorized,

    /// Operation's precondition (readiness, maturity, quorum state) is unmet.
    #[error("precondition not met")]
    PreconditionUnmet,

    /// A loaded artifact's digest did not match its manifest entry.
    #[error("tamper detected on load")]
    TamperDetected,

    /// Username is already registered.
    #[error("duplicate user")]
    DuplicateUser,

    /// No account exists under that username or public key.
    #[error("unknown user")]
    UnknownUser,

    /// Underlying cryptographic operation failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] ferrochain_crypto::Error),

    /// Gossip send/receive failed; the caller should drop the message rather
    /// than propagate the failure to the user-facing operation that caused it.
    #[error("network error: {0}")]
    NetworkError(String),

    /// Artifact load/save I/O failure at the persistence boundary.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenient result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
