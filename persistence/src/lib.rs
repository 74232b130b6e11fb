//! Ferrochain Persistence
//!
//! Atomic snapshot/restore of the three process-local state artifacts
//! (`accounts.dat`, `ledger.dat`, `pool.dat`) plus a `manifest.dat` of their
//! SHA-256 digests, grounded in `Data.py`'s `save_and_return_hash` /
//! `load_if_valid` pattern. Unlike the original, which writes each artifact
//! directly with `open(path, "wb+")`, writes here go through a temp file in
//! the same directory followed by `fs::rename`, so a crash mid-write never
//! leaves a half-written artifact in place — `rename` is the atomic commit
//! point within a single filesystem, same role the manifest write plays at
//! the multi-artifact level.

pub mod error;
pub mod manifest;
pub mod store;

pub use error::{Error, Result};
pub use store::Store;
