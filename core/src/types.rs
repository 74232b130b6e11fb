//! Shared newtypes used across the data model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A SHA-256 digest, used as the content-address of both transactions and
/// blocks.
pub type Hash = [u8; 32];

pub fn hash_hex(hash: &Hash) -> String {
    hex::encode(hash)
}

/// A PEM-encoded Ed25519 public key (`SubjectPublicKeyInfo`).
///
/// Wrapping the raw `String` keeps PEM-vs-plain-bytes confusion out of the
/// type signatures of [`crate::tx::Tx`] and [`crate::block::Block`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKeyPem(pub String);

impl PublicKeyPem {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PublicKeyPem {
    fn from(s: String) -> Self {
        PublicKeyPem(s)
    }
}

impl fmt::Display for PublicKeyPem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An AES-GCM-encrypted Ed25519 signing-key seed, opaque outside the crypto
/// adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPrivateKey(pub Vec<u8>);
