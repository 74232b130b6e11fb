//! Ferrochain crypto adapter.
//!
//! Wraps the handful of cryptographic primitives the rest of the workspace
//! depends on: Ed25519 keypair generation and detached signatures, SHA-256
//! digests, PEM encoding of public keys, and password-based encryption of a
//! private key for at-rest storage.
//!
//! Nothing above this crate should reach for `ed25519_dalek`, `sha2`,
//! `pbkdf2`, or `aes_gcm` directly — this module is the single seam.

use aes_gcm::aead::{Aead, KeyInit, OsRng as AesOsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use ed25519_dalek::pkcs8::{DecodePublicKey, EncodePublicKey};
use ed25519_dalek::{Signature, Signer, Verifier};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

// Re-exported so downstream crates can name key types without taking a
// direct `ed25519-dalek` dependency of their own.
pub use ed25519_dalek::{SigningKey, VerifyingKey};

pub type Hash256 = [u8; 32];

const PBKDF2_ROUNDS: u32 = 100_000;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Errors surfaced by the crypto adapter.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("signature verification failed")]
    BadSignature,

    #[error("malformed public key")]
    InvalidKey,

    #[error("private key decryption failed, wrong password or corrupt blob")]
    DecryptFailed,

    #[error("key encoding failed")]
    EncodeFailed,
}

pub type Result<T> = core::result::Result<T, Error>;

/// Generates a fresh Ed25519 keypair using the OS CSPRNG.
pub fn generate_keypair() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

/// Encodes a public key as a PEM-formatted `SubjectPublicKeyInfo` string.
pub fn encode_public_key(verifying_key: &VerifyingKey) -> Result<String> {
    verifying_key
        .to_public_key_pem(Default::default())
        .map_err(|_| Error::EncodeFailed)
}

/// Decodes a PEM-formatted public key produced by [`encode_public_key`].
pub fn decode_public_key(pem: &str) -> Result<VerifyingKey> {
    VerifyingKey::from_public_key_pem(pem).map_err(|_| Error::InvalidKey)
}

/// Signs `message` with `signing_key`, returning the raw detached signature.
pub fn sign(signing_key: &SigningKey, message: &[u8]) -> Vec<u8> {
    signing_key.sign(message).to_bytes().to_vec()
}

/// Verifies a detached signature against a PEM-encoded public key.
pub fn verify(pem: &str, message: &[u8], signature: &[u8]) -> bool {
    let Ok(verifying_key) = decode_public_key(pem) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; 64]>::try_from(signature) else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_bytes);
    verifying_key.verify(message, &signature).is_ok()
}

/// SHA-256 digest of `data`.
pub fn hash256(data: &[u8]) -> Hash256 {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Salted SHA-256 digest of `username || password`, used for account login.
pub fn password_digest(username: &str, password: &str) -> Hash256 {
    let mut buf = Vec::with_capacity(username.len() + password.len());
    buf.extend_from_slice(username.as_bytes());
    buf.extend_from_slice(password.as_bytes());
    hash256(&buf)
}

/// Encrypts a signing key's raw seed under a password-derived AES-256-GCM key.
///
/// Layout: `salt (16B) || nonce (12B) || ciphertext`.
pub fn encrypt_private_key(signing_key: &SigningKey, password: &str) -> Vec<u8> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let key = derive_key(password, &salt);
    let cipher = Aes256Gcm::new((&key).into());

    let mut nonce_bytes = [0u8; NONCE_LEN];
    AesOsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, signing_key.to_bytes().as_slice())
        .expect("AES-GCM encryption over a fixed-size 32-byte seed cannot fail");

    let mut blob = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    blob
}

/// Decrypts a blob produced by [`encrypt_private_key`]. Fails (rather than
/// panicking) on a wrong password or a corrupted/tampered blob.
pub fn decrypt_private_key(blob: &[u8], password: &str) -> Result<SigningKey> {
    if blob.len() < SALT_LEN + NONCE_LEN {
        return Err(Error::DecryptFailed);
    }
    let (salt, rest) = blob.split_at(SALT_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

    let key = derive_key(password, salt);
    let cipher = Aes256Gcm::new((&key).into());
    let nonce = Nonce::from_slice(nonce_bytes);

    let seed = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| Error::DecryptFailed)?;
    let seed: [u8; 32] = seed.as_slice().try_into().map_err(|_| Error::DecryptFailed)?;
    Ok(SigningKey::from_bytes(&seed))
}

fn derive_key(password: &str, salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
    key
}
