//! The user directory: username -> account record, with public-key lookup.

use crate::types::{EncryptedPrivateKey, PublicKeyPem};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password_digest: [u8; 32],
    pub priv_key_encrypted: EncryptedPrivateKey,
    pub pub_key: PublicKeyPem,
}

impl User {
    pub fn authorize(&self, password: &str) -> bool {
        self.password_digest == ferrochain_crypto::password_digest(&self.username, password)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Accounts {
    users: BTreeMap<String, User>,
}

impl Accounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `user` if the username is unseen.
    pub fn add_user(&mut self, user: User) -> bool {
        if self.users.contains_key(&user.username) {
            return false;
        }
        self.users.insert(user.username.clone(), user);
        true
    }

    pub fn get_user(&self, username: &str) -> Option<&User> {
        self.users.get(username)
    }

    pub fn get_user_by_public_key(&self, pk: &PublicKeyPem) -> Option<&User> {
        self.users.values().find(|u| u.pub_key == *pk)
    }

    pub fn user_exists(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    pub fn snapshot(&self) -> BTreeMap<String, User> {
        self.users.clone()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
