//! # Credential Store
//!
//! File-backed username → password-hash lookup. The store is externally
//! managed; the core only loads it, verifies logins against it, and lists
//! registered usernames for the `USERS` directory query.
//!
//! On-disk format: a flat JSON object mapping each username to the SHA-256
//! hex digest of its password.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Error type for credential-store access.
#[derive(Debug)]
pub enum CredentialError {
    Io(io::Error),
    Malformed(serde_json::Error),
    DuplicateUser(String),
}

impl std::fmt::Display for CredentialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialError::Io(err) => write!(f, "credential store I/O error: {err}"),
            CredentialError::Malformed(err) => {
                write!(f, "credential store is not valid JSON: {err}")
            }
            CredentialError::DuplicateUser(user) => {
                write!(f, "user '{user}' is already registered")
            }
        }
    }
}

impl std::error::Error for CredentialError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CredentialError::Io(err) => Some(err),
            CredentialError::Malformed(err) => Some(err),
            CredentialError::DuplicateUser(_) => None,
        }
    }
}

impl From<io::Error> for CredentialError {
    fn from(err: io::Error) -> Self {
        CredentialError::Io(err)
    }
}

impl From<serde_json::Error> for CredentialError {
    fn from(err: serde_json::Error) -> Self {
        CredentialError::Malformed(err)
    }
}

/// In-memory view of the registered-user database.
#[derive(Debug, Default, Clone)]
pub struct CredentialStore {
    users: BTreeMap<String, String>,
}

impl CredentialStore {
    /// Load the store from `path`. A missing file is an empty store, so a
    /// fresh deployment starts without manual setup.
    pub fn load(path: &Path) -> Result<Self, CredentialError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        let users: BTreeMap<String, String> = serde_json::from_str(&contents)?;
        Ok(Self { users })
    }

    /// Persist the store to `path`.
    pub fn save(&self, path: &Path) -> Result<(), CredentialError> {
        let contents = serde_json::to_string_pretty(&self.users)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Check a username/password pair against the stored hash.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.users
            .get(username)
            .is_some_and(|stored| stored == &hash_password(password))
    }

    /// Add a new user. Existing entries are never overwritten.
    pub fn register(&mut self, username: &str, password: &str) -> Result<(), CredentialError> {
        if self.users.contains_key(username) {
            return Err(CredentialError::DuplicateUser(username.to_string()));
        }
        self.users
            .insert(username.to_string(), hash_password(password));
        Ok(())
    }

    /// All registered usernames, in stable sorted order.
    pub fn usernames(&self) -> Vec<String> {
        self.users.keys().cloned().collect()
    }

    pub fn is_registered(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// SHA-256 hex digest of a password, the on-disk content address.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}
