//! In-memory credential store.
//!
//! Accounts are loaded once from configuration and never change while the
//! server runs. Passwords are held only as Argon2 PHC strings.

use std::collections::HashMap;

use anyhow::{Context, anyhow, bail};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use tracing::warn;

use crate::config::UserConfig;

/// A login account.
#[derive(Clone)]
pub struct UserRecord {
    pub id: u64,
    pub username: String,
    password_hash: String,
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("username", &self.username)
            .finish()
    }
}

/// Username to account mapping with constant-work verification.
pub struct CredentialStore {
    users: HashMap<String, UserRecord>,
    /// Verified against when the username is unknown, so both failure paths cost one hash.
    dummy_hash: String,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("users", &self.users.len())
            .finish()
    }
}

/// Hash a password into an Argon2id PHC string.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("failed to hash password: {e}"))
}

fn verify_password(phc: &str, password: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

impl CredentialStore {
    /// Build the store, hashing any plaintext passwords.
    pub fn from_config(users: &[UserConfig]) -> anyhow::Result<Self> {
        let mut records = HashMap::with_capacity(users.len());

        for user in users {
            let password_hash = match (&user.password_hash, &user.password) {
                (Some(phc), _) => {
                    PasswordHash::new(phc)
                        .map_err(|e| anyhow!("{e}"))
                        .with_context(|| format!("invalid password_hash for '{}'", user.username))?;
                    phc.clone()
                }
                (None, Some(plain)) => {
                    warn!(
                        "User '{}' is configured with a plaintext password; prefer password_hash",
                        user.username
                    );
                    hash_password(plain)?
                }
                (None, None) => bail!("user '{}' has no password", user.username),
            };

            let record = UserRecord {
                id: user.id,
                username: user.username.clone(),
                password_hash,
            };
            if records.insert(user.username.clone(), record).is_some() {
                bail!("duplicate username: {}", user.username);
            }
        }

        Ok(Self {
            users: records,
            dummy_hash: hash_password("vizgate-dummy-password")?,
        })
    }

    /// Check a username/password pair.
    pub fn verify(&self, username: &str, password: &str) -> Option<&UserRecord> {
        match self.users.get(username) {
            Some(user) => verify_password(&user.password_hash, password).then_some(user),
            None => {
                let _ = verify_password(&self.dummy_hash, password);
                None
            }
        }
    }

    pub fn get(&self, username: &str) -> Option<&UserRecord> {
        self.users.get(username)
    }
}
