//! Durable session record: the `token` and `user` storage keys.
//!
//! This is persistence only. Discovery across contexts and change
//! notification live with the extension runtime.

use sha2::{Digest, Sha256};

use crate::Error;
use crate::storage::StorageDb;

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";

/// Reads and writes the stored session.
#[derive(Clone, Debug)]
pub struct SessionStorage {
    db: StorageDb,
}

impl SessionStorage {
    pub fn new(db: StorageDb) -> Self {
        Self { db }
    }

    /// The stored token. An empty string is treated as absent.
    pub async fn load_token(&self) -> Result<Option<String>, Error> {
        let token: Option<Option<String>> = self.db.get_json(TOKEN_KEY).await?;
        Ok(token.flatten().filter(|t| !t.is_empty()))
    }

    /// Replace the stored token; `None` records a logout.
    pub async fn save_token(&self, token: Option<&str>) -> Result<(), Error> {
        self.db.put_json(TOKEN_KEY, &token).await
    }

    pub async fn load_user(&self) -> Result<Option<serde_json::Value>, Error> {
        let user: Option<serde_json::Value> = self.db.get_json(USER_KEY).await?;
        Ok(user.filter(|u| !u.is_null()))
    }

    pub async fn save_user(&self, user: Option<&serde_json::Value>) -> Result<(), Error> {
        self.db.put_json(USER_KEY, &user).await
    }
}

/// Short, stable identifier for a token, safe to log.
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..6])
}
