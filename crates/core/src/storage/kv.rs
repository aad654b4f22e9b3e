//! Key/value operations on the durable store.

use super::connection::StorageDb;
use crate::Error;
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

impl StorageDb {
    /// Get the raw JSON stored under `key`.
    ///
    /// Returns None if the key doesn't exist.
    pub async fn get_value(&self, key: &str) -> Result<Option<String>, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let mut stmt = conn.prepare("SELECT value_json FROM kv_store WHERE key = ?1")?;
                match stmt.query_row(params![key], |row| row.get(0)) {
                    Ok(json) => Ok(Some(json)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Get and decode the value stored under `key`.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, Error> {
        match self.get_value(key).await? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| Error::corrupt(key, e)),
            None => Ok(None),
        }
    }

    /// Insert or replace the raw JSON stored under `key`.
    ///
    /// Uses UPSERT semantics: a prior value is overwritten wholesale.
    pub async fn put_value(&self, key: &str, value_json: &str) -> Result<(), Error> {
        let key = key.to_string();
        let value_json = value_json.to_string();
        let updated_at = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO kv_store (key, value_json, updated_at) VALUES (?1, ?2, ?3)
                    ON CONFLICT(key) DO UPDATE SET
                        value_json = excluded.value_json,
                        updated_at = excluded.updated_at",
                    params![key, value_json, updated_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Encode `value` as JSON and store it under `key`.
    pub async fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), Error> {
        let json = serde_json::to_string(value).map_err(|e| Error::corrupt(key, e))?;
        self.put_value(key, &json).await
    }

    /// Delete the given keys.
    ///
    /// Returns the number of deleted entries.
    pub async fn remove(&self, keys: &[String]) -> Result<u64, Error> {
        if keys.is_empty() {
            return Ok(0);
        }
        let keys = keys.to_vec();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let mut deleted = 0u64;
                {
                    let mut stmt = tx.prepare("DELETE FROM kv_store WHERE key = ?1")?;
                    for key in &keys {
                        deleted += stmt.execute(params![key])? as u64;
                    }
                }
                tx.commit()?;
                Ok(deleted)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete `key` only while it still holds `expected_json`.
    ///
    /// Returns false when the value was replaced (or removed) in the
    /// meantime, leaving the newer value untouched.
    pub async fn remove_if(&self, key: &str, expected_json: &str) -> Result<bool, Error> {
        let key = key.to_string();
        let expected_json = expected_json.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM kv_store WHERE key = ?1 AND value_json = ?2",
                    params![key, expected_json],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// List every `(key, value_json)` pair whose key starts with one of `prefixes`.
    ///
    /// Compares with `substr` rather than `LIKE` because `_` is a `LIKE`
    /// wildcard and both cache namespaces end in one.
    pub async fn scan_prefixes(&self, prefixes: &[&str]) -> Result<Vec<(String, String)>, Error> {
        let prefixes: Vec<String> = prefixes.iter().map(|p| (*p).to_string()).collect();
        self.conn
            .call(move |conn| -> Result<Vec<(String, String)>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT key, value_json FROM kv_store
                    WHERE substr(key, 1, length(?1)) = ?1
                    ORDER BY key",
                )?;
                let mut out = Vec::new();
                for prefix in &prefixes {
                    let rows = stmt.query_map(params![prefix], |row| Ok((row.get(0)?, row.get(1)?)))?;
                    for row in rows {
                        out.push(row?);
                    }
                }
                Ok(out)
            })
            .await
            .map_err(Error::from)
    }
}
