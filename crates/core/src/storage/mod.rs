//! Durable key/value storage shared by every execution context.
//!
//! A single SQLite table maps string keys to JSON documents. The session
//! (`token`, `user`) and the result cache (`product_*`, `search_*`) both
//! live here. Every write is one upsert statement, so each `get`/`put` is
//! atomic at the storage layer; nothing above it takes a lock.

pub mod connection;
pub mod kv;
pub mod migrations;

pub use connection::StorageDb;
