//! Durable key-value persistence for answers and session identifiers.
//!
//! Two independent keys, whole-value replacement only. No business logic
//! lives here; the flow store decides what to write and when.

mod sqlite;

pub use sqlite::SqlitePersistence;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::PersistenceResult;

/// Storage key for the serialized answer map. The schema version is part of
/// the key so an incompatible stored shape is discarded, not crashed on.
pub const ANSWERS_KEY: &str = "answers:v2";

/// Storage key for the session identifier
pub const SESSION_KEY: &str = "session";

/// Durable string key-value storage
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Read a value, `None` when the key is absent
    async fn get(&self, key: &str) -> PersistenceResult<Option<String>>;
    /// Write a value, replacing any prior one
    async fn set(&self, key: &str, value: &str) -> PersistenceResult<()>;
    /// Delete a key; absent keys are not an error
    async fn remove(&self, key: &str) -> PersistenceResult<()>;
}

/// In-memory persistence for tests and ephemeral runs
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn get(&self, key: &str) -> PersistenceResult<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> PersistenceResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> PersistenceResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}
