//! Persistence of the safe state subset.
//!
//! The store serializes a small subset of its state as JSON into an async
//! key-value collaborator. Packages, loading flags and listeners are never
//! persisted; they are recomputed or re-registered each session.

use crate::Result;
use anyhow::Context;
use async_trait::async_trait;
use prokit_lib::{Platform, SubscriptionInfo};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Storage key for the persisted entitlement state.
pub const STATE_KEY: &str = "prokit/subscription-state";

/// Async string key-value store, JSON values.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory key-value store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        Ok(data.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.remove(key);
        Ok(())
    }
}

/// File-backed key-value store: one JSON document per key under a base
/// directory. Simple by design; not a production database.
pub struct FileKeyValueStore {
    base_path: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path).context("Failed to create key-value directory")?;
        Ok(Self { base_path })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are namespaced with '/'; flatten them into a single file name.
        let file = key.replace(['/', '\\'], "_");
        self.base_path.join(format!("{file}.json"))
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let value = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        std::fs::write(&path, value)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        Ok(())
    }
}

/// The subset of store state that survives restarts.
///
/// Excludes packages and the loading flag (recomputed each session) and
/// listeners (not serializable).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub is_pro: bool,
    pub platform: Platform,
    pub customer_info: Option<SubscriptionInfo>,
    pub web_subscription_info: Option<SubscriptionInfo>,
}

impl PersistedState {
    /// Load the persisted subset, if any.
    pub async fn load(kv: &dyn KeyValueStore) -> Result<Option<Self>> {
        let json = match kv.get(STATE_KEY).await? {
            Some(json) => json,
            None => return Ok(None),
        };
        let state =
            serde_json::from_str(&json).context("Failed to decode persisted entitlement state")?;
        Ok(Some(state))
    }

    /// Serialize and write the persisted subset.
    pub async fn save(&self, kv: &dyn KeyValueStore) -> Result<()> {
        let json = serde_json::to_string(self)?;
        kv.set(STATE_KEY, &json).await
    }
}
