//! In-memory storage for tests and short-lived state

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::{AsyncStorage, SyncStorage};
use crate::error::PersistResult;

/// Process-local key-value map.
///
/// Clones share the same map; separately constructed instances do not.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    data: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data<I, K, V>(data: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let storage = Self::new();
        {
            let mut map = storage.data.write();
            for (key, value) in data {
                map.insert(key.into(), value.into());
            }
        }
        storage
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.data.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    pub fn clear(&self) {
        self.data.write().clear();
    }
}

impl SyncStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> PersistResult<Option<String>> {
        Ok(self.get(key))
    }

    fn set_item(&self, key: &str, value: &str) -> PersistResult<()> {
        self.data.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> PersistResult<()> {
        self.data.write().remove(key);
        Ok(())
    }
}

#[async_trait]
impl AsyncStorage for MemoryStorage {
    async fn get_item(&self, key: &str) -> PersistResult<Option<String>> {
        SyncStorage::get_item(self, key)
    }

    async fn set_item(&self, key: &str, value: &str) -> PersistResult<()> {
        SyncStorage::set_item(self, key, value)
    }

    async fn remove_item(&self, key: &str) -> PersistResult<()> {
        SyncStorage::remove_item(self, key)
    }
}
