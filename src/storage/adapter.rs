use async_trait::async_trait;
use std::sync::Arc;
use tokio::task;

use super::{AsyncStorage, SyncStorage};
use crate::error::{PersistError, PersistResult};

/// Exposes a [`SyncStorage`] backend through the [`AsyncStorage`] interface.
///
/// Backend calls run on tokio's blocking pool so file I/O never stalls the
/// runtime's worker threads.
#[derive(Debug)]
pub struct SyncAdapter<B> {
    backend: Arc<B>,
}

impl<B: SyncStorage + 'static> SyncAdapter<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    async fn blocking<R, F>(&self, op: F) -> PersistResult<R>
    where
        F: FnOnce(&B) -> PersistResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        task::spawn_blocking(move || op(&backend))
            .await
            .map_err(|e| PersistError::Storage(format!("storage task failed: {}", e)))?
    }
}

impl<B> Clone for SyncAdapter<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

#[async_trait]
impl<B: SyncStorage + 'static> AsyncStorage for SyncAdapter<B> {
    async fn get_item(&self, key: &str) -> PersistResult<Option<String>> {
        let key = key.to_string();
        self.blocking(move |backend| backend.get_item(&key)).await
    }

    async fn set_item(&self, key: &str, value: &str) -> PersistResult<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.blocking(move |backend| backend.set_item(&key, &value)).await
    }

    async fn remove_item(&self, key: &str) -> PersistResult<()> {
        let key = key.to_string();
        self.blocking(move |backend| backend.remove_item(&key)).await
    }
}
