//! Key-value storage backends.
//!
//! Persistence talks to storage only through [`AsyncStorage`]. Backends with
//! a blocking API implement [`SyncStorage`] and are lifted with
//! [`SyncAdapter`]. Two such backends ship with the crate:
//!
//! - [`MemoryStorage`]: lives as long as the process, like a browser's
//!   session storage.
//! - [`FileStorage`]: a JSON file on disk that survives restarts, like a
//!   browser's local storage.
//!
//! Both are plain values rather than globals, so independent bindings can
//! use independent backing stores.

mod adapter;
mod file;
mod memory;

pub use adapter::SyncAdapter;
pub use file::FileStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;

use crate::error::PersistResult;

/// Asynchronous string key-value store.
#[async_trait]
pub trait AsyncStorage: Send + Sync {
    /// Fetch the value stored under `key`, or `None` if there is none.
    async fn get_item(&self, key: &str) -> PersistResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set_item(&self, key: &str, value: &str) -> PersistResult<()>;

    /// Delete `key`. Removing a missing key is not an error.
    async fn remove_item(&self, key: &str) -> PersistResult<()>;
}

/// Blocking string key-value store.
pub trait SyncStorage: Send + Sync {
    fn get_item(&self, key: &str) -> PersistResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> PersistResult<()>;
    fn remove_item(&self, key: &str) -> PersistResult<()>;
}
