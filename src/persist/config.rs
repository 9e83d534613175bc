//! Configuration for persisted stores

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{PersistError, PersistResult};
use crate::storage::AsyncStorage;

/// Source of wall-clock time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Reads the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Serializable part of the persistence configuration.
///
/// Everything except the storage handle, so it can live in a settings file:
///
/// ```
/// use tincan_persist::PersistSettings;
///
/// let settings: PersistSettings =
///     serde_json::from_str(r#"{ "prefix_key": "app", "expire_ms": 60000 }"#).unwrap();
/// assert_eq!(settings.prefix_key.as_deref(), Some("app"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistSettings {
    /// Prefix for stored keys. The key for a store is `{prefix}:{name}`.
    pub prefix_key: Option<String>,

    /// Records older than this many milliseconds are discarded.
    pub expire_ms: Option<u64>,
}

/// How a store is persisted: where, under which key prefix, and for how long.
///
/// Immutable once handed to a binder.
#[derive(Clone)]
pub struct PersistConfig {
    prefix_key: Option<String>,
    storage: Arc<dyn AsyncStorage>,
    expire: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl PersistConfig {
    pub fn new<S>(storage: S) -> Self
    where
        S: AsyncStorage + 'static,
    {
        Self::from_shared(Arc::new(storage))
    }

    /// Use a storage handle that is already shared elsewhere.
    pub fn from_shared(storage: Arc<dyn AsyncStorage>) -> Self {
        Self {
            prefix_key: None,
            storage,
            expire: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn from_settings(settings: PersistSettings, storage: Arc<dyn AsyncStorage>) -> Self {
        let mut config = Self::from_shared(storage);
        config.prefix_key = settings.prefix_key;
        config.expire = settings.expire_ms.map(Duration::from_millis);
        config
    }

    pub fn builder() -> PersistConfigBuilder {
        PersistConfigBuilder::default()
    }

    pub fn with_prefix_key(mut self, prefix: impl Into<String>) -> Self {
        self.prefix_key = Some(prefix.into());
        self
    }

    /// Discard stored records older than `window` instead of restoring them.
    ///
    /// A restored value is written back with a fresh timestamp, so the window
    /// slides: a store rehydrated at least once per `window` never expires.
    pub fn with_expire(mut self, window: Duration) -> Self {
        self.expire = Some(window);
        self
    }

    pub fn with_clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// The key prefix, if a non-empty one was configured.
    pub fn prefix_key(&self) -> Option<&str> {
        self.prefix_key.as_deref().filter(|p| !p.is_empty())
    }

    /// The expiry window. A zero window means records never expire.
    pub fn expire(&self) -> Option<Duration> {
        self.expire.filter(|window| !window.is_zero())
    }

    pub fn storage(&self) -> &Arc<dyn AsyncStorage> {
        &self.storage
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

impl fmt::Debug for PersistConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistConfig")
            .field("prefix_key", &self.prefix_key)
            .field("expire", &self.expire)
            .finish_non_exhaustive()
    }
}

/// Step-by-step construction of a [`PersistConfig`].
#[derive(Default)]
pub struct PersistConfigBuilder {
    prefix_key: Option<String>,
    storage: Option<Arc<dyn AsyncStorage>>,
    expire: Option<Duration>,
    clock: Option<Arc<dyn Clock>>,
}

impl PersistConfigBuilder {
    pub fn prefix_key(mut self, prefix: impl Into<String>) -> Self {
        self.prefix_key = Some(prefix.into());
        self
    }

    pub fn storage<S>(mut self, storage: S) -> Self
    where
        S: AsyncStorage + 'static,
    {
        self.storage = Some(Arc::new(storage));
        self
    }

    pub fn shared_storage(mut self, storage: Arc<dyn AsyncStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn expire(mut self, window: Duration) -> Self {
        self.expire = Some(window);
        self
    }

    pub fn expire_ms(self, millis: u64) -> Self {
        self.expire(Duration::from_millis(millis))
    }

    pub fn clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// # Errors
    ///
    /// Returns `PersistError::Configuration` if no storage was supplied.
    pub fn build(self) -> PersistResult<PersistConfig> {
        let storage = self
            .storage
            .ok_or_else(|| PersistError::Configuration("storage is required".to_string()))?;
        Ok(PersistConfig {
            prefix_key: self.prefix_key,
            storage,
            expire: self.expire,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        })
    }
}
