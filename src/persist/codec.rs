use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::error::{PersistError, PersistResult};

/// A value together with the wall-clock time it was written, in
/// milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedRecord<T> {
    pub written_at_ms: i64,
    pub value: T,
}

impl<T> PersistedRecord<T> {
    pub fn new(written_at_ms: i64, value: T) -> Self {
        Self {
            written_at_ms,
            value,
        }
    }

    /// Milliseconds elapsed between the write and `now_ms`.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.written_at_ms)
    }

    /// A record is expired once it is strictly older than `window`.
    pub fn is_expired(&self, now_ms: i64, window: Duration) -> bool {
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        self.age_ms(now_ms) > window_ms
    }
}

/// Encodes records to the string form kept in storage, and back.
///
/// Implement this to persist a value type with something other than JSON.
pub trait Codec<T>: Send + Sync + 'static {
    fn encode(&self, written_at_ms: i64, value: &T) -> PersistResult<String>;

    fn decode(&self, raw: &str) -> PersistResult<PersistedRecord<T>>;
}

/// Stores records as the JSON array `[timestamp, value]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> Codec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, written_at_ms: i64, value: &T) -> PersistResult<String> {
        serde_json::to_string(&(written_at_ms, value))
            .map_err(|e| PersistError::Serialization(e.to_string()))
    }

    fn decode(&self, raw: &str) -> PersistResult<PersistedRecord<T>> {
        let (written_at_ms, value): (i64, T) = serde_json::from_str(raw)
            .map_err(|e| PersistError::Deserialization(e.to_string()))?;
        Ok(PersistedRecord::new(written_at_ms, value))
    }
}
