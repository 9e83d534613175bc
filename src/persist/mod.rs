//! Persistence for stores.
//!
//! A [`Binding`] ties a store to an [`AsyncStorage`](crate::storage::AsyncStorage)
//! backend:
//!
//! - every change is written as `[timestamp, value]` under the store's key;
//! - once, at bind time, the key is read back and a live record is restored
//!   into the store as a [`Transition::Rehydrate`](crate::store::Transition).
//!
//! Records older than the configured expiry window are deleted instead of
//! restored. Storage and codec failures on either path are logged and
//! absorbed; only configuration problems are reported by [`bind`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tincan_persist::{bind, MemoryStorage, PersistConfig, Store};
//!
//! # async fn run() -> tincan_persist::PersistResult<()> {
//! let storage = MemoryStorage::new();
//! let counter = Store::named("counter", 0u32);
//!
//! let binding = bind(
//!     &counter,
//!     PersistConfig::new(storage)
//!         .with_prefix_key("app")
//!         .with_expire(Duration::from_secs(3600)),
//! )?;
//!
//! binding.rehydrated().await;
//! counter.update(|n| *n += 1);
//! binding.unbind().await;
//! # Ok(())
//! # }
//! ```

mod binder;
mod codec;
mod config;
mod key;

pub use binder::{bind, bind_with_codec, make_binder, Binder, Binding, Rehydration};
pub use codec::{Codec, JsonCodec, PersistedRecord};
pub use config::{Clock, PersistConfig, PersistConfigBuilder, PersistSettings, SystemClock};
pub use key::storage_key;
