//! # Tincan Persist
//!
//! Persistence for reactive stores.
//!
//! A [`Store`] holds a value and notifies subscribers when it changes.
//! [`bind`] wires a store to an async key-value backend:
//!
//! - **Write path**: every change is serialized together with the time it
//!   happened and written under the store's key.
//! - **Read path**: when the binding is made, the key is read once in the
//!   background and a previously persisted value is restored, unless it is
//!   older than the configured expiry window.
//!
//! Storage backends implement [`AsyncStorage`]. [`MemoryStorage`] and
//! [`FileStorage`] are provided, and any blocking backend can be lifted with
//! [`SyncAdapter`].

pub mod error;
pub mod persist;
pub mod storage;
pub mod store;

// Re-export main types for convenience
pub use error::{PersistError, PersistResult};
pub use persist::{
    bind, bind_with_codec, make_binder, Binder, Binding, Clock, Codec, JsonCodec, PersistConfig,
    PersistConfigBuilder, PersistSettings, PersistedRecord, Rehydration, SystemClock,
};
pub use storage::{AsyncStorage, FileStorage, MemoryStorage, SyncAdapter, SyncStorage};
pub use store::{StateContainer, Store, Transition};
