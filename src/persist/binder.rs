use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::codec::{Codec, JsonCodec};
use super::config::{Clock, PersistConfig};
use super::key::storage_key;
use crate::error::{PersistError, PersistResult};
use crate::storage::AsyncStorage;
use crate::store::{RehydrateStatus, StateContainer, Transition};

/// What happened when a binding tried to restore its store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rehydration {
    /// A stored value was injected into the store.
    Restored,
    /// Nothing was stored under the key.
    Missing,
    /// The stored record was older than the expiry window and was deleted.
    Expired,
    /// The stored record could not be decoded and was ignored.
    Corrupt,
    /// Reading from storage failed.
    Failed,
    /// The store changed before the read finished; its newer value was kept.
    Superseded,
    /// The store was disposed before the read finished.
    Disposed,
}

enum Command {
    Write { revision: u64, payload: String },
    Flush(oneshot::Sender<()>),
    Close,
}

/// Applies one [`PersistConfig`] to any number of stores.
///
/// ```no_run
/// use tincan_persist::{make_binder, MemoryStorage, PersistConfig, Store};
///
/// # async fn run() -> tincan_persist::PersistResult<()> {
/// let binder = make_binder(PersistConfig::new(MemoryStorage::new()).with_prefix_key("app"));
///
/// let counter = Store::named("counter", 0u32);
/// let title = Store::named("title", String::new());
/// let _counter_binding = binder.bind(&counter)?;
/// let _title_binding = binder.bind(&title)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Binder {
    config: PersistConfig,
}

/// Create a [`Binder`] that shares `config` between stores.
pub fn make_binder(config: PersistConfig) -> Binder {
    Binder::new(config)
}

/// Persist `container` with the JSON codec.
///
/// See [`Binder::bind`].
pub fn bind<C>(container: &C, config: PersistConfig) -> PersistResult<Binding>
where
    C: StateContainer + Clone,
    C::State: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    Binder::new(config).bind(container)
}

/// Persist `container` with a custom codec.
pub fn bind_with_codec<C, K>(container: &C, config: PersistConfig, codec: K) -> PersistResult<Binding>
where
    C: StateContainer + Clone,
    C::State: Send + Sync + 'static,
    K: Codec<C::State>,
{
    Binder::new(config).bind_with_codec(container, codec)
}

impl Binder {
    pub fn new(config: PersistConfig) -> Self {
        Self { config }
    }

    /// Wire `container` to storage.
    ///
    /// Every later change of the container is written under the derived key.
    /// In the background the key is read once; a live record is injected as a
    /// rehydrate transition, an expired one is deleted. Returns as soon as the
    /// subscription is in place.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `PersistError::Configuration` if no storage key can be derived
    /// or there is no runtime to drive the background task. Storage and codec
    /// failures never surface here.
    pub fn bind<C>(&self, container: &C) -> PersistResult<Binding>
    where
        C: StateContainer + Clone,
        C::State: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.bind_with_codec(container, JsonCodec)
    }

    pub fn bind_with_codec<C, K>(&self, container: &C, codec: K) -> PersistResult<Binding>
    where
        C: StateContainer + Clone,
        C::State: Send + Sync + 'static,
        K: Codec<C::State>,
    {
        let key = storage_key(self.config.prefix_key(), container.name())?;
        let runtime = Handle::try_current().map_err(|_| {
            PersistError::Configuration("binding requires a running tokio runtime".to_string())
        })?;

        let codec = Arc::new(codec);
        let (commands, queue) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = watch::channel(None);

        // Anything applied after this point means the application moved on
        // before the stored value arrived.
        let revision = container.revision();
        let subscription = container.subscribe_revisions(write_path(
            key.clone(),
            Arc::clone(&codec),
            Arc::clone(self.config.clock()),
            commands.clone(),
        ));

        let worker = Worker {
            key: key.clone(),
            storage: Arc::clone(self.config.storage()),
            clock: Arc::clone(self.config.clock()),
            expire: self.config.expire(),
        };
        let task = runtime.spawn(worker.run(container.clone(), revision, codec, outcome_tx, queue));

        debug!(key = %key, "store bound to storage");

        let detached = container.clone();
        Ok(Binding {
            key,
            detach: Box::new(move || detached.unsubscribe(subscription)),
            commands,
            outcome: outcome_rx,
            task,
        })
    }
}

fn write_path<T, K>(
    key: String,
    codec: Arc<K>,
    clock: Arc<dyn Clock>,
    commands: mpsc::UnboundedSender<Command>,
) -> Box<dyn Fn(&T, Transition, u64) + Send + Sync>
where
    T: 'static,
    K: Codec<T>,
{
    Box::new(move |value: &T, _transition: Transition, revision: u64| match codec.encode(clock.now_millis(), value) {
        Ok(payload) => {
            if commands.send(Command::Write { revision, payload }).is_err() {
                debug!(key = %key, "binding closed, change not persisted");
            }
        }
        Err(e) => warn!(key = %key, error = %e, "failed to encode state, change not persisted"),
    })
}

struct Worker {
    key: String,
    storage: Arc<dyn AsyncStorage>,
    clock: Arc<dyn Clock>,
    expire: Option<Duration>,
}

impl Worker {
    async fn run<C, K>(
        self,
        container: C,
        revision: u64,
        codec: Arc<K>,
        outcome: watch::Sender<Option<Rehydration>>,
        mut queue: mpsc::UnboundedReceiver<Command>,
    ) where
        C: StateContainer,
        K: Codec<C::State>,
    {
        let rehydration = self.rehydrate(&container, revision, codec.as_ref()).await;
        // Release the store so it can be freed while the binding is alive.
        drop(container);
        outcome.send_replace(Some(rehydration));

        let mut written = None;
        while let Some(command) = queue.recv().await {
            match command {
                // Changes racing on other threads can be queued out of order.
                Command::Write { revision, .. } if written.is_some_and(|last| revision <= last) => {
                    debug!(key = %self.key, revision, "skipping superseded write");
                }
                Command::Write { revision, payload } => {
                    written = Some(revision);
                    if let Err(e) = self.storage.set_item(&self.key, &payload).await {
                        warn!(key = %self.key, error = %e, "failed to persist state");
                    }
                }
                Command::Flush(done) => {
                    let _ = done.send(());
                }
                Command::Close => break,
            }
        }

        debug!(key = %self.key, "persistence stopped");
    }

    async fn rehydrate<C, K>(&self, container: &C, revision: u64, codec: &K) -> Rehydration
    where
        C: StateContainer,
        K: Codec<C::State>,
    {
        if container.is_disposed() {
            debug!(key = %self.key, "store disposed before rehydration");
            return Rehydration::Disposed;
        }

        let raw = match self.storage.get_item(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key = %self.key, "nothing to rehydrate");
                return Rehydration::Missing;
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "failed to read persisted state");
                return Rehydration::Failed;
            }
        };

        let record = match codec.decode(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(key = %self.key, error = %e, "ignoring unreadable persisted state");
                return Rehydration::Corrupt;
            }
        };

        if let Some(window) = self.expire {
            let now = self.clock.now_millis();
            if record.is_expired(now, window) {
                debug!(
                    key = %self.key,
                    age_ms = record.age_ms(now),
                    "persisted state expired, removing"
                );
                if let Err(e) = self.storage.remove_item(&self.key).await {
                    warn!(key = %self.key, error = %e, "failed to remove expired state");
                }
                return Rehydration::Expired;
            }
        }

        match container.rehydrate_if_unchanged(record.value, revision) {
            RehydrateStatus::Applied => {
                info!(key = %self.key, "store rehydrated");
                Rehydration::Restored
            }
            RehydrateStatus::Stale => {
                debug!(key = %self.key, "store changed before rehydration, keeping newer state");
                Rehydration::Superseded
            }
            RehydrateStatus::Disposed => {
                debug!(key = %self.key, "store disposed before rehydration");
                Rehydration::Disposed
            }
        }
    }
}

/// Handle to a live persistence binding.
///
/// Dropping the handle leaves the store persisted for as long as it lives;
/// call [`Binding::unbind`] to stop.
pub struct Binding {
    key: String,
    detach: Box<dyn FnOnce() -> bool + Send + Sync>,
    commands: mpsc::UnboundedSender<Command>,
    outcome: watch::Receiver<Option<Rehydration>>,
    task: JoinHandle<()>,
}

impl Binding {
    /// The storage key this binding reads and writes.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait for the startup read to finish and report what it did.
    pub async fn rehydrated(&self) -> Rehydration {
        if self.outcome.clone().wait_for(Option::is_some).await.is_err() {
            return Rehydration::Failed;
        }
        (*self.outcome.borrow()).unwrap_or(Rehydration::Failed)
    }

    /// Wait until every change observed so far has been handed to storage.
    pub async fn flush(&self) {
        let (done, flushed) = oneshot::channel();
        if self.commands.send(Command::Flush(done)).is_ok() {
            let _ = flushed.await;
        }
    }

    /// Stop persisting the store.
    ///
    /// Unsubscribes from the store, waits for queued writes to reach storage,
    /// then ends the background task. A rehydration still in flight finishes
    /// first.
    pub async fn unbind(self) {
        let Binding {
            key,
            detach,
            commands,
            task,
            ..
        } = self;

        detach();
        let _ = commands.send(Command::Close);
        drop(commands);
        if let Err(e) = task.await {
            warn!(key = %key, error = %e, "persistence task ended abnormally");
        }
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("key", &self.key)
            .field("rehydration", &*self.outcome.borrow())
            .finish_non_exhaustive()
    }
}
