use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::container::{RehydrateStatus, StateContainer, SubscriptionId, Transition};

type Subscriber<T> = Arc<dyn Fn(&T, Transition, u64) + Send + Sync>;

struct State<T> {
    value: T,
    revision: u64,
}

struct Inner<T> {
    name: Option<String>,
    state: RwLock<State<T>>,
    subscribers: RwLock<Vec<(SubscriptionId, Subscriber<T>)>>,
    next_subscription: AtomicUsize,
    disposed: AtomicBool,
}

/// A thread-safe, optionally named store for managing application state.
///
/// Every change is tagged with a [`Transition`] so subscribers can tell
/// organic updates apart from values restored out of storage.
pub struct Store<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Clone> Store<T> {
    /// Create a new anonymous store with the given initial state.
    pub fn new(initial: T) -> Self {
        Self::build(None, initial)
    }

    /// Create a new store identified by `name`.
    ///
    /// The name is what persistence uses to derive the storage key.
    pub fn named(name: impl Into<String>, initial: T) -> Self {
        Self::build(Some(name.into()), initial)
    }

    fn build(name: Option<String>, initial: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                state: RwLock::new(State {
                    value: initial,
                    revision: 0,
                }),
                subscribers: RwLock::new(Vec::new()),
                next_subscription: AtomicUsize::new(0),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// The store's short name, if it has one.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Get a clone of the current state.
    pub fn get(&self) -> T {
        self.inner.state.read().value.clone()
    }

    /// Number of transitions applied since creation.
    pub fn revision(&self) -> u64 {
        self.inner.state.read().revision
    }

    /// Update the state using a function.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        if self.is_disposed() {
            return;
        }
        let (snapshot, revision) = {
            let mut state = self.inner.state.write();
            f(&mut state.value);
            state.revision += 1;
            (state.value.clone(), state.revision)
        };
        self.notify(&snapshot, Transition::Update, revision);
    }

    /// Set a new state value.
    pub fn set(&self, new_state: T) {
        self.replace(new_state, Transition::Set);
    }

    /// Replace the state with a value restored from storage.
    ///
    /// Subscribers see this change as [`Transition::Rehydrate`].
    pub fn rehydrate(&self, value: T) {
        self.replace(value, Transition::Rehydrate);
    }

    fn replace(&self, value: T, transition: Transition) {
        if self.is_disposed() {
            return;
        }
        let (snapshot, revision) = {
            let mut state = self.inner.state.write();
            state.value = value;
            state.revision += 1;
            (state.value.clone(), state.revision)
        };
        self.notify(&snapshot, transition, revision);
    }

    /// Subscribe to state changes.
    ///
    /// The callback will be called whenever the state is updated.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_transitions(move |state, _| callback(state))
    }

    /// Subscribe to state changes along with the kind of transition.
    pub fn subscribe_transitions<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&T, Transition) + Send + Sync + 'static,
    {
        self.add_subscriber(Arc::new(move |state: &T, transition, _| callback(state, transition)))
    }

    fn add_subscriber(&self, subscriber: Subscriber<T>) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::SeqCst));
        if !self.is_disposed() {
            self.inner.subscribers.write().push((id, subscriber));
        }
        id
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.inner.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sub, _)| *sub != id);
        subscribers.len() != before
    }

    /// Tear the store down: drop all subscribers and ignore further changes.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.inner.subscribers.write().clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Notify all subscribers of a state change.
    ///
    /// Callbacks run outside the store's locks, so they may read the store.
    /// Concurrent changes can therefore be delivered out of order; `revision`
    /// tells them apart.
    fn notify(&self, state: &T, transition: Transition, revision: u64) {
        let subscribers: Vec<Subscriber<T>> = self
            .inner
            .subscribers
            .read()
            .iter()
            .map(|(_, subscriber)| Arc::clone(subscriber))
            .collect();
        for subscriber in subscribers {
            subscriber(state, transition, revision);
        }
    }

    /// Read state without cloning it.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let state = self.inner.state.read();
        f(&state.value)
    }
}

impl<T: Clone> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> StateContainer for Store<T>
where
    T: Clone + Send + Sync + 'static,
{
    type State = T;

    fn name(&self) -> Option<&str> {
        Store::name(self)
    }

    fn revision(&self) -> u64 {
        Store::revision(self)
    }

    fn subscribe_revisions(
        &self,
        callback: Box<dyn Fn(&T, Transition, u64) + Send + Sync>,
    ) -> SubscriptionId {
        self.add_subscriber(Arc::from(callback))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        Store::unsubscribe(self, id)
    }

    fn rehydrate_if_unchanged(&self, value: T, revision: u64) -> RehydrateStatus {
        if self.is_disposed() {
            return RehydrateStatus::Disposed;
        }
        let (snapshot, applied) = {
            let mut state = self.inner.state.write();
            if state.revision != revision {
                return RehydrateStatus::Stale;
            }
            state.value = value;
            state.revision += 1;
            (state.value.clone(), state.revision)
        };
        self.notify(&snapshot, Transition::Rehydrate, applied);
        RehydrateStatus::Applied
    }

    fn is_disposed(&self) -> bool {
        Store::is_disposed(self)
    }
}
