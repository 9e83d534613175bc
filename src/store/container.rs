/// The kind of change a subscriber is being notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// The whole value was replaced with `set`.
    Set,
    /// The value was mutated in place with `update`.
    Update,
    /// The value was restored from persisted storage.
    Rehydrate,
}

/// Handle identifying one subscriber of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) usize);

/// Result of trying to inject a rehydrated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RehydrateStatus {
    Applied,
    /// The container changed since the expected revision; nothing was written.
    Stale,
    /// The container was torn down; nothing was written.
    Disposed,
}

/// Capabilities an observable container must offer to be persisted.
///
/// [`Store`](super::Store) implements this; other reactive containers can be
/// bound by implementing it themselves.
pub trait StateContainer: Send + Sync + 'static {
    /// The value held by the container.
    type State;

    /// Short identifying name, used to derive the storage key.
    fn name(&self) -> Option<&str>;

    /// Counter that increases on every applied transition.
    fn revision(&self) -> u64;

    /// Register `callback` for every applied transition.
    ///
    /// The third argument is the revision the value was applied at. Callbacks
    /// for concurrent changes may arrive out of order.
    fn subscribe_revisions(
        &self,
        callback: Box<dyn Fn(&Self::State, Transition, u64) + Send + Sync>,
    ) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Apply a [`Transition::Rehydrate`] carrying `value`, but only if the
    /// container is still at `revision`.
    fn rehydrate_if_unchanged(&self, value: Self::State, revision: u64) -> RehydrateStatus;

    /// `true` once the container has been torn down.
    fn is_disposed(&self) -> bool;
}
