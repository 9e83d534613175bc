//! Observable state containers.
//!
//! [`Store`] is a named, thread-safe container that tags every change with a
//! [`Transition`]. The [`StateContainer`] trait is the seam persistence binds
//! against, so any container that implements it can be persisted.

mod container;
mod store;

pub use container::{RehydrateStatus, StateContainer, SubscriptionId, Transition};
pub use store::Store;
