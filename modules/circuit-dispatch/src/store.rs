//! Store identity, the store callback contract and the registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::action::ActionLike;
use crate::agreement::Agreement;
use crate::channel::Channel;
use crate::error::{DispatchError, Result};

/// Stable identifier for a store. Used as registry key and graph vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreId(&'static str);

impl StoreId {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// What a store exposes to the dispatcher.
///
/// `vote_for` is called for every action, on every registered store.
/// `complete` receives a [`Channel`] that must be resolved exactly once; the
/// store may move it into a task and resolve it later. `signal_change` fires
/// after the whole dependency graph for the action has been walked, and only
/// for stores that acked.
///
/// Stores own their state and should only mutate it inside `complete`.
pub trait StoreCallback<A: ActionLike>: Send + Sync {
    fn vote_for(&self, action: &A) -> Agreement;

    fn complete(&self, action: &A, channel: Channel);

    fn signal_change(&self, action: &A);
}

// Lets callers keep an Arc to the store for reading its state.
impl<A: ActionLike, S: StoreCallback<A> + ?Sized> StoreCallback<A> for Arc<S> {
    fn vote_for(&self, action: &A) -> Agreement {
        (**self).vote_for(action)
    }

    fn complete(&self, action: &A, channel: Channel) {
        (**self).complete(action, channel)
    }

    fn signal_change(&self, action: &A) {
        (**self).signal_change(action)
    }
}

/// Store callbacks keyed by id. Populated before the dispatcher starts and
/// read-only afterwards.
pub struct Registry<A: ActionLike> {
    callbacks: BTreeMap<StoreId, Box<dyn StoreCallback<A>>>,
}

impl<A: ActionLike> Default for Registry<A> {
    fn default() -> Self {
        Self {
            callbacks: BTreeMap::new(),
        }
    }
}

impl<A: ActionLike> Registry<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a callback to an id. Binding the same id twice is an error.
    pub fn register(&mut self, store: StoreId, callback: impl StoreCallback<A> + 'static) -> Result<()> {
        if self.callbacks.contains_key(&store) {
            return Err(DispatchError::DuplicateStore(store));
        }
        self.callbacks.insert(store, Box::new(callback));
        Ok(())
    }

    pub fn get(&self, store: &StoreId) -> Option<&dyn StoreCallback<A>> {
        self.callbacks.get(store).map(|cb| cb.as_ref())
    }

    pub fn contains(&self, store: &StoreId) -> bool {
        self.callbacks.contains_key(store)
    }

    /// Registered stores in id order.
    pub fn iter(&self) -> impl Iterator<Item = (StoreId, &dyn StoreCallback<A>)> {
        self.callbacks.iter().map(|(id, cb)| (*id, cb.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}
