//! Lifecycle observers.
//!
//! The dispatcher re-broadcasts every lifecycle event to all registered
//! observers in registration order. Observers are not owned by the
//! dispatcher; a failing observer is logged and skipped.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use anyhow::Result;
use tracing::{debug, warn};

use crate::action::ActionLike;
use crate::error::DispatchError;
use crate::store::StoreId;

/// Hooks for tracing the dispatch lifecycle. Every method defaults to a no-op.
#[allow(unused_variables)]
pub trait Diagnostics<A: ActionLike>: Send + Sync {
    /// An action was handed to the dispatcher.
    fn on_dispatch(&self, action: &A) -> Result<()> {
        Ok(())
    }

    fn on_lock(&self) -> Result<()> {
        Ok(())
    }

    fn on_execute(&self, store: StoreId, action: &A) -> Result<()> {
        Ok(())
    }

    fn on_ack(&self, store: StoreId, action: &A) -> Result<()> {
        Ok(())
    }

    fn on_nack(&self, store: StoreId, action: &A, error: &anyhow::Error) -> Result<()> {
        Ok(())
    }

    fn on_unlock(&self) -> Result<()> {
        Ok(())
    }

    /// The action arrived while the queue was full and was discarded.
    fn on_drop(&self, action: &A) -> Result<()> {
        Ok(())
    }

    /// The action's graph could not be executed (cycle, unknown store).
    fn on_abort(&self, action: &A, error: &DispatchError) -> Result<()> {
        Ok(())
    }
}

pub(crate) enum Lifecycle<'a, A> {
    Dispatch(&'a A),
    Lock,
    Execute(StoreId, &'a A),
    Ack(StoreId, &'a A),
    Nack(StoreId, &'a A, &'a anyhow::Error),
    Unlock,
    Drop(&'a A),
    Abort(&'a A, &'a DispatchError),
}

impl<A> Lifecycle<'_, A> {
    fn name(&self) -> &'static str {
        match self {
            Lifecycle::Dispatch(_) => "dispatch",
            Lifecycle::Lock => "lock",
            Lifecycle::Execute(..) => "execute",
            Lifecycle::Ack(..) => "ack",
            Lifecycle::Nack(..) => "nack",
            Lifecycle::Unlock => "unlock",
            Lifecycle::Drop(_) => "drop",
            Lifecycle::Abort(..) => "abort",
        }
    }
}

/// Shared set of observers. Cloning a handle shares the same set.
pub(crate) struct DiagnosticsFanout<A: ActionLike> {
    observers: RwLock<Vec<Arc<dyn Diagnostics<A>>>>,
}

impl<A: ActionLike> DiagnosticsFanout<A> {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Register an observer. Adding the same observer twice is a no-op.
    pub fn add(&self, observer: Arc<dyn Diagnostics<A>>) {
        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        if !observers.iter().any(|o| same_observer(o, &observer)) {
            observers.push(observer);
        }
    }

    /// Unregister an observer. Removing an unknown observer is a no-op.
    pub fn remove(&self, observer: &Arc<dyn Diagnostics<A>>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|o| !same_observer(o, observer));
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.observers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn emit(&self, event: Lifecycle<'_, A>) {
        // Snapshot so observers may (de)register from inside a callback.
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for observer in observers {
            if let Err(e) = deliver(observer.as_ref(), &event) {
                warn!(event = event.name(), error = %e, "Diagnostics observer failed");
            }
        }
    }
}

fn same_observer<A: ActionLike>(a: &Arc<dyn Diagnostics<A>>, b: &Arc<dyn Diagnostics<A>>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn deliver<A: ActionLike>(observer: &dyn Diagnostics<A>, event: &Lifecycle<'_, A>) -> Result<()> {
    match *event {
        Lifecycle::Dispatch(action) => observer.on_dispatch(action),
        Lifecycle::Lock => observer.on_lock(),
        Lifecycle::Execute(store, action) => observer.on_execute(store, action),
        Lifecycle::Ack(store, action) => observer.on_ack(store, action),
        Lifecycle::Nack(store, action, error) => observer.on_nack(store, action, error),
        Lifecycle::Unlock => observer.on_unlock(),
        Lifecycle::Drop(action) => observer.on_drop(action),
        Lifecycle::Abort(action, error) => observer.on_abort(action, error),
    }
}

// ---------------------------------------------------------------------------
// TracingDiagnostics
// ---------------------------------------------------------------------------

/// Writes every lifecycle event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl<A: ActionLike> Diagnostics<A> for TracingDiagnostics {
    fn on_dispatch(&self, action: &A) -> Result<()> {
        debug!(action = action.action_type(), "Dispatch");
        Ok(())
    }

    fn on_lock(&self) -> Result<()> {
        debug!("Dispatcher locked");
        Ok(())
    }

    fn on_execute(&self, store: StoreId, action: &A) -> Result<()> {
        debug!(store = store.as_str(), action = action.action_type(), "Execute");
        Ok(())
    }

    fn on_ack(&self, store: StoreId, action: &A) -> Result<()> {
        debug!(store = store.as_str(), action = action.action_type(), "Ack");
        Ok(())
    }

    fn on_nack(&self, store: StoreId, action: &A, error: &anyhow::Error) -> Result<()> {
        warn!(store = store.as_str(), action = action.action_type(), error = %error, "Nack");
        Ok(())
    }

    fn on_unlock(&self) -> Result<()> {
        debug!("Dispatcher unlocked");
        Ok(())
    }

    fn on_drop(&self, action: &A) -> Result<()> {
        warn!(action = action.action_type(), "Dropped");
        Ok(())
    }

    fn on_abort(&self, action: &A, error: &DispatchError) -> Result<()> {
        warn!(action = action.action_type(), error = %error, "Aborted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingDiagnostics (tests — assert on the lifecycle sequence)
// ---------------------------------------------------------------------------

/// A lifecycle event as captured by [`RecordingDiagnostics`]. Actions are
/// kept as their `Debug` rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    Dispatch { action: String },
    Lock,
    Execute { store: StoreId, action: String },
    Ack { store: StoreId, action: String },
    Nack { store: StoreId, action: String, error: String },
    Unlock,
    Drop { action: String },
    Abort { action: String, error: String },
}

/// In-memory observer that records every event.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Stores in the order they were executed.
    pub fn executed(&self) -> Vec<StoreId> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DiagnosticEvent::Execute { store, .. } => Some(store),
                _ => None,
            })
            .collect()
    }

    pub fn dropped(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DiagnosticEvent::Drop { action } => Some(action),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: DiagnosticEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}

impl<A: ActionLike> Diagnostics<A> for RecordingDiagnostics {
    fn on_dispatch(&self, action: &A) -> Result<()> {
        self.record(DiagnosticEvent::Dispatch {
            action: format!("{action:?}"),
        })
    }

    fn on_lock(&self) -> Result<()> {
        self.record(DiagnosticEvent::Lock)
    }

    fn on_execute(&self, store: StoreId, action: &A) -> Result<()> {
        self.record(DiagnosticEvent::Execute {
            store,
            action: format!("{action:?}"),
        })
    }

    fn on_ack(&self, store: StoreId, action: &A) -> Result<()> {
        self.record(DiagnosticEvent::Ack {
            store,
            action: format!("{action:?}"),
        })
    }

    fn on_nack(&self, store: StoreId, action: &A, error: &anyhow::Error) -> Result<()> {
        self.record(DiagnosticEvent::Nack {
            store,
            action: format!("{action:?}"),
            error: error.to_string(),
        })
    }

    fn on_unlock(&self) -> Result<()> {
        self.record(DiagnosticEvent::Unlock)
    }

    fn on_drop(&self, action: &A) -> Result<()> {
        self.record(DiagnosticEvent::Drop {
            action: format!("{action:?}"),
        })
    }

    fn on_abort(&self, action: &A, error: &DispatchError) -> Result<()> {
        self.record(DiagnosticEvent::Abort {
            action: format!("{action:?}"),
            error: error.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Tick;

    impl ActionLike for Tick {
        fn action_type(&self) -> &'static str {
            "tick"
        }
    }

    struct Failing;

    impl Diagnostics<Tick> for Failing {
        fn on_lock(&self) -> Result<()> {
            anyhow::bail!("observer exploded")
        }
    }

    #[test]
    fn broadcasts_to_every_observer_despite_failures() {
        let fanout = DiagnosticsFanout::<Tick>::new();
        let recorder = Arc::new(RecordingDiagnostics::new());
        fanout.add(Arc::new(Failing));
        fanout.add(recorder.clone());

        fanout.emit(Lifecycle::Lock);
        fanout.emit(Lifecycle::Dispatch(&Tick));

        assert_eq!(
            recorder.events(),
            vec![
                DiagnosticEvent::Lock,
                DiagnosticEvent::Dispatch {
                    action: "Tick".into()
                },
            ]
        );
    }

    #[test]
    fn add_and_remove_are_idempotent() {
        let fanout = DiagnosticsFanout::<Tick>::new();
        let recorder: Arc<dyn Diagnostics<Tick>> = Arc::new(RecordingDiagnostics::new());
        let stranger: Arc<dyn Diagnostics<Tick>> = Arc::new(RecordingDiagnostics::new());

        fanout.add(recorder.clone());
        fanout.add(recorder.clone());
        assert_eq!(fanout.len(), 1);

        fanout.remove(&stranger);
        assert_eq!(fanout.len(), 1);

        fanout.remove(&recorder);
        fanout.remove(&recorder);
        assert_eq!(fanout.len(), 0);
    }
}
