//! Action dispatcher with dependency ordering between stores.
//!
//! Stores vote on each action. Approving stores (and the stores they depend
//! on) form a dependency graph that must be acyclic; stores then run in
//! topological order, each acknowledging asynchronously through a
//! [`Channel`]. Once the whole graph has been walked, every store that acked
//! gets a single change signal.
//!
//! Actions are processed strictly one at a time. Actions dispatched while one
//! is in flight wait in a bounded FIFO queue; when the queue is full the
//! incoming action is dropped with a warning.

pub mod action;
pub mod agreement;
pub mod channel;
pub mod config;
pub mod diagnostics;
pub mod dispatcher;
pub mod error;
pub mod graph;
pub mod queue;
pub mod store;

pub use action::ActionLike;
pub use agreement::Agreement;
pub use channel::Channel;
pub use config::{DispatcherConfig, DEFAULT_QUEUE_CAPACITY};
pub use diagnostics::{DiagnosticEvent, Diagnostics, RecordingDiagnostics, TracingDiagnostics};
pub use dispatcher::{Dispatcher, DispatcherBuilder, DispatcherHandle, DispatcherStatus};
pub use error::{DispatchError, Result};
pub use graph::DependencyGraph;
pub use queue::BoundedQueue;
pub use store::{Registry, StoreCallback, StoreId};
