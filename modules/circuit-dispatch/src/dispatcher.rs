//! The dispatch loop.
//!
//! One actor task owns the registry, the pending queue and the execution
//! state. Producers and stores talk to it through a [`DispatcherHandle`].
//!
//! Intake → lock → vote → graph → execute in order → signal change → unlock
//! → next queued action.
//!
//! While a store holds its [`Channel`] the actor keeps reading its inbox, so
//! actions dispatched in the meantime (including by the store itself) are
//! queued, never interleaved.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::action::ActionLike;
use crate::agreement::Agreement;
use crate::channel::{Channel, Outcome};
use crate::config::DispatcherConfig;
use crate::diagnostics::{Diagnostics, DiagnosticsFanout, Lifecycle};
use crate::error::{DispatchError, Result};
use crate::graph::DependencyGraph;
use crate::queue::BoundedQueue;
use crate::store::{Registry, StoreCallback, StoreId};

enum Command<A> {
    Dispatch(A),
    Status(oneshot::Sender<DispatcherStatus>),
    Shutdown,
}

/// Point-in-time view of the dispatcher, answered in inbox order: every
/// action dispatched before the request has been accepted, queued or dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStatus {
    /// An action's graph is executing.
    pub locked: bool,
    /// Actions waiting for the current one to finish.
    pub queued: usize,
    /// Actions whose pipeline ran to completion, including no-op ones.
    pub processed: u64,
    /// Actions discarded because the queue was full.
    pub dropped: u64,
    /// Actions abandoned because their graph was invalid.
    pub aborted: u64,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects stores and observers, then freezes them into a [`Dispatcher`].
pub struct DispatcherBuilder<A: ActionLike> {
    config: DispatcherConfig,
    registry: Registry<A>,
    diagnostics: Arc<DiagnosticsFanout<A>>,
    tx: mpsc::UnboundedSender<Command<A>>,
    rx: mpsc::UnboundedReceiver<Command<A>>,
}

impl<A: ActionLike> DispatcherBuilder<A> {
    pub fn new(config: DispatcherConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            config,
            registry: Registry::new(),
            diagnostics: Arc::new(DiagnosticsFanout::new()),
            tx,
            rx,
        }
    }

    /// A handle usable before the dispatcher is built, for stores that
    /// dispatch follow-up actions.
    ///
    /// A store holding one keeps the inbox open for as long as the
    /// dispatcher owns that store, so such a dispatcher only stops on
    /// [`DispatcherHandle::shutdown`].
    pub fn handle(&self) -> DispatcherHandle<A> {
        DispatcherHandle {
            tx: self.tx.clone(),
            diagnostics: self.diagnostics.clone(),
        }
    }

    /// Register a store. Fails if the id is already taken.
    pub fn register(
        mut self,
        store: StoreId,
        callback: impl StoreCallback<A> + 'static,
    ) -> Result<Self> {
        self.registry.register(store, callback)?;
        Ok(self)
    }

    pub fn with_diagnostics(self, observer: Arc<dyn Diagnostics<A>>) -> Self {
        self.diagnostics.add(observer);
        self
    }

    pub fn build(self) -> (Dispatcher<A>, DispatcherHandle<A>) {
        let handle = DispatcherHandle {
            tx: self.tx,
            diagnostics: self.diagnostics.clone(),
        };
        let dispatcher = Dispatcher {
            queue: BoundedQueue::new(self.config.queue_capacity),
            registry: self.registry,
            diagnostics: self.diagnostics,
            inbox: self.rx,
            state: State::Idle,
            accepting: true,
            status: DispatcherStatus::default(),
        };
        (dispatcher, handle)
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable entry point to a running [`Dispatcher`].
pub struct DispatcherHandle<A: ActionLike> {
    tx: mpsc::UnboundedSender<Command<A>>,
    diagnostics: Arc<DiagnosticsFanout<A>>,
}

impl<A: ActionLike> Clone for DispatcherHandle<A> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            diagnostics: self.diagnostics.clone(),
        }
    }
}

impl<A: ActionLike> DispatcherHandle<A> {
    /// Hand an action to the dispatcher. Fire-and-forget: the outcome is only
    /// visible through store state, change signals and diagnostics.
    pub fn dispatch(&self, action: A) {
        if let Err(mpsc::error::SendError(Command::Dispatch(action))) =
            self.tx.send(Command::Dispatch(action))
        {
            warn!(action = action.action_type(), "Dispatcher stopped, dropping action");
        }
    }

    pub fn add_diagnostics(&self, observer: Arc<dyn Diagnostics<A>>) {
        self.diagnostics.add(observer);
    }

    pub fn remove_diagnostics(&self, observer: &Arc<dyn Diagnostics<A>>) {
        self.diagnostics.remove(observer);
    }

    /// Snapshot of the dispatcher. `None` once it has stopped.
    pub async fn status(&self) -> Option<DispatcherStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Status(reply)).ok()?;
        rx.await.ok()
    }

    /// Stop accepting actions. The action in flight and everything already
    /// queued still run before [`Dispatcher::run`] returns.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

enum State<A> {
    Idle,
    Executing {
        execution: Execution<A>,
        store: StoreId,
        pending: oneshot::Receiver<Outcome>,
    },
}

/// Walk over one action's topological order.
struct Execution<A> {
    action: A,
    order: Vec<StoreId>,
    cursor: usize,
    acked: Vec<StoreId>,
}

enum Step<A> {
    Resolved(std::result::Result<Outcome, oneshot::error::RecvError>),
    Inbound(Option<Command<A>>),
}

pub struct Dispatcher<A: ActionLike> {
    registry: Registry<A>,
    queue: BoundedQueue<A>,
    diagnostics: Arc<DiagnosticsFanout<A>>,
    inbox: mpsc::UnboundedReceiver<Command<A>>,
    state: State<A>,
    accepting: bool,
    status: DispatcherStatus,
}

impl<A: ActionLike> Dispatcher<A> {
    pub fn builder(config: DispatcherConfig) -> DispatcherBuilder<A> {
        DispatcherBuilder::new(config)
    }

    /// Run on a tokio task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process actions until `shutdown` is called or every handle is
    /// dropped, then drain all accepted work.
    ///
    /// Handles held by registered stores count: they live as long as the
    /// dispatcher, so with one in play only `shutdown` ends the loop. A
    /// store that never resolves its channel stalls this loop for good.
    pub async fn run(mut self) {
        info!(
            stores = self.registry.len(),
            queue_capacity = self.queue.capacity(),
            "Dispatcher started"
        );

        loop {
            let step = match (&mut self.state, self.accepting) {
                // Inbox first: anything dispatched while a store works is
                // queued behind the current action.
                (State::Executing { pending, .. }, true) => tokio::select! {
                    biased;
                    command = self.inbox.recv() => Step::Inbound(command),
                    outcome = pending => Step::Resolved(outcome),
                },
                (State::Executing { pending, .. }, false) => Step::Resolved(pending.await),
                (State::Idle, true) => Step::Inbound(self.inbox.recv().await),
                (State::Idle, false) => break,
            };

            match step {
                Step::Resolved(outcome) => {
                    self.resume(outcome);
                    self.drain_queue();
                }
                Step::Inbound(Some(command)) => self.handle(command),
                Step::Inbound(None) => self.accepting = false,
            }
        }

        info!(
            processed = self.status.processed,
            dropped = self.status.dropped,
            aborted = self.status.aborted,
            "Dispatcher stopped"
        );
    }

    fn is_locked(&self) -> bool {
        matches!(self.state, State::Executing { .. })
    }

    fn handle(&mut self, command: Command<A>) {
        match command {
            Command::Dispatch(action) => self.dispatch(action),
            Command::Status(reply) => {
                let _ = reply.send(DispatcherStatus {
                    locked: self.is_locked(),
                    queued: self.queue.len(),
                    ..self.status
                });
            }
            Command::Shutdown => {
                if self.queue.is_empty() {
                    debug!("Dispatcher shutting down");
                } else {
                    debug!(queued = self.queue.len(), "Dispatcher shutting down, draining queue");
                }
                self.accepting = false;
                self.inbox.close();
            }
        }
    }

    fn dispatch(&mut self, action: A) {
        self.diagnostics.emit(Lifecycle::Dispatch(&action));

        if !self.is_locked() {
            self.begin(action);
            self.drain_queue();
            return;
        }

        if let Err(action) = self.queue.offer(action) {
            warn!(
                action = action.action_type(),
                capacity = self.queue.capacity(),
                "Dispatcher is dropping action, queue is full"
            );
            self.status.dropped += 1;
            self.diagnostics.emit(Lifecycle::Drop(&action));
        }
    }

    fn drain_queue(&mut self) {
        while !self.is_locked() {
            let Some(next) = self.queue.poll() else {
                break;
            };
            self.begin(next);
        }
    }

    fn lock(&mut self) {
        self.diagnostics.emit(Lifecycle::Lock);
    }

    fn unlock(&mut self) {
        self.state = State::Idle;
        self.diagnostics.emit(Lifecycle::Unlock);
    }

    /// Lock, collect votes, validate the graph and start executing.
    fn begin(&mut self, action: A) {
        self.lock();

        match self.prepare(&action) {
            Ok(order) if order.is_empty() => {
                debug!(action = action.action_type(), "No store approved action");
                self.status.processed += 1;
                self.unlock();
            }
            Ok(order) => {
                debug!(action = action.action_type(), stores = order.len(), "Executing action");
                self.advance(Execution {
                    action,
                    order,
                    cursor: 0,
                    acked: Vec::new(),
                });
            }
            Err(e) => {
                error!(action = action.action_type(), error = %e, "Aborting action");
                self.status.aborted += 1;
                self.diagnostics.emit(Lifecycle::Abort(&action, &e));
                self.unlock();
            }
        }
    }

    /// Ask every store for its vote and derive the execution order.
    fn prepare(&self, action: &A) -> Result<Vec<StoreId>> {
        if self.registry.is_empty() {
            return Ok(Vec::new());
        }

        let votes: Vec<(StoreId, Agreement)> = self
            .registry
            .iter()
            .map(|(store, callback)| (store, callback.vote_for(action)))
            .collect();

        for (dependent, agreement) in votes.iter().filter(|(_, a)| a.is_approved()) {
            if let Some(missing) = agreement
                .dependencies()
                .iter()
                .find(|dep| !self.registry.contains(dep))
            {
                return Err(DispatchError::UnknownStore {
                    store: *missing,
                    dependent: *dependent,
                });
            }
        }

        let graph = DependencyGraph::from_agreements(votes.iter().map(|(s, a)| (*s, a)));
        for store in graph.dependency_only() {
            warn!(
                store = store.as_str(),
                action = action.action_type(),
                "Store executes as a dependency without approving the action"
            );
        }

        graph.execution_order()
    }

    /// Invoke stores from the cursor on, or complete the action once the
    /// order is exhausted. Channels resolved inside `complete` are settled
    /// on the spot; the loop only suspends on one still pending.
    fn advance(&mut self, mut execution: Execution<A>) {
        while let Some(&store) = execution.order.get(execution.cursor) {
            let Some(callback) = self.registry.get(&store) else {
                // prepare() rejects unknown stores; skip rather than stall.
                execution.cursor += 1;
                continue;
            };

            self.diagnostics
                .emit(Lifecycle::Execute(store, &execution.action));
            let (channel, mut pending) = Channel::new();
            callback.complete(&execution.action, channel);

            let outcome = match pending.try_recv() {
                Ok(outcome) => outcome,
                Err(oneshot::error::TryRecvError::Closed) => Err(abandoned()),
                Err(oneshot::error::TryRecvError::Empty) => {
                    self.state = State::Executing {
                        execution,
                        store,
                        pending,
                    };
                    return;
                }
            };
            self.settle(&mut execution, store, outcome);
            execution.cursor += 1;
        }

        self.complete(execution);
    }

    /// Resume after the current store resolved (or dropped) its channel.
    fn resume(&mut self, outcome: std::result::Result<Outcome, oneshot::error::RecvError>) {
        let State::Executing {
            mut execution,
            store,
            ..
        } = std::mem::replace(&mut self.state, State::Idle)
        else {
            return;
        };

        let outcome = outcome.unwrap_or_else(|_| Err(abandoned()));
        self.settle(&mut execution, store, outcome);
        execution.cursor += 1;
        self.advance(execution);
    }

    /// Record one store's ack or nack.
    fn settle(&self, execution: &mut Execution<A>, store: StoreId, outcome: Outcome) {
        match outcome {
            Ok(()) => {
                self.diagnostics
                    .emit(Lifecycle::Ack(store, &execution.action));
                execution.acked.push(store);
            }
            Err(e) => {
                debug!(
                    store = store.as_str(),
                    action = execution.action.action_type(),
                    error = %e,
                    "Store failed to process action"
                );
                self.diagnostics
                    .emit(Lifecycle::Nack(store, &execution.action, &e));
            }
        }
    }

    /// Signal change on every acked store in ack order, then unlock.
    fn complete(&mut self, execution: Execution<A>) {
        for store in &execution.acked {
            if let Some(callback) = self.registry.get(store) {
                callback.signal_change(&execution.action);
            }
        }
        debug!(
            action = execution.action.action_type(),
            acked = execution.acked.len(),
            failed = execution.order.len() - execution.acked.len(),
            "Action complete"
        );
        self.status.processed += 1;
        self.unlock();
    }
}

fn abandoned() -> anyhow::Error {
    anyhow::anyhow!("channel dropped without ack or nack")
}
