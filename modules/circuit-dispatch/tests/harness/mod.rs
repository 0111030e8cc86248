//! Test harness for dispatcher integration tests.
//!
//! Stores record what happened to them in a shared [`Journal`] and resolve
//! their channels according to a scripted [`Reply`].
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use circuit_dispatch::{
    ActionLike, Agreement, Channel, Dispatcher, DispatcherBuilder, DispatcherConfig,
    DispatcherHandle, DispatcherStatus, StoreCallback, StoreId,
};

pub const A: StoreId = StoreId::new("a");
pub const B: StoreId = StoreId::new("b");
pub const C: StoreId = StoreId::new("c");
pub const D: StoreId = StoreId::new("d");

// ---------------------------------------------------------------------------
// Test action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestAction {
    Dress,
    Undress,
    Numbered(u32),
}

impl ActionLike for TestAction {
    fn action_type(&self) -> &'static str {
        match self {
            TestAction::Dress => "test:dress",
            TestAction::Undress => "test:undress",
            TestAction::Numbered(_) => "test:numbered",
        }
    }
}

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Complete(StoreId, TestAction),
    Signal(StoreId, TestAction),
}

/// Shared, ordered record of store calls.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Entry>>>);

impl Journal {
    pub fn push(&self, entry: Entry) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.0.lock().unwrap().clone()
    }

    pub fn completed(&self) -> Vec<(StoreId, TestAction)> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                Entry::Complete(s, a) => Some((s, a)),
                Entry::Signal(..) => None,
            })
            .collect()
    }

    pub fn signalled(&self) -> Vec<(StoreId, TestAction)> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                Entry::Signal(s, a) => Some((s, a)),
                Entry::Complete(..) => None,
            })
            .collect()
    }

    /// Stores completed for one action, in call order.
    pub fn completed_for(&self, action: &TestAction) -> Vec<StoreId> {
        self.completed()
            .into_iter()
            .filter(|(_, a)| a == action)
            .map(|(s, _)| s)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Parked channels
// ---------------------------------------------------------------------------

/// Channels held back by stores replying with [`Reply::Park`].
#[derive(Debug, Clone, Default)]
pub struct Parked(Arc<Mutex<VecDeque<Channel>>>);

impl Parked {
    pub fn push(&self, channel: Channel) {
        self.0.lock().unwrap().push_back(channel);
    }

    pub fn take(&self) -> Option<Channel> {
        self.0.lock().unwrap().pop_front()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

// ---------------------------------------------------------------------------
// Test store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Ack,
    Nack,
    /// Drop the channel without resolving it.
    Abandon,
    /// Hand the channel to the test, which resolves it later.
    Park,
    /// Ack from a spawned task after a delay.
    AckAfter(Duration),
}

pub struct TestStore {
    id: StoreId,
    journal: Journal,
    votes: Vec<(Option<TestAction>, Agreement)>,
    reply: Reply,
    parked: Parked,
}

impl TestStore {
    /// A store that approves nothing until told otherwise.
    pub fn new(id: StoreId, journal: &Journal) -> Self {
        Self {
            id,
            journal: journal.clone(),
            votes: Vec::new(),
            reply: Reply::Ack,
            parked: Parked::default(),
        }
    }

    pub fn approves(mut self, action: TestAction, deps: impl IntoIterator<Item = StoreId>) -> Self {
        self.votes.push((Some(action), Agreement::depends_on(deps)));
        self
    }

    pub fn approves_all(mut self, deps: impl IntoIterator<Item = StoreId>) -> Self {
        self.votes.push((None, Agreement::depends_on(deps)));
        self
    }

    pub fn replying(mut self, reply: Reply) -> Self {
        self.reply = reply;
        self
    }

    pub fn parked(&self) -> Parked {
        self.parked.clone()
    }
}

impl StoreCallback<TestAction> for TestStore {
    fn vote_for(&self, action: &TestAction) -> Agreement {
        self.votes
            .iter()
            .find(|(wanted, _)| wanted.as_ref().map_or(true, |w| w == action))
            .map(|(_, agreement)| agreement.clone())
            .unwrap_or_else(Agreement::none)
    }

    fn complete(&self, action: &TestAction, channel: Channel) {
        self.journal.push(Entry::Complete(self.id, action.clone()));
        match self.reply {
            Reply::Ack => channel.ack(),
            Reply::Nack => channel.nack(anyhow::anyhow!("{} refused", self.id)),
            Reply::Abandon => drop(channel),
            Reply::Park => self.parked.push(channel),
            Reply::AckAfter(delay) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    channel.ack();
                });
            }
        }
    }

    fn signal_change(&self, action: &TestAction) {
        self.journal.push(Entry::Signal(self.id, action.clone()));
    }
}

// ---------------------------------------------------------------------------
// Dispatcher helpers
// ---------------------------------------------------------------------------

pub fn builder() -> DispatcherBuilder<TestAction> {
    Dispatcher::builder(DispatcherConfig::default())
}

pub fn builder_with_capacity(capacity: usize) -> DispatcherBuilder<TestAction> {
    Dispatcher::builder(DispatcherConfig::default().with_queue_capacity(capacity))
}

/// Build and spawn the dispatcher.
pub fn start(builder: DispatcherBuilder<TestAction>) -> DispatcherHandle<TestAction> {
    let (dispatcher, handle) = builder.build();
    dispatcher.spawn();
    handle
}

/// Poll until the dispatcher reports a status matching `done`.
pub async fn wait_for(
    handle: &DispatcherHandle<TestAction>,
    done: impl Fn(&DispatcherStatus) -> bool,
) -> DispatcherStatus {
    for _ in 0..2_000 {
        let status = handle.status().await.expect("dispatcher stopped");
        if done(&status) {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("dispatcher never reached the expected status");
}

/// Wait until nothing is executing and nothing is queued.
pub async fn settle(handle: &DispatcherHandle<TestAction>) -> DispatcherStatus {
    wait_for(handle, |s| !s.locked && s.queued == 0).await
}

/// Ack parked channels one by one until the dispatcher is idle.
pub async fn release_all(handle: &DispatcherHandle<TestAction>, parked: &Parked) -> DispatcherStatus {
    for _ in 0..2_000 {
        if let Some(channel) = parked.take() {
            channel.ack();
        }
        let status = handle.status().await.expect("dispatcher stopped");
        if !status.locked && status.queued == 0 && parked.len() == 0 {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("dispatcher never drained");
}
