//! Attribute observation.
//!
//! Externally visible graph state (labels, port lists, readiness flags) is
//! published as [`Change`] records to registered [`ChangeSink`]s. A state
//! synchronization layer subscribes here to mirror the graph remotely.
//!
//! Each change carries the id of the task that was running when it was made,
//! so observers can group one task's side effects into a single undoable unit
//! (see [`ChangeLog::by_task`]).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::graph::{EdgeId, NodeId, PortRef};
use crate::runtime::{TaskId, TaskScope};
use crate::value::Value;

/// What a change is about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Subject {
    Node(NodeId),
    Port(PortRef),
    Edge(EdgeId),
}

/// One published attribute write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    /// The task that made the write, `None` outside the timeline.
    pub task: Option<TaskId>,
    pub subject: Subject,
    pub attribute: &'static str,
    pub value: Value,
}

/// Receiver of published changes.
///
/// This is the write half of attribute access only. Current values are read
/// through the [`Graph`](crate::graph::Graph) accessors (`node`, `edge`,
/// `input_port`, `output_port`), which a sink can consult once it is back on
/// the scheduler timeline.
pub trait ChangeSink: Send + Sync {
    fn publish(&self, change: &Change);
}

impl<F> ChangeSink for F
where
    F: Fn(&Change) + Send + Sync,
{
    fn publish(&self, change: &Change) {
        self(change)
    }
}

/// Unique identifier for a sink registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Fan-out of changes to every registered sink.
#[derive(Default)]
pub struct Publisher {
    sinks: Vec<(SubscriptionId, Arc<dyn ChangeSink>)>,
}

impl Publisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, sink: Arc<dyn ChangeSink>) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.sinks.push((id, sink));
        id
    }

    /// Returns `false` if the subscription was unknown.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.sinks.len();
        self.sinks.retain(|(sub, _)| *sub != id);
        self.sinks.len() != before
    }

    pub fn is_observed(&self) -> bool {
        !self.sinks.is_empty()
    }

    /// Publish a write. The value is only built when someone is listening.
    pub fn publish(&self, subject: Subject, attribute: &'static str, value: impl FnOnce() -> Value) {
        if self.sinks.is_empty() {
            return;
        }
        let change = Change {
            task: TaskScope::current(),
            subject,
            attribute,
            value: value(),
        };
        for (_, sink) in &self.sinks {
            sink.publish(&change);
        }
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

/// A sink that records every change it receives.
#[derive(Debug, Default)]
pub struct ChangeLog {
    changes: Mutex<Vec<Change>>,
}

impl ChangeLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn changes(&self) -> Vec<Change> {
        self.changes.lock().clone()
    }

    pub fn take(&self) -> Vec<Change> {
        std::mem::take(&mut *self.changes.lock())
    }

    /// Changes made by one task, in publication order.
    pub fn for_task(&self, task: TaskId) -> Vec<Change> {
        self.changes
            .lock()
            .iter()
            .filter(|change| change.task == Some(task))
            .cloned()
            .collect()
    }

    /// Changes grouped by the task that made them, in first-seen order.
    pub fn by_task(&self) -> IndexMap<Option<TaskId>, Vec<Change>> {
        let mut groups: IndexMap<Option<TaskId>, Vec<Change>> = IndexMap::new();
        for change in self.changes.lock().iter() {
            groups.entry(change.task).or_default().push(change.clone());
        }
        groups
    }
}

impl ChangeSink for ChangeLog {
    fn publish(&self, change: &Change) {
        self.changes.lock().push(change.clone());
    }
}
