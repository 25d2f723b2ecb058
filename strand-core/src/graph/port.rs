//! Ports
//!
//! A port is a named attachment point on a node. Input ports receive data,
//! output ports send it. Each port keeps the handles of its attached edges in
//! attachment order and enforces its capacity when an edge is attached.
//!
//! Input ports may carry a [`DefaultProvider`], consulted only while no edge
//! is attached. Output ports can retain the last pushed value and replay it to
//! edges attached later.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use smallvec::SmallVec;

use super::edge::{Edge, EdgeId};
use super::node::NodeId;
use crate::error::GraphError;
use crate::value::Value;

/// Port direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Input,
    Output,
}

/// Stable address of a port: owning node, direction and name.
///
/// Ports are addressed by name rather than position because node callbacks
/// may add and remove ports at run time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PortRef {
    pub node: NodeId,
    pub direction: Direction,
    pub name: Arc<str>,
}

impl PortRef {
    pub fn input(node: NodeId, name: impl Into<Arc<str>>) -> Self {
        Self {
            node,
            direction: Direction::Input,
            name: name.into(),
        }
    }

    pub fn output(node: NodeId, name: impl Into<Arc<str>>) -> Self {
        Self {
            node,
            direction: Direction::Output,
            name: name.into(),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = match self.direction {
            Direction::Input => "<-",
            Direction::Output => "->",
        };
        write!(f, "{}{}{}", self.node, arrow, self.name)
    }
}

/// Maximum number of edges a port accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capacity {
    Bounded(usize),
    Unbounded,
}

impl Capacity {
    /// Whether a port currently holding `attached` edges may take one more.
    pub fn admits(&self, attached: usize) -> bool {
        match self {
            Self::Bounded(max) => attached < *max,
            Self::Unbounded => true,
        }
    }

    pub fn limit(&self) -> Option<usize> {
        match self {
            Self::Bounded(max) => Some(*max),
            Self::Unbounded => None,
        }
    }
}

impl From<Option<usize>> for Capacity {
    fn from(limit: Option<usize>) -> Self {
        limit.map_or(Self::Unbounded, Self::Bounded)
    }
}

/// Fallback value source for an input port with no attached edges.
pub trait DefaultProvider: Send + Sync {
    /// The value the port should read right now, if any.
    fn current(&self) -> Option<Value>;

    /// Replace the value. Returns `false` for read-only providers.
    fn set(&self, _value: Value) -> bool {
        false
    }
}

/// A fixed, read-only default.
#[derive(Debug, Clone)]
pub struct Literal(pub Value);

impl DefaultProvider for Literal {
    fn current(&self) -> Option<Value> {
        Some(self.0.clone())
    }
}

/// A user-editable default (a slider, a text box).
#[derive(Debug, Default)]
pub struct Control {
    value: RwLock<Option<Value>>,
}

impl Control {
    pub fn new(initial: Option<Value>) -> Self {
        Self {
            value: RwLock::new(initial),
        }
    }

    pub fn clear(&self) {
        *self.value.write() = None;
    }
}

impl DefaultProvider for Control {
    fn current(&self) -> Option<Value> {
        self.value.read().clone()
    }

    fn set(&self, value: Value) -> bool {
        *self.value.write() = Some(value);
        true
    }
}

/// Declaration of a port, used when adding it to a node.
#[derive(Clone)]
pub struct PortSpec {
    pub(crate) name: Arc<str>,
    pub(crate) display_name: Option<String>,
    pub(crate) capacity: Option<Capacity>,
    pub(crate) default: Option<Arc<dyn DefaultProvider>>,
}

impl PortSpec {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            capacity: None,
            default: None,
        }
    }

    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Bound the number of attached edges. Without this the graph default
    /// for the port's direction applies.
    pub fn capacity(mut self, max_edges: usize) -> Self {
        self.capacity = Some(Capacity::Bounded(max_edges));
        self
    }

    pub fn unbounded(mut self) -> Self {
        self.capacity = Some(Capacity::Unbounded);
        self
    }

    /// Input ports only; ignored on outputs.
    pub fn default_provider(mut self, provider: Arc<dyn DefaultProvider>) -> Self {
        self.default = Some(provider);
        self
    }

    pub fn literal(self, value: Value) -> Self {
        self.default_provider(Arc::new(Literal(value)))
    }

    pub fn control(self, initial: Option<Value>) -> Self {
        self.default_provider(Arc::new(Control::new(initial)))
    }
}

impl fmt::Debug for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortSpec")
            .field("name", &self.name)
            .field("display_name", &self.display_name)
            .field("capacity", &self.capacity)
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

type EdgeList = SmallVec<[EdgeId; 2]>;

/// Edge bookkeeping shared by both port directions.
#[derive(Debug, Clone)]
struct Attachments {
    capacity: Capacity,
    edges: EdgeList,
}

impl Attachments {
    fn attach(&mut self, port: &PortRef, edge: EdgeId) -> Result<(), GraphError> {
        if !self.capacity.admits(self.edges.len()) {
            return Err(GraphError::PortFull {
                port: port.clone(),
                capacity: self.edges.len(),
            });
        }
        self.edges.push(edge);
        Ok(())
    }

    fn detach(&mut self, edge: EdgeId) -> bool {
        match self.edges.iter().position(|e| *e == edge) {
            Some(position) => {
                self.edges.remove(position);
                true
            }
            None => false,
        }
    }
}

/// A port that receives data.
pub struct InputPort {
    key: PortRef,
    display_name: String,
    attachments: Attachments,
    default: Option<Arc<dyn DefaultProvider>>,
    using_default: bool,
}

impl InputPort {
    pub(crate) fn new(key: PortRef, spec: PortSpec, capacity: Capacity) -> Self {
        Self {
            display_name: spec.display_name.unwrap_or_else(|| spec.name.to_string()),
            key,
            attachments: Attachments {
                capacity,
                edges: EdgeList::new(),
            },
            default: spec.default,
            using_default: true,
        }
    }

    pub fn key(&self) -> &PortRef {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn capacity(&self) -> Capacity {
        self.attachments.capacity
    }

    pub fn edges(&self) -> &[EdgeId] {
        &self.attachments.edges
    }

    pub fn can_attach(&self) -> bool {
        self.attachments.capacity.admits(self.attachments.edges.len())
    }

    /// True iff no edge is attached.
    pub fn using_default(&self) -> bool {
        self.using_default
    }

    pub fn default_provider(&self) -> Option<&Arc<dyn DefaultProvider>> {
        self.default.as_ref()
    }

    /// The default value, if the port has a provider and it holds a value.
    pub fn default_value(&self) -> Option<Value> {
        self.default.as_ref().and_then(|provider| provider.current())
    }

    /// Join-all readiness.
    ///
    /// With no edges the port is ready iff its default provider has a value.
    /// Otherwise every attached edge must hold unconsumed data.
    pub fn is_ready(&self, edges: &SlotMap<EdgeId, Edge>) -> bool {
        if self.using_default {
            return self.default_value().is_some();
        }
        self.attachments.edges.iter().all(|id| {
            edges
                .get(*id)
                .map(|edge| edge.is_ready())
                .unwrap_or(false)
        })
    }

    pub(crate) fn attach(&mut self, edge: EdgeId) -> Result<(), GraphError> {
        self.attachments.attach(&self.key, edge)?;
        self.using_default = self.attachments.edges.is_empty();
        Ok(())
    }

    pub(crate) fn detach(&mut self, edge: EdgeId) -> bool {
        let removed = self.attachments.detach(edge);
        self.using_default = self.attachments.edges.is_empty();
        removed
    }
}

impl fmt::Debug for InputPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputPort")
            .field("key", &self.key)
            .field("capacity", &self.attachments.capacity)
            .field("edges", &self.attachments.edges)
            .field("using_default", &self.using_default)
            .finish()
    }
}

/// A port that sends data.
#[derive(Debug)]
pub struct OutputPort {
    key: PortRef,
    display_name: String,
    attachments: Attachments,
    retained: Option<Value>,
}

impl OutputPort {
    pub(crate) fn new(key: PortRef, spec: PortSpec, capacity: Capacity) -> Self {
        Self {
            display_name: spec.display_name.unwrap_or_else(|| spec.name.to_string()),
            key,
            attachments: Attachments {
                capacity,
                edges: EdgeList::new(),
            },
            retained: None,
        }
    }

    pub fn key(&self) -> &PortRef {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn capacity(&self) -> Capacity {
        self.attachments.capacity
    }

    pub fn edges(&self) -> &[EdgeId] {
        &self.attachments.edges
    }

    pub fn can_attach(&self) -> bool {
        self.attachments.capacity.admits(self.attachments.edges.len())
    }

    /// Whether the last push asked for its value to be retained.
    pub fn is_retaining(&self) -> bool {
        self.retained.is_some()
    }

    /// The value replayed to newly attached edges.
    pub fn retained(&self) -> Option<&Value> {
        self.retained.as_ref()
    }

    /// Record a push. A retained push latches the value; a plain push
    /// releases any earlier latch so a stale value is never replayed.
    pub(crate) fn latch(&mut self, data: &Value, retain: bool) {
        self.retained = retain.then(|| data.clone());
    }

    pub(crate) fn clear_retained(&mut self) {
        self.retained = None;
    }

    pub(crate) fn attach(&mut self, edge: EdgeId) -> Result<(), GraphError> {
        self.attachments.attach(&self.key, edge)
    }

    pub(crate) fn detach(&mut self, edge: EdgeId) -> bool {
        self.attachments.detach(edge)
    }
}
