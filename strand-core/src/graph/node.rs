//! Graph Nodes
//!
//! This module defines the node record stored in the graph's slot map: identity,
//! type and category, and the ordered input and output ports.
//!
//! Node behavior (what happens when data arrives) is not stored here; see
//! [`NodeBehavior`](super::NodeBehavior).

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use slotmap::{new_key_type, Key};

use super::edge::EdgeId;
use super::port::{Capacity, InputPort, OutputPort, PortRef, PortSpec};
use crate::error::GraphError;

new_key_type! {
    /// Generational handle to a node. Stops resolving once the node is destroyed.
    pub struct NodeId;
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (slot, version) = split(self.data().as_ffi());
        write!(f, "node#{slot}.{version}")
    }
}

/// Slot index and version packed into a key's FFI form.
pub(crate) fn split(ffi: u64) -> (u32, u32) {
    (ffi as u32, (ffi >> 32) as u32)
}

/// Where a node is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// The build phase is running. Ports are being declared.
    Building,

    /// Fully constructed. Callbacks fire.
    Active,

    /// Teardown is in progress. The node no longer receives callbacks.
    Destroying,
}

/// A vertex in the dataflow graph.
#[derive(Debug)]
pub struct Node {
    /// Unique identifier for this node.
    id: NodeId,

    /// Registry key of the node's behavior.
    type_name: String,

    /// Organizational tag supplied by the registry.
    category: String,

    lifecycle: Lifecycle,

    /// Input ports in declaration order.
    inputs: IndexMap<Arc<str>, InputPort>,

    /// Output ports in declaration order.
    outputs: IndexMap<Arc<str>, OutputPort>,
}

impl Node {
    pub(crate) fn new(id: NodeId, type_name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            category: category.into(),
            lifecycle: Lifecycle::Building,
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    pub(crate) fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = lifecycle;
    }

    pub fn input(&self, name: &str) -> Option<&InputPort> {
        self.inputs.get(name)
    }

    pub fn output(&self, name: &str) -> Option<&OutputPort> {
        self.outputs.get(name)
    }

    /// Input port by declaration position.
    pub fn input_at(&self, position: usize) -> Option<&InputPort> {
        self.inputs.get_index(position).map(|(_, port)| port)
    }

    /// Output port by declaration position.
    pub fn output_at(&self, position: usize) -> Option<&OutputPort> {
        self.outputs.get_index(position).map(|(_, port)| port)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &InputPort> + '_ {
        self.inputs.values()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &OutputPort> + '_ {
        self.outputs.values()
    }

    pub fn input_names(&self) -> Vec<String> {
        self.inputs.keys().map(|name| name.to_string()).collect()
    }

    pub fn output_names(&self) -> Vec<String> {
        self.outputs.keys().map(|name| name.to_string()).collect()
    }

    /// Every edge attached to any of this node's ports.
    pub fn attached_edges(&self) -> Vec<EdgeId> {
        self.inputs
            .values()
            .flat_map(|port| port.edges().iter().copied())
            .chain(
                self.outputs
                    .values()
                    .flat_map(|port| port.edges().iter().copied()),
            )
            .collect()
    }

    pub(crate) fn input_mut(&mut self, name: &str) -> Option<&mut InputPort> {
        self.inputs.get_mut(name)
    }

    pub(crate) fn output_mut(&mut self, name: &str) -> Option<&mut OutputPort> {
        self.outputs.get_mut(name)
    }

    pub(crate) fn add_input(&mut self, spec: PortSpec, capacity: Capacity) -> Result<PortRef, GraphError> {
        let key = PortRef::input(self.id, Arc::clone(&spec.name));
        if self.inputs.contains_key(&spec.name) {
            return Err(GraphError::DuplicatePort(key));
        }
        self.inputs.insert(
            Arc::clone(&spec.name),
            InputPort::new(key.clone(), spec, capacity),
        );
        Ok(key)
    }

    pub(crate) fn add_output(&mut self, spec: PortSpec, capacity: Capacity) -> Result<PortRef, GraphError> {
        let key = PortRef::output(self.id, Arc::clone(&spec.name));
        if self.outputs.contains_key(&spec.name) {
            return Err(GraphError::DuplicatePort(key));
        }
        self.outputs.insert(
            Arc::clone(&spec.name),
            OutputPort::new(key.clone(), spec, capacity),
        );
        Ok(key)
    }

    /// Remove a port, keeping the order of the remaining ones.
    pub(crate) fn remove_input(&mut self, name: &str) -> Option<InputPort> {
        self.inputs.shift_remove(name)
    }

    pub(crate) fn remove_output(&mut self, name: &str) -> Option<OutputPort> {
        self.outputs.shift_remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn node() -> Node {
        let mut keys: SlotMap<NodeId, ()> = SlotMap::with_key();
        Node::new(keys.insert(()), "math.add", "math")
    }

    #[test]
    fn ids_display_slot_and_version() {
        let mut keys: SlotMap<NodeId, ()> = SlotMap::with_key();
        let first = keys.insert(());
        keys.remove(first);
        let reused = keys.insert(());

        assert_ne!(first, reused);
        assert_ne!(first.to_string(), reused.to_string());
        assert!(reused.to_string().starts_with("node#"));
    }

    #[test]
    fn node_starts_building() {
        let node = node();
        assert_eq!(node.lifecycle(), Lifecycle::Building);
        assert!(!node.is_active());
        assert_eq!(node.type_name(), "math.add");
        assert_eq!(node.category(), "math");
    }

    #[test]
    fn ports_keep_declaration_order() {
        let mut node = node();
        for name in ["b", "a", "c"] {
            node.add_input(PortSpec::new(name), Capacity::Bounded(1))
                .unwrap();
        }
        assert_eq!(node.input_names(), vec!["b", "a", "c"]);
        assert_eq!(node.input_at(1).unwrap().name(), "a");

        node.remove_input("a");
        assert_eq!(node.input_names(), vec!["b", "c"]);
    }

    #[test]
    fn duplicate_port_names_are_rejected() {
        let mut node = node();
        node.add_output(PortSpec::new("out"), Capacity::Unbounded)
            .unwrap();
        let err = node
            .add_output(PortSpec::new("out"), Capacity::Unbounded)
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicatePort(_)));

        // Same name in the other direction is fine.
        assert!(node
            .add_input(PortSpec::new("out"), Capacity::Bounded(1))
            .is_ok());
    }
}
