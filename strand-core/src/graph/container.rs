//! The graph container.
//!
//! [`Graph`] owns every node and edge and is the state the scheduler drives.
//! All mutation goes through it, on the scheduler timeline, so no locks are
//! needed around graph state.
//!
//! # Teardown
//!
//! There is exactly one way a node goes away: [`Graph::destroy_node`]. It
//! destroys every edge touching the node's ports first, so no port ever holds
//! a handle to a freed edge. Handles are generational, so a stale id held by
//! a behavior simply stops resolving.

use std::sync::Arc;

use serde_json::json;
use slotmap::SlotMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::behavior::{ActivationSource, InitArgs, NodeBehavior, NodeRegistry};
use super::context::NodeContext;
use super::directory::Directory;
use super::edge::{Edge, EdgeId};
use super::node::{Lifecycle, Node, NodeId};
use super::port::{Capacity, Direction, InputPort, OutputPort, PortRef, PortSpec};
use crate::config::GraphConfig;
use crate::error::GraphError;
use crate::observe::{ChangeSink, Publisher, Subject, SubscriptionId};
use crate::runtime::SchedulerHandle;
use crate::value::Value;

struct NodeSlot {
    node: Node,
    behavior: Arc<dyn NodeBehavior>,
}

/// Owner of all nodes and edges.
pub struct Graph {
    config: GraphConfig,
    registry: Arc<NodeRegistry>,
    handle: SchedulerHandle<Graph>,
    nodes: SlotMap<NodeId, NodeSlot>,
    edges: SlotMap<EdgeId, Edge>,
    directory: Directory,
    publisher: Publisher,
}

impl Graph {
    pub fn new(config: GraphConfig, registry: Arc<NodeRegistry>, handle: SchedulerHandle<Graph>) -> Self {
        Self {
            config,
            registry,
            handle,
            nodes: SlotMap::with_key(),
            edges: SlotMap::with_key(),
            directory: Directory::new(),
            publisher: Publisher::new(),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Handle to the scheduler driving this graph.
    pub fn handle(&self) -> &SchedulerHandle<Graph> {
        &self.handle
    }

    /// Observe attribute changes.
    pub fn subscribe(&mut self, sink: Arc<dyn ChangeSink>) -> SubscriptionId {
        self.publisher.subscribe(sink)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.publisher.unsubscribe(id)
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id).map(|slot| &slot.node)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id)
    }

    pub fn contains_edge(&self, id: EdgeId) -> bool {
        self.edges.contains_key(id)
    }

    pub fn edge_ids(&self) -> Vec<EdgeId> {
        self.edges.keys().collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn input_port(&self, port: &PortRef) -> Result<&InputPort, GraphError> {
        if port.direction != Direction::Input {
            return Err(GraphError::PortNotFound(port.clone()));
        }
        self.node(port.node)
            .ok_or(GraphError::NodeNotFound(port.node))?
            .input(&port.name)
            .ok_or_else(|| GraphError::PortNotFound(port.clone()))
    }

    pub fn output_port(&self, port: &PortRef) -> Result<&OutputPort, GraphError> {
        if port.direction != Direction::Output {
            return Err(GraphError::PortNotFound(port.clone()));
        }
        self.node(port.node)
            .ok_or(GraphError::NodeNotFound(port.node))?
            .output(&port.name)
            .ok_or_else(|| GraphError::PortNotFound(port.clone()))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, GraphError> {
        self.nodes
            .get_mut(id)
            .map(|slot| &mut slot.node)
            .ok_or(GraphError::NodeNotFound(id))
    }

    fn input_port_mut(&mut self, port: &PortRef) -> Result<&mut InputPort, GraphError> {
        if port.direction != Direction::Input {
            return Err(GraphError::PortNotFound(port.clone()));
        }
        self.node_mut(port.node)?
            .input_mut(&port.name)
            .ok_or_else(|| GraphError::PortNotFound(port.clone()))
    }

    fn output_port_mut(&mut self, port: &PortRef) -> Result<&mut OutputPort, GraphError> {
        if port.direction != Direction::Output {
            return Err(GraphError::PortNotFound(port.clone()));
        }
        self.node_mut(port.node)?
            .output_mut(&port.name)
            .ok_or_else(|| GraphError::PortNotFound(port.clone()))
    }

    fn edge_mut(&mut self, id: EdgeId) -> Result<&mut Edge, GraphError> {
        self.edges.get_mut(id).ok_or(GraphError::EdgeNotFound(id))
    }

    /// A context for calling into a node the way its callbacks see it.
    pub fn node_context(&mut self, id: NodeId) -> Result<NodeContext<'_>, GraphError> {
        if !self.contains_node(id) {
            return Err(GraphError::NodeNotFound(id));
        }
        Ok(NodeContext::new(self, id))
    }

    // ------------------------------------------------------------------
    // Directory
    // ------------------------------------------------------------------

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.directory.lookup(name)
    }

    pub fn register_name(&mut self, node: NodeId, name: impl Into<String>) -> Result<(), GraphError> {
        if !self.contains_node(node) {
            return Err(GraphError::NodeNotFound(node));
        }
        self.directory.register(name, node)
    }

    pub fn unregister_name(&mut self, name: &str) -> Option<NodeId> {
        self.directory.unregister(name)
    }

    // ------------------------------------------------------------------
    // Node lifetime
    // ------------------------------------------------------------------

    /// Create a node of a registered type and run its build phase.
    ///
    /// An unknown type or a failing factory is refused with
    /// [`GraphError::BuildFailed`] before any node exists. If the node's own
    /// build callback fails, the partially built node is torn down again and
    /// the error comes back wrapped in [`GraphError::Hook`].
    pub fn create_node(&mut self, type_name: &str, args: InitArgs) -> Result<NodeId, GraphError> {
        let (behavior, category) = self.registry.instantiate(type_name, &args)?;
        let id = self.nodes.insert_with_key(|id| NodeSlot {
            node: Node::new(id, type_name, category),
            behavior: Arc::clone(&behavior),
        });

        if let Err(err) = behavior.build(&mut NodeContext::new(self, id)) {
            debug!(node = %id, type_name, error = %err, "build failed");
            if let Err(rollback) = self.teardown(id) {
                debug!(node = %id, error = %rollback, "rollback after failed build");
            }
            return Err(GraphError::hook(id, err));
        }

        self.node_mut(id)?.set_lifecycle(Lifecycle::Active);
        debug!(node = %id, type_name, "node created");
        self.publisher
            .publish(Subject::Node(id), "type", || json!(type_name));
        self.publish_port_lists(id);
        Ok(id)
    }

    /// Destroy a node, severing all of its edges first.
    ///
    /// Teardown always completes. The first error raised by a callback along
    /// the way is returned afterwards.
    pub fn destroy_node(&mut self, id: NodeId) -> Result<(), GraphError> {
        let behavior = self
            .nodes
            .get(id)
            .map(|slot| Arc::clone(&slot.behavior))
            .ok_or(GraphError::NodeNotFound(id))?;
        self.node_mut(id)?.set_lifecycle(Lifecycle::Destroying);

        let mut first_error = self.sever_edges(id).err();
        if let Err(err) = behavior.destroy(&mut NodeContext::new(self, id)) {
            first_error.get_or_insert(GraphError::hook(id, err));
        }
        if let Err(err) = self.teardown(id) {
            first_error.get_or_insert(err);
        }

        debug!(node = %id, "node destroyed");
        self.publisher
            .publish(Subject::Node(id), "destroyed", || json!(true));
        first_error.map_or(Ok(()), Err)
    }

    /// Destroy every node (and with them, every edge).
    pub fn clear(&mut self) -> Result<(), GraphError> {
        let mut first_error = None;
        for id in self.node_ids() {
            if let Err(err) = self.destroy_node(id) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Sever remaining edges, drop directory names and free the slot.
    fn teardown(&mut self, id: NodeId) -> Result<(), GraphError> {
        let result = self.sever_edges(id);
        self.directory.forget(id);
        self.nodes.remove(id);
        result
    }

    fn sever_edges(&mut self, id: NodeId) -> Result<(), GraphError> {
        let mut first_error = None;
        loop {
            let edges = match self.node(id) {
                Some(node) => node.attached_edges(),
                None => break,
            };
            if edges.is_empty() {
                break;
            }
            for edge in edges {
                if let Err(err) = self.destroy_edge(edge) {
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    // ------------------------------------------------------------------
    // Ports
    // ------------------------------------------------------------------

    pub fn add_input(&mut self, node: NodeId, spec: PortSpec) -> Result<PortRef, GraphError> {
        let capacity = spec
            .capacity
            .unwrap_or_else(|| Capacity::from(self.config.default_input_capacity));
        let port = self.node_mut(node)?.add_input(spec, capacity)?;
        self.publish_port_lists(node);
        Ok(port)
    }

    pub fn add_output(&mut self, node: NodeId, spec: PortSpec) -> Result<PortRef, GraphError> {
        let capacity = spec
            .capacity
            .unwrap_or_else(|| Capacity::from(self.config.default_output_capacity));
        let port = self.node_mut(node)?.add_output(spec, capacity)?;
        self.publish_port_lists(node);
        Ok(port)
    }

    /// Remove a port of either direction, destroying its edges first.
    pub fn remove_port(&mut self, port: &PortRef) -> Result<(), GraphError> {
        let edges: Vec<EdgeId> = match port.direction {
            Direction::Input => self.input_port(port)?.edges().to_vec(),
            Direction::Output => self.output_port(port)?.edges().to_vec(),
        };
        let mut first_error = None;
        for edge in edges {
            if let Err(err) = self.destroy_edge(edge) {
                first_error.get_or_insert(err);
            }
        }

        let node = self.node_mut(port.node)?;
        match port.direction {
            Direction::Input => {
                node.remove_input(&port.name);
            }
            Direction::Output => {
                node.remove_output(&port.name);
            }
        }
        self.publish_port_lists(port.node);
        first_error.map_or(Ok(()), Err)
    }

    /// Join-all readiness of an input port.
    pub fn is_input_ready(&self, port: &PortRef) -> Result<bool, GraphError> {
        Ok(self.input_port(port)?.is_ready(&self.edges))
    }

    /// Edit the value of an input's default provider.
    ///
    /// While the port has no edges this activates it, exactly as a push would.
    pub fn set_default_value(&mut self, port: &PortRef, value: Value) -> Result<(), GraphError> {
        let input = self.input_port(port)?;
        let provider = input
            .default_provider()
            .cloned()
            .ok_or_else(|| GraphError::ReadOnlyDefault(port.clone()))?;
        let using_default = input.using_default();

        if !provider.set(value.clone()) {
            return Err(GraphError::ReadOnlyDefault(port.clone()));
        }
        self.publisher
            .publish(Subject::Port(port.clone()), "default", || value);

        if using_default {
            self.activate_input(port, ActivationSource::Default)?;
        }
        Ok(())
    }

    /// Invoke the owning node's activation callback for `port`.
    pub fn activate_input(&mut self, port: &PortRef, source: ActivationSource) -> Result<(), GraphError> {
        self.input_port(port)?;
        trace!(port = %port, ?source, "activate");
        self.notify(port.node, |behavior, ctx| {
            behavior.edge_activated(ctx, &port.name, source)
        })
    }

    /// Push to every edge of an output port.
    ///
    /// With `retain`, the value is also replayed to edges attached later.
    pub fn push_output(&mut self, port: &PortRef, data: Value, retain: bool) -> Result<(), GraphError> {
        let output = self.output_port_mut(port)?;
        output.latch(&data, retain);
        let targets: SmallVec<[EdgeId; 4]> = output.edges().iter().copied().collect();

        for edge in targets {
            self.push_edge(edge, data.clone(), None)?;
        }
        Ok(())
    }

    /// Stop replaying a retained value to new edges.
    pub fn clear_retained(&mut self, port: &PortRef) -> Result<(), GraphError> {
        self.output_port_mut(port)?.clear_retained();
        Ok(())
    }

    /// Read an input: the default while no edges are attached, otherwise the
    /// first edge.
    pub fn read_input(&mut self, port: &PortRef) -> Result<Value, GraphError> {
        let input = self.input_port(port)?;
        if input.using_default() {
            return input
                .default_value()
                .ok_or_else(|| GraphError::PortEmpty(port.clone()));
        }
        let edge = input
            .edges()
            .first()
            .copied()
            .ok_or_else(|| GraphError::PortEmpty(port.clone()))?;
        self.read_edge(edge)
    }

    /// Read every edge of an input, in attachment order.
    ///
    /// Nothing is consumed unless every edge is ready.
    pub fn read_inputs(&mut self, port: &PortRef) -> Result<Vec<Value>, GraphError> {
        let input = self.input_port(port)?;
        if input.using_default() {
            return input
                .default_value()
                .map(|value| vec![value])
                .ok_or_else(|| GraphError::PortEmpty(port.clone()));
        }
        let edges = input.edges().to_vec();
        if let Some(stale) = edges
            .iter()
            .find(|id| !self.edge(**id).is_some_and(Edge::is_ready))
        {
            return Err(GraphError::DataNotAvailable(*stale));
        }
        edges.into_iter().map(|edge| self.read_edge(edge)).collect()
    }

    // ------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------

    /// Connect an output port to an input port.
    ///
    /// Both endpoints must exist and have room; otherwise nothing is created.
    /// The head is attached (and notified) first, then the tail, which
    /// replays its retained value if it has one.
    pub fn create_edge(&mut self, tail: &PortRef, head: &PortRef) -> Result<EdgeId, GraphError> {
        let output = self.output_port(tail)?;
        if !output.can_attach() {
            return Err(GraphError::PortFull {
                port: tail.clone(),
                capacity: output.edges().len(),
            });
        }
        let input = self.input_port(head)?;
        if !input.can_attach() {
            return Err(GraphError::PortFull {
                port: head.clone(),
                capacity: input.edges().len(),
            });
        }

        let id = self
            .edges
            .insert_with_key(|id| Edge::new(id, tail.clone(), head.clone()));
        self.input_port_mut(head)?.attach(id)?;
        self.output_port_mut(tail)?.attach(id)?;
        debug!(edge = %id, tail = %tail, head = %head, "edge created");
        self.publisher
            .publish(Subject::Edge(id), "endpoints", || {
                json!({ "tail": tail, "head": head })
            });
        self.publish_using_default(head);

        self.notify(head.node, |behavior, ctx| {
            behavior.input_edge_added(ctx, &head.name, id)
        })?;
        self.notify(tail.node, |behavior, ctx| {
            behavior.output_edge_added(ctx, &tail.name, id)
        })?;

        let retained = self.output_port(tail)?.retained().cloned();
        if let Some(value) = retained {
            self.push_edge(id, value, None)?;
        }
        Ok(id)
    }

    /// Detach an edge from both ports and free it.
    pub fn destroy_edge(&mut self, id: EdgeId) -> Result<(), GraphError> {
        let edge = self
            .edges
            .remove(id)
            .ok_or(GraphError::EdgeNotFound(id))?;
        let (tail, head) = (edge.tail().clone(), edge.head().clone());

        if let Ok(input) = self.input_port_mut(&head) {
            input.detach(id);
        }
        if let Ok(output) = self.output_port_mut(&tail) {
            output.detach(id);
        }
        debug!(edge = %id, "edge destroyed");
        self.publisher
            .publish(Subject::Edge(id), "destroyed", || json!(true));
        self.publish_using_default(&head);

        let removed_in = self.notify(head.node, |behavior, ctx| {
            behavior.input_edge_removed(ctx, &head.name, id)
        });
        let removed_out = self.notify(tail.node, |behavior, ctx| {
            behavior.output_edge_removed(ctx, &tail.name, id)
        });
        removed_in.and(removed_out)
    }

    /// Push a value through an edge and activate its head synchronously.
    ///
    /// Pushing onto a destroyed edge does nothing.
    pub fn push_edge(&mut self, id: EdgeId, data: Value, label: Option<String>) -> Result<(), GraphError> {
        let derive = self.config.derive_labels;
        let Some(edge) = self.edges.get_mut(id) else {
            trace!(edge = %id, "push onto destroyed edge ignored");
            return Ok(());
        };
        let relabelled = edge.begin_push(data, label, derive);
        let head = edge.head().clone();
        let label = relabelled.then(|| edge.label().to_string());
        trace!(edge = %id, head = %head, "push");

        if let Some(label) = label {
            self.publisher
                .publish(Subject::Edge(id), "label", || json!(label));
        }
        self.publisher
            .publish(Subject::Edge(id), "ready", || json!(true));

        let result = self.activate_input(&head, ActivationSource::Edge(id));
        if let Some(edge) = self.edges.get_mut(id) {
            edge.end_push();
        }
        result
    }

    /// Consume the edge's pending value.
    pub fn read_edge(&mut self, id: EdgeId) -> Result<Value, GraphError> {
        let edge = self.edge_mut(id)?;
        let value = edge.read()?;
        let ready = edge.is_ready();
        self.publisher
            .publish(Subject::Edge(id), "ready", || json!(ready));
        Ok(value)
    }

    pub fn peek_edge(&self, id: EdgeId) -> Result<&Value, GraphError> {
        self.edge(id).ok_or(GraphError::EdgeNotFound(id))?.peek()
    }

    pub fn set_reacquirable(&mut self, id: EdgeId, reacquirable: bool) -> Result<(), GraphError> {
        self.edge_mut(id)?.set_reacquirable(reacquirable);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Call into an active node's behavior. Nodes that are building or being
    /// destroyed are skipped.
    ///
    /// Whatever the callback returns is attributed to the node, so it can
    /// never be mistaken for a refused request.
    fn notify<F>(&mut self, node: NodeId, hook: F) -> Result<(), GraphError>
    where
        F: FnOnce(&dyn NodeBehavior, &mut NodeContext<'_>) -> Result<(), GraphError>,
    {
        let behavior = match self.nodes.get(node) {
            Some(slot) if slot.node.is_active() => Arc::clone(&slot.behavior),
            _ => return Ok(()),
        };
        hook(behavior.as_ref(), &mut NodeContext::new(self, node))
            .map_err(|err| GraphError::hook(node, err))
    }

    fn publish_port_lists(&self, id: NodeId) {
        if !self.publisher.is_observed() {
            return;
        }
        if let Some(node) = self.node(id) {
            self.publisher
                .publish(Subject::Node(id), "inputs", || json!(node.input_names()));
            self.publisher
                .publish(Subject::Node(id), "outputs", || json!(node.output_names()));
        }
    }

    fn publish_using_default(&self, port: &PortRef) {
        if let Ok(input) = self.input_port(port) {
            let using_default = input.using_default();
            self.publisher
                .publish(Subject::Port(port.clone()), "using_default", || {
                    json!(using_default)
                });
        }
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .field("names", &self.directory.len())
            .field("publisher", &self.publisher)
            .finish()
    }
}
