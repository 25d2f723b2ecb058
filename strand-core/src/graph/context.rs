//! The view a node behavior gets of the graph.

use std::borrow::Cow;

use super::container::Graph;
use super::edge::EdgeId;
use super::node::{Node, NodeId};
use super::port::{PortRef, PortSpec};
use crate::error::{GraphError, TaskError};
use crate::runtime::{NoInterrupt, Task, TaskId};
use crate::value::Value;

/// Exclusive access to the graph, scoped to one node.
///
/// Port names are resolved against the node the context was created for.
/// The full graph stays reachable through [`graph`](Self::graph) for node
/// types that manage other nodes.
pub struct NodeContext<'g> {
    graph: &'g mut Graph,
    node: NodeId,
}

impl<'g> NodeContext<'g> {
    pub(crate) fn new(graph: &'g mut Graph, node: NodeId) -> Self {
        Self { graph, node }
    }

    pub fn id(&self) -> NodeId {
        self.node
    }

    pub fn node(&self) -> Result<&Node, GraphError> {
        self.graph
            .node(self.node)
            .ok_or(GraphError::NodeNotFound(self.node))
    }

    pub fn graph(&mut self) -> &mut Graph {
        &mut *self.graph
    }

    pub fn input(&self, name: &str) -> PortRef {
        PortRef::input(self.node, name)
    }

    pub fn output(&self, name: &str) -> PortRef {
        PortRef::output(self.node, name)
    }

    pub fn add_input(&mut self, spec: PortSpec) -> Result<PortRef, GraphError> {
        self.graph.add_input(self.node, spec)
    }

    pub fn add_output(&mut self, spec: PortSpec) -> Result<PortRef, GraphError> {
        self.graph.add_output(self.node, spec)
    }

    /// Remove an input port and every edge attached to it.
    pub fn remove_input(&mut self, name: &str) -> Result<(), GraphError> {
        let port = self.input(name);
        self.graph.remove_port(&port)
    }

    pub fn remove_output(&mut self, name: &str) -> Result<(), GraphError> {
        let port = self.output(name);
        self.graph.remove_port(&port)
    }

    pub fn is_ready(&self, port: &str) -> Result<bool, GraphError> {
        self.graph.is_input_ready(&self.input(port))
    }

    /// Whether every input port of the node is ready.
    pub fn all_inputs_ready(&self) -> Result<bool, GraphError> {
        let node = self.node()?;
        for port in node.inputs() {
            if !self.graph.is_input_ready(port.key())? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn read(&mut self, port: &str) -> Result<Value, GraphError> {
        let port = self.input(port);
        self.graph.read_input(&port)
    }

    pub fn read_all(&mut self, port: &str) -> Result<Vec<Value>, GraphError> {
        let port = self.input(port);
        self.graph.read_inputs(&port)
    }

    pub fn peek(&self, edge: EdgeId) -> Result<&Value, GraphError> {
        self.graph.peek_edge(edge)
    }

    pub fn push(&mut self, port: &str, data: Value) -> Result<(), GraphError> {
        let port = self.output(port);
        self.graph.push_output(&port, data, false)
    }

    /// Push and keep the value for edges attached later.
    pub fn push_retained(&mut self, port: &str, data: Value) -> Result<(), GraphError> {
        let port = self.output(port);
        self.graph.push_output(&port, data, true)
    }

    /// Spawn nested work onto the scheduler stack.
    pub fn spawn<F>(&self, name: impl Into<Cow<'static, str>>, body: F) -> TaskId
    where
        F: FnOnce(&mut Graph) -> Result<(), TaskError> + Send + 'static,
    {
        self.graph.handle().spawn(Task::new(name, body))
    }

    /// Queue independent work behind everything already submitted.
    pub fn schedule<F>(&self, name: impl Into<Cow<'static, str>>, body: F) -> TaskId
    where
        F: FnOnce(&mut Graph) -> Result<(), TaskError> + Send + 'static,
    {
        self.graph.handle().submit(Task::new(name, body))
    }

    /// Spawn a prepared task (for example a resumable one) onto the stack.
    pub fn spawn_task(&self, task: Task<Graph>) -> TaskId {
        self.graph.handle().spawn(task)
    }

    pub fn checkpoint(&self) -> Result<(), TaskError> {
        self.graph.handle().checkpoint()
    }

    pub fn no_interrupt(&self) -> NoInterrupt {
        self.graph.handle().no_interrupt()
    }

    pub fn register_name(&mut self, name: impl Into<String>) -> Result<(), GraphError> {
        self.graph.register_name(self.node, name)
    }

    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.graph.lookup(name)
    }

    /// Build a behavior error attributed to this node.
    pub fn fail(&self, message: impl Into<String>) -> GraphError {
        GraphError::Behavior {
            node: self.node,
            message: message.into(),
        }
    }
}

impl std::fmt::Debug for NodeContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContext")
            .field("node", &self.node)
            .finish()
    }
}
