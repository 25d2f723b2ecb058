//! Edges
//!
//! An edge is a one-way, single-slot channel from an output port (the tail)
//! to an input port (the head). Pushing stores one pending value and marks the
//! edge ready; reading consumes it.
//!
//! The synchronous activation of the head port happens in
//! [`Graph::push_edge`](super::Graph::push_edge), since it needs the whole
//! graph. This module only holds the per-edge state machine.

use std::fmt;

use slotmap::{new_key_type, Key};

use super::node::split;
use super::port::PortRef;
use crate::error::GraphError;
use crate::value::{shape_label, Value};

new_key_type! {
    /// Generational handle to an edge.
    pub struct EdgeId;
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (slot, version) = split(self.data().as_ffi());
        write!(f, "edge#{slot}.{version}")
    }
}

/// A data channel between two ports.
#[derive(Debug, Clone)]
pub struct Edge {
    id: EdgeId,
    tail: PortRef,
    head: PortRef,
    label: String,
    pending: Option<Value>,
    ready: bool,
    activated: bool,
    reacquirable: bool,
}

impl Edge {
    pub(crate) fn new(id: EdgeId, tail: PortRef, head: PortRef) -> Self {
        Self {
            id,
            tail,
            head,
            label: String::new(),
            pending: None,
            ready: false,
            activated: false,
            reacquirable: false,
        }
    }

    pub fn id(&self) -> EdgeId {
        self.id
    }

    /// The output port data comes from.
    pub fn tail(&self) -> &PortRef {
        &self.tail
    }

    /// The input port data goes to.
    pub fn head(&self) -> &PortRef {
        &self.head
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Holds a value that has not been consumed.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// True only while a push through this edge is in progress.
    pub fn is_activated(&self) -> bool {
        self.activated
    }

    pub fn is_reacquirable(&self) -> bool {
        self.reacquirable
    }

    /// Consume the pending value.
    ///
    /// Reacquirable edges keep the value and stay ready.
    pub fn read(&mut self) -> Result<Value, GraphError> {
        if !self.ready {
            return Err(GraphError::DataNotAvailable(self.id));
        }
        if self.reacquirable {
            return self
                .pending
                .clone()
                .ok_or(GraphError::DataNotAvailable(self.id));
        }
        self.ready = false;
        self.pending
            .take()
            .ok_or(GraphError::DataNotAvailable(self.id))
    }

    /// Inspect the pending value without consuming it.
    pub fn peek(&self) -> Result<&Value, GraphError> {
        if !self.ready {
            return Err(GraphError::DataNotAvailable(self.id));
        }
        self.pending
            .as_ref()
            .ok_or(GraphError::DataNotAvailable(self.id))
    }

    /// Store a pushed value and begin activation.
    ///
    /// Returns `true` if the label changed.
    pub(crate) fn begin_push(&mut self, data: Value, label: Option<String>, derive: bool) -> bool {
        let label = label.or_else(|| derive.then(|| shape_label(&data)));
        self.pending = Some(data);
        self.ready = true;
        self.activated = true;
        match label {
            Some(label) if label != self.label => {
                self.label = label;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn end_push(&mut self) {
        self.activated = false;
    }

    pub(crate) fn set_reacquirable(&mut self, reacquirable: bool) {
        self.reacquirable = reacquirable;
    }
}
