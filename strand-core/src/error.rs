//! Error Types
//!
//! Two layers of failure exist in the runtime:
//!
//! - [`GraphError`]: protocol violations raised by node, port and edge
//!   operations (a full port, a read with no data, a stale handle). Errors
//!   that come out of a node's own callbacks are wrapped in
//!   [`GraphError::Hook`], so a bad handle used by node logic is told apart
//!   from a bad handle in an editor request.
//! - [`TaskError`]: anything that escapes a scheduled task. The scheduler
//!   treats [`TaskError::Cancelled`] as recoverable and every other variant
//!   as fatal to the pending batch of work.

use thiserror::Error;

use crate::graph::{EdgeId, NodeId, PortRef};

/// Errors raised by graph protocol operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphError {
    /// Attaching another edge would exceed the port's capacity.
    #[error("port full: {port} already holds {capacity} edge(s)")]
    PortFull { port: PortRef, capacity: usize },

    /// The edge holds no unconsumed value.
    #[error("data not available on edge {0}")]
    DataNotAvailable(EdgeId),

    /// The input port has no edges and no default value.
    #[error("data not available on port {0}")]
    PortEmpty(PortRef),

    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("edge not found: {0}")]
    EdgeNotFound(EdgeId),

    #[error("port not found: {0}")]
    PortNotFound(PortRef),

    #[error("duplicate port: {0}")]
    DuplicatePort(PortRef),

    #[error("unknown node type: {0}")]
    UnknownNodeType(String),

    /// The node type's build phase rejected its arguments.
    #[error("failed to build node of type {type_name}: {reason}")]
    BuildFailed { type_name: String, reason: String },

    /// The port's default provider cannot be edited.
    #[error("default value of {0} is read-only")]
    ReadOnlyDefault(PortRef),

    #[error("name already registered: {0}")]
    NameTaken(String),

    /// Free-form failure raised by node-type logic.
    #[error("node {node} failed: {message}")]
    Behavior { node: NodeId, message: String },

    /// A node callback failed. `source` is whatever the callback returned.
    #[error("node {node} callback failed: {source}")]
    Hook { node: NodeId, source: Box<GraphError> },
}

impl GraphError {
    /// Attribute a callback failure to `node`. Failures already attributed
    /// to a node deeper in the propagation keep that attribution.
    pub fn hook(node: NodeId, err: GraphError) -> Self {
        match err {
            err @ Self::Hook { .. } => err,
            other => Self::Hook {
                node,
                source: Box::new(other),
            },
        }
    }

    /// A refused request (bad handle, full port, unknown type) rather than a
    /// failure of node logic or of the read protocol.
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            Self::DataNotAvailable(_)
                | Self::PortEmpty(_)
                | Self::Behavior { .. }
                | Self::Hook { .. }
        )
    }

    /// The innermost error, looking through callback attribution.
    pub fn root_cause(&self) -> &GraphError {
        let mut err = self;
        while let Self::Hook { source, .. } = err {
            err = source;
        }
        err
    }
}

/// Errors that escape a scheduled task.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TaskError {
    /// The step was interrupted at a cancellation checkpoint.
    #[error("task cancelled")]
    Cancelled,

    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The task panicked; the payload message is preserved when available.
    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task failed: {0}")]
    Failed(String),
}

impl TaskError {
    /// Build a free-form failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Whether this error is a cancellation rather than a fatal failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn node() -> NodeId {
        let mut keys: SlotMap<NodeId, ()> = SlotMap::with_key();
        keys.insert(())
    }

    #[test]
    fn graph_errors_convert_into_fatal_task_errors() {
        let err: TaskError = GraphError::UnknownNodeType("math.nope".into()).into();
        assert!(!err.is_cancellation());
        assert_eq!(err.to_string(), "unknown node type: math.nope");
    }

    #[test]
    fn cancellation_is_recognised() {
        assert!(TaskError::Cancelled.is_cancellation());
        assert!(!TaskError::failed("boom").is_cancellation());
    }

    #[test]
    fn protocol_failures_are_not_rejections() {
        assert!(GraphError::UnknownNodeType("x".into()).is_rejection());
        assert!(GraphError::NameTaken("fib".into()).is_rejection());
        assert!(!GraphError::Behavior {
            node: node(),
            message: "bad".into(),
        }
        .is_rejection());
    }

    #[test]
    fn callback_failures_are_never_rejections() {
        let node = node();
        let missing = GraphError::NodeNotFound(node);
        assert!(missing.is_rejection());

        let hooked = GraphError::hook(node, missing.clone());
        assert!(!hooked.is_rejection());
        assert_eq!(hooked.root_cause(), &missing);
    }

    #[test]
    fn innermost_callback_keeps_attribution() {
        let mut keys: SlotMap<NodeId, ()> = SlotMap::with_key();
        let (inner, outer) = (keys.insert(()), keys.insert(()));
        let cause = GraphError::NameTaken("x".into());

        let err = GraphError::hook(outer, GraphError::hook(inner, cause.clone()));
        assert!(matches!(err, GraphError::Hook { node, .. } if node == inner));
        assert_eq!(err.root_cause(), &cause);
    }
}
