//! Dataflow Graph
//!
//! This module implements the node/port/edge protocol and the container that
//! owns it.
//!
//! # Overview
//!
//! - A **node** has ordered input and output ports and a pluggable
//!   [`NodeBehavior`] registered by type name.
//! - An **edge** connects one output port (its tail) to one input port (its
//!   head) and carries at most one pending value.
//! - Pushing onto an edge marks it ready and synchronously activates the head
//!   port, which calls the owning node's [`NodeBehavior::edge_activated`].
//!   The node decides when to compute, usually when every input is ready
//!   (join-all).
//!
//! # Design Decisions
//!
//! 1. The [`Graph`] owns every node and edge in versioned slot maps. Nodes,
//!    ports and edges refer to each other by id, never by pointer, so a stale
//!    handle fails to resolve instead of dangling.
//!
//! 2. The graph is only mutated on the scheduler timeline. Callbacks receive
//!    `&mut Graph` through a [`NodeContext`], and spawn further work instead of
//!    blocking.
//!
//! 3. Behaviors are shared (`Arc`) and take `&self`, so a push that loops back
//!    into the node that made it is an ordinary nested call.

mod behavior;
pub mod commands;
mod container;
mod context;
mod directory;
mod edge;
mod node;
mod port;

pub use behavior::{ActivationSource, InitArgs, NodeBehavior, NodeRegistry};
pub use container::Graph;
pub use context::NodeContext;
pub use directory::Directory;
pub use edge::{Edge, EdgeId};
pub use node::{Lifecycle, Node, NodeId};
pub use port::{
    Capacity, Control, DefaultProvider, Direction, InputPort, Literal, OutputPort, PortRef, PortSpec,
};
