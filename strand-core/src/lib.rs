//! Strand Core
//!
//! This crate provides the execution core of the Strand visual dataflow
//! environment. It implements:
//!
//! - A cooperative, single-timeline task scheduler with interrupts
//! - The node/port/edge data-propagation protocol
//! - The graph container that owns nodes and edges
//!
//! Editors, node libraries and persistence live in other crates and talk to
//! the core through [`SchedulerHandle`](runtime::SchedulerHandle) and the
//! [`NodeBehavior`](graph::NodeBehavior) trait.
//!
//! # Architecture
//!
//! - `runtime`: tasks, the scheduler loop and interrupt delivery
//! - `graph`: nodes, ports, edges, the container and mutation commands
//! - `observe`: attribute change notifications, attributed to tasks
//! - `engine`: a scheduler and a graph wired together
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use strand_core::{Engine, NodeRegistry, RuntimeConfig};
//! use strand_core::graph::{commands, PortRef};
//!
//! let registry = Arc::new(NodeRegistry::new());
//! registry.register("math.double", "math", |_| Ok(Arc::new(Double)));
//!
//! let mut engine = Engine::new(RuntimeConfig::from_env()?, registry);
//! let (task, reply) = commands::create_node("math.double", Default::default());
//! engine.submit(task);
//! engine.run_until_idle();
//! let node = reply.recv()??;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod observe;
pub mod runtime;
pub mod value;

pub use config::RuntimeConfig;
pub use engine::Engine;
pub use error::{ConfigError, GraphError, TaskError};
pub use graph::{Graph, NodeBehavior, NodeContext, NodeRegistry};
pub use runtime::{Scheduler, SchedulerHandle, Task, TaskId};
pub use value::Value;
