//! A scheduler and the graph it drives, bundled.
//!
//! Most embedders want exactly one of each. [`Engine`] wires them together
//! from a [`RuntimeConfig`] and forwards the driving calls.

use std::sync::Arc;

use tracing::info;

use crate::config::RuntimeConfig;
use crate::graph::{Graph, NodeRegistry};
use crate::runtime::{Failure, Scheduler, SchedulerHandle, Task, TaskId};

pub struct Engine {
    scheduler: Scheduler<Graph>,
    graph: Graph,
}

impl Engine {
    pub fn new(config: RuntimeConfig, registry: Arc<NodeRegistry>) -> Self {
        let scheduler = Scheduler::new(config.scheduler);
        let graph = Graph::new(config.graph, registry, scheduler.handle());
        info!(node_types = graph.registry().type_names().len(), "engine created");
        Self { scheduler, graph }
    }

    /// Handle for submitting work from any thread.
    pub fn handle(&self) -> SchedulerHandle<Graph> {
        self.scheduler.handle()
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Direct access for setup before the loop starts.
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn scheduler(&self) -> &Scheduler<Graph> {
        &self.scheduler
    }

    pub fn on_failure<F>(&mut self, sink: F)
    where
        F: FnMut(&Failure) + Send + 'static,
    {
        self.scheduler.on_failure(sink);
    }

    pub fn submit(&self, task: Task<Graph>) -> TaskId {
        self.scheduler.submit(task, false)
    }

    /// Process at most one unit of work without blocking.
    pub fn turn(&mut self) -> bool {
        self.scheduler.turn(&mut self.graph)
    }

    /// Run until exit is requested through a handle.
    pub fn run(&mut self) {
        self.scheduler.run(&mut self.graph);
    }

    pub fn run_until_idle(&mut self) -> usize {
        self.scheduler.run_until_idle(&mut self.graph)
    }

    /// Split into parts, for callers that drive the loop themselves.
    pub fn into_parts(self) -> (Scheduler<Graph>, Graph) {
        (self.scheduler, self.graph)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("graph", &self.graph)
            .field("queue", &self.scheduler.queue_len())
            .field("stack", &self.scheduler.stack_len())
            .finish()
    }
}
