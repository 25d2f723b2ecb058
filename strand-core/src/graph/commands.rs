//! Graph mutations packaged as scheduler tasks.
//!
//! Code that does not run on the scheduler timeline (a UI thread, a file
//! loader) cannot touch the [`Graph`] directly. It builds a command here,
//! submits the task through a [`SchedulerHandle`](crate::runtime::SchedulerHandle),
//! and waits on the returned receiver for the result.
//!
//! Refused requests (a full port, a stale handle) are delivered through the
//! reply and the task itself succeeds, so one bad user action does not wipe
//! the pending work. Anything raised inside a node callback arrives as
//! [`GraphError::Hook`] and still fails the task, even when the cause looks
//! like a refusal.

use crossbeam_channel::{bounded, Receiver};

use super::behavior::InitArgs;
use super::container::Graph;
use super::edge::EdgeId;
use super::node::NodeId;
use super::port::PortRef;
use crate::error::{GraphError, TaskError};
use crate::runtime::Task;
use crate::value::Value;

/// Receives the outcome of a command once its task has run.
pub type Reply<T> = Receiver<Result<T, GraphError>>;

fn command<T, F>(name: &'static str, op: F) -> (Task<Graph>, Reply<T>)
where
    T: Send + 'static,
    F: FnOnce(&mut Graph) -> Result<T, GraphError> + Send + 'static,
{
    let (tx, rx) = bounded(1);
    let task = Task::new(name, move |graph: &mut Graph| {
        let result = op(graph);
        let escalate = match &result {
            Err(err) if !err.is_rejection() => Some(err.clone()),
            _ => None,
        };
        // The caller may have stopped listening.
        let _ = tx.send(result);
        match escalate {
            Some(err) => Err(TaskError::from(err)),
            None => Ok(()),
        }
    });
    (task, rx)
}

pub fn create_node(type_name: impl Into<String>, args: InitArgs) -> (Task<Graph>, Reply<NodeId>) {
    let type_name = type_name.into();
    command("create_node", move |graph| graph.create_node(&type_name, args))
}

pub fn destroy_node(node: NodeId) -> (Task<Graph>, Reply<()>) {
    command("destroy_node", move |graph| graph.destroy_node(node))
}

pub fn create_edge(tail: PortRef, head: PortRef) -> (Task<Graph>, Reply<EdgeId>) {
    command("create_edge", move |graph| graph.create_edge(&tail, &head))
}

pub fn destroy_edge(edge: EdgeId) -> (Task<Graph>, Reply<()>) {
    command("destroy_edge", move |graph| graph.destroy_edge(edge))
}

/// Push a value out of an output port, as if the owning node had.
pub fn push_output(port: PortRef, data: Value, retain: bool) -> (Task<Graph>, Reply<()>) {
    command("push_output", move |graph| graph.push_output(&port, data, retain))
}

pub fn set_default_value(port: PortRef, value: Value) -> (Task<Graph>, Reply<()>) {
    command("set_default_value", move |graph| {
        graph.set_default_value(&port, value)
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::config::GraphConfig;
    use crate::graph::{ActivationSource, NodeBehavior, NodeContext, NodeRegistry, PortSpec};
    use crate::runtime::Scheduler;
    use serde_json::json;

    struct Pass;

    impl NodeBehavior for Pass {
        fn build(&self, ctx: &mut NodeContext<'_>) -> Result<(), GraphError> {
            ctx.add_input(PortSpec::new("in"))?;
            ctx.add_output(PortSpec::new("out"))?;
            Ok(())
        }
    }

    /// Starts some work, then reads a port it never declared.
    struct Misread(Arc<AtomicUsize>);

    impl NodeBehavior for Misread {
        fn build(&self, ctx: &mut NodeContext<'_>) -> Result<(), GraphError> {
            ctx.add_input(PortSpec::new("in"))?;
            Ok(())
        }

        fn edge_activated(
            &self,
            ctx: &mut NodeContext<'_>,
            _port: &str,
            _source: ActivationSource,
        ) -> Result<(), GraphError> {
            let runs = Arc::clone(&self.0);
            ctx.spawn("partial", move |_: &mut Graph| {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            ctx.read("inn")?;
            Ok(())
        }
    }

    fn setup() -> (Scheduler<Graph>, Graph) {
        setup_with(Arc::new(AtomicUsize::new(0)))
    }

    fn setup_with(runs: Arc<AtomicUsize>) -> (Scheduler<Graph>, Graph) {
        let registry = NodeRegistry::new();
        registry.register("pass", "util", |_| Ok(Arc::new(Pass)));
        registry.register("misread", "util", move |_| Ok(Arc::new(Misread(Arc::clone(&runs)))));
        let scheduler = Scheduler::new(Default::default());
        let graph = Graph::new(GraphConfig::default(), Arc::new(registry), scheduler.handle());
        (scheduler, graph)
    }

    #[test]
    fn replies_carry_results() {
        let (mut scheduler, mut graph) = setup();
        let handle = scheduler.handle();

        let (task, reply) = create_node("pass", InitArgs::new());
        handle.submit(task);
        scheduler.run_until_idle(&mut graph);
        let node = reply.try_recv().unwrap().unwrap();
        assert!(graph.contains_node(node));

        let (task, reply) = destroy_node(node);
        handle.submit(task);
        scheduler.run_until_idle(&mut graph);
        assert_eq!(reply.try_recv().unwrap(), Ok(()));
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn rejections_do_not_clear_pending_work() {
        let (mut scheduler, mut graph) = setup();
        let handle = scheduler.handle();
        let a = graph.create_node("pass", InitArgs::new()).unwrap();
        let b = graph.create_node("pass", InitArgs::new()).unwrap();
        let c = graph.create_node("pass", InitArgs::new()).unwrap();
        graph
            .create_edge(&PortRef::output(a, "out"), &PortRef::input(c, "in"))
            .unwrap();

        let (full, full_reply) = create_edge(PortRef::output(b, "out"), PortRef::input(c, "in"));
        let (later, later_reply) = create_edge(PortRef::output(a, "out"), PortRef::input(b, "in"));
        handle.submit(full);
        handle.submit(later);

        let failures = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&failures);
        scheduler.on_failure(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.run_until_idle(&mut graph);

        assert_eq!(failures.load(Ordering::SeqCst), 0);

        assert!(matches!(
            full_reply.try_recv().unwrap(),
            Err(GraphError::PortFull { .. })
        ));
        assert!(later_reply.try_recv().unwrap().is_ok());
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn read_only_default_is_refused() {
        let (mut scheduler, mut graph) = setup();
        let node = graph.create_node("pass", InitArgs::new()).unwrap();

        let (task, reply) = set_default_value(PortRef::input(node, "in"), json!(1));
        scheduler.submit(task, false);
        scheduler.run_until_idle(&mut graph);

        assert!(matches!(
            reply.try_recv().unwrap(),
            Err(GraphError::ReadOnlyDefault(_))
        ));
    }

    #[test]
    fn callback_errors_fail_the_command_even_when_they_look_like_refusals() {
        let runs = Arc::new(AtomicUsize::new(0));
        let (mut scheduler, mut graph) = setup_with(Arc::clone(&runs));
        let handle = scheduler.handle();
        let source = graph.create_node("pass", InitArgs::new()).unwrap();
        let sink = graph.create_node("misread", InitArgs::new()).unwrap();
        graph
            .create_edge(&PortRef::output(source, "out"), &PortRef::input(sink, "in"))
            .unwrap();

        let (push, reply) = push_output(PortRef::output(source, "out"), json!(1), false);
        handle.submit(push);
        let counter = Arc::clone(&runs);
        handle.submit(Task::new("independent", move |_: &mut Graph| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        let failures = Arc::new(AtomicUsize::new(0));
        let failed = Arc::clone(&failures);
        scheduler.on_failure(move |failure| {
            assert!(!failure.is_cancellation());
            failed.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.run_until_idle(&mut graph);

        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_idle());

        let err = reply.try_recv().unwrap().unwrap_err();
        assert!(matches!(err, GraphError::Hook { node, .. } if node == sink));
        assert!(matches!(err.root_cause(), GraphError::PortNotFound(_)));
    }
}
