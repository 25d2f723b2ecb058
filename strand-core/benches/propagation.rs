//! # Propagation Benchmark
//!
//! Pushes values through a chain of pass-through nodes. Each hop activates
//! the next node synchronously and spawns its forwarding task, so this
//! measures push, activation and scheduler overhead together.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use strand_core::graph::{
    commands, ActivationSource, Graph, InitArgs, NodeBehavior, NodeContext, NodeRegistry, PortRef,
    PortSpec,
};
use strand_core::{Engine, GraphError, RuntimeConfig};

struct Relay;

impl NodeBehavior for Relay {
    fn build(&self, ctx: &mut NodeContext<'_>) -> Result<(), GraphError> {
        ctx.add_input(PortSpec::new("in"))?;
        ctx.add_output(PortSpec::new("out"))?;
        Ok(())
    }

    fn edge_activated(
        &self,
        ctx: &mut NodeContext<'_>,
        _port: &str,
        _source: ActivationSource,
    ) -> Result<(), GraphError> {
        if !ctx.is_ready("in")? {
            return Ok(());
        }
        let (input, output) = (ctx.input("in"), ctx.output("out"));
        ctx.spawn("relay", move |graph: &mut Graph| {
            let value = graph.read_input(&input)?;
            graph.push_output(&output, value, false)?;
            Ok(())
        });
        Ok(())
    }
}

struct Source;

impl NodeBehavior for Source {
    fn build(&self, ctx: &mut NodeContext<'_>) -> Result<(), GraphError> {
        ctx.add_output(PortSpec::new("out"))?;
        Ok(())
    }
}

/// Build a source feeding a chain of `length` relays. Returns the engine and
/// the source's output port.
fn chain(length: usize) -> (Engine, PortRef) {
    let registry = NodeRegistry::new();
    registry.register("bench.source", "bench", |_| Ok(Arc::new(Source)));
    registry.register("bench.relay", "bench", |_| Ok(Arc::new(Relay)));
    let mut engine = Engine::new(RuntimeConfig::default(), Arc::new(registry));

    let graph = engine.graph_mut();
    let source = graph.create_node("bench.source", InitArgs::new()).unwrap();
    let mut tail = PortRef::output(source, "out");
    for _ in 0..length {
        let relay = graph.create_node("bench.relay", InitArgs::new()).unwrap();
        graph
            .create_edge(&tail, &PortRef::input(relay, "in"))
            .unwrap();
        tail = PortRef::output(relay, "out");
    }

    (engine, PortRef::output(source, "out"))
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation");
    for length in [1usize, 8, 64] {
        group.throughput(Throughput::Elements(length as u64));
        group.bench_with_input(BenchmarkId::new("chain", length), &length, |b, &length| {
            let (mut engine, source) = chain(length);
            b.iter(|| {
                let (task, _reply) = commands::push_output(source.clone(), json!(1), false);
                engine.submit(task);
                engine.run_until_idle();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_chain);
criterion_main!(benches);
