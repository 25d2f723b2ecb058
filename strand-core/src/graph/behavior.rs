//! Node behaviors and the node-type registry.
//!
//! A node type is a [`NodeBehavior`] implementation registered under a name.
//! The graph resolves the name when a node is created, asks the factory for a
//! behavior instance, and runs its build phase synchronously.
//!
//! All callbacks run on the scheduler timeline with exclusive access to the
//! graph through a [`NodeContext`]. Behaviors keep their own state behind
//! interior mutability, since the same node may be re-entered (for example a
//! push that loops back to the node that made it).

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::context::NodeContext;
use super::edge::EdgeId;
use crate::error::GraphError;
use crate::value::Value;

/// Construction arguments for a node.
pub type InitArgs = serde_json::Map<String, Value>;

/// Why an input port was activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationSource {
    /// Data was pushed through this edge.
    Edge(EdgeId),
    /// The port's default provider changed while no edge is attached.
    Default,
}

/// Pluggable behavior of a node type.
///
/// Only [`build`](Self::build) is required. The remaining callbacks default
/// to doing nothing.
pub trait NodeBehavior: Send + Sync {
    /// Declare ports. Runs once, synchronously, before the node is active.
    fn build(&self, ctx: &mut NodeContext<'_>) -> Result<(), GraphError>;

    /// An input port was activated. This is where a node decides whether to
    /// compute now, typically by checking [`NodeContext::is_ready`].
    fn edge_activated(
        &self,
        _ctx: &mut NodeContext<'_>,
        _port: &str,
        _source: ActivationSource,
    ) -> Result<(), GraphError> {
        Ok(())
    }

    fn input_edge_added(&self, _ctx: &mut NodeContext<'_>, _port: &str, _edge: EdgeId) -> Result<(), GraphError> {
        Ok(())
    }

    fn input_edge_removed(&self, _ctx: &mut NodeContext<'_>, _port: &str, _edge: EdgeId) -> Result<(), GraphError> {
        Ok(())
    }

    fn output_edge_added(&self, _ctx: &mut NodeContext<'_>, _port: &str, _edge: EdgeId) -> Result<(), GraphError> {
        Ok(())
    }

    fn output_edge_removed(&self, _ctx: &mut NodeContext<'_>, _port: &str, _edge: EdgeId) -> Result<(), GraphError> {
        Ok(())
    }

    /// The node is being destroyed. Its edges are already gone.
    fn destroy(&self, _ctx: &mut NodeContext<'_>) -> Result<(), GraphError> {
        Ok(())
    }
}

type Factory = Arc<dyn Fn(&InitArgs) -> Result<Arc<dyn NodeBehavior>, GraphError> + Send + Sync>;

#[derive(Clone)]
struct Registration {
    category: String,
    factory: Factory,
}

/// Maps node type names to behavior factories.
///
/// Registration may happen from any thread (plugin loaders), so the map is
/// concurrent.
#[derive(Default)]
pub struct NodeRegistry {
    types: DashMap<String, Registration>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node type. Replaces (and returns `true` for) an existing
    /// registration with the same name.
    pub fn register<F>(&self, type_name: impl Into<String>, category: impl Into<String>, factory: F) -> bool
    where
        F: Fn(&InitArgs) -> Result<Arc<dyn NodeBehavior>, GraphError> + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        let category = category.into();
        debug!(type_name = %type_name, category = %category, "registering node type");
        self.types
            .insert(
                type_name,
                Registration {
                    category,
                    factory: Arc::new(factory),
                },
            )
            .is_some()
    }

    pub fn unregister(&self, type_name: &str) -> bool {
        self.types.remove(type_name).is_some()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn category(&self, type_name: &str) -> Option<String> {
        self.types.get(type_name).map(|entry| entry.category.clone())
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Create a behavior instance. Returns the behavior and its category.
    pub fn instantiate(
        &self,
        type_name: &str,
        args: &InitArgs,
    ) -> Result<(Arc<dyn NodeBehavior>, String), GraphError> {
        // Clone out of the map so a factory may touch the registry itself.
        let registration = self
            .types
            .get(type_name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GraphError::UnknownNodeType(type_name.to_string()))?;
        let behavior = (registration.factory)(args)?;
        Ok((behavior, registration.category))
    }
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Empty;

    impl NodeBehavior for Empty {
        fn build(&self, _ctx: &mut NodeContext<'_>) -> Result<(), GraphError> {
            Ok(())
        }
    }

    #[test]
    fn registry_resolves_by_name() {
        let registry = NodeRegistry::new();
        assert!(!registry.register("util.empty", "util", |_| Ok(Arc::new(Empty))));

        assert!(registry.contains("util.empty"));
        assert_eq!(registry.category("util.empty").as_deref(), Some("util"));

        let (_, category) = registry.instantiate("util.empty", &InitArgs::new()).unwrap();
        assert_eq!(category, "util");
    }

    #[test]
    fn unknown_type_is_an_error() {
        let registry = NodeRegistry::new();
        let err = registry
            .instantiate("util.missing", &InitArgs::new())
            .err()
            .unwrap();
        assert_eq!(err, GraphError::UnknownNodeType("util.missing".into()));
    }

    #[test]
    fn factories_see_init_args() {
        let registry = NodeRegistry::new();
        registry.register("util.strict", "util", |args| {
            if args.contains_key("size") {
                Ok(Arc::new(Empty) as Arc<dyn NodeBehavior>)
            } else {
                Err(GraphError::BuildFailed {
                    type_name: "util.strict".into(),
                    reason: "missing size".into(),
                })
            }
        });

        assert!(registry.instantiate("util.strict", &InitArgs::new()).is_err());

        let mut args = InitArgs::new();
        args.insert("size".into(), Value::from(3));
        assert!(registry.instantiate("util.strict", &args).is_ok());
    }

    #[test]
    fn re_registration_replaces() {
        let registry = NodeRegistry::new();
        registry.register("a", "x", |_| Ok(Arc::new(Empty)));
        assert!(registry.register("a", "y", |_| Ok(Arc::new(Empty))));
        assert_eq!(registry.category("a").as_deref(), Some("y"));
        assert_eq!(registry.type_names(), vec!["a"]);
        assert!(registry.unregister("a"));
        assert!(!registry.contains("a"));
    }
}
