//! Per-graph name directory.
//!
//! Some node types need to find each other by name (a call site looking up
//! the function definition it invokes). Names live here, owned by the graph,
//! and are dropped automatically when their node is destroyed.

use indexmap::IndexMap;

use super::node::NodeId;
use crate::error::GraphError;

#[derive(Debug, Default)]
pub struct Directory {
    names: IndexMap<String, NodeId>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `node`. Re-binding to the same node is a no-op.
    pub fn register(&mut self, name: impl Into<String>, node: NodeId) -> Result<(), GraphError> {
        let name = name.into();
        match self.names.get(&name) {
            Some(existing) if *existing != node => Err(GraphError::NameTaken(name)),
            _ => {
                self.names.insert(name, node);
                Ok(())
            }
        }
    }

    pub fn unregister(&mut self, name: &str) -> Option<NodeId> {
        self.names.shift_remove(name)
    }

    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Names bound to `node`, in registration order.
    pub fn names_of(&self, node: NodeId) -> Vec<&str> {
        self.names
            .iter()
            .filter(|(_, bound)| **bound == node)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Drop every name bound to `node`.
    pub fn forget(&mut self, node: NodeId) {
        self.names.retain(|_, bound| *bound != node);
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn names_resolve_until_forgotten() {
        let mut keys: SlotMap<NodeId, ()> = SlotMap::with_key();
        let def = keys.insert(());
        let other = keys.insert(());

        let mut directory = Directory::new();
        directory.register("fib", def).unwrap();
        directory.register("fib", def).unwrap();
        assert_eq!(
            directory.register("fib", other),
            Err(GraphError::NameTaken("fib".into()))
        );
        directory.register("fib2", def).unwrap();

        assert_eq!(directory.lookup("fib"), Some(def));
        assert_eq!(directory.names_of(def), vec!["fib", "fib2"]);

        directory.forget(def);
        assert!(directory.lookup("fib").is_none());
        assert!(directory.is_empty());
    }
}
