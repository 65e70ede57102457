//! Foreign-key dependency graph and table ordering.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Result, SnapshotError};

/// Directed graph of tables; an edge `a -> b` means `a` references `b`.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeSet<String>,
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table with no dependencies (yet).
    pub fn add_table(&mut self, table: impl Into<String>) {
        self.nodes.insert(table.into());
    }

    /// Record that `table` references `referenced`.
    ///
    /// Self references are dropped: a table never waits on itself.
    pub fn add_dependency(&mut self, table: impl Into<String>, referenced: impl Into<String>) {
        let table = table.into();
        let referenced = referenced.into();
        self.nodes.insert(table.clone());
        if table != referenced {
            self.edges.entry(table).or_default().insert(referenced);
        }
    }

    /// Number of tables in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Edges whose target is not a table of the graph, as `(table, referenced)`.
    ///
    /// These impose no ordering.
    pub fn dangling_references(&self) -> Vec<(String, String)> {
        self.edges
            .iter()
            .flat_map(|(table, refs)| {
                refs.iter()
                    .filter(|r| !self.nodes.contains(*r))
                    .map(move |r| (table.clone(), r.clone()))
            })
            .collect()
    }

    /// Order tables so each one follows every table it references.
    ///
    /// Kahn's algorithm with in-degree counted on the referenced side:
    /// tables nobody references are ready first, which yields referencing
    /// tables before referenced ones; the result is then reversed. Ready
    /// tables are taken in descending name order so that the reversed
    /// output lists independent tables by ascending name.
    pub fn resolve(&self) -> Result<Vec<String>> {
        let mut in_degree: BTreeMap<&str, usize> =
            self.nodes.iter().map(|n| (n.as_str(), 0)).collect();
        for refs in self.edges.values() {
            for r in refs {
                if let Some(d) = in_degree.get_mut(r.as_str()) {
                    *d += 1;
                }
            }
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| *n)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = ready.pop_last() {
            order.push(node.to_string());
            if let Some(refs) = self.edges.get(node) {
                for r in refs {
                    if let Some(d) = in_degree.get_mut(r.as_str()) {
                        *d -= 1;
                        if *d == 0 {
                            ready.insert(r.as_str());
                        }
                    }
                }
            }
        }

        if order.len() < self.nodes.len() {
            let placed: BTreeSet<&str> = order.iter().map(String::as_str).collect();
            let tables = self
                .nodes
                .iter()
                .filter(|n| !placed.contains(n.as_str()))
                .cloned()
                .collect();
            return Err(SnapshotError::CyclicDependency { tables });
        }

        order.reverse();
        Ok(order)
    }
}
