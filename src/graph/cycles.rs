// src/graph/cycles.rs

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graphmap::DiGraphMap;

use crate::resource::{ResourceId, ResourceSet, ResourceTable};

/// Graph of declared dependencies between resources still in flight.
///
/// Edge direction: dependency -> dependent.
#[derive(Debug, Default)]
pub struct DeclaredGraph {
    graph: DiGraphMap<ResourceId, ()>,
}

impl DeclaredGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(resource, declared dependencies)` pairs. Dependencies
    /// outside the pairs are already settled and cannot be part of a stall.
    pub fn from_pending(pending: &[(ResourceId, ResourceSet)]) -> Self {
        let mut g = Self::new();
        for (id, _) in pending {
            g.graph.add_node(*id);
        }
        for (id, deps) in pending {
            for dep in deps {
                if g.graph.contains_node(*dep) {
                    g.add_dependency(*id, *dep);
                }
            }
        }
        g
    }

    pub fn add_dependency(&mut self, dependent: ResourceId, dependency: ResourceId) {
        self.graph.add_edge(dependency, dependent, ());
    }

    /// Members of one cycle, sorted; `None` if the graph is acyclic.
    pub fn find_cycle(&self) -> Option<Vec<ResourceId>> {
        // A topological sort will fail if there is a cycle.
        let culprit = match toposort(&self.graph, None) {
            Ok(_) => return None,
            Err(cycle) => cycle.node_id(),
        };
        let mut members = tarjan_scc(&self.graph)
            .into_iter()
            .find(|scc| scc.contains(&culprit))
            .unwrap_or_else(|| vec![culprit]);
        members.sort();
        Some(members)
    }
}

/// Describe a dependency cycle among unfinished registrations, if any.
pub fn find_stall_cycle(table: &ResourceTable) -> Option<String> {
    let cycle = DeclaredGraph::from_pending(&table.transferring()).find_cycle()?;
    let names: Vec<String> = cycle
        .iter()
        .map(|id| {
            table
                .handle(*id)
                .map(|h| h.describe())
                .unwrap_or_else(|| id.to_string())
        })
        .collect();
    Some(names.join(", "))
}
