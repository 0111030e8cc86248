//! Per-action dependency graph over the stores that take part in it.
//!
//! Vertices are every store that approved the action plus every store named
//! as a dependency by an approved agreement. Edges point from dependency to
//! dependent. Built and discarded once per action.

use std::collections::BTreeSet;

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graphmap::DiGraphMap;

use crate::agreement::Agreement;
use crate::error::{DispatchError, Result};
use crate::store::StoreId;

#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraphMap<StoreId, ()>,
    approved: BTreeSet<StoreId>,
}

impl DependencyGraph {
    /// Build the graph from approved agreements. Unapproved agreements are
    /// skipped; their stores only enter the graph if some approved store
    /// depends on them.
    pub fn from_agreements<'a>(
        agreements: impl IntoIterator<Item = (StoreId, &'a Agreement)>,
    ) -> Self {
        let approved: Vec<(StoreId, &Agreement)> = agreements
            .into_iter()
            .filter(|(_, agreement)| agreement.is_approved())
            .collect();

        let mut graph = DiGraphMap::new();
        for (store, agreement) in &approved {
            graph.add_node(*store);
            for dep in agreement.dependencies() {
                graph.add_node(*dep);
            }
        }
        for (store, agreement) in &approved {
            for dep in agreement.dependencies() {
                graph.add_edge(*dep, *store, ());
            }
        }

        Self {
            graph,
            approved: approved.iter().map(|(store, _)| *store).collect(),
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    #[cfg(test)]
    pub fn contains(&self, store: StoreId) -> bool {
        self.graph.contains_node(store)
    }

    /// Stores that approved a dependent's agreement but not the action itself.
    pub fn dependency_only(&self) -> Vec<StoreId> {
        self.graph
            .nodes()
            .filter(|store| !self.approved.contains(store))
            .collect()
    }

    /// Stores that the given store waits on.
    #[cfg(test)]
    pub fn dependencies_of(&self, store: StoreId) -> Vec<StoreId> {
        self.graph
            .neighbors_directed(store, petgraph::Direction::Incoming)
            .collect()
    }

    /// Every store that sits on a cycle, sorted. `None` for a DAG.
    pub fn find_cycle(&self) -> Option<Vec<StoreId>> {
        let mut members: Vec<StoreId> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .flatten()
            .collect();
        if members.is_empty() {
            return None;
        }
        members.sort();
        Some(members)
    }

    /// Topological execution order. Checks for cycles over the whole graph
    /// first. Order among independent stores is deterministic but otherwise
    /// unspecified.
    pub fn execution_order(&self) -> Result<Vec<StoreId>> {
        if let Some(stores) = self.find_cycle() {
            return Err(DispatchError::CycleDetected { stores });
        }
        toposort(&self.graph, None).map_err(|cycle| DispatchError::CycleDetected {
            stores: vec![cycle.node_id()],
        })
    }
}
