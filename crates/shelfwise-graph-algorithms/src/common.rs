//! Shared utilities for graph algorithms
//!
//! Provides a read-only, index-dense view of a weighted graph for algorithm execution.

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Node Identifier type (u64)
pub type NodeId = u64;

/// A dense, integer-indexed view of the graph topology using Compressed Sparse Row (CSR) format.
///
/// Undirected views store every edge in both directions, so `successors` and
/// `predecessors` return the same neighbourhood.
#[derive(Debug, Clone)]
pub struct GraphView {
    /// Number of nodes
    pub node_count: usize,
    /// Mapping from dense index (0..N) back to NodeId
    pub index_to_node: Vec<NodeId>,
    /// Mapping from NodeId to dense index
    pub node_to_index: HashMap<NodeId, usize>,

    /// Outgoing edges CSR structure
    /// Offsets into `out_targets`. Size = node_count + 1
    pub out_offsets: Vec<usize>,
    /// Contiguous array of target node indices
    pub out_targets: Vec<usize>,

    /// Incoming edges CSR structure (Compressed Sparse Column effectively)
    /// Offsets into `in_sources`. Size = node_count + 1
    pub in_offsets: Vec<usize>,
    /// Contiguous array of source node indices
    pub in_sources: Vec<usize>,

    /// Edge weights: aligned with `out_targets`
    pub weights: Option<Vec<f64>>,

    /// True when every edge is stored in both directions
    pub undirected: bool,
}

impl GraphView {
    /// Get the out-degree of a node (by index)
    pub fn out_degree(&self, idx: usize) -> usize {
        self.out_offsets[idx + 1] - self.out_offsets[idx]
    }

    /// Get the in-degree of a node (by index)
    pub fn in_degree(&self, idx: usize) -> usize {
        self.in_offsets[idx + 1] - self.in_offsets[idx]
    }

    /// Get outgoing neighbors (successors) of a node
    pub fn successors(&self, idx: usize) -> &[usize] {
        let start = self.out_offsets[idx];
        let end = self.out_offsets[idx + 1];
        &self.out_targets[start..end]
    }

    /// Get incoming neighbors (predecessors) of a node
    pub fn predecessors(&self, idx: usize) -> &[usize] {
        let start = self.in_offsets[idx];
        let end = self.in_offsets[idx + 1];
        &self.in_sources[start..end]
    }

    /// Get weights for outgoing edges of a node
    pub fn weights(&self, idx: usize) -> Option<&[f64]> {
        self.weights.as_ref().map(|w| {
            let start = self.out_offsets[idx];
            let end = self.out_offsets[idx + 1];
            &w[start..end]
        })
    }

    /// Iterate `(neighbor, weight)` pairs of the outgoing edges; unweighted views yield 1.0
    pub fn weighted_successors(&self, idx: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let weights = self.weights(idx);
        self.successors(idx)
            .iter()
            .enumerate()
            .map(move |(i, &v)| (v, weights.map_or(1.0, |w| w[i])))
    }

    /// Sum of outgoing edge weights of a node
    pub fn weighted_degree(&self, idx: usize) -> f64 {
        self.weighted_successors(idx).map(|(_, w)| w).sum()
    }

    /// Total edge weight, counting each undirected edge once
    pub fn total_weight(&self) -> f64 {
        let sum: f64 = (0..self.node_count).map(|i| self.weighted_degree(i)).sum();
        if self.undirected {
            sum / 2.0
        } else {
            sum
        }
    }

    /// Number of edges, counting each undirected edge once
    pub fn edge_count(&self) -> usize {
        if self.undirected {
            self.out_targets.len() / 2
        } else {
            self.out_targets.len()
        }
    }

    /// Build a directed, weighted view from `(source, target, weight)` triples.
    ///
    /// Node indices follow ascending NodeId order. Parallel edges are kept as-is.
    pub fn from_directed_edges(edges: &[(NodeId, NodeId, f64)]) -> Self {
        let (index_to_node, node_to_index) = Self::index_nodes(edges);
        let node_count = index_to_node.len();

        let mut outgoing = vec![Vec::new(); node_count];
        let mut incoming = vec![Vec::new(); node_count];
        let mut weights = vec![Vec::new(); node_count];

        for &(source, target, weight) in edges {
            let u = node_to_index[&source];
            let v = node_to_index[&target];
            outgoing[u].push(v);
            weights[u].push(weight);
            incoming[v].push(u);
        }

        let mut view = Self::from_adjacency_list(
            node_count,
            index_to_node,
            node_to_index,
            outgoing,
            incoming,
            Some(weights),
        );
        view.undirected = false;
        view
    }

    /// Build an undirected, weighted view from `(source, target, weight)` triples.
    ///
    /// Reciprocal edges (A,B) and (B,A) are summed into one undirected edge.
    /// Self-loops are dropped.
    pub fn from_undirected_edges(edges: &[(NodeId, NodeId, f64)]) -> Self {
        let (index_to_node, node_to_index) = Self::index_nodes(edges);
        let node_count = index_to_node.len();

        let mut merged: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for &(source, target, weight) in edges {
            if source == target {
                continue;
            }
            let u = node_to_index[&source];
            let v = node_to_index[&target];
            let key = if u < v { (u, v) } else { (v, u) };
            *merged.entry(key).or_insert(0.0) += weight;
        }

        let mut adjacency = vec![Vec::new(); node_count];
        let mut weights = vec![Vec::new(); node_count];
        for (&(u, v), &w) in &merged {
            adjacency[u].push(v);
            weights[u].push(w);
            adjacency[v].push(u);
            weights[v].push(w);
        }

        let mut view = Self::from_adjacency_list(
            node_count,
            index_to_node,
            node_to_index,
            adjacency.clone(),
            adjacency,
            Some(weights),
        );
        view.undirected = true;
        view
    }

    fn index_nodes(edges: &[(NodeId, NodeId, f64)]) -> (Vec<NodeId>, HashMap<NodeId, usize>) {
        let nodes: BTreeSet<NodeId> = edges
            .iter()
            .flat_map(|&(source, target, _)| [source, target])
            .collect();

        let index_to_node: Vec<NodeId> = nodes.into_iter().collect();
        let node_to_index = index_to_node
            .iter()
            .enumerate()
            .map(|(idx, &node)| (node, idx))
            .collect();
        (index_to_node, node_to_index)
    }

    /// Helper to create GraphView from adjacency lists
    pub fn from_adjacency_list(
        node_count: usize,
        index_to_node: Vec<NodeId>,
        node_to_index: HashMap<NodeId, usize>,
        outgoing: Vec<Vec<usize>>,
        incoming: Vec<Vec<usize>>,
        weights: Option<Vec<Vec<f64>>>,
    ) -> Self {
        let mut out_offsets = Vec::with_capacity(node_count + 1);
        let mut out_targets = Vec::new();
        let mut in_offsets = Vec::with_capacity(node_count + 1);
        let mut in_sources = Vec::new();
        let mut flat_weights = if weights.is_some() { Some(Vec::new()) } else { None };

        out_offsets.push(0);
        for (i, neighbors) in outgoing.into_iter().enumerate() {
            out_targets.extend(neighbors);
            out_offsets.push(out_targets.len());

            if let Some(ref mut w_flat) = flat_weights {
                if let Some(w_row) = weights.as_ref().map(|w| &w[i]) {
                    w_flat.extend(w_row.iter());
                }
            }
        }

        in_offsets.push(0);
        for sources in incoming {
            in_sources.extend(sources);
            in_offsets.push(in_sources.len());
        }

        GraphView {
            node_count,
            index_to_node,
            node_to_index,
            out_offsets,
            out_targets,
            in_offsets,
            in_sources,
            weights: flat_weights,
            undirected: false,
        }
    }
}
