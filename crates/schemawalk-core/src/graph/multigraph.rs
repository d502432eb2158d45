//! Labelled directed multigraph.
//!
//! # Overview
//!
//! [`LabelledMultigraph`] stores a set of vertices and, for every ordered
//! vertex pair, a bag of edge labels. Two foreign keys from `orders` to
//! `customers` become one vertex pair carrying two labels. It holds no
//! ordering or cycle logic; see [`crate::graph::topo`] and
//! [`crate::graph::cycles`] for that.
//!
//! # Registration
//!
//! Edges may only connect vertices that were added first. Adding an edge
//! with an unknown endpoint fails with [`GraphError::UnknownVertex`] and
//! leaves the graph untouched, so a typo in a table name never silently
//! grows the graph.
//!
//! # Ordering
//!
//! Vertices keep their registration order. Neighbour lists follow edge
//! insertion order. Both orders are observable through the sorts, so they
//! are part of the contract.
//!
//! # Storage
//!
//! Backed by a petgraph [`DiGraph`] with one petgraph edge per vertex pair
//! whose weight is the label bag, plus a value → [`NodeIndex`] map.

#![allow(clippy::module_name_repetitions)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::error::ErrorCode;

// ---------------------------------------------------------------------------
// GraphError
// ---------------------------------------------------------------------------

/// Which end of an edge failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    From,
    To,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::From => write!(f, "source"),
            Self::To => write!(f, "target"),
        }
    }
}

/// Invalid graph construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// An edge endpoint was never added as a vertex.
    #[error("edge {endpoint} vertex {vertex} has not been added to the graph")]
    UnknownVertex {
        /// The offending end of the edge.
        endpoint: Endpoint,
        /// Debug rendering of the vertex value.
        vertex: String,
    },
}

impl GraphError {
    /// Stable error code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownVertex { .. } => ErrorCode::UnknownVertex,
        }
    }
}

// ---------------------------------------------------------------------------
// LabelledMultigraph
// ---------------------------------------------------------------------------

/// A directed graph with a bag of labels on each ordered vertex pair.
///
/// Built once per request, then queried. Queries take `&self` and never
/// mutate, so a finished graph can be shared across threads for reading.
#[derive(Debug, Clone)]
pub struct LabelledMultigraph<V, E> {
    graph: DiGraph<V, Vec<E>>,
    index: HashMap<V, NodeIndex>,
}

impl<V, E> Default for LabelledMultigraph<V, E>
where
    V: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> LabelledMultigraph<V, E>
where
    V: Clone + Eq + Hash,
{
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
        }
    }

    /// Create an empty graph with room for `vertices` vertices.
    #[must_use]
    pub fn with_capacity(vertices: usize) -> Self {
        Self {
            graph: DiGraph::with_capacity(vertices, vertices),
            index: HashMap::with_capacity(vertices),
        }
    }

    /// Add a vertex. Returns `false` if an equal vertex was already present.
    pub fn add_vertex(&mut self, vertex: V) -> bool {
        if self.index.contains_key(&vertex) {
            return false;
        }
        let idx = self.graph.add_node(vertex.clone());
        self.index.insert(vertex, idx);
        true
    }

    /// Add every vertex from `vertices`, skipping ones already present.
    pub fn add_vertices(&mut self, vertices: impl IntoIterator<Item = V>) {
        for vertex in vertices {
            self.add_vertex(vertex);
        }
    }

    /// Return `true` if an equal vertex has been added.
    #[must_use]
    pub fn contains_vertex(&self, vertex: &V) -> bool {
        self.index.contains_key(vertex)
    }

    /// Append `label` to the bag on `from → to`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownVertex`] if either endpoint has not been
    /// added. The graph is unchanged in that case.
    pub fn add_edge(&mut self, from: V, to: V, label: E) -> Result<(), GraphError>
    where
        V: fmt::Debug,
    {
        let Some(&from_idx) = self.index.get(&from) else {
            return Err(GraphError::UnknownVertex {
                endpoint: Endpoint::From,
                vertex: format!("{from:?}"),
            });
        };
        let Some(&to_idx) = self.index.get(&to) else {
            return Err(GraphError::UnknownVertex {
                endpoint: Endpoint::To,
                vertex: format!("{to:?}"),
            });
        };

        if let Some(edge) = self.graph.find_edge(from_idx, to_idx) {
            self.graph[edge].push(label);
        } else {
            self.graph.add_edge(from_idx, to_idx, vec![label]);
        }
        Ok(())
    }

    /// Add every `(from, to, label)` triple, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first [`GraphError`] encountered; triples before it stay
    /// applied.
    pub fn add_edges(&mut self, edges: impl IntoIterator<Item = (V, V, E)>) -> Result<(), GraphError>
    where
        V: fmt::Debug,
    {
        for (from, to, label) in edges {
            self.add_edge(from, to, label)?;
        }
        Ok(())
    }

    /// Distinct targets of edges leaving `vertex`, in edge insertion order.
    ///
    /// Empty if the vertex is unknown or has no outgoing edges.
    #[must_use]
    pub fn outgoing_neighbours(&self, vertex: &V) -> Vec<&V> {
        self.index.get(vertex).map_or_else(Vec::new, |&idx| {
            self.neighbour_indices(idx.index(), Direction::Outgoing)
                .into_iter()
                .map(|n| self.vertex_at(n))
                .collect()
        })
    }

    /// Distinct sources of edges entering `vertex`, in edge insertion order.
    #[must_use]
    pub fn incoming_neighbours(&self, vertex: &V) -> Vec<&V> {
        self.index.get(vertex).map_or_else(Vec::new, |&idx| {
            self.neighbour_indices(idx.index(), Direction::Incoming)
                .into_iter()
                .map(|n| self.vertex_at(n))
                .collect()
        })
    }

    /// All labels on `from → to`, in insertion order. Empty if none.
    #[must_use]
    pub fn edges(&self, from: &V, to: &V) -> &[E] {
        match (self.index.get(from), self.index.get(to)) {
            (Some(&f), Some(&t)) => self.labels_between(f.index(), t.index()),
            _ => &[],
        }
    }

    /// Vertices not reachable from any of `roots` by following edges.
    ///
    /// Unknown roots are ignored. Returned in registration order.
    #[must_use]
    pub fn unreachable_vertices<'a>(&self, roots: impl IntoIterator<Item = &'a V>) -> Vec<&V>
    where
        V: 'a,
    {
        let mut visited: HashSet<usize> = HashSet::new();
        let mut queue: VecDeque<usize> = VecDeque::new();

        for root in roots {
            if let Some(&idx) = self.index.get(root) {
                if visited.insert(idx.index()) {
                    queue.push_back(idx.index());
                }
            }
        }

        while let Some(current) = queue.pop_front() {
            for next in self.neighbour_indices(current, Direction::Outgoing) {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        (0..self.vertex_count())
            .filter(|ix| !visited.contains(ix))
            .map(|ix| self.vertex_at(ix))
            .collect()
    }

    /// Iterate vertices in registration order.
    pub fn vertices(&self) -> impl Iterator<Item = &V> {
        self.graph.node_weights()
    }

    /// Number of vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of distinct ordered vertex pairs carrying at least one label.
    #[must_use]
    pub fn edge_pair_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Total number of labels across all vertex pairs.
    #[must_use]
    pub fn label_count(&self) -> usize {
        self.graph.edge_weights().map(Vec::len).sum()
    }

    /// Return `true` if the graph has no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Underlying petgraph graph, for algorithms petgraph already provides.
    #[must_use]
    pub fn as_petgraph(&self) -> &DiGraph<V, Vec<E>> {
        &self.graph
    }

    // -----------------------------------------------------------------------
    // Index-level access for the algorithms in this module tree
    // -----------------------------------------------------------------------

    pub(crate) fn vertex_at(&self, ix: usize) -> &V {
        &self.graph[NodeIndex::new(ix)]
    }

    pub(crate) fn neighbour_indices(&self, ix: usize, direction: Direction) -> Vec<usize> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(NodeIndex::new(ix), direction)
            .collect();
        // petgraph yields edges newest-first; edge ids grow with insertion.
        edges.sort_unstable_by_key(|edge| edge.id());
        edges
            .into_iter()
            .map(|edge| match direction {
                Direction::Outgoing => edge.target().index(),
                Direction::Incoming => edge.source().index(),
            })
            .collect()
    }

    pub(crate) fn labels_between(&self, from: usize, to: usize) -> &[E] {
        self.graph
            .find_edge(NodeIndex::new(from), NodeIndex::new(to))
            .map_or(&[], |edge| self.graph[edge].as_slice())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> LabelledMultigraph<&'static str, &'static str> {
        let mut g = LabelledMultigraph::new();
        g.add_vertices(["a", "b", "c"]);
        g
    }

    #[test]
    fn add_vertex_is_idempotent() {
        let mut g: LabelledMultigraph<&str, ()> = LabelledMultigraph::new();
        assert!(g.add_vertex("a"));
        assert!(!g.add_vertex("a"));
        g.add_vertices(["a", "b", "a"]);
        assert_eq!(g.vertex_count(), 2);
        assert_eq!(g.vertices().copied().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn edge_between_unregistered_vertices_is_rejected() {
        let mut g: LabelledMultigraph<&str, &str> = LabelledMultigraph::new();
        let err = g.add_edge("a", "b", "fk").unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownVertex {
                endpoint: Endpoint::From,
                vertex: "\"a\"".to_string(),
            }
        );
        assert!(g.is_empty());

        g.add_vertices(["a", "b"]);
        g.add_edge("a", "b", "fk").unwrap();
        assert_eq!(g.edges(&"a", &"b"), &["fk"]);
    }

    #[test]
    fn unknown_target_reports_target_endpoint() {
        let mut g: LabelledMultigraph<&str, &str> = LabelledMultigraph::new();
        g.add_vertex("a");
        let err = g.add_edge("a", "zz", "fk").unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnknownVertex {
                endpoint: Endpoint::To,
                ..
            }
        ));
        assert_eq!(err.code(), ErrorCode::UnknownVertex);
        assert_eq!(g.edge_pair_count(), 0);
    }

    #[test]
    fn multi_edges_accumulate_on_one_pair() {
        let mut g = abc();
        g.add_edge("a", "b", "e1").unwrap();
        g.add_edge("a", "b", "e2").unwrap();

        assert_eq!(g.edges(&"a", &"b"), &["e1", "e2"]);
        assert_eq!(g.outgoing_neighbours(&"a"), vec![&"b"]);
        assert_eq!(g.edge_pair_count(), 1);
        assert_eq!(g.label_count(), 2);
    }

    #[test]
    fn edges_for_missing_pair_are_empty() {
        let g = abc();
        assert!(g.edges(&"a", &"c").is_empty());
        assert!(g.edges(&"x", &"y").is_empty());
    }

    #[test]
    fn neighbours_follow_insertion_order() {
        let mut g = abc();
        g.add_vertex("d");
        g.add_edges([("a", "c", "1"), ("a", "b", "2"), ("a", "d", "3"), ("b", "d", "4")])
            .unwrap();

        assert_eq!(g.outgoing_neighbours(&"a"), vec![&"c", &"b", &"d"]);
        assert_eq!(g.incoming_neighbours(&"d"), vec![&"a", &"b"]);
        assert!(g.incoming_neighbours(&"a").is_empty());
        assert!(g.outgoing_neighbours(&"missing").is_empty());
    }

    #[test]
    fn add_edges_stops_at_first_failure() {
        let mut g = abc();
        let result = g.add_edges([("a", "b", "ok"), ("a", "nope", "bad"), ("b", "c", "skipped")]);
        assert!(result.is_err());
        assert_eq!(g.edges(&"a", &"b"), &["ok"]);
        assert!(g.edges(&"b", &"c").is_empty());
    }

    #[test]
    fn unreachable_vertices_sweeps_from_roots() {
        let mut g = abc();
        g.add_vertices(["d", "e"]);
        g.add_edges([("a", "b", ""), ("b", "c", ""), ("d", "e", "")])
            .unwrap();

        assert_eq!(g.unreachable_vertices([&"a"]), vec![&"d", &"e"]);
        assert_eq!(g.unreachable_vertices([&"a", &"d"]), Vec::<&&str>::new());
        assert_eq!(g.unreachable_vertices([&"c"]).len(), 4);
        assert_eq!(g.unreachable_vertices(std::iter::empty()).len(), 5);
    }

    #[test]
    fn self_edge_is_allowed_in_the_container() {
        let mut g = abc();
        g.add_edge("a", "a", "self").unwrap();
        assert_eq!(g.outgoing_neighbours(&"a"), vec![&"a"]);
        assert_eq!(g.incoming_neighbours(&"a"), vec![&"a"]);
    }
}
