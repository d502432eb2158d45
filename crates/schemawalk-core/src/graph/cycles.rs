//! Cycle enumeration for diagnostics.
//!
//! # Overview
//!
//! [`find_cycles`] reports the cycles a depth-first search closes, one per
//! distinct back-edge, each as the set of vertices it touches. Two cycles
//! over the same vertices are reported once, whatever their rotation.
//!
//! # Design
//!
//! - **One DFS**: roots are taken in registration order, neighbours in edge
//!   insertion order. Vertices are White (unvisited), Gray (on the active
//!   path) or Black (done).
//! - **Path trace**: the edges of the active path are kept as a stack. A
//!   back-edge `u → w` to a Gray `w` closes the cycle formed by the trace
//!   suffix starting at `w`'s outgoing edge, plus the back-edge.
//! - **Not a cycle basis**: a vertex set already reported is skipped, and
//!   cycles that only share a back-edge with a reported one are not found.
//!
//! Callers that want whole strongly connected components instead should use
//! `petgraph::algo::tarjan_scc` on [`LabelledMultigraph::as_petgraph`].

#![allow(clippy::module_name_repetitions)]

use std::collections::HashSet;
use std::hash::Hash;

use petgraph::Direction;
use tracing::{debug, instrument};

use super::multigraph::LabelledMultigraph;

/// DFS colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Enumerate cycles, one vertex set per distinct cycle.
///
/// Returns an empty list for an empty or acyclic graph. Order follows the
/// DFS: cycles closed earlier come first.
#[must_use]
#[instrument(skip_all, fields(vertices = graph.vertex_count()))]
pub fn find_cycles<V, E>(graph: &LabelledMultigraph<V, E>) -> Vec<HashSet<V>>
where
    V: Clone + Eq + Hash,
{
    let n = graph.vertex_count();
    let mut walk = CycleWalk {
        graph,
        color: vec![Color::White; n],
        trace: Vec::new(),
        found: Vec::new(),
    };

    for root in 0..n {
        if walk.color[root] == Color::White {
            walk.visit(root);
        }
    }

    debug!(cycles = walk.found.len(), "cycle enumeration complete");
    walk.found
        .into_iter()
        .map(|members| members.into_iter().map(|ix| graph.vertex_at(ix).clone()).collect())
        .collect()
}

struct CycleWalk<'g, V, E> {
    graph: &'g LabelledMultigraph<V, E>,
    color: Vec<Color>,
    /// Edges of the active DFS path, root first.
    trace: Vec<(usize, usize)>,
    found: Vec<HashSet<usize>>,
}

impl<V, E> CycleWalk<'_, V, E>
where
    V: Clone + Eq + Hash,
{
    fn visit(&mut self, node: usize) {
        self.color[node] = Color::Gray;

        for next in self.graph.neighbour_indices(node, Direction::Outgoing) {
            match self.color[next] {
                Color::White => {
                    self.trace.push((node, next));
                    self.visit(next);
                    self.trace.pop();
                }
                Color::Gray => self.record(node, next),
                Color::Black => {}
            }
        }

        self.color[node] = Color::Black;
    }

    fn record(&mut self, from: usize, to: usize) {
        let start = self
            .trace
            .iter()
            .position(|&(source, _)| source == to)
            .unwrap_or(self.trace.len());

        let mut members: HashSet<usize> = HashSet::from([from, to]);
        for &(source, target) in &self.trace[start..] {
            members.insert(source);
            members.insert(target);
        }

        if !self.found.contains(&members) {
            self.found.push(members);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
