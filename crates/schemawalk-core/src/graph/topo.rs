//! Kahn-style topological ordering over a [`LabelledMultigraph`].
//!
//! # Overview
//!
//! An edge `a → b` means `a` must come before `b`. Three entry points share
//! one sort core:
//!
//! - [`topological_sort`]: strict linear order, fails on any cycle.
//! - [`topological_sort_with`]: linear order with [`SortOptions`]. A caller
//!   breaker may accept individual edges as "ignore this one" when the sort
//!   stalls, a formatter renders the failure message, and a
//!   [`ResidualPolicy`] chooses between failing and appending whatever the
//!   cycle left behind.
//! - [`topological_batches`]: independence levels. Every vertex's
//!   predecessors lie in a strictly earlier batch. No breaker.
//!
//! # Accounting
//!
//! Predecessor counts are kept per distinct vertex pair, not per label: two
//! foreign keys between the same tables are one dependency. The count map
//! lives for one call only.
//!
//! # Failure
//!
//! When vertices remain blocked, one concrete cycle is reconstructed by
//! walking unresolved predecessor links backwards until a vertex repeats,
//! then reversing. The result is a [`CycleError`] carrying the cycle as
//! ordered `(from, to, labels)` triples.
//!
//! # Residual Order
//!
//! When blocked vertices are kept instead, they are grouped by strongly
//! connected component and the components are sorted again. Only edges
//! inside one component are dropped, so a vertex that is merely stuck
//! behind a cycle still comes after everything that points at it.

#![allow(clippy::module_name_repetitions, clippy::missing_const_for_fn)]

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::NodeIndex;
use tracing::{debug, instrument, warn};

use super::multigraph::LabelledMultigraph;
use crate::error::ErrorCode;

/// Caller verdict on whether a stalled sort may ignore `from → to`.
pub type EdgeBreaker<'a, V, E> = dyn Fn(&V, &V, &[E]) -> bool + 'a;

/// Renders a reconstructed cycle into an error message.
pub type CycleFormatter<'a, V, E> = dyn Fn(&[CycleEdge<V, E>]) -> String + 'a;

// ---------------------------------------------------------------------------
// CycleEdge / CycleError
// ---------------------------------------------------------------------------

/// One hop of a reconstructed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleEdge<V, E> {
    pub from: V,
    pub to: V,
    /// Every label on the `from → to` pair, in insertion order.
    pub labels: Vec<E>,
}

/// A sort could not place every vertex.
///
/// `cycle` lists the hops in forward order; the last hop's `to` is the
/// first hop's `from`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError<V, E> {
    cycle: Vec<CycleEdge<V, E>>,
    message: String,
}

impl<V, E> CycleError<V, E> {
    /// The reconstructed cycle.
    #[must_use]
    pub fn cycle(&self) -> &[CycleEdge<V, E>] {
        &self.cycle
    }

    /// Vertices on the cycle, each once, in cycle order.
    pub fn vertices(&self) -> impl Iterator<Item = &V> {
        self.cycle.iter().map(|hop| &hop.from)
    }

    /// Rendered message (from the caller's formatter when one was given).
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Stable error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::CycleDetected
    }

    /// Consume the error, keeping only the cycle.
    #[must_use]
    pub fn into_cycle(self) -> Vec<CycleEdge<V, E>> {
        self.cycle
    }
}

impl<V, E> fmt::Display for CycleError<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl<V: fmt::Debug, E: fmt::Debug> std::error::Error for CycleError<V, E> {}

fn default_cycle_message<V: fmt::Debug, E>(cycle: &[CycleEdge<V, E>]) -> String {
    let mut path: Vec<String> = cycle.iter().map(|hop| format!("{:?}", hop.from)).collect();
    if let Some(first) = cycle.first() {
        path.push(format!("{:?}", first.from));
    }
    format!("cycle detected: {}", path.join(" -> "))
}

// ---------------------------------------------------------------------------
// SortOptions
// ---------------------------------------------------------------------------

/// What a linear sort does with vertices a cycle leaves blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResidualPolicy {
    /// Return a [`CycleError`].
    #[default]
    Fail,
    /// Append the blocked vertices and succeed. Edges between different
    /// cycles, or from a cycle to a vertex it blocks, are still honoured.
    AppendRemaining,
}

/// Knobs for [`topological_sort_with`].
pub struct SortOptions<'a, V, E> {
    breaker: Option<Box<EdgeBreaker<'a, V, E>>>,
    formatter: Option<Box<CycleFormatter<'a, V, E>>>,
    residual: ResidualPolicy,
}

impl<V, E> Default for SortOptions<'_, V, E> {
    fn default() -> Self {
        Self {
            breaker: None,
            formatter: None,
            residual: ResidualPolicy::Fail,
        }
    }
}

impl<V, E> fmt::Debug for SortOptions<'_, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortOptions")
            .field("breaker", &self.breaker.is_some())
            .field("formatter", &self.formatter.is_some())
            .field("residual", &self.residual)
            .finish()
    }
}

impl<'a, V, E> SortOptions<'a, V, E> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consult `breaker` for candidate edges whenever the sort stalls.
    #[must_use]
    pub fn with_breaker(mut self, breaker: impl Fn(&V, &V, &[E]) -> bool + 'a) -> Self {
        self.breaker = Some(Box::new(breaker));
        self
    }

    /// Render failures with `formatter` instead of the default message.
    #[must_use]
    pub fn with_formatter(mut self, formatter: impl Fn(&[CycleEdge<V, E>]) -> String + 'a) -> Self {
        self.formatter = Some(Box::new(formatter));
        self
    }

    #[must_use]
    pub fn with_residual_policy(mut self, residual: ResidualPolicy) -> Self {
        self.residual = residual;
        self
    }
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Strict linear topological order.
///
/// Ties are broken by registration order.
///
/// # Errors
///
/// Returns [`CycleError`] if the graph contains a cycle.
pub fn topological_sort<V, E>(graph: &LabelledMultigraph<V, E>) -> Result<Vec<V>, CycleError<V, E>>
where
    V: Clone + Eq + Hash + fmt::Debug,
    E: Clone,
{
    topological_sort_with(graph, &SortOptions::default())
}

/// Linear topological order with a breaker, formatter and residual policy.
///
/// # Errors
///
/// Returns [`CycleError`] when vertices stay blocked after the breaker has
/// declined every candidate edge and the policy is [`ResidualPolicy::Fail`].
#[instrument(skip_all, fields(vertices = graph.vertex_count(), pairs = graph.edge_pair_count()))]
pub fn topological_sort_with<V, E>(
    graph: &LabelledMultigraph<V, E>,
    options: &SortOptions<'_, V, E>,
) -> Result<Vec<V>, CycleError<V, E>>
where
    V: Clone + Eq + Hash + fmt::Debug,
    E: Clone,
{
    let outcome = sort_linear(graph, options.breaker.as_deref());

    if outcome.residual.is_empty() {
        return Ok(outcome.into_vertices(graph));
    }

    match options.residual {
        ResidualPolicy::Fail => Err(build_cycle_error(
            graph,
            &outcome.residual,
            &outcome.broken,
            options.formatter.as_deref(),
        )),
        ResidualPolicy::AppendRemaining => {
            warn!(
                residual = outcome.residual.len(),
                "cycle left vertices blocked; appending them around the cycle"
            );
            Ok(outcome.into_vertices(graph))
        }
    }
}

/// Linear order that never fails: blocked vertices go last.
///
/// Members of one cycle keep registration order among themselves; every
/// other edge still holds.
#[must_use]
pub fn topological_sort_tolerant<V, E>(graph: &LabelledMultigraph<V, E>) -> Vec<V>
where
    V: Clone + Eq + Hash,
{
    let outcome = sort_linear(graph, None);
    if !outcome.residual.is_empty() {
        warn!(
            residual = outcome.residual.len(),
            "cycle left vertices blocked; appending them around the cycle"
        );
    }
    outcome.into_vertices(graph)
}

/// Group vertices into independence levels.
///
/// Batch `k` holds every vertex whose predecessors were all emitted in
/// batches `0..k`. Within a batch, vertices keep registration order for the
/// first batch and readiness order after that.
///
/// # Errors
///
/// Returns [`CycleError`] if the graph contains a cycle. There is no breaker
/// for batches.
#[instrument(skip_all, fields(vertices = graph.vertex_count(), pairs = graph.edge_pair_count()))]
pub fn topological_batches<V, E>(
    graph: &LabelledMultigraph<V, E>,
    formatter: Option<&CycleFormatter<'_, V, E>>,
) -> Result<Vec<Vec<V>>, CycleError<V, E>>
where
    V: Clone + Eq + Hash + fmt::Debug,
    E: Clone,
{
    let n = graph.vertex_count();
    let mut counts = predecessor_counts(graph);
    let mut emitted = vec![false; n];
    let mut emitted_count = 0usize;
    let mut batches: Vec<Vec<usize>> = Vec::new();

    let mut current: Vec<usize> = (0..n).filter(|ix| !counts.contains_key(ix)).collect();

    while !current.is_empty() {
        let mut next = Vec::new();
        for &ix in &current {
            emitted[ix] = true;
            emitted_count += 1;
            for succ in graph.neighbour_indices(ix, Direction::Outgoing) {
                if release(&mut counts, succ) {
                    next.push(succ);
                }
            }
        }
        batches.push(std::mem::replace(&mut current, next));
    }

    if emitted_count < n {
        let residual: Vec<usize> = (0..n).filter(|&ix| !emitted[ix]).collect();
        return Err(build_cycle_error(graph, &residual, &HashSet::new(), formatter));
    }

    debug!(batches = batches.len(), "batched sort complete");
    Ok(batches
        .into_iter()
        .map(|batch| batch.into_iter().map(|ix| graph.vertex_at(ix).clone()).collect())
        .collect())
}

// ---------------------------------------------------------------------------
// Sort core
// ---------------------------------------------------------------------------

struct LinearOutcome {
    order: Vec<usize>,
    /// Blocked vertices, registration order.
    residual: Vec<usize>,
    /// Pairs the breaker accepted.
    broken: HashSet<(usize, usize)>,
}

impl LinearOutcome {
    fn into_vertices<V: Clone + Eq + Hash, E>(self, graph: &LabelledMultigraph<V, E>) -> Vec<V> {
        let tail = if self.residual.is_empty() {
            Vec::new()
        } else {
            order_residual(graph, &self.residual, &self.broken)
        };
        self.order
            .into_iter()
            .chain(tail)
            .map(|ix| graph.vertex_at(ix).clone())
            .collect()
    }
}

/// Count of distinct predecessor pairs for every vertex that has any.
fn predecessor_counts<V, E>(graph: &LabelledMultigraph<V, E>) -> HashMap<usize, usize>
where
    V: Clone + Eq + Hash,
{
    let mut counts: HashMap<usize, usize> = HashMap::new();
    for ix in 0..graph.vertex_count() {
        for succ in graph.neighbour_indices(ix, Direction::Outgoing) {
            *counts.entry(succ).or_insert(0) += 1;
        }
    }
    counts
}

/// Consume one predecessor pair of `ix`. Returns `true` when it becomes ready.
fn release(counts: &mut HashMap<usize, usize>, ix: usize) -> bool {
    match counts.get_mut(&ix) {
        Some(count) if *count > 1 => {
            *count -= 1;
            false
        }
        Some(_) => {
            counts.remove(&ix);
            true
        }
        None => false,
    }
}

fn sort_linear<V, E>(
    graph: &LabelledMultigraph<V, E>,
    breaker: Option<&EdgeBreaker<'_, V, E>>,
) -> LinearOutcome
where
    V: Clone + Eq + Hash,
{
    let n = graph.vertex_count();
    let mut counts = predecessor_counts(graph);
    let mut emitted = vec![false; n];
    let mut broken: HashSet<(usize, usize)> = HashSet::new();
    let mut order = Vec::with_capacity(n);

    let mut ready: VecDeque<usize> = (0..n).filter(|ix| !counts.contains_key(ix)).collect();

    loop {
        while let Some(ix) = ready.pop_front() {
            emitted[ix] = true;
            order.push(ix);
            for succ in graph.neighbour_indices(ix, Direction::Outgoing) {
                if emitted[succ] || broken.contains(&(ix, succ)) {
                    continue;
                }
                if release(&mut counts, succ) {
                    ready.push_back(succ);
                }
            }
        }

        if order.len() == n {
            break;
        }
        let Some(breaker) = breaker else {
            break;
        };
        let Some((from, to)) = find_breakable(graph, breaker, &emitted, &broken) else {
            break;
        };

        debug!(from, to, "breaker accepted edge");
        broken.insert((from, to));
        if release(&mut counts, to) {
            ready.push_back(to);
        }
    }

    let residual = (0..n).filter(|&ix| !emitted[ix]).collect();
    LinearOutcome {
        order,
        residual,
        broken,
    }
}

/// First unsorted pair, scanning targets in registration order and sources
/// in edge insertion order, that the breaker accepts.
fn find_breakable<V, E>(
    graph: &LabelledMultigraph<V, E>,
    breaker: &EdgeBreaker<'_, V, E>,
    emitted: &[bool],
    broken: &HashSet<(usize, usize)>,
) -> Option<(usize, usize)>
where
    V: Clone + Eq + Hash,
{
    (0..graph.vertex_count())
        .filter(|&to| !emitted[to])
        .flat_map(|to| {
            graph
                .neighbour_indices(to, Direction::Incoming)
                .into_iter()
                .map(move |from| (from, to))
        })
        .filter(|&(from, to)| !emitted[from] && !broken.contains(&(from, to)))
        .find(|&(from, to)| {
            breaker(
                graph.vertex_at(from),
                graph.vertex_at(to),
                graph.labels_between(from, to),
            )
        })
}

/// Sort blocked vertices over their condensation.
///
/// A component becomes ready once every unbroken edge into it from another
/// blocked component has been consumed; ties go to the component whose
/// first member was registered first.
fn order_residual<V, E>(
    graph: &LabelledMultigraph<V, E>,
    residual: &[usize],
    broken: &HashSet<(usize, usize)>,
) -> Vec<usize>
where
    V: Clone + Eq + Hash,
{
    let blocked: HashSet<usize> = residual.iter().copied().collect();
    let mut component_of: HashMap<usize, usize> = HashMap::with_capacity(residual.len());
    let mut members: Vec<Vec<usize>> = Vec::new();
    for scc in tarjan_scc(graph.as_petgraph()) {
        let mut scc: Vec<usize> = scc
            .into_iter()
            .map(NodeIndex::index)
            .filter(|ix| blocked.contains(ix))
            .collect();
        if scc.is_empty() {
            continue;
        }
        scc.sort_unstable();
        for &ix in &scc {
            component_of.insert(ix, members.len());
        }
        members.push(scc);
    }

    let crossing = |from: usize, to: usize| -> Option<usize> {
        if broken.contains(&(from, to)) {
            return None;
        }
        let (Some(&from_c), Some(&to_c)) = (component_of.get(&from), component_of.get(&to)) else {
            return None;
        };
        (from_c != to_c).then_some(to_c)
    };

    let mut counts: HashMap<usize, usize> = HashMap::new();
    for &ix in residual {
        for succ in graph.neighbour_indices(ix, Direction::Outgoing) {
            if let Some(to_c) = crossing(ix, succ) {
                *counts.entry(to_c).or_insert(0) += 1;
            }
        }
    }

    let mut ready: BTreeSet<(usize, usize)> = (0..members.len())
        .filter(|c| !counts.contains_key(c))
        .map(|c| (members[c][0], c))
        .collect();
    let mut order = Vec::with_capacity(residual.len());

    while let Some((_, c)) = ready.pop_first() {
        for &ix in &members[c] {
            order.push(ix);
            for succ in graph.neighbour_indices(ix, Direction::Outgoing) {
                let Some(to_c) = crossing(ix, succ) else {
                    continue;
                };
                if release(&mut counts, to_c) {
                    ready.insert((members[to_c][0], to_c));
                }
            }
        }
    }
    order
}

// ---------------------------------------------------------------------------
// Cycle reconstruction
// ---------------------------------------------------------------------------

fn build_cycle_error<V, E>(
    graph: &LabelledMultigraph<V, E>,
    residual: &[usize],
    broken: &HashSet<(usize, usize)>,
    formatter: Option<&CycleFormatter<'_, V, E>>,
) -> CycleError<V, E>
where
    V: Clone + Eq + Hash + fmt::Debug,
    E: Clone,
{
    let members = trace_cycle(graph, residual, broken);
    let len = members.len();
    let cycle: Vec<CycleEdge<V, E>> = members
        .iter()
        .enumerate()
        .map(|(i, &from)| {
            let to = members[(i + 1) % len];
            CycleEdge {
                from: graph.vertex_at(from).clone(),
                to: graph.vertex_at(to).clone(),
                labels: graph.labels_between(from, to).to_vec(),
            }
        })
        .collect();

    let message = formatter.map_or_else(|| default_cycle_message(&cycle), |render| render(&cycle));
    debug!(len, "reconstructed cycle");
    CycleError { cycle, message }
}

/// Walk unbroken predecessor links among unresolved vertices until one
/// repeats, then return the loop in forward order.
///
/// Every unresolved vertex still has an unbroken unresolved predecessor, so
/// the walk always closes.
fn trace_cycle<V, E>(
    graph: &LabelledMultigraph<V, E>,
    residual: &[usize],
    broken: &HashSet<(usize, usize)>,
) -> Vec<usize>
where
    V: Clone + Eq + Hash,
{
    let unresolved: HashSet<usize> = residual.iter().copied().collect();
    let Some(&start) = residual.first() else {
        return Vec::new();
    };

    let mut walk = vec![start];
    let mut position: HashMap<usize, usize> = HashMap::from([(start, 0)]);
    let mut current = start;

    loop {
        let Some(pred) = graph
            .neighbour_indices(current, Direction::Incoming)
            .into_iter()
            .find(|p| unresolved.contains(p) && !broken.contains(&(*p, current)))
        else {
            // Unreachable while counts are consistent; report what was walked.
            break;
        };
        if let Some(&at) = position.get(&pred) {
            walk.drain(..at);
            break;
        }
        position.insert(pred, walk.len());
        walk.push(pred);
        current = pred;
    }

    walk.reverse();
    walk
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
