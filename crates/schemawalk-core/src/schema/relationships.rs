//! Foreign-key graph and table ordering.
//!
//! # Edge Direction
//!
//! Every foreign key contributes an edge `child → parent`, labelled with the
//! key name. A topological order of that graph lists children before their
//! parents, which is a safe order for deleting rows or dropping tables.
//! Reversed, it is a safe order for inserting rows or creating tables.
//!
//! # Cycles
//!
//! Deletion and insertion order never fail: tables caught in a referential
//! cycle are appended after everything that could be ordered. Members of one
//! cycle keep the order they were first seen in, and a table stuck behind a
//! cycle still comes before its own parents. Use [`RelationshipOrderer::strict_order`] to get a
//! [`RelationshipCycle`] instead, or [`RelationshipOrderer::find_cycles`] to
//! report them.
//!
//! Self-references (`employees.manager_id → employees.id`) do not constrain
//! ordering and are left out of the graph. Foreign keys pointing at tables
//! outside the given set are left out too.

#![allow(clippy::module_name_repetitions)]

use std::collections::BTreeSet;

use petgraph::algo::tarjan_scc;
use tracing::{debug, instrument};

use super::{Identifier, Table};
use crate::graph::{
    CycleEdge, CycleError, CycleFormatter, Endpoint, GraphError, LabelledMultigraph, SortOptions, find_cycles,
    topological_batches, topological_sort_tolerant, topological_sort_with,
};

/// A referential cycle; hop labels are foreign key names.
pub type RelationshipCycle = CycleError<Identifier, String>;

/// Deletion order for `tables`: children before parents.
#[must_use]
pub fn deletion_order<'a>(tables: impl IntoIterator<Item = &'a Table>) -> Vec<Identifier> {
    RelationshipOrderer::new(tables).deletion_order()
}

/// Insertion order for `tables`: parents before children.
#[must_use]
pub fn insertion_order<'a>(tables: impl IntoIterator<Item = &'a Table>) -> Vec<Identifier> {
    RelationshipOrderer::new(tables).insertion_order()
}

/// Render a cycle as `a -[fk]-> b -[fk]-> a`.
#[must_use]
pub fn render_cycle(cycle: &[CycleEdge<Identifier, String>]) -> String {
    let Some(first) = cycle.first() else {
        return String::new();
    };
    let mut out = first.from.to_string();
    for hop in cycle {
        out.push_str(&format!(" -[{}]-> {}", hop.labels.join(","), hop.to));
    }
    out
}

// ---------------------------------------------------------------------------
// RelationshipOrderer
// ---------------------------------------------------------------------------

/// The foreign-key graph of a set of tables.
#[derive(Debug, Clone)]
pub struct RelationshipOrderer {
    graph: LabelledMultigraph<Identifier, String>,
}

impl RelationshipOrderer {
    /// Build the graph. Tables are vertices in the order given; a table
    /// repeated under identifier equality is registered once.
    ///
    /// # Panics
    ///
    /// Never in practice: every child table is registered before its keys
    /// are added, so only the parent end of an edge can be unknown.
    #[instrument(skip_all)]
    pub fn new<'a>(tables: impl IntoIterator<Item = &'a Table>) -> Self {
        let tables: Vec<&Table> = tables.into_iter().collect();
        let mut graph = LabelledMultigraph::with_capacity(tables.len());

        for table in &tables {
            if !graph.add_vertex(table.id.clone()) {
                debug!(table = %table.id, "duplicate table identifier; keys merged");
            }
        }

        for table in &tables {
            for (key, parent) in table.parent_keys() {
                if *parent == table.id {
                    continue;
                }
                match graph.add_edge(table.id.clone(), parent.clone(), key.name.clone()) {
                    Ok(()) => {}
                    Err(GraphError::UnknownVertex { endpoint: Endpoint::To, .. }) => {
                        debug!(
                            table = %table.id,
                            key = %key.name,
                            parent = %parent,
                            "foreign key references a table outside the set; skipped"
                        );
                    }
                    Err(err) => unreachable!("child table {} was registered above: {err}", table.id),
                }
            }
        }

        debug!(
            tables = graph.vertex_count(),
            relationships = graph.label_count(),
            "relationship graph built"
        );
        Self { graph }
    }

    /// The underlying `child → parent` graph.
    #[must_use]
    pub fn graph(&self) -> &LabelledMultigraph<Identifier, String> {
        &self.graph
    }

    /// Children before parents. Never fails; cyclic tables go last.
    #[must_use]
    pub fn deletion_order(&self) -> Vec<Identifier> {
        topological_sort_tolerant(&self.graph)
    }

    /// Parents before children: the reverse of [`Self::deletion_order`].
    #[must_use]
    pub fn insertion_order(&self) -> Vec<Identifier> {
        let mut order = self.deletion_order();
        order.reverse();
        order
    }

    /// Deletion order, failing on the first referential cycle.
    ///
    /// # Errors
    ///
    /// Returns [`RelationshipCycle`] with a message rendered by
    /// [`render_cycle`].
    pub fn strict_order(&self) -> Result<Vec<Identifier>, RelationshipCycle> {
        let options = SortOptions::new().with_formatter(render_cycle);
        topological_sort_with(&self.graph, &options)
    }

    /// Levels of tables that can be created together, parents first.
    ///
    /// # Errors
    ///
    /// Returns [`RelationshipCycle`] if the tables contain a cycle.
    pub fn creation_batches(&self) -> Result<Vec<Vec<Identifier>>, RelationshipCycle> {
        let render: &CycleFormatter<'_, Identifier, String> = &render_cycle;
        let mut batches = topological_batches(&self.graph, Some(render))?;
        batches.reverse();
        Ok(batches)
    }

    /// Referential cycles, one vertex set per distinct cycle.
    #[must_use]
    pub fn find_cycles(&self) -> Vec<BTreeSet<Identifier>> {
        find_cycles(&self.graph)
            .into_iter()
            .map(|cycle| cycle.into_iter().collect())
            .collect()
    }

    /// Strongly connected components with more than one table, sorted.
    #[must_use]
    pub fn cycle_components(&self) -> Vec<BTreeSet<Identifier>> {
        let graph = self.graph.as_petgraph();
        let mut components: Vec<BTreeSet<Identifier>> = tarjan_scc(graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| component.into_iter().map(|ix| graph[ix].clone()).collect())
            .collect();
        components.sort_unstable();
        components
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
