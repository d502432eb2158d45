//! Generic graph utilities for dependency ordering.
//!
//! Nothing in this module knows about tables or keys. Vertices are any
//! `Clone + Eq + Hash` value and edge labels are opaque, so the same
//! machinery orders tables, loaders, or anything else with dependencies.
//!
//! ## Submodules
//!
//! - [`multigraph`]: [`LabelledMultigraph`], a vertex set plus a bag of
//!   labels per ordered vertex pair.
//! - [`topo`]: Kahn-style topological sorts: strict (optionally breaking
//!   edges on a caller's say-so), batched, and the cycle-tolerant variant
//!   used by relationship ordering.
//! - [`cycles`]: DFS back-edge cycle enumeration for diagnostics.
//!
//! ## Typical Usage
//!
//! ```rust
//! use schemawalk_core::graph::{LabelledMultigraph, topological_sort};
//!
//! let mut g: LabelledMultigraph<u32, &str> = LabelledMultigraph::new();
//! g.add_vertices([1, 2, 3]);
//! g.add_edge(2, 1, "fk_a")?;
//! g.add_edge(1, 3, "fk_b")?;
//!
//! let order = topological_sort(&g).expect("acyclic");
//! assert_eq!(order, vec![2, 1, 3]);
//! # Ok::<(), schemawalk_core::graph::GraphError>(())
//! ```

pub mod cycles;
pub mod multigraph;
pub mod topo;

pub use cycles::find_cycles;
pub use multigraph::{Endpoint, GraphError, LabelledMultigraph};
pub use topo::{
    CycleEdge, CycleError, CycleFormatter, EdgeBreaker, ResidualPolicy, SortOptions,
    topological_batches, topological_sort, topological_sort_tolerant, topological_sort_with,
};
