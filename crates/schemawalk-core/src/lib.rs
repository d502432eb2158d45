#![forbid(unsafe_code)]
//! schemawalk-core library.
//!
//! Reconstructs the foreign-key graph of a relational schema and answers
//! ordering questions about it: which order tables can be deleted or
//! created in, which tables can be created in parallel, and which tables
//! form referential cycles. Table metadata is fetched through a
//! single-flight cache so concurrent lookups of the same table share one
//! load.
//!
//! # Conventions
//!
//! - **Errors**: Typed errors via `thiserror` in [`error`]; `anyhow::Result`
//!   for loading and configuration plumbing.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).
//!
//! ## Modules
//!
//! - [`graph`]: labelled multigraph, topological sorts, cycle enumeration.
//! - [`schema`]: tables, keys, identifiers, and the relationship orderer.
//! - [`cache`]: single-flight asynchronous memoization.
//! - [`catalog`]: identifier-keyed table lookup backed by the cache.
//! - [`config`]: project and user configuration.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod graph;
pub mod schema;
