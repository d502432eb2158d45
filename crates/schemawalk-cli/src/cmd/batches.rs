//! `schemawalk batches`: levels of tables that can be created together.

use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use schemawalk_core::schema::{Identifier, RelationshipOrderer};
use serde::Serialize;
use tracing::{info, instrument};

use super::{Context, load_schema, select_tables};
use crate::output::{pretty_kv, pretty_section, render_mode};

/// Arguments for `schemawalk batches`.
#[derive(Args, Debug)]
pub struct BatchesArgs {
    /// Schema document (`.toml` or `.json`).
    pub schema: PathBuf,

    /// Restrict batching to these tables (repeatable).
    #[arg(long = "table", value_name = "NAME")]
    pub tables: Vec<String>,
}

#[derive(Debug, Serialize)]
struct BatchesOutput {
    batches: Vec<Vec<Identifier>>,
}

/// Execute `schemawalk batches`.
///
/// A referential cycle fails the command.
#[instrument(skip_all, fields(schema = %args.schema.display()))]
pub fn run_batches(args: &BatchesArgs, ctx: &Context) -> anyhow::Result<()> {
    let policy = ctx.policy();
    let loaded = load_schema(&args.schema, &policy)?;
    let tables = select_tables(loaded.tables, &args.tables, &loaded.policy)?;

    let batches = RelationshipOrderer::new(&tables).creation_batches()?;
    info!(levels = batches.len(), "creation batches computed");

    render_mode(ctx.output, &BatchesOutput { batches }, render_batches_text, render_batches_pretty)
}

fn render_batches_text(payload: &BatchesOutput, w: &mut dyn Write) -> std::io::Result<()> {
    for batch in &payload.batches {
        let names: Vec<String> = batch.iter().map(ToString::to_string).collect();
        writeln!(w, "{}", names.join(" "))?;
    }
    Ok(())
}

fn render_batches_pretty(payload: &BatchesOutput, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, "Creation batches (parents first)")?;
    for (idx, batch) in payload.batches.iter().enumerate() {
        writeln!(w, "Batch {}:", idx + 1)?;
        for id in batch {
            writeln!(w, "  - {id}")?;
        }
    }
    writeln!(w)?;
    pretty_kv(w, "batches", payload.batches.len().to_string())?;
    pretty_kv(w, "tables", payload.batches.iter().map(Vec::len).sum::<usize>().to_string())
}
