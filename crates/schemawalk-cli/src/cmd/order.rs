//! `schemawalk order`: deletion or insertion order for a schema's tables.

use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use schemawalk_core::schema::{Identifier, RelationshipOrderer};
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::{Context, load_schema, select_tables};
use crate::output::{pretty_kv, pretty_section, render_mode};

/// Arguments for `schemawalk order`.
#[derive(Args, Debug)]
pub struct OrderArgs {
    /// Schema document (`.toml` or `.json`).
    pub schema: PathBuf,

    /// Parents before children instead of children before parents.
    #[arg(long)]
    pub insertion: bool,

    /// Restrict ordering to these tables (repeatable).
    #[arg(long = "table", value_name = "NAME")]
    pub tables: Vec<String>,
}

#[derive(Debug, Serialize)]
struct OrderOutput {
    direction: &'static str,
    tables: Vec<Identifier>,
    /// Tables that sit on a referential cycle, in output order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cyclic: Vec<Identifier>,
    fingerprint: String,
}

/// Execute `schemawalk order`.
#[instrument(skip_all, fields(schema = %args.schema.display(), insertion = args.insertion))]
pub fn run_order(args: &OrderArgs, ctx: &Context) -> anyhow::Result<()> {
    let policy = ctx.policy();
    let loaded = load_schema(&args.schema, &policy)?;
    let fingerprint = loaded.document.fingerprint(&policy)?;
    let tables = select_tables(loaded.tables, &args.tables, &loaded.policy)?;

    let orderer = RelationshipOrderer::new(&tables);
    let mut order = orderer.deletion_order();
    if args.insertion {
        order.reverse();
    }

    let cyclic = cyclic_tables(&order, &orderer);
    if !cyclic.is_empty() {
        warn!(tables = cyclic.len(), "order includes tables on a referential cycle");
    }
    info!(tables = order.len(), "order computed");

    let payload = OrderOutput {
        direction: if args.insertion { "insertion" } else { "deletion" },
        tables: order,
        cyclic,
        fingerprint,
    };
    render_mode(ctx.output, &payload, render_order_text, render_order_pretty)
}

/// Members of `order` that belong to a cyclic component. Tables that are
/// only blocked by a cycle are not on it and are left out.
fn cyclic_tables(order: &[Identifier], orderer: &RelationshipOrderer) -> Vec<Identifier> {
    let components = orderer.cycle_components();
    order
        .iter()
        .filter(|id| components.iter().any(|c| c.contains(*id)))
        .cloned()
        .collect()
}

fn render_order_text(payload: &OrderOutput, w: &mut dyn Write) -> std::io::Result<()> {
    for id in &payload.tables {
        writeln!(w, "{id}")?;
    }
    Ok(())
}

fn render_order_pretty(payload: &OrderOutput, w: &mut dyn Write) -> std::io::Result<()> {
    let heading = if payload.direction == "insertion" {
        "Insertion order (parents first)"
    } else {
        "Deletion order (children first)"
    };
    pretty_section(w, heading)?;
    for (idx, id) in payload.tables.iter().enumerate() {
        if payload.cyclic.contains(id) {
            writeln!(w, "{:>4}. {id}  (cycle)", idx + 1)?;
        } else {
            writeln!(w, "{:>4}. {id}", idx + 1)?;
        }
    }
    writeln!(w)?;
    pretty_kv(w, "tables", payload.tables.len().to_string())?;
    if !payload.cyclic.is_empty() {
        pretty_kv(w, "cyclic", payload.cyclic.len().to_string())?;
    }
    pretty_kv(w, "fingerprint", &payload.fingerprint)
}
