//! `schemawalk check`: fail when the schema has a referential cycle.

use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use schemawalk_core::schema::{Identifier, RelationshipCycle, RelationshipOrderer};
use serde::Serialize;
use tracing::{info, instrument};

use super::{Context, load_schema};
use crate::output::{pretty_kv, pretty_section, render_mode};

/// Arguments for `schemawalk check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Schema document (`.toml` or `.json`).
    pub schema: PathBuf,
}

#[derive(Debug, Serialize)]
struct CheckOutput {
    ok: bool,
    tables: usize,
    relationships: usize,
    fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cycle: Option<Vec<CycleHop>>,
    /// The cycle rendered as `a -[fk]-> b -[fk]-> a`.
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct CycleHop {
    from: String,
    to: String,
    keys: Vec<String>,
}

/// Execute `schemawalk check`.
///
/// The report is printed either way; a cycle is then returned as the error
/// so the process exits non-zero.
#[instrument(skip_all, fields(schema = %args.schema.display()))]
pub fn run_check(args: &CheckArgs, ctx: &Context) -> anyhow::Result<()> {
    let policy = ctx.policy();
    let loaded = load_schema(&args.schema, &policy)?;
    let fingerprint = loaded.document.fingerprint(&policy)?;

    let orderer = RelationshipOrderer::new(&loaded.tables);
    let outcome = orderer.strict_order();

    let payload = check_payload(&orderer, &outcome, fingerprint);
    info!(ok = payload.ok, tables = payload.tables, "schema checked");
    render_mode(ctx.output, &payload, render_check_text, render_check_pretty)?;

    outcome.map(|_| ()).map_err(anyhow::Error::new)
}

fn check_payload(
    orderer: &RelationshipOrderer,
    outcome: &Result<Vec<Identifier>, RelationshipCycle>,
    fingerprint: String,
) -> CheckOutput {
    let failure = outcome.as_ref().err();
    CheckOutput {
        ok: failure.is_none(),
        tables: orderer.graph().vertex_count(),
        relationships: orderer.graph().label_count(),
        fingerprint,
        cycle: failure.map(|err| {
            err.cycle()
                .iter()
                .map(|hop| CycleHop {
                    from: hop.from.to_string(),
                    to: hop.to.to_string(),
                    keys: hop.labels.clone(),
                })
                .collect()
        }),
        message: failure.map(|err| err.message().to_string()),
    }
}

fn render_check_text(payload: &CheckOutput, w: &mut dyn Write) -> std::io::Result<()> {
    if payload.ok {
        writeln!(w, "ok {} {}", payload.tables, payload.fingerprint)
    } else {
        writeln!(w, "cycle {}", payload.message.as_deref().unwrap_or_default())
    }
}

fn render_check_pretty(payload: &CheckOutput, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, "Schema check")?;
    pretty_kv(w, "status", if payload.ok { "ok" } else { "cycle detected" })?;
    pretty_kv(w, "tables", payload.tables.to_string())?;
    pretty_kv(w, "relationships", payload.relationships.to_string())?;
    pretty_kv(w, "fingerprint", &payload.fingerprint)?;
    if !payload.ok {
        pretty_kv(w, "cycle", payload.message.as_deref().unwrap_or_default())?;
    }
    Ok(())
}
