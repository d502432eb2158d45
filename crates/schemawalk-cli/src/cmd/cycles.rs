//! `schemawalk cycles`: list referential cycles.

use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use schemawalk_core::schema::{Identifier, RelationshipOrderer};
use serde::Serialize;
use tracing::{info, instrument};

use super::{Context, load_schema};
use crate::output::{pretty_kv, pretty_section, render_mode};

/// Arguments for `schemawalk cycles`.
#[derive(Args, Debug)]
pub struct CyclesArgs {
    /// Schema document (`.toml` or `.json`).
    pub schema: PathBuf,

    /// Report strongly connected components instead of individual cycles.
    #[arg(long)]
    pub components: bool,

    /// Maximum number of groups to list (defaults to `diagnostics.max_cycles`).
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct CyclesOutput {
    kind: &'static str,
    cycles: Vec<Vec<Identifier>>,
    truncated: bool,
}

/// Execute `schemawalk cycles`. Finding cycles is not an error.
#[instrument(skip_all, fields(schema = %args.schema.display(), components = args.components))]
pub fn run_cycles(args: &CyclesArgs, ctx: &Context) -> anyhow::Result<()> {
    let policy = ctx.policy();
    let loaded = load_schema(&args.schema, &policy)?;
    let orderer = RelationshipOrderer::new(&loaded.tables);

    let mut groups = if args.components {
        orderer.cycle_components()
    } else {
        let mut cycles = orderer.find_cycles();
        cycles.sort_unstable();
        cycles
    };

    let limit = args.limit.unwrap_or(ctx.config.project.diagnostics.max_cycles);
    let truncated = groups.len() > limit;
    info!(found = groups.len(), limit, "cycles enumerated");
    groups.truncate(limit);

    let payload = CyclesOutput {
        kind: if args.components { "components" } else { "cycles" },
        cycles: groups.into_iter().map(|set| set.into_iter().collect()).collect(),
        truncated,
    };
    render_mode(ctx.output, &payload, render_cycles_text, render_cycles_human)
}

fn render_cycles_text(payload: &CyclesOutput, w: &mut dyn Write) -> std::io::Result<()> {
    for cycle in &payload.cycles {
        let names: Vec<String> = cycle.iter().map(ToString::to_string).collect();
        writeln!(w, "{}", names.join(" "))?;
    }
    Ok(())
}

fn render_cycles_human(payload: &CyclesOutput, w: &mut dyn Write) -> std::io::Result<()> {
    if payload.cycles.is_empty() {
        writeln!(w, "No referential cycles found.")?;
        return Ok(());
    }

    let label = if payload.kind == "components" {
        "Cyclic components"
    } else {
        "Referential cycles"
    };
    pretty_section(w, &format!("{label} ({})", payload.cycles.len()))?;

    for (idx, cycle) in payload.cycles.iter().enumerate() {
        writeln!(w, "\nCycle {}:", idx + 1)?;
        for id in cycle {
            writeln!(w, "  - {id}")?;
        }
    }

    if payload.truncated {
        writeln!(w)?;
        pretty_kv(w, "truncated", "raise --limit to see more")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: CyclesArgs,
    }

    fn id(name: &str) -> Identifier {
        Identifier::new(None, name).expect("id")
    }

    #[test]
    fn cycles_args_parse_flags() {
        let parsed = Wrapper::parse_from(["test", "s.json", "--components", "--limit", "3"]);
        assert!(parsed.args.components);
        assert_eq!(parsed.args.limit, Some(3));

        let parsed = Wrapper::parse_from(["test", "s.json"]);
        assert!(!parsed.args.components);
        assert!(parsed.args.limit.is_none());
    }

    #[test]
    fn render_cycles_human_no_cycles() {
        let payload = CyclesOutput {
            kind: "cycles",
            cycles: Vec::new(),
            truncated: false,
        };
        let mut out = Vec::new();
        render_cycles_human(&payload, &mut out).expect("render");
        assert!(String::from_utf8(out).expect("utf8").contains("No referential cycles found."));
    }

    #[test]
    fn render_cycles_human_lists_groups() {
        let payload = CyclesOutput {
            kind: "cycles",
            cycles: vec![vec![id("a"), id("b")]],
            truncated: true,
        };
        let mut out = Vec::new();
        render_cycles_human(&payload, &mut out).expect("render");

        let rendered = String::from_utf8(out).expect("utf8");
        assert!(rendered.contains("Referential cycles (1)"));
        assert!(rendered.contains("Cycle 1:"));
        assert!(rendered.contains("  - a\n  - b"));
        assert!(rendered.contains("truncated:"));
    }

    #[test]
    fn text_prints_one_cycle_per_line() {
        let payload = CyclesOutput {
            kind: "components",
            cycles: vec![vec![id("a"), id("b")], vec![id("x"), id("y")]],
            truncated: false,
        };
        let mut out = Vec::new();
        render_cycles_text(&payload, &mut out).expect("render");
        assert_eq!(String::from_utf8(out).expect("utf8"), "a b\nx y\n");
    }
}
