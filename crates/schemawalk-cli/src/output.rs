//! Rendering of command reports and errors.
//!
//! Handlers build a serializable report and hand it to [`render_mode`]
//! together with a text and a pretty renderer; JSON needs no renderer.
//!
//! # Picking a mode
//!
//! 1. `--format`
//! 2. `--json`, `FORMAT`, then `output` in the user config (see
//!    `schemawalk_core::config::resolve_config`)
//! 3. [`OutputMode::Pretty`] on a terminal, [`OutputMode::Text`] otherwise
//!
//! Errors always go to stderr so a failing `check` still leaves its JSON
//! report alone on stdout.

use clap::ValueEnum;
use schemawalk_core::cache::CacheError;
use schemawalk_core::error::ErrorCode;
use schemawalk_core::graph::GraphError;
use schemawalk_core::schema::{RelationshipCycle, SchemaError};
use serde::Serialize;
use std::io::{self, Write};

use crate::cmd::CommandError;

/// Width of the `----` rule under pretty headings.
const PRETTY_RULE_WIDTH: usize = 72;

fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Heading line plus rule.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// `key:` padded to a fixed column, then the value.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<14} {}", format!("{key}:"), value.as_ref())
}

/// How a command prints its report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Headings, numbering and summaries.
    Pretty,
    /// One record per line.
    Text,
    /// The report struct serialized as JSON.
    Json,
}

impl OutputMode {
    /// Parse a canonical mode name as produced by the config layer.
    fn from_resolved(name: &str) -> Self {
        match name {
            "json" => Self::Json,
            "pretty" => Self::Pretty,
            _ => Self::Text,
        }
    }
}

/// Pick the output mode: an explicit `--format` wins, otherwise the mode the
/// config layer resolved from `--json`, `FORMAT`, user config and TTY.
pub fn resolve_output_mode(format_flag: Option<OutputMode>, resolved: &str) -> OutputMode {
    format_flag.unwrap_or_else(|| OutputMode::from_resolved(resolved))
}

/// Print `value` to stdout in `mode`.
pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Text => text_fn(value, &mut out)?,
        OutputMode::Pretty => pretty_fn(value, &mut out)?,
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// What the user sees when a command fails.
#[derive(Debug, Serialize)]
pub struct CliError {
    /// The full error chain, outermost context first.
    pub message: String,
    /// The hint registered for the error code, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// `E####` code from [`ErrorCode`].
    pub error_code: String,
}

impl CliError {
    /// Build from an error chain, taking the code of the first typed error
    /// found in it.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let code = error_code_of(err);
        Self {
            message: format!("{err:#}"),
            suggestion: code.hint().map(str::to_string),
            error_code: code.code().to_string(),
        }
    }
}

fn error_code_of(err: &anyhow::Error) -> ErrorCode {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<CommandError>() {
            return e.code;
        }
        if let Some(e) = cause.downcast_ref::<SchemaError>() {
            return e.code();
        }
        if let Some(e) = cause.downcast_ref::<RelationshipCycle>() {
            return e.code();
        }
        if let Some(e) = cause.downcast_ref::<GraphError>() {
            return e.code();
        }
        if let Some(e) = cause.downcast_ref::<CacheError>() {
            return e.code();
        }
    }
    ErrorCode::InternalUnexpected
}

/// Print `error` to stderr.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    write_error(mode, error, &mut out)?;
    Ok(())
}

fn write_error(mode: OutputMode, error: &CliError, out: &mut dyn Write) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({
                "error": error,
            });
            serde_json::to_writer_pretty(&mut *out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            writeln!(out, "error[{}]: {}", error.error_code, error.message)?;
            if let Some(ref suggestion) = error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── resolve_output_mode ─────────────────────────────────────────────────

    #[test]
    fn format_flag_wins_over_resolved() {
        assert_eq!(resolve_output_mode(Some(OutputMode::Text), "json"), OutputMode::Text);
    }

    #[test]
    fn resolved_names_map_to_modes() {
        assert_eq!(resolve_output_mode(None, "json"), OutputMode::Json);
        assert_eq!(resolve_output_mode(None, "pretty"), OutputMode::Pretty);
        assert_eq!(resolve_output_mode(None, "text"), OutputMode::Text);
        assert_eq!(resolve_output_mode(None, "bogus"), OutputMode::Text);
    }

    // ── CliError ────────────────────────────────────────────────────────────

    #[test]
    fn typed_error_in_chain_sets_code() {
        let err = anyhow::Error::new(SchemaError::InvalidArgument("blank".into()))
            .context("loading schema.toml");
        let cli = CliError::from_anyhow(&err);
        assert_eq!(cli.error_code, "E1003");
        assert!(cli.message.contains("loading schema.toml"));
        assert!(cli.message.contains("blank"));
        assert!(cli.suggestion.is_some());
    }

    #[test]
    fn untyped_error_is_internal() {
        let cli = CliError::from_anyhow(&anyhow::anyhow!("boom"));
        assert_eq!(cli.error_code, ErrorCode::InternalUnexpected.code());
    }

    #[test]
    fn command_error_code_is_used() {
        let err = anyhow::Error::new(CommandError::new(ErrorCode::TableNotFound, "no table x"));
        assert_eq!(CliError::from_anyhow(&err).error_code, "E2003");
    }

    #[test]
    fn json_error_is_wrapped() {
        let cli = CliError::from_anyhow(&anyhow::anyhow!("boom"));
        let mut out = Vec::new();
        write_error(OutputMode::Json, &cli, &mut out).expect("render");
        let json: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(json["error"]["message"], "boom");
        assert_eq!(json["error"]["error_code"], "E9001");
    }

    #[test]
    fn human_error_shows_code_and_suggestion() {
        let err = anyhow::Error::new(CommandError::new(ErrorCode::TableNotFound, "no table x"));
        let cli = CliError::from_anyhow(&err);
        let mut out = Vec::new();
        write_error(OutputMode::Pretty, &cli, &mut out).expect("render");
        let rendered = String::from_utf8(out).expect("utf8");
        assert!(rendered.starts_with("error[E2003]: no table x"));
        assert!(rendered.contains("suggestion:"));
    }
}
