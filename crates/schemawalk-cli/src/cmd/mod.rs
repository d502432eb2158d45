//! Subcommand handlers and the loading steps they share.

pub mod batches;
pub mod check;
pub mod cycles;
pub mod order;

use std::path::Path;

use anyhow::Result;
use futures::executor::block_on;
use schemawalk_core::cache::CancellationToken;
use schemawalk_core::catalog::{DocumentSource, TableCatalog};
use schemawalk_core::config::EffectiveConfig;
use schemawalk_core::error::ErrorCode;
use schemawalk_core::schema::{IdentifierPolicy, SchemaDocument, SchemaError, Table};
use tracing::debug;

use crate::output::OutputMode;

/// A CLI-level failure with a stable code.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct CommandError {
    pub code: ErrorCode,
    pub message: String,
}

impl CommandError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// What every handler needs besides its own arguments.
#[derive(Debug)]
pub struct Context {
    pub output: OutputMode,
    pub config: EffectiveConfig,
}

impl Context {
    pub fn policy(&self) -> IdentifierPolicy {
        self.config.project.identifiers.policy()
    }
}

/// A loaded, validated schema document.
pub struct LoadedSchema {
    pub document: SchemaDocument,
    pub tables: Vec<Table>,
    /// The configured policy with the document's `default_schema` applied.
    pub policy: IdentifierPolicy,
}

/// Read and validate the schema document at `path`.
pub fn load_schema(path: &Path, policy: &IdentifierPolicy) -> Result<LoadedSchema> {
    let document = SchemaDocument::load(path).map_err(|err| {
        if err.chain().any(|cause| cause.is::<SchemaError>()) {
            err
        } else {
            CommandError::new(ErrorCode::SchemaDocumentInvalid, format!("{err:#}")).into()
        }
    })?;
    let tables = document.to_tables(policy)?;
    debug!(tables = tables.len(), "schema validated");
    let policy = IdentifierPolicy {
        case: policy.case,
        default_schema: document
            .default_schema
            .clone()
            .or_else(|| policy.default_schema.clone()),
    };
    Ok(LoadedSchema {
        document,
        tables,
        policy,
    })
}

/// Narrow `tables` to the named ones, looked up through a [`TableCatalog`].
///
/// An empty `names` keeps every table.
pub fn select_tables(tables: Vec<Table>, names: &[String], policy: &IdentifierPolicy) -> Result<Vec<Table>> {
    if names.is_empty() {
        return Ok(tables);
    }

    let ids = names
        .iter()
        .map(|name| policy.parse(name))
        .collect::<Result<Vec<_>, SchemaError>>()?;

    let catalog = TableCatalog::new(DocumentSource::new(tables));
    let cancel = CancellationToken::new();

    let mut selected = Vec::with_capacity(ids.len());
    for id in &ids {
        match block_on(catalog.table(id, &cancel))? {
            Some(table) => selected.push(Table::clone(&table)),
            None => {
                return Err(CommandError::new(
                    ErrorCode::TableNotFound,
                    format!("table '{id}' is not in the schema document"),
                )
                .into());
            }
        }
    }
    debug!(selected = selected.len(), cached = catalog.cached_len(), "tables selected");
    Ok(selected)
}
