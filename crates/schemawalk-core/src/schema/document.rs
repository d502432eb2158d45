//! Schema documents: tables and keys described in TOML or JSON.
//!
//! A document stands in for a live catalog query. The format is picked by
//! file extension (`.json` is JSON, anything else is TOML):
//!
//! ```toml
//! default_schema = "public"
//!
//! [[tables]]
//! name = "customers"
//! keys = [{ name = "customers_pkey", kind = "primary", columns = ["id"] }]
//!
//! [[tables]]
//! name = "orders"
//! columns = [{ name = "customer_id", type = "bigint", nullable = false }]
//!
//! [[tables.keys]]
//! name = "fk_orders_customer"
//! kind = "foreign"
//! columns = ["customer_id"]
//! references = { table = "customers", columns = ["id"] }
//! ```
//!
//! Parsing only checks shape. [`SchemaDocument::to_tables`] validates
//! names and references and builds [`Table`]s.

#![allow(clippy::module_name_repetitions)]

use std::path::Path;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Column, ForeignReference, Identifier, IdentifierPolicy, Key, KeyKind, SchemaError, Table};

/// Top-level document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDocument {
    /// Schema assumed for unqualified names. Overrides the configured one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_schema: Option<String>,
    #[serde(default)]
    pub tables: Vec<TableEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnEntry>,
    #[serde(default)]
    pub keys: Vec<KeyEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnEntry {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

const fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub name: String,
    pub kind: KeyKind,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<ReferenceEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub table: String,
    #[serde(default)]
    pub columns: Vec<String>,
}

impl SchemaDocument {
    /// Read a document from `path`, choosing the format by extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed. Parse failures
    /// carry a [`SchemaError::Parse`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read schema document {}", path.display()))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let doc = if is_json {
            Self::from_json(&content)
        } else {
            Self::from_toml(&content)
        }
        .with_context(|| format!("invalid schema document {}", path.display()))?;

        debug!(path = %path.display(), tables = doc.tables.len(), "loaded schema document");
        Ok(doc)
    }

    /// Parse TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Parse`] on malformed input.
    pub fn from_toml(text: &str) -> Result<Self, SchemaError> {
        toml::from_str(text).map_err(|e| SchemaError::Parse {
            format: "TOML",
            message: e.to_string(),
        })
    }

    /// Parse JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Parse`] on malformed input.
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(text).map_err(|e| SchemaError::Parse {
            format: "JSON",
            message: e.to_string(),
        })
    }

    /// Validate and convert into [`Table`]s, in document order.
    ///
    /// The document's `default_schema` wins over `policy.default_schema`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidArgument`] for blank table, key or
    /// column names, a foreign key without `references`, or a non-foreign
    /// key with one.
    pub fn to_tables(&self, policy: &IdentifierPolicy) -> Result<Vec<Table>, SchemaError> {
        let policy = IdentifierPolicy {
            case: policy.case,
            default_schema: self
                .default_schema
                .clone()
                .or_else(|| policy.default_schema.clone()),
        };
        self.tables
            .iter()
            .map(|entry| entry.to_table(&policy))
            .collect()
    }

    /// Content hash of the table set and its relationships.
    ///
    /// Stable under reordering of tables and keys; changes when a table or
    /// a foreign key is added, removed or retargeted.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the document does not validate.
    pub fn fingerprint(&self, policy: &IdentifierPolicy) -> Result<String, SchemaError> {
        let tables = self.to_tables(policy)?;

        let mut names: Vec<String> = tables.iter().map(|t| t.id.to_string()).collect();
        names.sort_unstable();

        let mut edges: Vec<(String, String, String)> = tables
            .iter()
            .flat_map(|t| {
                t.parent_keys()
                    .map(|(key, parent)| (t.id.to_string(), parent.to_string(), key.name.clone()))
            })
            .collect();
        edges.sort_unstable();

        let mut hasher = blake3::Hasher::new();
        for name in &names {
            hasher.update(name.as_bytes());
            hasher.update(b"\x00");
        }
        hasher.update(b"\x01");
        for (child, parent, key) in &edges {
            hasher.update(child.as_bytes());
            hasher.update(b"\x00");
            hasher.update(parent.as_bytes());
            hasher.update(b"\x00");
            hasher.update(key.as_bytes());
            hasher.update(b"\x00");
        }
        Ok(format!("blake3:{}", hasher.finalize()))
    }
}

impl TableEntry {
    fn to_table(&self, policy: &IdentifierPolicy) -> Result<Table, SchemaError> {
        let id = policy.identifier(self.schema.as_deref(), &self.name)?;

        let columns = self
            .columns
            .iter()
            .map(|col| {
                if col.name.trim().is_empty() {
                    return Err(SchemaError::InvalidArgument(format!(
                        "table '{id}' has a column with a blank name"
                    )));
                }
                Ok(Column {
                    name: col.name.clone(),
                    data_type: col.data_type.clone(),
                    nullable: col.nullable,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let keys = self
            .keys
            .iter()
            .map(|key| key.to_key(&id, policy))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Table { id, columns, keys })
    }
}

impl KeyEntry {
    fn to_key(&self, table: &Identifier, policy: &IdentifierPolicy) -> Result<Key, SchemaError> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::InvalidArgument(format!(
                "table '{table}' has a key with a blank name"
            )));
        }

        let references = match (self.kind, &self.references) {
            (KeyKind::Foreign, Some(reference)) => Some(ForeignReference {
                table: policy.identifier(reference.schema.as_deref(), &reference.table)?,
                columns: reference.columns.clone(),
            }),
            (KeyKind::Foreign, None) => {
                return Err(SchemaError::InvalidArgument(format!(
                    "foreign key '{}' on '{table}' has no references",
                    self.name
                )));
            }
            (KeyKind::Primary | KeyKind::Unique, Some(_)) => {
                return Err(SchemaError::InvalidArgument(format!(
                    "{} key '{}' on '{table}' must not declare references",
                    self.kind, self.name
                )));
            }
            (KeyKind::Primary | KeyKind::Unique, None) => None,
        };

        Ok(Key {
            name: self.name.clone(),
            kind: self.kind,
            columns: self.columns.clone(),
            references,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::IdentifierCase;

    const SHOP: &str = r#"
default_schema = "public"

[[tables]]
name = "customers"
keys = [{ name = "customers_pkey", kind = "primary", columns = ["id"] }]

[[tables]]
name = "orders"
columns = [{ name = "customer_id", type = "bigint", nullable = false }]

[[tables.keys]]
name = "fk_orders_customer"
kind = "foreign"
columns = ["customer_id"]
references = { table = "customers", columns = ["id"] }
"#;

    #[test]
    fn parses_toml_and_builds_tables() {
        let doc = SchemaDocument::from_toml(SHOP).unwrap();
        let tables = doc.to_tables(&IdentifierPolicy::default()).unwrap();

        assert_eq!(tables.len(), 2);
        assert_eq!(tables[1].id.to_string(), "public.orders");
        assert!(!tables[1].columns[0].nullable);
        assert_eq!(tables[1].columns[0].data_type.as_deref(), Some("bigint"));

        let parents: Vec<String> = tables[1].parent_keys().map(|(_, p)| p.to_string()).collect();
        assert_eq!(parents, vec!["public.customers"]);
    }

    #[test]
    fn parses_json() {
        let json = r#"{
            "tables": [
                {"name": "a", "keys": [{"name": "fk", "kind": "foreign", "columns": ["b_id"],
                  "references": {"table": "b"}}]},
                {"name": "b"}
            ]
        }"#;
        let doc = SchemaDocument::from_json(json).unwrap();
        let tables = doc.to_tables(&IdentifierPolicy::default()).unwrap();
        assert_eq!(tables[0].id.to_string(), "a");
        assert_eq!(tables[0].keys[0].parent().map(ToString::to_string).as_deref(), Some("b"));
    }

    #[test]
    fn malformed_input_is_parse_error() {
        let err = SchemaDocument::from_toml("[[tables]\nname=").unwrap_err();
        assert!(matches!(err, SchemaError::Parse { format: "TOML", .. }));
        assert!(SchemaDocument::from_json("{").is_err());
    }

    #[test]
    fn foreign_key_without_reference_is_invalid() {
        let doc = SchemaDocument::from_toml(
            r#"
[[tables]]
name = "orders"
keys = [{ name = "fk", kind = "foreign", columns = ["x"] }]
"#,
        )
        .unwrap();
        let err = doc.to_tables(&IdentifierPolicy::default()).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidArgument(_)));
    }

    #[test]
    fn blank_table_name_is_invalid() {
        let doc = SchemaDocument::from_toml("[[tables]]\nname = \" \"\n").unwrap();
        assert!(matches!(
            doc.to_tables(&IdentifierPolicy::default()),
            Err(SchemaError::InvalidArgument(_))
        ));
    }

    #[test]
    fn primary_key_with_reference_is_invalid() {
        let doc = SchemaDocument::from_toml(
            r#"
[[tables]]
name = "orders"
keys = [{ name = "pk", kind = "primary", references = { table = "x" } }]
"#,
        )
        .unwrap();
        assert!(doc.to_tables(&IdentifierPolicy::default()).is_err());
    }

    #[test]
    fn policy_case_flows_into_identifiers() {
        let doc = SchemaDocument::from_toml("[[tables]]\nname = \"Orders\"\n[[tables]]\nname = \"orders\"\n")
            .unwrap();
        let policy = IdentifierPolicy {
            case: IdentifierCase::FoldLower,
            default_schema: None,
        };
        let tables = doc.to_tables(&policy).unwrap();
        assert_eq!(tables[0].id, tables[1].id);
    }

    #[test]
    fn fingerprint_ignores_order_but_tracks_relationships() {
        let policy = IdentifierPolicy::default();
        let doc = SchemaDocument::from_toml(SHOP).unwrap();
        let base = doc.fingerprint(&policy).unwrap();
        assert!(base.starts_with("blake3:"));

        let mut reordered = doc.clone();
        reordered.tables.reverse();
        assert_eq!(reordered.fingerprint(&policy).unwrap(), base);

        let mut detached = doc.clone();
        detached.tables[1].keys.clear();
        assert_ne!(detached.fingerprint(&policy).unwrap(), base);
    }

    #[test]
    fn load_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("schema.toml");
        std::fs::write(&toml_path, SHOP).unwrap();
        assert_eq!(SchemaDocument::load(&toml_path).unwrap().tables.len(), 2);

        let json_path = dir.path().join("schema.json");
        std::fs::write(&json_path, r#"{"tables": [{"name": "t"}]}"#).unwrap();
        assert_eq!(SchemaDocument::load(&json_path).unwrap().tables.len(), 1);

        let err = SchemaDocument::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read schema document"));
    }

    #[test]
    fn load_error_keeps_schema_error_in_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        let err = SchemaDocument::load(&path).unwrap_err();
        assert!(err.chain().any(|cause| cause.downcast_ref::<SchemaError>().is_some()));
    }
}
