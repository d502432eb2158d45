//! Relational schema model.
//!
//! Tables are identified by an [`Identifier`] (optional schema qualifier plus
//! name) and carry columns and keys. Only foreign keys matter for ordering;
//! primary and unique keys are kept so documents round-trip and so the CLI
//! can describe a table fully.
//!
//! ## Identifier equality
//!
//! Whether `Public.Orders` and `public.orders` name the same table depends on
//! the database. [`IdentifierCase`] picks the rule, and [`Identifier`]'s
//! `Eq`, `Hash` and `Ord` all compare the normalized form, so every graph and
//! cache keyed by identifiers follows the same rule.
//!
//! ## Submodules
//!
//! - [`document`]: TOML/JSON schema documents.
//! - [`relationships`]: foreign-key graph and table ordering.

#![allow(clippy::module_name_repetitions)]

pub mod document;
pub mod relationships;

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

pub use document::SchemaDocument;
pub use relationships::{RelationshipCycle, RelationshipOrderer, deletion_order, insertion_order, render_cycle};

// ---------------------------------------------------------------------------
// SchemaError
// ---------------------------------------------------------------------------

/// Invalid schema input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to parse {format} schema document: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },
}

impl SchemaError {
    /// Stable error code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Parse { .. } => ErrorCode::SchemaDocumentInvalid,
        }
    }
}

// ---------------------------------------------------------------------------
// Identifier
// ---------------------------------------------------------------------------

/// How identifier text is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierCase {
    /// Exact comparison.
    #[default]
    Sensitive,
    /// Compare lowercased text.
    FoldLower,
}

impl IdentifierCase {
    fn normalize(self, text: &str) -> String {
        match self {
            Self::Sensitive => text.to_string(),
            Self::FoldLower => text.to_lowercase(),
        }
    }
}

/// A schema-qualified table name.
///
/// The original spelling is kept for display; comparison uses the form
/// normalized by the identifier's [`IdentifierCase`].
#[derive(Clone)]
pub struct Identifier {
    schema: Option<String>,
    name: String,
    key: (Option<String>, String),
}

impl Identifier {
    /// Build a case-sensitive identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidArgument`] if `name` or a given `schema`
    /// is blank.
    pub fn new(schema: Option<&str>, name: &str) -> Result<Self, SchemaError> {
        Self::with_case(schema, name, IdentifierCase::Sensitive)
    }

    /// Build an identifier compared under `case`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidArgument`] if `name` or a given `schema`
    /// is blank.
    pub fn with_case(
        schema: Option<&str>,
        name: &str,
        case: IdentifierCase,
    ) -> Result<Self, SchemaError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SchemaError::InvalidArgument(
                "table name must not be blank".to_string(),
            ));
        }
        let schema = match schema.map(str::trim) {
            Some("") => {
                return Err(SchemaError::InvalidArgument(format!(
                    "schema qualifier of table '{name}' must not be blank"
                )));
            }
            other => other.map(str::to_string),
        };
        let key = (
            schema.as_deref().map(|s| case.normalize(s)),
            case.normalize(name),
        );
        Ok(Self {
            schema,
            name: name.to_string(),
            key,
        })
    }

    /// Parse `schema.name` or a bare `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidArgument`] for blank parts.
    pub fn parse(text: &str, case: IdentifierCase) -> Result<Self, SchemaError> {
        match text.split_once('.') {
            Some((schema, name)) => Self::with_case(Some(schema), name, case),
            None => Self::with_case(None, text, case),
        }
    }

    #[must_use]
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({self})")
    }
}

impl Serialize for Identifier {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// How raw names become [`Identifier`]s: comparison rule plus the schema
/// assumed for unqualified names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierPolicy {
    pub case: IdentifierCase,
    pub default_schema: Option<String>,
}

impl IdentifierPolicy {
    /// Build an identifier, qualifying it with the default schema if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidArgument`] for blank parts.
    pub fn identifier(&self, schema: Option<&str>, name: &str) -> Result<Identifier, SchemaError> {
        let schema = schema.or(self.default_schema.as_deref());
        Identifier::with_case(schema, name, self.case)
    }

    /// Parse `schema.name` or `name`, qualifying bare names.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidArgument`] for blank parts.
    pub fn parse(&self, text: &str) -> Result<Identifier, SchemaError> {
        match text.split_once('.') {
            Some((schema, name)) => self.identifier(Some(schema), name),
            None => self.identifier(None, text),
        }
    }
}

// ---------------------------------------------------------------------------
// Tables, columns, keys
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub data_type: Option<String>,
    pub nullable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    Primary,
    Unique,
    Foreign,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Unique => write!(f, "unique"),
            Self::Foreign => write!(f, "foreign"),
        }
    }
}

/// The parent side of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignReference {
    pub table: Identifier,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Key {
    pub name: String,
    pub kind: KeyKind,
    pub columns: Vec<String>,
    /// Set for foreign keys only.
    pub references: Option<ForeignReference>,
}

impl Key {
    #[must_use]
    pub fn primary(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: KeyKind::Primary,
            columns,
            references: None,
        }
    }

    #[must_use]
    pub fn foreign(name: impl Into<String>, columns: Vec<String>, references: ForeignReference) -> Self {
        Self {
            name: name.into(),
            kind: KeyKind::Foreign,
            columns,
            references: Some(references),
        }
    }

    /// The referenced table, for foreign keys.
    #[must_use]
    pub fn parent(&self) -> Option<&Identifier> {
        match self.kind {
            KeyKind::Foreign => self.references.as_ref().map(|r| &r.table),
            KeyKind::Primary | KeyKind::Unique => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub id: Identifier,
    pub columns: Vec<Column>,
    pub keys: Vec<Key>,
}

impl Table {
    #[must_use]
    pub fn new(id: Identifier) -> Self {
        Self {
            id,
            columns: Vec::new(),
            keys: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    #[must_use]
    pub fn with_key(mut self, key: Key) -> Self {
        self.keys.push(key);
        self
    }

    /// Foreign keys paired with the table each one references.
    pub fn parent_keys(&self) -> impl Iterator<Item = (&Key, &Identifier)> {
        self.keys
            .iter()
            .filter_map(|key| key.parent().map(|parent| (key, parent)))
    }

    /// Return `true` if any foreign key points back at this table.
    #[must_use]
    pub fn references_self(&self) -> bool {
        self.parent_keys().any(|(_, parent)| *parent == self.id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn display_qualifies_with_schema() {
        let id = Identifier::new(Some("public"), "orders").unwrap();
        assert_eq!(id.to_string(), "public.orders");
        assert_eq!(Identifier::new(None, "orders").unwrap().to_string(), "orders");
    }

    #[test]
    fn blank_parts_are_invalid() {
        assert!(matches!(
            Identifier::new(None, "  "),
            Err(SchemaError::InvalidArgument(_))
        ));
        assert!(matches!(
            Identifier::new(Some(""), "orders"),
            Err(SchemaError::InvalidArgument(_))
        ));
        assert!(Identifier::parse("public.", IdentifierCase::Sensitive).is_err());
    }

    #[test]
    fn sensitive_identifiers_distinguish_case() {
        let a = Identifier::new(Some("public"), "Orders").unwrap();
        let b = Identifier::new(Some("public"), "orders").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn folded_identifiers_compare_and_hash_equal() {
        let case = IdentifierCase::FoldLower;
        let a = Identifier::with_case(Some("Public"), "Orders", case).unwrap();
        let b = Identifier::with_case(Some("public"), "ORDERS", case).unwrap();
        assert_eq!(a, b);

        let set: HashSet<Identifier> = [a.clone(), b].into_iter().collect();
        assert_eq!(set.len(), 1);
        // Original spelling survives for display.
        assert_eq!(a.to_string(), "Public.Orders");
    }

    #[test]
    fn parse_splits_on_first_dot() {
        let id = Identifier::parse("sales.order_items", IdentifierCase::Sensitive).unwrap();
        assert_eq!(id.schema(), Some("sales"));
        assert_eq!(id.name(), "order_items");
    }

    #[test]
    fn policy_applies_default_schema() {
        let policy = IdentifierPolicy {
            case: IdentifierCase::Sensitive,
            default_schema: Some("public".to_string()),
        };
        assert_eq!(policy.parse("orders").unwrap().to_string(), "public.orders");
        assert_eq!(policy.parse("audit.log").unwrap().to_string(), "audit.log");
    }

    #[test]
    fn parent_keys_skip_non_foreign_keys() {
        let orders = Identifier::new(None, "orders").unwrap();
        let customers = Identifier::new(None, "customers").unwrap();
        let table = Table::new(orders.clone())
            .with_key(Key::primary("orders_pkey", vec!["id".into()]))
            .with_key(Key::foreign(
                "fk_customer",
                vec!["customer_id".into()],
                ForeignReference {
                    table: customers.clone(),
                    columns: vec!["id".into()],
                },
            ));

        let parents: Vec<&Identifier> = table.parent_keys().map(|(_, p)| p).collect();
        assert_eq!(parents, vec![&customers]);
        assert!(!table.references_self());
    }

    #[test]
    fn self_reference_is_detected() {
        let employees = Identifier::new(None, "employees").unwrap();
        let table = Table::new(employees.clone()).with_key(Key::foreign(
            "fk_manager",
            vec!["manager_id".into()],
            ForeignReference {
                table: employees,
                columns: vec!["id".into()],
            },
        ));
        assert!(table.references_self());
    }

    #[test]
    fn identifier_serializes_as_display_string() {
        let id = Identifier::new(Some("public"), "orders").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"public.orders\"");
    }
}
