use std::fmt;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    SchemaDocumentInvalid,
    InvalidArgument,
    UnknownVertex,
    CycleDetected,
    TableNotFound,
    LoadFailed,
    LoadCancelled,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::SchemaDocumentInvalid => "E1002",
            Self::InvalidArgument => "E1003",
            Self::UnknownVertex => "E2001",
            Self::CycleDetected => "E2002",
            Self::TableNotFound => "E2003",
            Self::LoadFailed => "E3001",
            Self::LoadCancelled => "E3002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::SchemaDocumentInvalid => "Schema document could not be read",
            Self::InvalidArgument => "Invalid argument",
            Self::UnknownVertex => "Edge references an unregistered vertex",
            Self::CycleDetected => "Referential cycle prevents ordering",
            Self::TableNotFound => "Table not found",
            Self::LoadFailed => "Metadata load failed",
            Self::LoadCancelled => "Metadata load wait cancelled",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .schemawalk/config.toml and retry."),
            Self::SchemaDocumentInvalid => {
                Some("Check the schema document is valid TOML or JSON with a [[tables]] list.")
            }
            Self::InvalidArgument => Some("Provide non-empty table and key identifiers."),
            Self::UnknownVertex => Some("Register both tables before relating them."),
            Self::CycleDetected => Some(
                "Run `schemawalk cycles` to list the cycle, or use `schemawalk order` for a best-effort order.",
            ),
            Self::TableNotFound => Some("Check the table name and schema qualifier."),
            Self::LoadFailed => Some("Retry after fixing the metadata source; failures are cached until cleared."),
            Self::LoadCancelled => None,
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCode;
    use std::collections::HashSet;

    const ALL: [ErrorCode; 9] = [
        ErrorCode::ConfigParseError,
        ErrorCode::SchemaDocumentInvalid,
        ErrorCode::InvalidArgument,
        ErrorCode::UnknownVertex,
        ErrorCode::CycleDetected,
        ErrorCode::TableNotFound,
        ErrorCode::LoadFailed,
        ErrorCode::LoadCancelled,
        ErrorCode::InternalUnexpected,
    ];

    #[test]
    fn all_codes_are_unique() {
        let mut seen = HashSet::new();
        for code in ALL {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        for code in ALL {
            let code = code.code();
            assert_eq!(code.len(), 5);
            assert!(code.starts_with('E'));
            assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn display_matches_code() {
        assert_eq!(ErrorCode::CycleDetected.to_string(), "E2002");
    }
}
