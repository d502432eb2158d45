use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::Path;

use crate::schema::{IdentifierCase, IdentifierPolicy};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub identifiers: IdentifierConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentifierConfig {
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default)]
    pub default_schema: Option<String>,
}

impl IdentifierConfig {
    /// How the project's table names are compared and qualified.
    #[must_use]
    pub fn policy(&self) -> IdentifierPolicy {
        IdentifierPolicy {
            case: if self.case_insensitive {
                IdentifierCase::FoldLower
            } else {
                IdentifierCase::Sensitive
            },
            default_schema: self.default_schema.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Upper bound on cycles listed by `schemawalk cycles`.
    #[serde(default = "default_max_cycles")]
    pub max_cycles: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            max_cycles: default_max_cycles(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

/// Load `<root>/.schemawalk/config.toml`, or defaults if it does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(".schemawalk/config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load `<config dir>/schemawalk/config.toml`, or defaults if missing.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("schemawalk/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Merge project config, user config and the environment.
///
/// Output mode precedence: `--json`, then `FORMAT`, then the user config,
/// then `pretty` on a terminal and `text` otherwise.
///
/// # Errors
///
/// Returns an error if either config file is malformed.
pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.as_deref(), env_format.as_deref());

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

/// Map an output mode name to its canonical form.
#[must_use]
pub fn normalize_output_mode(raw: &str) -> Option<&'static str> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pretty" | "human" => Some("pretty"),
        "text" | "plain" => Some("text"),
        "json" => Some("json"),
        _ => None,
    }
}

fn resolve_output(cli_json: bool, user_output: Option<&str>, env_format: Option<&str>) -> String {
    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

const fn default_max_cycles() -> usize {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_project_config_uses_defaults() {
        let root = tempfile::tempdir().expect("temp dir");
        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert!(!cfg.identifiers.case_insensitive);
        assert!(cfg.identifiers.default_schema.is_none());
        assert_eq!(cfg.diagnostics.max_cycles, 50);
    }

    #[test]
    fn project_config_parses_sections() {
        let root = tempfile::tempdir().expect("temp dir");
        let dir = root.path().join(".schemawalk");
        std::fs::create_dir_all(&dir).expect("create config dir");
        std::fs::write(
            dir.join("config.toml"),
            r#"
[identifiers]
case_insensitive = true
default_schema = "public"

[diagnostics]
max_cycles = 3
"#,
        )
        .expect("write config");

        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.diagnostics.max_cycles, 3);

        let policy = cfg.identifiers.policy();
        assert_eq!(policy.case, IdentifierCase::FoldLower);
        assert_eq!(policy.default_schema.as_deref(), Some("public"));
    }

    #[test]
    fn malformed_project_config_is_an_error() {
        let root = tempfile::tempdir().expect("temp dir");
        let dir = root.path().join(".schemawalk");
        std::fs::create_dir_all(&dir).expect("create config dir");
        std::fs::write(dir.join("config.toml"), "[identifiers\n").expect("write config");

        let err = load_project_config(root.path()).expect_err("parse should fail");
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn cli_json_overrides_env_and_config() {
        assert_eq!(resolve_output(true, Some("pretty"), Some("text")), "json");
    }

    #[test]
    fn env_beats_user_config() {
        assert_eq!(resolve_output(false, Some("pretty"), Some("text")), "text");
        assert_eq!(resolve_output(false, Some("json"), Some("bogus")), "json");
    }

    #[test]
    fn aliases_are_normalized() {
        assert_eq!(normalize_output_mode(" Human "), Some("pretty"));
        assert_eq!(normalize_output_mode("plain"), Some("text"));
        assert_eq!(normalize_output_mode("yaml"), None);
    }
}
