use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};
use std::path::Path;
use tracing::debug;

use super::{types::RunConfig, ConfigError};

/// Environment prefix for overrides, e.g. `PRISM_TRACKER__MAX_ITEMS=3`.
const ENV_PREFIX: &str = "PRISM_";

/// Load configuration from an optional file with environment variable overrides.
///
/// A missing file is not an error: every section has defaults. `.toml` files are read
/// as TOML, anything else as JSON.
pub fn load_config(path: &Path) -> Result<RunConfig, ConfigError> {
    let mut figment = Figment::new();

    if path.exists() {
        if !path.is_file() {
            return Err(ConfigError::Unreadable(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        figment = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => figment.merge(Toml::file(path)),
            _ => figment.merge(Json::file(path)),
        };
    } else {
        debug!(path = %path.display(), "No configuration file, using defaults");
    }

    figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load configuration from a JSON string (useful for testing)
pub fn load_config_from_str(json: &str) -> Result<RunConfig, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_load_config_from_str_valid() {
        let json = r#"{"tracker": {"max_items": 4, "repository": "acme/widgets"}}"#;
        let config = load_config_from_str(json).unwrap();
        assert_eq!(config.tracker.max_items, 4);
        assert_eq!(config.tracker.repository, "acme/widgets");
    }

    #[test]
    fn test_load_config_from_str_malformed() {
        let result = load_config_from_str(r#"{"tracker": {"max_items": "many"}}"#);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let config = load_config(Path::new("does-not-exist.json")).unwrap();
            assert_eq!(config.tracker.max_items, 1);
            assert_eq!(config.tracker.max_age_days, 10);
            Ok(())
        });
    }

    #[test]
    fn test_load_json_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "agent_config.json",
                r#"{"model": {"model_id": "m"}, "github": {"max_issues": 2}}"#,
            )?;
            let config = load_config(Path::new("agent_config.json")).unwrap();
            assert_eq!(config.model.model_id, "m");
            assert_eq!(config.tracker.max_items, 2);
            Ok(())
        });
    }

    #[test]
    fn test_load_toml_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "prism.toml",
                r#"
[tracker]
max_items = 5
include_labels = ["bug"]

[execution]
auto_approve_commands = true
"#,
            )?;
            let config = load_config(Path::new("prism.toml")).unwrap();
            assert_eq!(config.tracker.max_items, 5);
            assert!(config.tracker.include_labels.contains("bug"));
            assert!(config.execution.auto_approve_commands);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("agent_config.json", r#"{"tracker": {"max_items": 2}}"#)?;
            jail.set_env("PRISM_TRACKER__MAX_ITEMS", "7");
            let config = load_config(Path::new("agent_config.json")).unwrap();
            assert_eq!(config.tracker.max_items, 7);
            Ok(())
        });
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        Jail::expect_with(|jail| {
            jail.create_file("agent_config.json", "{ not json")?;
            let result = load_config(Path::new("agent_config.json"));
            assert!(matches!(result, Err(ConfigError::ParseError(_))));
            Ok(())
        });
    }

    #[test]
    fn test_directory_is_unreadable() {
        Jail::expect_with(|jail| {
            let dir = jail.directory().to_path_buf();
            let result = load_config(&dir);
            assert!(matches!(result, Err(ConfigError::Unreadable(_))));
            Ok(())
        });
    }
}
