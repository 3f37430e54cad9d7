use std::collections::HashSet;
use std::path::Path;

use super::{types::RunConfig, ConfigError, WorkerConfig};
use crate::workspace::is_safe_component;

/// Largest accepted `tracker.max_age_days` (about a century).
pub const MAX_AGE_DAYS: u32 = 36_500;

/// Validate configuration
/// Currently validates:
/// - Model parameters (temperature range, token budget, model id)
/// - Tracker repository is set and the age window is bounded
/// - Workspace names are single safe path components
/// - Transient names never match the durable pattern
/// - Worker servers are uniquely named and have a command
pub fn validate_config(config: &RunConfig) -> Result<(), ConfigError> {
    let model = &config.model;
    if !(0.0..=1.0).contains(&model.temperature) {
        return Err(invalid(format!(
            "model.temperature must be within 0.0..=1.0, got {}",
            model.temperature
        )));
    }
    if model.max_tokens == 0 {
        return Err(invalid("model.max_tokens cannot be 0"));
    }
    if model.model_id.trim().is_empty() {
        return Err(invalid("model.model_id cannot be empty"));
    }

    if config.tracker.repository.trim().is_empty() {
        return Err(invalid("tracker.repository cannot be empty"));
    }
    if config.tracker.max_age_days > MAX_AGE_DAYS {
        return Err(invalid(format!(
            "tracker.max_age_days must be at most {}, got {}",
            MAX_AGE_DAYS, config.tracker.max_age_days
        )));
    }

    let workspace = &config.workspace;
    if !is_safe_component(&workspace.item_prefix) {
        return Err(invalid("workspace.item_prefix must be a plain file name"));
    }
    if !is_safe_component(&workspace.report_prefix) {
        return Err(invalid("workspace.report_prefix must be a plain file name"));
    }
    for ext in [&workspace.report_extension, &workspace.durable_extension] {
        if !is_safe_component(ext) || ext.contains('.') {
            return Err(invalid(format!(
                "workspace extension '{}' must be a bare extension",
                ext
            )));
        }
    }
    for name in &workspace.transient {
        if !is_safe_component(name) {
            return Err(invalid(format!(
                "workspace.transient entry '{}' must be a plain file name",
                name
            )));
        }
        if workspace.is_durable(Path::new(name)) {
            return Err(invalid(format!(
                "workspace.transient entry '{}' matches the durable pattern *.{}",
                name, workspace.durable_extension
            )));
        }
    }

    if config.supervisor.connect_timeout_secs == 0 {
        return Err(invalid("supervisor.connect_timeout_secs cannot be 0"));
    }

    for (role, worker) in [
        ("fetch", &config.workers.fetch),
        ("test", &config.workers.test),
        ("report", &config.workers.report),
    ] {
        validate_worker(role, worker)?;
    }

    Ok(())
}

fn validate_worker(role: &str, worker: &WorkerConfig) -> Result<(), ConfigError> {
    if worker.max_steps == 0 {
        return Err(invalid(format!("workers.{}.max_steps cannot be 0", role)));
    }

    let mut seen = HashSet::new();
    for server in &worker.servers {
        if server.name.trim().is_empty() || server.name.contains('.') {
            return Err(invalid(format!(
                "workers.{}: server name '{}' must be non-empty and contain no '.'",
                role, server.name
            )));
        }
        if server.name == "local" {
            return Err(invalid(format!(
                "workers.{}: server name 'local' is reserved",
                role
            )));
        }
        if !seen.insert(server.name.as_str()) {
            return Err(invalid(format!(
                "workers.{}: duplicate server name '{}'",
                role, server.name
            )));
        }
        if server.command.trim().is_empty() {
            return Err(invalid(format!(
                "workers.{}: server '{}' has an empty command",
                role, server.name
            )));
        }
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}
