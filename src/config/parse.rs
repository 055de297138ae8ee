use super::types::*;
use crate::config::{expand_env_vars, unexpanded_env_vars};
use regex::Regex;
use std::fs::File;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<WriterConfig, ConfigError> {
    use std::io::Read;

    let mut file = File::open(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut yaml_string = String::new();
    file.read_to_string(&mut yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string)
}

/// Parse and validate a config from a YAML string.
pub fn parse_config(yaml: &str) -> Result<WriterConfig, ConfigError> {
    // Expand environment variables in the YAML string before parsing
    let yaml_string = expand_env_vars(yaml);

    check_unexpanded_vars(&yaml_string)?;

    let config: WriterConfig = serde_yaml::from_str(&yaml_string)?;

    validate_config(&config)?;

    Ok(config)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let mut unexpanded_vars = unexpanded_env_vars(yaml_string);

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    let error_msg = if unexpanded_vars.len() == 1 {
        format!(
            "Environment variable $env{{{0}}} is not set.\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variable: export {0}=...\n\
             2. Replace $env{{{0}}} in the config file with an actual value",
            unexpanded_vars[0]
        )
    } else {
        format!(
            "Environment variables are not set: {}\n\
             \n\
             Set them, or replace the variables in the config file with actual values",
            unexpanded_vars.join(", ")
        )
    };

    Err(ConfigError::Validation(error_msg))
}

fn identifier_regex() -> &'static Regex {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    IDENTIFIER.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\-]+$").expect("identifier regex is valid"))
}

/// Database and measurement identifiers are restricted to `[A-Za-z0-9_-]+`.
pub fn is_valid_identifier(input: &str) -> bool {
    identifier_regex().is_match(input)
}

/// Validate a config that was built programmatically or parsed from YAML.
pub fn validate_config(config: &WriterConfig) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if !is_valid_identifier(&config.database) {
        errors.push(format!(
            "database: '{}' is not a valid identifier (allowed: letters, digits, '_' and '-')",
            config.database
        ));
    }

    if !(config.url.starts_with("http://") || config.url.starts_with("https://")) {
        errors.push(format!(
            "url: '{}' must start with http:// or https://",
            config.url
        ));
    }

    if config.batch.max_lines == 0 {
        errors.push("batch.max_lines must be at least 1".to_string());
    }

    if config.submit.max_in_flight == 0 {
        errors.push("submit.max_in_flight must be at least 1".to_string());
    }

    if config.events.capacity == 0 {
        errors.push("events.capacity must be at least 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}
