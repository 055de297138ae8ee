pub mod parse;
pub mod types;

use regex::Regex;
use std::sync::OnceLock;

pub use parse::{is_valid_identifier, load_config, parse_config, validate_config, ConfigError};
pub use types::{BatchConfig, EventsConfig, HttpConfig, SubmitConfig, WriterConfig};

fn env_var_regex() -> &'static Regex {
    static ENV_VAR: OnceLock<Regex> = OnceLock::new();
    // Matches $env{VAR_NAME} where VAR_NAME starts with a letter or underscore
    #[allow(clippy::expect_used)]
    ENV_VAR.get_or_init(|| {
        Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var regex is valid")
    })
}

/// Expands environment variables in a string.
/// Supports $env{VAR_NAME} syntax.
/// If an environment variable is not set, it's left unchanged.
pub fn expand_env_vars(text: &str) -> String {
    env_var_regex()
        .replace_all(text, |caps: &regex::Captures| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            match caps.get(1) {
                Some(name) => std::env::var(name.as_str()).unwrap_or_else(|_| whole.to_string()),
                None => whole.to_string(),
            }
        })
        .to_string()
}

/// Names of `$env{...}` references still present in `text`.
pub(crate) fn unexpanded_env_vars(text: &str) -> Vec<String> {
    env_var_regex()
        .captures_iter(text)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect()
}
