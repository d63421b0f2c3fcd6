//! Layered configuration.
//!
//! Built-in defaults are overlaid with an optional YAML file and then with
//! `AUTHGRANT__SECTION__KEY=value` environment variables. The merged tree is
//! validated once and frozen behind an [`Arc`].

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use authgrant_core_types::{AuthSettings, NotificationSettings};

const ENV_PREFIX: &str = "AUTHGRANT__";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error on {path}: {message}")]
    Io { path: PathBuf, message: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("unsupported configuration path: {0}")]
    UnsupportedPath(String),
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `authgrant_policy=debug,info`.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthgrantConfig {
    pub core: AuthSettings,
    pub logging: LoggingConfig,
    pub notifications: NotificationSettings,
}

impl AuthgrantConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.core.auth_server_url.trim();
        if url.is_empty() {
            return Err(ConfigError::Invalid("core.auth_server_url is empty".into()));
        }
        if url.contains("://") || url.contains(char::is_whitespace) {
            return Err(ConfigError::Invalid(format!(
                "core.auth_server_url must be a bare host, got '{url}'"
            )));
        }
        EnvFilter::try_new(&self.logging.level).map_err(|err| {
            ConfigError::Invalid(format!("logging.level '{}': {err}", self.logging.level))
        })?;
        if self.notifications.email_enabled && self.notifications.sender.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "notifications.sender is required when email is enabled".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct LoadOptions {
    pub path: Option<PathBuf>,
    pub include_env: bool,
}

/// Loads the configuration from `path` (if given) and the process
/// environment.
pub fn load_config(path: Option<&Path>) -> Result<Arc<AuthgrantConfig>, ConfigError> {
    load_config_with_options(&LoadOptions {
        path: path.map(Path::to_path_buf),
        include_env: true,
    })
}

pub fn load_config_with_options(options: &LoadOptions) -> Result<Arc<AuthgrantConfig>, ConfigError> {
    let mut tree = serde_json::to_value(AuthgrantConfig::default())
        .map_err(|err| ConfigError::Invalid(err.to_string()))?;

    if let Some(path) = &options.path {
        for (key, value) in overlays_from_file(path)? {
            apply_overlay(&mut tree, &key, value)?;
        }
    }
    if options.include_env {
        for (key, value) in overlays_from_env(env::vars()) {
            apply_overlay(&mut tree, &key, value)?;
        }
    }

    let config: AuthgrantConfig =
        serde_json::from_value(tree).map_err(|err| ConfigError::Invalid(err.to_string()))?;
    config.validate()?;
    Ok(Arc::new(config))
}

fn overlays_from_file(path: &Path) -> Result<Vec<(String, Value)>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|err| ConfigError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|err| ConfigError::Invalid(err.to_string()))?;
    let json = serde_json::to_value(yaml).map_err(|err| ConfigError::Invalid(err.to_string()))?;
    match json {
        Value::Object(_) => Ok(flatten(json, None)),
        Value::Null => Ok(Vec::new()),
        _ => Err(ConfigError::Invalid(format!(
            "{} must contain a mapping",
            path.display()
        ))),
    }
}

fn overlays_from_env<I>(vars: I) -> Vec<(String, Value)>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut overlays: Vec<(String, Value)> = vars
        .into_iter()
        .filter_map(|(key, raw)| {
            let stripped = key.strip_prefix(ENV_PREFIX)?;
            let path = stripped
                .split("__")
                .filter(|segment| !segment.is_empty())
                .map(|segment| segment.to_ascii_lowercase())
                .collect::<Vec<_>>()
                .join(".");
            (!path.is_empty()).then(|| (path, parse_env_value(&raw)))
        })
        .collect();
    overlays.sort_by(|a, b| a.0.cmp(&b.0));
    overlays
}

fn parse_env_value(raw: &str) -> Value {
    if let Ok(boolean) = raw.parse::<bool>() {
        return Value::Bool(boolean);
    }
    if let Ok(int_val) = raw.parse::<i64>() {
        return Value::Number(int_val.into());
    }
    Value::String(raw.to_string())
}

fn flatten(value: Value, prefix: Option<String>) -> Vec<(String, Value)> {
    match value {
        Value::Object(map) => map
            .into_iter()
            .flat_map(|(key, value)| {
                let segment = key.trim().to_ascii_lowercase();
                let next = match &prefix {
                    Some(prefix) => format!("{prefix}.{segment}"),
                    None => segment,
                };
                flatten(value, Some(next))
            })
            .collect(),
        other => prefix.map(|path| vec![(path, other)]).unwrap_or_default(),
    }
}

/// Sets a dotted path in the defaults tree. Only keys the defaults already
/// define may be set.
fn apply_overlay(tree: &mut Value, path: &str, value: Value) -> Result<(), ConfigError> {
    let mut node = tree;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let map: &mut Map<String, Value> = match node {
            Value::Object(map) => map,
            _ => return Err(ConfigError::UnsupportedPath(path.to_string())),
        };
        let slot = map
            .get_mut(segment)
            .ok_or_else(|| ConfigError::UnsupportedPath(path.to_string()))?;
        if segments.peek().is_none() {
            *slot = coerce(slot, value);
            return Ok(());
        }
        node = slot;
    }
    Err(ConfigError::UnsupportedPath(path.to_string()))
}

/// Environment values arrive as text; keep string-typed keys strings even
/// when the text looks like a number or boolean.
fn coerce(current: &Value, value: Value) -> Value {
    match (current, value) {
        (Value::String(_), Value::Bool(b)) => Value::String(b.to_string()),
        (Value::String(_), Value::Number(n)) => Value::String(n.to_string()),
        (_, value) => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_dotted_paths() {
        let overlays = overlays_from_env(vec![
            ("AUTHGRANT__CORE__AUTH_SERVER_URL".to_string(), "auth.example.org".to_string()),
            ("AUTHGRANT__LOGGING__JSON".to_string(), "true".to_string()),
            ("OTHER__CORE__AUTH_SERVER_URL".to_string(), "ignored".to_string()),
        ]);
        assert_eq!(
            overlays,
            vec![
                ("core.auth_server_url".to_string(), Value::String("auth.example.org".into())),
                ("logging.json".to_string(), Value::Bool(true)),
            ]
        );
    }

    #[test]
    fn unknown_paths_are_rejected() {
        let mut tree = serde_json::to_value(AuthgrantConfig::default()).unwrap();
        let err = apply_overlay(&mut tree, "core.nope", Value::Bool(true)).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedPath(path) if path == "core.nope"));
    }

    #[test]
    fn string_keys_stay_strings() {
        let mut tree = serde_json::to_value(AuthgrantConfig::default()).unwrap();
        apply_overlay(&mut tree, "notifications.sender", Value::Number(42.into())).unwrap();
        assert_eq!(tree["notifications"]["sender"], Value::String("42".into()));
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut config = AuthgrantConfig::default();
        assert!(config.validate().is_ok());

        config.core.auth_server_url = "https://auth.example.org".into();
        assert!(config.validate().is_err());

        config = AuthgrantConfig::default();
        config.notifications.sender = " ".into();
        assert!(config.validate().is_err());
        config.notifications.email_enabled = false;
        assert!(config.validate().is_ok());
    }
}
