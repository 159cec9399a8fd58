// Bus configuration: defaults, TOML file and environment overrides
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::schema::SchemaRegistry;
use crate::{BusError, Result};

pub const DEFAULT_QUEUE_LENGTH: usize = 10;
pub const DEFAULT_FAILURE_BUFFER: usize = 64;

/// Construction options for [`EventBus`](crate::EventBus).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Capacity of the request queue; callers wait when it is full.
    pub queue_length: usize,
    /// Capacity of the delivery-failure broadcast channel.
    pub failure_buffer: usize,
    /// Topic schemas; `None` builds an unchecked bus.
    pub schema: Option<SchemaRegistry>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_length: DEFAULT_QUEUE_LENGTH,
            failure_buffer: DEFAULT_FAILURE_BUFFER,
            schema: None,
        }
    }
}

impl BusConfig {
    pub fn with_queue_length(mut self, length: usize) -> Self {
        self.queue_length = length;
        self
    }

    pub fn with_failure_buffer(mut self, capacity: usize) -> Self {
        self.failure_buffer = capacity;
        self
    }

    pub fn with_schema(mut self, schema: SchemaRegistry) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Defaults overlaid with `EVENTUALLY_QUEUE_LENGTH` / `EVENTUALLY_FAILURE_BUFFER`.
    pub fn from_env() -> Self {
        Self::default().overlay_env(|key| std::env::var(key).ok())
    }

    /// Load configuration from a TOML file, overlaying values onto defaults and
    /// then the environment. A missing file yields the env-driven defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(target: "config", path = %path.display(), "No TOML config found; using defaults/env");
            return Ok(Self::from_env());
        }
        let raw = fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&raw)?.overlay_env(|key| std::env::var(key).ok()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    fn overlay_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_positive(&lookup, "EVENTUALLY_QUEUE_LENGTH") {
            self.queue_length = v;
        }
        if let Some(v) = parse_positive(&lookup, "EVENTUALLY_FAILURE_BUFFER") {
            self.failure_buffer = v;
        }
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.queue_length == 0 {
            return Err(BusError::ConfigError(
                "queue_length must be positive".into(),
            ));
        }
        if self.failure_buffer == 0 {
            return Err(BusError::ConfigError(
                "failure_buffer must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn parse_positive<F>(lookup: &F, key: &str) -> Option<usize>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).filter(|s| !s.is_empty())?;
    match raw.parse::<usize>() {
        Ok(v) if v > 0 => Some(v),
        _ => {
            tracing::warn!(target: "config", key, value = %raw, "Ignoring invalid value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ArgType;

    #[test]
    fn test_defaults() {
        let cfg = BusConfig::default();
        assert_eq!(cfg.queue_length, 10);
        assert_eq!(cfg.failure_buffer, 64);
        assert!(cfg.schema.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_zero_queue_length_is_rejected() {
        let cfg = BusConfig::default().with_queue_length(0);
        assert!(matches!(cfg.validate(), Err(BusError::ConfigError(_))));
        let cfg = BusConfig::default().with_failure_buffer(0);
        assert!(matches!(cfg.validate(), Err(BusError::ConfigError(_))));
    }

    #[test]
    fn test_toml_overlays_defaults() {
        let cfg = BusConfig::from_toml_str(
            r#"
            queue_length = 32

            [schema]
            hello = ["string", "int"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.queue_length, 32);
        assert_eq!(cfg.failure_buffer, DEFAULT_FAILURE_BUFFER);
        let schema = cfg.schema.unwrap();
        assert_eq!(
            schema.declared("hello"),
            Some(&[ArgType::Str, ArgType::Int][..])
        );
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        assert!(matches!(
            BusConfig::from_toml_str("queue_length = \"many\""),
            Err(BusError::ParseError(_))
        ));
    }

    #[test]
    fn test_env_overlay_ignores_invalid_values() {
        let cfg = BusConfig::default().overlay_env(|key| match key {
            "EVENTUALLY_QUEUE_LENGTH" => Some("4".into()),
            "EVENTUALLY_FAILURE_BUFFER" => Some("zero".into()),
            _ => None,
        });
        assert_eq!(cfg.queue_length, 4);
        assert_eq!(cfg.failure_buffer, DEFAULT_FAILURE_BUFFER);

        let cfg = BusConfig::default().overlay_env(|_| Some("0".into()));
        assert_eq!(cfg.queue_length, DEFAULT_QUEUE_LENGTH);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = BusConfig::load("/nonexistent/eventually.toml").unwrap();
        assert!(cfg.queue_length > 0);
        assert!(cfg.schema.is_none());
    }
}
