//! Handle configuration.

use ormline_core::{ConfigError, Error, Result, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Per-handle settings. Sessions copy and adjust them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run create/update/delete without wrapping them in a transaction
    pub skip_default_transaction: bool,
    /// Build SQL without executing it
    pub dry_run: bool,
    /// Prepare every statement once and reuse it
    pub prepare_stmt: bool,
    /// Permit UPDATE and DELETE without conditions
    pub allow_global_update: bool,
    /// Do not call model lifecycle hooks
    pub skip_hooks: bool,
    pub create: CreateConfig,
    pub logger: LoggerConfig,
    /// Clock for automatic creation and update times
    #[serde(skip)]
    pub now_func: NowFunc,
}

impl Config {
    /// Load a configuration from JSON. Missing keys keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| {
            Error::Config(ConfigError {
                message: format!("invalid configuration: {e}"),
                source: Some(Arc::new(e)),
            })
        })
    }
}

/// Source of the current time, in microseconds since the Unix epoch.
///
/// Defaults to the system clock. Two clocks compare equal only when they
/// are the same function.
#[derive(Clone)]
pub struct NowFunc(Arc<dyn Fn() -> i64 + Send + Sync>);

impl NowFunc {
    pub fn new(f: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// A clock stopped at `micros`.
    pub fn fixed(micros: i64) -> Self {
        Self::new(move || micros)
    }

    pub fn now(&self) -> Value {
        Value::Timestamp((self.0)())
    }
}

impl Default for NowFunc {
    fn default() -> Self {
        Self::new(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| i64::try_from(d.as_micros()).unwrap_or(i64::MAX))
        })
    }
}

impl fmt::Debug for NowFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NowFunc")
    }
}

impl PartialEq for NowFunc {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for NowFunc {}

/// How generated keys come back from INSERT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateConfig {
    /// Use `RETURNING` on dialects that support it
    pub with_returning: bool,
    /// The driver reports the last id of a batch rather than the first
    pub last_insert_id_reversed: bool,
}

impl Default for CreateConfig {
    fn default() -> Self {
        Self {
            with_returning: true,
            last_insert_id_reversed: false,
        }
    }
}

/// Statement log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Silent,
    Error,
    #[default]
    Warn,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub level: LogLevel,
    /// Statements slower than this are logged as warnings
    pub slow_threshold_ms: u64,
    /// Do not log record-not-found as a failure
    pub ignore_record_not_found: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            slow_threshold_ms: 200,
            ignore_record_not_found: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_overrides_only_given_keys() {
        let config = Config::from_json(concat!(
            r#"{"dry_run": true, "logger": {"level": "info"}, "#,
            r#""create": {"last_insert_id_reversed": true}}"#
        ))
        .unwrap();
        assert!(config.dry_run);
        assert!(!config.skip_default_transaction);
        assert_eq!(config.logger.level, LogLevel::Info);
        assert_eq!(config.logger.slow_threshold_ms, 200);
        assert!(config.create.with_returning);
        assert!(config.create.last_insert_id_reversed);
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let err = Config::from_json("{\"dry_run\": 3}").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn clock_is_not_part_of_json() {
        let config = Config {
            now_func: NowFunc::fixed(5),
            ..Config::default()
        };
        assert_eq!(config.now_func.now(), Value::Timestamp(5));
        let text = serde_json::to_string(&config).unwrap();
        assert!(!text.contains("now_func"), "{text}");
        assert!(matches!(Config::default().now_func.now(), Value::Timestamp(t) if t > 0));
    }

    #[test]
    fn levels_are_ordered() {
        assert!(LogLevel::Info > LogLevel::Warn);
        assert!(LogLevel::Error > LogLevel::Silent);
    }
}
