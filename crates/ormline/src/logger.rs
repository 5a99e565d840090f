//! Statement logging.

use crate::config::{LogLevel, LoggerConfig};
use ormline_core::{Error, Value};
use std::time::Duration;

/// Emits one tracing event per executed statement.
#[derive(Debug, Clone, Copy)]
pub struct SqlLogger<'a> {
    config: &'a LoggerConfig,
}

impl<'a> SqlLogger<'a> {
    pub fn new(config: &'a LoggerConfig) -> Self {
        Self { config }
    }

    pub fn trace(
        &self,
        elapsed: Duration,
        sql: &str,
        vars: &[Value],
        rows_affected: u64,
        error: Option<&Error>,
    ) {
        let level = self.config.level;
        if level == LogLevel::Silent || sql.is_empty() {
            return;
        }
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let failed =
            error.filter(|e| !(self.config.ignore_record_not_found && e.is_record_not_found()));

        if let Some(e) = failed {
            if level >= LogLevel::Error {
                tracing::error!(
                    target: "ormline::sql",
                    sql = %sql,
                    vars = ?vars,
                    rows_affected,
                    elapsed_ms,
                    error = %e,
                    "statement failed"
                );
            }
        } else if self.config.slow_threshold_ms > 0
            && elapsed > Duration::from_millis(self.config.slow_threshold_ms)
            && level >= LogLevel::Warn
        {
            tracing::warn!(
                target: "ormline::sql",
                sql = %sql,
                vars = ?vars,
                rows_affected,
                elapsed_ms,
                threshold_ms = self.config.slow_threshold_ms,
                "slow statement"
            );
        } else if level == LogLevel::Info {
            tracing::info!(
                target: "ormline::sql",
                sql = %sql,
                vars = ?vars,
                rows_affected,
                elapsed_ms,
                "statement"
            );
        }
    }
}
