//! Pipeline configuration.

use serde::{Deserialize, Serialize};

use crate::error::{FlywheelError, Result};

/// Default number of undelivered states at which a subscriber is reported
/// as falling behind.
pub const DEFAULT_BACKLOG_WARNING: usize = 1024;

/// Tunables for one combiner's pipeline.
///
/// # Example
///
/// ```ignore
/// let config = PipelineConfig::default()
///     .with_label("counter")
///     .with_backlog_warning(64);
///
/// let pipeline = Pipeline::with_config(CounterState::default(), config)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// How many undelivered states a subscriber may hold before a `warn` is
    /// logged. Subscribers never skip states; this only flags slow readers.
    pub backlog_warning: usize,

    /// Upper bound on the stub's action log. `None` keeps every action.
    ///
    /// With a limit set the log keeps only the newest entries, so it no
    /// longer holds every action sent. Meant for long-running tests.
    pub action_log_limit: Option<usize>,

    /// Name attached to log events for this pipeline.
    pub label: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backlog_warning: DEFAULT_BACKLOG_WARNING,
            action_log_limit: None,
            label: None,
        }
    }
}

impl PipelineConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_backlog_warning(mut self, backlog: usize) -> Self {
        self.backlog_warning = backlog;
        self
    }

    pub fn with_action_log_limit(mut self, limit: usize) -> Self {
        self.action_log_limit = Some(limit);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Check the invariants the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        if self.backlog_warning == 0 {
            return Err(FlywheelError::InvalidConfig(
                "backlog_warning must be greater than zero".to_string(),
            ));
        }
        if self.action_log_limit == Some(0) {
            return Err(FlywheelError::InvalidConfig(
                "action_log_limit must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PipelineConfig::from_json(r#"{ "label": "search" }"#).unwrap();

        assert_eq!(config.label.as_deref(), Some("search"));
        assert_eq!(config.backlog_warning, DEFAULT_BACKLOG_WARNING);
        assert_eq!(config.action_log_limit, None);
    }

    #[test]
    fn test_zero_thresholds_are_rejected() {
        let err = PipelineConfig::from_json(r#"{ "backlog_warning": 0 }"#).unwrap_err();
        assert!(matches!(err, FlywheelError::InvalidConfig(_)));

        let err = PipelineConfig::default()
            .with_action_log_limit(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, FlywheelError::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_json_is_a_config_error() {
        let err = PipelineConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, FlywheelError::Config(_)));
    }
}
