//! Rig configuration loading.
//!
//! The rig is described by a single TOML file: tick pacing, run length,
//! and the list of subsystems to register. Loading is a three-step
//! pipeline: read → parse → validate, with the active configuration
//! untouched on any failure.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading the rig configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found or unreadable.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parsing failed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Tick pacing and run length.
#[derive(Debug, Clone, Deserialize)]
pub struct RigSection {
    /// Fixed tick period [ms].
    pub tick_period_ms: u64,
    /// Number of ticks to drive before shutting down.
    pub run_ticks: u64,
}

/// One subsystem to register with the scheduler.
#[derive(Debug, Clone, Deserialize)]
pub struct SubsystemConfig {
    /// Registry name, unique within the rig.
    pub name: String,
    /// Install an idle-hold default command on this subsystem.
    #[serde(default)]
    pub idle_hold: bool,
}

/// Full rig description.
#[derive(Debug, Clone, Deserialize)]
pub struct RigConfig {
    pub rig: RigSection,
    pub subsystems: Vec<SubsystemConfig>,
}

impl RigConfig {
    /// Load and validate a rig configuration from `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        Self::from_toml(&text)
    }

    /// Parse and validate a rig configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: RigConfig =
            toml::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic validation.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if:
    /// - `tick_period_ms` or `run_ticks` is zero
    /// - no subsystems are listed
    /// - a subsystem name is empty or duplicated
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rig.tick_period_ms == 0 {
            return Err(ConfigError::ValidationError(
                "tick_period_ms must be > 0".to_owned(),
            ));
        }
        if self.rig.run_ticks == 0 {
            return Err(ConfigError::ValidationError(
                "run_ticks must be > 0".to_owned(),
            ));
        }
        if self.subsystems.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one subsystem is required".to_owned(),
            ));
        }
        let mut names: Vec<&str> = self.subsystems.iter().map(|s| s.name.as_str()).collect();
        if names.iter().any(|name| name.is_empty()) {
            return Err(ConfigError::ValidationError(
                "subsystem names must not be empty".to_owned(),
            ));
        }
        names.sort_unstable();
        names.dedup();
        if names.len() != self.subsystems.len() {
            return Err(ConfigError::ValidationError(
                "subsystem names must be unique".to_owned(),
            ));
        }
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn rig_toml() -> &'static str {
        r#"
[rig]
tick_period_ms = 20
run_ticks = 250

[[subsystems]]
name = "launcher"

[[subsystems]]
name = "feeder"

[[subsystems]]
name = "chassis"
idle_hold = true
"#
    }

    #[test]
    fn loads_a_valid_config_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(rig_toml().as_bytes()).unwrap();

        let config = RigConfig::load(file.path()).unwrap();
        assert_eq!(config.rig.tick_period_ms, 20);
        assert_eq!(config.rig.run_ticks, 250);
        assert_eq!(config.subsystems.len(), 3);
        assert!(!config.subsystems[0].idle_hold);
        assert!(config.subsystems[2].idle_hold);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = RigConfig::load(Path::new("/nonexistent/rig.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let err = RigConfig::from_toml("{{not toml").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn zero_tick_period_is_rejected() {
        let text = rig_toml().replace("tick_period_ms = 20", "tick_period_ms = 0");
        let err = RigConfig::from_toml(&text).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn duplicate_subsystem_names_are_rejected() {
        let text = rig_toml().replace("name = \"feeder\"", "name = \"launcher\"");
        let err = RigConfig::from_toml(&text).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn empty_subsystem_list_is_rejected() {
        let text = r#"
subsystems = []

[rig]
tick_period_ms = 20
run_ticks = 100
"#;
        let err = RigConfig::from_toml(text).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}
