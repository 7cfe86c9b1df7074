use std::path::Path;

use config::{Config, File, FileFormat};
use serde::Deserialize;

use crate::error::{Result, VotingError};
use crate::window::{VoteWindow, WindowPolicy};

/// Rollover window applied to anonymous votes when none is configured.
/// Matches the historical one-day default.
pub const DEFAULT_ANONYMOUS_WINDOW: i64 = 86_400;

#[derive(Debug, Clone, Deserialize)]
pub struct VotingConfig {
    pub database: DatabaseConfig,
    pub voting: VotingSettings,
}

impl VotingConfig {
    pub fn load() -> Result<Self> {
        let configured_path = std::env::var("VOTETALLY_CONFIG")
            .unwrap_or_else(|_| "config/votetally.toml".to_string());
        assert!(
            !configured_path.is_empty(),
            "Configuration path must be non-empty"
        );
        assert!(
            configured_path.len() < 4096,
            "Configuration path length exceeds hard limit"
        );

        let mut builder = Config::builder()
            .add_source(File::new(&configured_path, FileFormat::Toml).required(true));

        if let Ok(env_override) = std::env::var("VOTETALLY_ENV") {
            if !env_override.is_empty() {
                let env_file = format!("config/votetally.{}.toml", env_override);
                if Path::new(&env_file).exists() {
                    builder = builder.add_source(File::new(&env_file, FileFormat::Toml));
                }
            }
        }

        let settings = builder
            .build()
            .map_err(|err| VotingError::Configuration(err.to_string()))?;
        let config: Self = settings
            .try_deserialize()
            .map_err(|err| VotingError::Configuration(err.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(VotingError::Configuration(
                "database URL must be specified".to_string(),
            ));
        }
        assert!(
            self.database.max_connections >= self.database.min_connections.unwrap_or(1),
            "Max connections must be >= min connections"
        );
        assert!(
            self.database.max_connections <= 128,
            "Connection pool oversized"
        );
        self.voting.window_policy()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VotingSettings {
    #[serde(default = "VotingSettings::default_anonymous_window")]
    pub anonymous_window: i64,
    #[serde(default = "VotingSettings::default_user_window")]
    pub user_window: i64,
    #[serde(default)]
    pub calculation_schedule: CalculationSchedule,
}

impl VotingSettings {
    /// Fails fast on window values outside {-1, 0, positive seconds}.
    pub fn window_policy(&self) -> Result<WindowPolicy> {
        let anonymous_window = VoteWindow::from_seconds(self.anonymous_window)?;
        let user_window = VoteWindow::from_seconds(self.user_window)?;
        Ok(WindowPolicy {
            anonymous_window,
            user_window,
        })
    }

    const fn default_anonymous_window() -> i64 {
        DEFAULT_ANONYMOUS_WINDOW
    }

    const fn default_user_window() -> i64 {
        -1
    }
}

impl Default for VotingSettings {
    fn default() -> Self {
        Self {
            anonymous_window: Self::default_anonymous_window(),
            user_window: Self::default_user_window(),
            calculation_schedule: CalculationSchedule::default(),
        }
    }
}

/// When cached results are retallied relative to vote writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalculationSchedule {
    /// Tally results whenever a vote is cast.
    #[default]
    Immediate,
    /// Postpone tallying to an external periodic driver.
    #[serde(alias = "cron")]
    Deferred,
    /// Never tally automatically; the caller manages its own results.
    Manual,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_produce_valid_policy() {
        let settings = VotingSettings::default();
        let policy = settings.window_policy().expect("default windows valid");
        assert_eq!(
            policy.anonymous_window,
            VoteWindow::Seconds(DEFAULT_ANONYMOUS_WINDOW)
        );
        assert_eq!(policy.user_window, VoteWindow::Never);
        assert_eq!(
            settings.calculation_schedule,
            CalculationSchedule::Immediate
        );
    }

    #[test]
    fn schedule_accepts_cron_alias() {
        #[derive(Deserialize)]
        struct Wrapper {
            schedule: CalculationSchedule,
        }
        let parsed: Wrapper = serde_json::from_str(r#"{"schedule":"cron"}"#).unwrap();
        assert_eq!(parsed.schedule, CalculationSchedule::Deferred);
        let parsed: Wrapper = serde_json::from_str(r#"{"schedule":"deferred"}"#).unwrap();
        assert_eq!(parsed.schedule, CalculationSchedule::Deferred);
    }

    #[test]
    fn out_of_domain_window_is_a_configuration_error() {
        let settings = VotingSettings {
            anonymous_window: -2,
            ..VotingSettings::default()
        };
        assert!(matches!(
            settings.window_policy(),
            Err(VotingError::Configuration(_))
        ));
    }
}
