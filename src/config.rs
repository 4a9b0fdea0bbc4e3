use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::escalation::MAX_INTERVAL_SECS;
use crate::notify::preferences::MAX_BATCH_WINDOW_SECS;
use crate::notify::timing::MAX_FALLBACK_MINUTES;
use crate::notify::types::Channel;
use crate::reminder::due::MAX_SNOOZE_MINUTES;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct NudgeConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
    pub notifications: NotificationsConfig,
    pub location: LocationConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Period of the due sweep and the notification queue sweep.
    pub sweep_interval_secs: u64,
    /// Wait between escalation levels before re-checking acknowledgement.
    pub escalation_interval_secs: u64,
    pub default_snooze_minutes: u32,
}

/// Defaults applied to owners without stored preferences, plus pipeline timing.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Quiet hours start (0-23, UTC). Equal start and end disables quiet hours.
    pub quiet_hours_start: u8,
    pub quiet_hours_end: u8,
    pub channels: Vec<Channel>,
    pub batching_enabled: bool,
    pub batch_window_secs: u64,
    /// Deferral used when the owner is in a meeting with no known end.
    pub meeting_fallback_minutes: i64,
    /// Deferral used when the owner is unavailable with no known return.
    pub unavailable_fallback_minutes: i64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LocationConfig {
    pub default_radius_m: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_nudge_dir()
            .join("nudge.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            escalation_interval_secs: 300,
            default_snooze_minutes: 10,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            quiet_hours_start: 22,
            quiet_hours_end: 7,
            channels: vec![Channel::Push, Channel::InApp],
            batching_enabled: false,
            batch_window_secs: 300,
            meeting_fallback_minutes: 15,
            unavailable_fallback_minutes: 30,
        }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            default_radius_m: 100.0,
        }
    }
}

/// Returns `~/.nudge/`
pub fn default_nudge_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".nudge")
}

/// Returns the default config file path: `~/.nudge/config.toml`
pub fn default_config_path() -> PathBuf {
    default_nudge_dir().join("config.toml")
}

impl NudgeConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            NudgeConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides (NUDGE_DB, NUDGE_LOG_LEVEL, NUDGE_SWEEP_SECS).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("NUDGE_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("NUDGE_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("NUDGE_SWEEP_SECS") {
            match val.parse() {
                Ok(secs) => self.scheduler.sweep_interval_secs = secs,
                Err(_) => tracing::warn!(value = %val, "ignoring invalid NUDGE_SWEEP_SECS"),
            }
        }
    }

    fn validate(&self) -> Result<()> {
        let n = &self.notifications;
        anyhow::ensure!(
            n.quiet_hours_start < 24 && n.quiet_hours_end < 24,
            "quiet hours must be between 0 and 23"
        );
        anyhow::ensure!(
            self.scheduler.sweep_interval_secs > 0,
            "scheduler.sweep_interval_secs must be positive"
        );
        anyhow::ensure!(
            (1..=MAX_INTERVAL_SECS).contains(&self.scheduler.escalation_interval_secs),
            "scheduler.escalation_interval_secs must be between 1 and {MAX_INTERVAL_SECS}"
        );
        anyhow::ensure!(
            (1..=MAX_SNOOZE_MINUTES).contains(&self.scheduler.default_snooze_minutes),
            "scheduler.default_snooze_minutes must be between 1 and {MAX_SNOOZE_MINUTES}"
        );
        anyhow::ensure!(
            n.batch_window_secs <= MAX_BATCH_WINDOW_SECS
                && (n.batch_window_secs > 0 || !n.batching_enabled),
            "notifications.batch_window_secs must be between 1 and {MAX_BATCH_WINDOW_SECS}"
        );
        anyhow::ensure!(
            (0..=MAX_FALLBACK_MINUTES).contains(&n.meeting_fallback_minutes)
                && (0..=MAX_FALLBACK_MINUTES).contains(&n.unavailable_fallback_minutes),
            "notification fallback minutes must be between 0 and {MAX_FALLBACK_MINUTES}"
        );
        anyhow::ensure!(
            self.location.default_radius_m > 0.0,
            "location.default_radius_m must be positive"
        );
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = NudgeConfig::default();
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.scheduler.sweep_interval_secs, 60);
        assert_eq!(config.scheduler.escalation_interval_secs, 300);
        assert_eq!(config.notifications.quiet_hours_start, 22);
        assert_eq!(config.notifications.quiet_hours_end, 7);
        assert!(config.storage.db_path.ends_with("nudge.db"));
        config.validate().unwrap();
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[storage]
db_path = "/tmp/test.db"

[notifications]
channels = ["push", "sms", "email"]
batching_enabled = true
"#;
        let config: NudgeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(
            config.notifications.channels,
            vec![Channel::Push, Channel::Sms, Channel::Email]
        );
        assert!(config.notifications.batching_enabled);
        // defaults still apply for unset fields
        assert_eq!(config.notifications.batch_window_secs, 300);
        assert_eq!(config.location.default_radius_m, 100.0);
    }

    #[test]
    fn invalid_quiet_hours_rejected() {
        let mut config = NudgeConfig::default();
        config.notifications.quiet_hours_start = 24;
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_timing_rejected() {
        let cases: [fn(&mut NudgeConfig); 6] = [
            |c| c.scheduler.escalation_interval_secs = 0,
            |c| c.scheduler.escalation_interval_secs = u64::MAX,
            |c| c.scheduler.default_snooze_minutes = u32::MAX,
            |c| c.notifications.batch_window_secs = 100_000_000_000_000,
            |c| c.notifications.meeting_fallback_minutes = i64::MAX,
            |c| c.notifications.unavailable_fallback_minutes = -1,
        ];
        for (i, tweak) in cases.iter().enumerate() {
            let mut config = NudgeConfig::default();
            tweak(&mut config);
            assert!(config.validate().is_err(), "case {i}");
        }

        let mut config = NudgeConfig::default();
        config.scheduler.escalation_interval_secs = MAX_INTERVAL_SECS;
        config.notifications.batch_window_secs = MAX_BATCH_WINDOW_SECS;
        config.validate().unwrap();
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = NudgeConfig::default();
        std::env::set_var("NUDGE_DB", "/tmp/override.db");
        std::env::set_var("NUDGE_LOG_LEVEL", "trace");
        std::env::set_var("NUDGE_SWEEP_SECS", "5");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.scheduler.sweep_interval_secs, 5);

        std::env::remove_var("NUDGE_DB");
        std::env::remove_var("NUDGE_LOG_LEVEL");
        std::env::remove_var("NUDGE_SWEEP_SECS");
    }
}
