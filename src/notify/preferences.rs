//! Per-owner notification preferences.
//!
//! Stored as a JSON document in `notification_preferences`. Owners without a
//! row get [`NotificationPreferences::from_config`], so defaults are always
//! deterministic.

use chrono::{DateTime, Timelike, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::types::{Channel, NotificationPriority};
use crate::config::NotificationsConfig;
use crate::db::ts;
use crate::error::{EngineError, Result};

/// Longest batch window an owner may configure.
pub const MAX_BATCH_WINDOW_SECS: u64 = 24 * 60 * 60;

/// A daily window in UTC hours, `[start_hour, end_hour)`. Wraps past midnight
/// when `start_hour > end_hour`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start_hour: u8,
    pub end_hour: u8,
}

impl QuietHours {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let hour = at.hour() as u8;
        if self.start_hour == self.end_hour {
            false
        } else if self.start_hour < self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPreferences {
    /// Channels to attempt, in order.
    pub channels: Vec<Channel>,
    pub quiet_hours: Option<QuietHours>,
    pub do_not_disturb: bool,
    /// Priorities the owner never wants to receive.
    pub disabled_priorities: Vec<NotificationPriority>,
    pub batching_enabled: bool,
    pub batch_window_secs: u64,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self::from_config(&NotificationsConfig::default())
    }
}

impl NotificationPreferences {
    pub fn from_config(config: &NotificationsConfig) -> Self {
        let quiet_hours = (config.quiet_hours_start != config.quiet_hours_end).then_some(QuietHours {
            start_hour: config.quiet_hours_start,
            end_hour: config.quiet_hours_end,
        });
        Self {
            channels: config.channels.clone(),
            quiet_hours,
            do_not_disturb: false,
            disabled_priorities: Vec::new(),
            batching_enabled: config.batching_enabled,
            batch_window_secs: config.batch_window_secs,
        }
    }

    pub fn allows_priority(&self, priority: NotificationPriority) -> bool {
        !self.disabled_priorities.contains(&priority)
    }

    pub fn in_quiet_hours(&self, at: DateTime<Utc>) -> bool {
        self.quiet_hours.is_some_and(|q| q.contains(at))
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(q) = self.quiet_hours {
            if q.start_hour > 23 || q.end_hour > 23 {
                return Err(EngineError::validation(
                    "quiet hours must be between 0 and 23",
                ));
            }
        }
        if self.batching_enabled && self.batch_window_secs == 0 {
            return Err(EngineError::validation(
                "batch window must be positive when batching is enabled",
            ));
        }
        if self.batch_window_secs > MAX_BATCH_WINDOW_SECS {
            return Err(EngineError::validation(format!(
                "batch window must be at most {MAX_BATCH_WINDOW_SECS} seconds"
            )));
        }
        Ok(())
    }
}

/// Stored preferences for an owner, or `None` when they have never set any.
pub fn get_preferences(conn: &Connection, owner: &str) -> Result<Option<NotificationPreferences>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT preferences FROM notification_preferences WHERE owner = ?1",
            params![owner],
            |row| row.get(0),
        )
        .optional()?;

    match raw {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// Insert or replace an owner's preferences.
pub fn set_preferences(
    conn: &Connection,
    owner: &str,
    prefs: &NotificationPreferences,
    now: DateTime<Utc>,
) -> Result<()> {
    prefs.validate()?;
    let json = serde_json::to_string(prefs)?;
    conn.execute(
        "INSERT INTO notification_preferences (owner, preferences, updated_at) \
         VALUES (?1, ?2, ?3) \
         ON CONFLICT(owner) DO UPDATE SET preferences = excluded.preferences, \
         updated_at = excluded.updated_at",
        params![owner, json, ts(now)],
    )?;
    Ok(())
}

pub fn delete_preferences(conn: &Connection, owner: &str) -> Result<bool> {
    let rows = conn.execute(
        "DELETE FROM notification_preferences WHERE owner = ?1",
        params![owner],
    )?;
    Ok(rows > 0)
}
