//! Reminder record types.
//!
//! Defines [`Reminder`] (time-triggered), [`LocationReminder`] (geofenced) and
//! their enums. String forms match the SQL `CHECK` constraints in
//! [`crate::db::schema`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::due::parse_due_time;
use crate::error::{EngineError, Result};
use crate::notify::types::NotificationPriority;

macro_rules! sql_enum {
    ($name:ident, $what:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(format!(concat!("unknown ", $what, ": {}"), s)),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderPriority {
    Low,
    #[default]
    Medium,
    High,
}

sql_enum!(ReminderPriority, "priority", {
    Low => "low",
    Medium => "medium",
    High => "high",
});

impl ReminderPriority {
    /// Priority of the first escalation level.
    pub fn notification_priority(&self) -> NotificationPriority {
        match self {
            Self::Low => NotificationPriority::Low,
            Self::Medium => NotificationPriority::Medium,
            Self::High => NotificationPriority::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
}

sql_enum!(Recurrence, "recurrence pattern", {
    None => "none",
    Daily => "daily",
    Weekly => "weekly",
    Monthly => "monthly",
});

impl Recurrence {
    pub fn is_recurring(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Lifecycle: `pending → triggered → completed`, `pending | triggered → snoozed`,
/// `snoozed → triggered` when the new due time passes, and `pending | snoozed →
/// completed`. `completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Pending,
    Triggered,
    Completed,
    /// Waiting like `pending`, re-armed for the snoozed-to time held in
    /// `due_time`. Listed separately so callers can tell the two apart.
    Snoozed,
}

sql_enum!(ReminderStatus, "reminder status", {
    Pending => "pending",
    Triggered => "triggered",
    Completed => "completed",
    Snoozed => "snoozed",
});

impl ReminderStatus {
    /// Completed or snoozed since escalation began.
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, Self::Completed | Self::Snoozed)
    }
}

/// A reminder record, matching the `reminders` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    /// UUID v7 primary key.
    pub id: String,
    pub owner: String,
    pub title: String,
    pub description: String,
    /// Meaningful only while `status` is pending or snoozed.
    pub due_time: DateTime<Utc>,
    pub priority: ReminderPriority,
    pub recurrence: Recurrence,
    pub status: ReminderStatus,
    /// The occurrence this one was generated from, for recurring reminders.
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub snoozed_at: Option<DateTime<Utc>>,
}

impl Reminder {
    pub fn recurring(&self) -> bool {
        self.recurrence.is_recurring()
    }
}

/// Input for [`crate::engine::Engine::create_reminder`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewReminder {
    pub owner: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Textual due time; see [`super::due::parse_due_time`] for accepted forms.
    pub due_time: String,
    #[serde(default)]
    pub priority: ReminderPriority,
    #[serde(default)]
    pub recurrence: Recurrence,
}

impl NewReminder {
    /// Validate the input and build a fresh pending reminder created at `now`.
    pub fn into_reminder(self, now: DateTime<Utc>) -> Result<Reminder> {
        if self.owner.trim().is_empty() {
            return Err(EngineError::validation("owner is required"));
        }
        if self.title.trim().is_empty() {
            return Err(EngineError::validation("title is required"));
        }
        let due_time = parse_due_time(&self.due_time)?;

        Ok(Reminder {
            id: Uuid::now_v7().to_string(),
            owner: self.owner.trim().to_string(),
            title: self.title.trim().to_string(),
            description: self.description,
            due_time,
            priority: self.priority,
            recurrence: self.recurrence,
            status: ReminderStatus::Pending,
            parent_id: None,
            created_at: now,
            triggered_at: None,
            completed_at: None,
            snoozed_at: None,
        })
    }
}

/// A point on the globe in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Where a location reminder points: explicit coordinates or a place name
/// resolved through a [`super::geofence::LocationResolver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetLocation {
    Coordinates(GeoPoint),
    Named(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationStatus {
    Pending,
    Triggered,
}

sql_enum!(LocationStatus, "location reminder status", {
    Pending => "pending",
    Triggered => "triggered",
});

/// A geofenced reminder, matching the `location_reminders` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationReminder {
    pub id: String,
    pub owner: String,
    pub title: String,
    pub description: String,
    /// The place name the target was resolved from, if any.
    pub location_name: Option<String>,
    pub target: GeoPoint,
    /// Trigger radius in meters, always > 0.
    pub radius_m: f64,
    pub status: LocationStatus,
    pub created_at: DateTime<Utc>,
    pub triggered_at: Option<DateTime<Utc>>,
}

/// Input for [`crate::engine::Engine::create_location_reminder`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewLocationReminder {
    pub owner: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub target: TargetLocation,
    /// Falls back to `location.default_radius_m` when absent.
    pub radius_m: Option<f64>,
}

/// A position report pushed by a position source.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionReport {
    pub owner: String,
    pub position: GeoPoint,
}
