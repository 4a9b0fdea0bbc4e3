//! Optimal delivery time.
//!
//! Critical or urgent notifications go out now. Anything else waits for the
//! end of the owner's current meeting, or until they are available again.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::types::{Notification, NotificationPriority};
use crate::config::NotificationsConfig;
use crate::error::Result;

/// What the calendar and presence lookups know about an owner right now.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Availability {
    pub in_meeting: bool,
    pub meeting_end: Option<DateTime<Utc>>,
    /// Set when a signal other than the calendar (travel, focus mode) says "not now".
    pub unavailable: bool,
    pub next_available: Option<DateTime<Utc>>,
}

impl Availability {
    pub fn available() -> Self {
        Self::default()
    }

    pub fn in_meeting_until(end: Option<DateTime<Utc>>) -> Self {
        Self {
            in_meeting: true,
            meeting_end: end,
            ..Self::default()
        }
    }

    pub fn unavailable_until(next: Option<DateTime<Utc>>) -> Self {
        Self {
            unavailable: true,
            next_available: next,
            ..Self::default()
        }
    }
}

/// Calendar and presence lookup, consumed by the pipeline.
#[async_trait]
pub trait AvailabilitySource: Send + Sync {
    async fn availability(&self, owner: &str) -> Result<Availability>;
}

/// Reports every owner as free. Used when no calendar is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAvailable;

#[async_trait]
impl AvailabilitySource for AlwaysAvailable {
    async fn availability(&self, _owner: &str) -> Result<Availability> {
        Ok(Availability::available())
    }
}

/// Longest fallback deferral, in minutes.
pub const MAX_FALLBACK_MINUTES: i64 = 24 * 60;

/// Fallback deferrals when the end of an unavailable period is unknown.
#[derive(Debug, Clone, Copy)]
pub struct TimingPolicy {
    pub meeting_fallback: Duration,
    pub unavailable_fallback: Duration,
}

impl TimingPolicy {
    /// Fallbacks are clamped to `0..=MAX_FALLBACK_MINUTES`.
    pub fn from_config(config: &NotificationsConfig) -> Self {
        let minutes = |m: i64| Duration::minutes(m.clamp(0, MAX_FALLBACK_MINUTES));
        Self {
            meeting_fallback: minutes(config.meeting_fallback_minutes),
            unavailable_fallback: minutes(config.unavailable_fallback_minutes),
        }
    }
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self::from_config(&NotificationsConfig::default())
    }
}

/// Bypasses timing entirely.
pub fn is_immediate(notification: &Notification) -> bool {
    notification.urgent || notification.priority == NotificationPriority::Critical
}

pub fn optimal_time(
    notification: &Notification,
    availability: &Availability,
    now: DateTime<Utc>,
    policy: &TimingPolicy,
) -> DateTime<Utc> {
    if is_immediate(notification) {
        return now;
    }
    if availability.in_meeting {
        return availability
            .meeting_end
            .unwrap_or(now + policy.meeting_fallback);
    }
    if availability.unavailable {
        return availability
            .next_available
            .unwrap_or(now + policy.unavailable_fallback);
    }
    now
}
