//! Three-level escalation for triggered reminders.
//!
//! Level 1 goes out when a reminder triggers. Each later level is requested
//! by a scheduled re-check one interval after the previous level, and only if
//! the store still shows the reminder as triggered by the same trigger.
//! Nothing follows level 3.
//!
//! The re-check always re-reads the store, so completing, snoozing or deleting
//! a reminder is observed by any re-check already in flight.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;

use crate::db::{with_conn, Db};
use crate::error::Result;
use crate::notify::types::{Notification, NotificationPriority, SendOutcome};
use crate::notify::Pipeline;
use crate::reminder::store;
use crate::reminder::types::{LocationReminder, LocationStatus, Reminder, ReminderPriority};
use crate::timer::{TaskKey, Timer};

pub const MAX_LEVEL: u8 = 3;

/// Minutes between repeats requested by a level 3 notification.
pub const REPEAT_EVERY_MINUTES: u32 = 5;

/// Upper bound on the gap between levels: one day.
pub const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// The gap between levels for a configured number of seconds, clamped to
/// `1..=MAX_INTERVAL_SECS`.
pub fn interval_from_secs(secs: u64) -> Duration {
    let secs = secs.clamp(1, MAX_INTERVAL_SECS);
    Duration::seconds(i64::try_from(secs).unwrap_or(1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertSource {
    Reminder,
    Location,
}

/// The triggered entity being escalated.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: String,
    pub source: AlertSource,
    pub owner: String,
    pub title: String,
    pub description: String,
    pub priority: ReminderPriority,
    pub triggered_at: DateTime<Utc>,
}

impl Alert {
    /// `None` for a reminder that has not been triggered.
    pub fn from_reminder(reminder: &Reminder) -> Option<Self> {
        Some(Self {
            id: reminder.id.clone(),
            source: AlertSource::Reminder,
            owner: reminder.owner.clone(),
            title: reminder.title.clone(),
            description: reminder.description.clone(),
            priority: reminder.priority,
            triggered_at: reminder.triggered_at?,
        })
    }

    pub fn from_location(reminder: &LocationReminder) -> Option<Self> {
        Some(Self {
            id: reminder.id.clone(),
            source: AlertSource::Location,
            owner: reminder.owner.clone(),
            title: reminder.title.clone(),
            description: reminder.description.clone(),
            priority: ReminderPriority::default(),
            triggered_at: reminder.triggered_at?,
        })
    }

    fn kind(&self) -> &'static str {
        match self.source {
            AlertSource::Reminder => "reminder",
            AlertSource::Location => "location_reminder",
        }
    }
}

/// Per-alert escalation progress. Written only by the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct EscalationState {
    pub alert: Alert,
    pub level: u8,
    pub last_requested_at: DateTime<Utc>,
}

/// What a re-check decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationStep {
    /// The reminder is still unacknowledged; this level was requested.
    Escalate(u8),
    /// Acknowledged, re-triggered, cancelled, or already at the last level.
    SkipTerminal,
    /// The reminder no longer exists.
    SkipNotFound,
}

/// The notification for one level of an alert.
pub fn level_notification(alert: &Alert, level: u8) -> Notification {
    let (priority, style) = match level {
        1 => (alert.priority.notification_priority(), "visual"),
        2 => (NotificationPriority::High, "audible"),
        _ => (NotificationPriority::High, "repeated"),
    };
    let body = if alert.description.is_empty() {
        alert.title.as_str()
    } else {
        alert.description.as_str()
    };

    let mut payload = json!({
        "reminder_id": alert.id,
        "escalation_level": level,
        "style": style,
    });
    if level >= MAX_LEVEL {
        payload["repeat_every_minutes"] = json!(REPEAT_EVERY_MINUTES);
    }

    Notification::new(alert.kind(), &alert.title, body, priority)
        .with_source(&alert.id)
        .with_payload(payload)
}

#[derive(Clone)]
pub struct EscalationController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    db: Db,
    timer: Timer,
    pipeline: Pipeline,
    interval: Duration,
    states: DashMap<String, EscalationState>,
}

impl EscalationController {
    pub fn new(db: Db, timer: Timer, pipeline: Pipeline, interval: Duration) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                db,
                timer,
                pipeline,
                interval,
                states: DashMap::new(),
            }),
        }
    }

    /// Start escalating a freshly triggered alert: request level 1 and
    /// schedule the first re-check. Replaces any earlier escalation of the
    /// same id.
    pub async fn begin(&self, alert: Alert) {
        let now = self.inner.timer.clock().now();
        let id = alert.id.clone();
        self.inner.states.insert(
            id.clone(),
            EscalationState {
                alert: alert.clone(),
                level: 1,
                last_requested_at: now,
            },
        );

        tracing::info!(reminder_id = %id, owner = %alert.owner, level = 1, "escalation started");
        self.request(&alert, 1).await;
        self.schedule_recheck(&id, now);
    }

    /// Rebuild escalation for an alert that triggered before this process
    /// started. Level 1 went out at `triggered_at`; the next re-check runs one
    /// interval after that, or right away if that moment has already passed.
    /// Returns `false` when the alert is already being escalated here.
    pub fn resume(&self, alert: Alert) -> bool {
        if self.inner.states.contains_key(&alert.id) {
            return false;
        }
        let now = self.inner.timer.clock().now();
        let id = alert.id.clone();
        let next_check = (alert.triggered_at + self.inner.interval).max(now);
        tracing::info!(reminder_id = %id, owner = %alert.owner, next_check = %next_check, "escalation resumed");

        self.inner.states.insert(
            id.clone(),
            EscalationState {
                last_requested_at: alert.triggered_at,
                alert,
                level: 1,
            },
        );
        self.schedule_recheck_at(&id, next_check);
        true
    }

    /// How long after a trigger an unacknowledged alert still has levels to
    /// send. Startup resumes alerts inside this window.
    pub fn window(&self) -> Duration {
        self.inner.interval * i32::from(MAX_LEVEL)
    }

    /// Run the re-check for `id` now.
    pub async fn recheck(&self, id: &str) -> Result<EscalationStep> {
        let Some(state) = self.inner.states.get(id).map(|s| s.clone()) else {
            tracing::debug!(reminder_id = %id, "no escalation in progress");
            return Ok(EscalationStep::SkipTerminal);
        };

        let source = state.alert.source;
        let key = id.to_string();
        let current = with_conn(&self.inner.db, move |conn| match source {
            AlertSource::Reminder => Ok(store::get_reminder(conn, &key)?
                .map(|r| (r.status.is_acknowledged(), r.triggered_at))),
            AlertSource::Location => Ok(store::get_location_reminder(conn, &key)?
                .map(|r| (r.status != LocationStatus::Triggered, r.triggered_at))),
        })
        .await?;

        let step = match current {
            None => EscalationStep::SkipNotFound,
            Some((acknowledged, triggered_at)) => {
                let retriggered = triggered_at != Some(state.alert.triggered_at);
                if acknowledged || retriggered || state.level >= MAX_LEVEL {
                    EscalationStep::SkipTerminal
                } else {
                    EscalationStep::Escalate(state.level + 1)
                }
            }
        };

        match step {
            EscalationStep::Escalate(level) => {
                let now = self.inner.timer.clock().now();
                // A concurrent cancel may have cleared the state since we read it.
                let still_active = match self.inner.states.get_mut(id) {
                    Some(mut s) if s.alert.triggered_at == state.alert.triggered_at => {
                        s.level = level;
                        s.last_requested_at = now;
                        true
                    }
                    _ => false,
                };
                if !still_active {
                    return Ok(EscalationStep::SkipTerminal);
                }

                tracing::info!(reminder_id = %id, owner = %state.alert.owner, level, "escalating");
                self.request(&state.alert, level).await;
                if level < MAX_LEVEL {
                    self.schedule_recheck(id, now);
                }
            }
            EscalationStep::SkipTerminal | EscalationStep::SkipNotFound => {
                tracing::debug!(reminder_id = %id, step = ?step, "escalation stopped");
                self.inner
                    .states
                    .remove_if(id, |_, s| s.alert.triggered_at == state.alert.triggered_at);
            }
        }
        Ok(step)
    }

    /// Stop escalating `id`: drop its state and any pending re-check.
    pub fn cancel(&self, id: &str) {
        self.inner
            .timer
            .cancel(&TaskKey::EscalationCheck(id.to_string()));
        if self.inner.states.remove(id).is_some() {
            tracing::debug!(reminder_id = %id, "escalation cancelled");
        }
    }

    /// Highest level requested so far for `id`.
    pub fn level(&self, id: &str) -> Option<u8> {
        self.inner.states.get(id).map(|s| s.level)
    }

    pub fn active_count(&self) -> usize {
        self.inner.states.len()
    }

    async fn request(&self, alert: &Alert, level: u8) {
        let notification = level_notification(alert, level);
        match self.inner.pipeline.send(&alert.owner, notification).await {
            Ok(SendOutcome::Sent { channels }) => {
                tracing::debug!(reminder_id = %alert.id, level, channels = channels.len(), "level sent")
            }
            Ok(outcome) => {
                tracing::debug!(reminder_id = %alert.id, level, outcome = ?outcome, "level not sent immediately")
            }
            // Escalation is driven by elapsed time, so a failed level does
            // not stop the next one.
            Err(e) => tracing::error!(reminder_id = %alert.id, level, error = %e, "escalation level failed"),
        }
    }

    fn schedule_recheck(&self, id: &str, from: DateTime<Utc>) {
        self.schedule_recheck_at(id, from + self.inner.interval);
    }

    fn schedule_recheck_at(&self, id: &str, at: DateTime<Utc>) {
        let controller = self.clone();
        let key = id.to_string();
        self.inner.timer.schedule_at(
            TaskKey::EscalationCheck(id.to_string()),
            at,
            async move {
                if let Err(e) = controller.recheck(&key).await {
                    tracing::error!(reminder_id = %key, error = %e, "escalation re-check failed");
                }
            },
        );
    }
}
