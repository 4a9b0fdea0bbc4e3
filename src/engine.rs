//! The reminder and notification engine.
//!
//! [`Engine`] wires the store, the timer, the escalation controller and the
//! notification pipeline together and exposes the operations other
//! in-process components call. Build one with [`Engine::builder`], then call
//! [`Engine::start`] to re-arm timers from the store and start the sweeps.

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::NudgeConfig;
use crate::db::{with_conn, Db};
use crate::error::{EngineError, Result};
use crate::escalation::{self, Alert, EscalationController};
use crate::notify::channel::DeliveryChannel;
use crate::notify::log::{self as delivery_log, DeliveryLog, DeliveryStats};
use crate::notify::preferences::{self, NotificationPreferences};
use crate::notify::timing::{AlwaysAvailable, AvailabilitySource};
use crate::notify::types::{Notification, SendOutcome};
use crate::notify::Pipeline;
use crate::reminder::due::{next_occurrence_after, snooze_until};
use crate::reminder::geofence::{self, LocationResolver};
use crate::reminder::store::{self, Transition};
use crate::reminder::types::{
    GeoPoint, LocationReminder, LocationStatus, NewLocationReminder, NewReminder, PositionReport,
    Reminder, ReminderStatus, TargetLocation,
};
use crate::timer::{TaskKey, Timer};

pub struct EngineBuilder {
    db: Db,
    config: NudgeConfig,
    clock: Arc<dyn Clock>,
    channels: Vec<Arc<dyn DeliveryChannel>>,
    availability: Arc<dyn AvailabilitySource>,
    resolver: Option<Arc<dyn LocationResolver>>,
}

impl EngineBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a transport. A later transport for the same channel kind wins.
    pub fn channel(mut self, channel: Arc<dyn DeliveryChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn availability(mut self, source: Arc<dyn AvailabilitySource>) -> Self {
        self.availability = source;
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn LocationResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn build(self) -> Engine {
        let timer = Timer::new(self.clock);
        let pipeline = Pipeline::new(
            Arc::clone(&self.db),
            timer.clone(),
            self.channels,
            self.availability,
            &self.config.notifications,
        );
        let interval = escalation::interval_from_secs(self.config.scheduler.escalation_interval_secs);
        let escalation =
            EscalationController::new(Arc::clone(&self.db), timer.clone(), pipeline.clone(), interval);

        Engine {
            inner: Arc::new(EngineInner {
                db: self.db,
                config: self.config,
                timer,
                pipeline,
                escalation,
                resolver: self.resolver,
                shutdown: CancellationToken::new(),
                sweeper: Mutex::new(None),
            }),
        }
    }
}

#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    db: Db,
    config: NudgeConfig,
    timer: Timer,
    pipeline: Pipeline,
    escalation: EscalationController,
    resolver: Option<Arc<dyn LocationResolver>>,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EngineError::validation(format!("{field} is required")));
    }
    Ok(())
}

impl Engine {
    pub fn builder(db: Db, config: NudgeConfig) -> EngineBuilder {
        EngineBuilder {
            db,
            config,
            clock: Arc::new(SystemClock),
            channels: Vec::new(),
            availability: Arc::new(AlwaysAvailable),
            resolver: None,
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    pub fn timer(&self) -> &Timer {
        &self.inner.timer
    }

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.inner.timer.clock().now()
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Re-arm timers for future pending/snoozed reminders, resume escalation
    /// for alerts that triggered within the escalation window and are still
    /// unacknowledged, and spawn the periodic due and queue sweeps. Overdue
    /// reminders are left to the first sweep. Returns the number of timers
    /// re-armed, escalation re-checks included.
    pub async fn start(&self) -> Result<usize> {
        let now = self.now();
        let since = now - self.inner.escalation.window();
        let (armed, open, open_locations) = with_conn(&self.inner.db, move |conn| {
            Ok((
                store::list_future_armed(conn, now)?,
                store::list_triggered_since(conn, since)?,
                store::list_location_triggered_since(conn, since)?,
            ))
        })
        .await?;

        let rearmed = armed.len();
        for reminder in armed {
            self.arm(&reminder.id, reminder.due_time);
        }
        let resumed = open
            .iter()
            .filter_map(Alert::from_reminder)
            .chain(open_locations.iter().filter_map(Alert::from_location))
            .map(|alert| self.inner.escalation.resume(alert))
            .filter(|resumed| *resumed)
            .count();
        tracing::info!(rearmed, resumed, "timers restored from store");
        let count = rearmed + resumed;

        let engine = self.clone();
        let cancel = self.inner.shutdown.clone();
        let period = std::time::Duration::from_secs(self.inner.config.scheduler.sweep_interval_secs.max(1));
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = engine.run_due_sweep().await {
                            tracing::error!(error = %e, "due sweep failed");
                        }
                        if let Err(e) = engine.run_queue_sweep().await {
                            tracing::error!(error = %e, "queue sweep failed");
                        }
                    }
                    _ = cancel.cancelled() => {
                        tracing::info!("sweep task shutting down");
                        break;
                    }
                }
            }
        });

        if let Ok(mut slot) = self.inner.sweeper.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }
        Ok(count)
    }

    /// Stop the sweeps and cancel every pending timer.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.timer.cancel_all();
        let handle = self.inner.sweeper.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "sweep task ended abnormally");
            }
        }
        tracing::info!("engine stopped");
    }

    /// Trigger every pending or snoozed reminder whose due time has passed.
    /// Returns how many this sweep triggered.
    pub async fn run_due_sweep(&self) -> Result<usize> {
        let now = self.now();
        let due = with_conn(&self.inner.db, move |conn| store::list_due_ids(conn, now)).await?;

        let mut triggered = 0;
        for id in due {
            match self.trigger_reminder(&id).await {
                Ok(Some(_)) => triggered += 1,
                Ok(None) => {}
                Err(e) => tracing::error!(reminder_id = %id, error = %e, "sweep trigger failed"),
            }
        }
        if triggered > 0 {
            tracing::info!(triggered, "due sweep triggered reminders");
        }
        Ok(triggered)
    }

    pub async fn run_queue_sweep(&self) -> Result<usize> {
        self.inner.pipeline.run_queue_sweep().await
    }

    // ── Time-based reminders ─────────────────────────────────────────────────

    /// Persist a reminder and schedule its trigger. A due time in the past
    /// fires on the next scheduling opportunity.
    pub async fn create_reminder(&self, input: NewReminder) -> Result<Reminder> {
        let reminder = input.into_reminder(self.now())?;

        let row = reminder.clone();
        with_conn(&self.inner.db, move |conn| store::insert_reminder(conn, &row)).await?;
        self.arm(&reminder.id, reminder.due_time);

        tracing::info!(
            reminder_id = %reminder.id,
            owner = %reminder.owner,
            due = %reminder.due_time,
            recurrence = %reminder.recurrence,
            "reminder created"
        );
        Ok(reminder)
    }

    pub async fn get_reminder(&self, id: &str) -> Result<Reminder> {
        let key = id.to_string();
        with_conn(&self.inner.db, move |conn| store::get_reminder(conn, &key))
            .await?
            .ok_or_else(|| EngineError::reminder_not_found(id))
    }

    /// An owner's reminders, optionally filtered by status. Snoozed reminders
    /// match only `Some(Snoozed)`, never `Some(Pending)`, though both are armed.
    pub async fn get_user_reminders(
        &self,
        owner: &str,
        status: Option<ReminderStatus>,
    ) -> Result<Vec<Reminder>> {
        let owner = owner.to_string();
        with_conn(&self.inner.db, move |conn| store::list_reminders(conn, &owner, status)).await
    }

    /// Mark a reminder completed and stop its timers and escalation.
    /// Completing an already completed reminder is a no-op.
    pub async fn complete_reminder(&self, id: &str) -> Result<Reminder> {
        let now = self.now();
        let key = id.to_string();
        let transition =
            with_conn(&self.inner.db, move |conn| store::mark_completed(conn, &key, now)).await?;

        self.inner.timer.cancel(&TaskKey::ReminderDue(id.to_string()));
        self.inner.escalation.cancel(id);

        match transition {
            Transition::Applied(r) => {
                tracing::info!(reminder_id = %id, owner = %r.owner, "reminder completed");
                Ok(r)
            }
            Transition::Unchanged(r) => Ok(r),
        }
    }

    /// Snooze for `minutes` (or the configured default). The reminder is
    /// re-armed and escalation restarts from level 1 on the next trigger.
    pub async fn snooze_reminder(&self, id: &str, minutes: Option<u32>) -> Result<Reminder> {
        let minutes = minutes.unwrap_or(self.inner.config.scheduler.default_snooze_minutes);
        let now = self.now();
        let until = snooze_until(now, minutes)?;

        let key = id.to_string();
        let reminder =
            with_conn(&self.inner.db, move |conn| store::mark_snoozed(conn, &key, now, until)).await?;

        self.inner.escalation.cancel(id);
        self.arm(id, until);
        tracing::info!(reminder_id = %id, until = %until, "reminder snoozed");
        Ok(reminder)
    }

    /// Remove a reminder together with its timers and escalation state.
    pub async fn delete_reminder(&self, id: &str) -> Result<()> {
        let key = id.to_string();
        let deleted = with_conn(&self.inner.db, move |conn| store::delete_reminder(conn, &key)).await?;

        self.inner.timer.cancel(&TaskKey::ReminderDue(id.to_string()));
        self.inner.escalation.cancel(id);

        if !deleted {
            return Err(EngineError::reminder_not_found(id));
        }
        tracing::info!(reminder_id = %id, "reminder deleted");
        Ok(())
    }

    /// Trigger a due reminder. Safe to call any number of times: only the
    /// caller that wins the `pending → triggered` transition escalates and
    /// spawns the next occurrence. Returns the reminder if this call triggered it.
    pub async fn trigger_reminder(&self, id: &str) -> Result<Option<Reminder>> {
        let now = self.now();
        let key = id.to_string();
        let Some(reminder) =
            with_conn(&self.inner.db, move |conn| store::mark_triggered(conn, &key, now)).await?
        else {
            tracing::debug!(reminder_id = %id, "trigger skipped, not due or already handled");
            return Ok(None);
        };
        self.inner.timer.cancel(&TaskKey::ReminderDue(id.to_string()));

        tracing::info!(reminder_id = %id, owner = %reminder.owner, "reminder triggered");
        if let Some(alert) = Alert::from_reminder(&reminder) {
            self.inner.escalation.begin(alert).await;
        }

        if reminder.recurring() {
            if let Err(e) = self.spawn_next_occurrence(&reminder).await {
                tracing::error!(reminder_id = %id, error = %e, "failed to create next occurrence");
            }
        }
        Ok(Some(reminder))
    }

    /// Create the next occurrence of a recurring reminder. Slots that are
    /// already in the past are skipped, so a reminder that fires late yields a
    /// single future successor on the original schedule.
    async fn spawn_next_occurrence(&self, reminder: &Reminder) -> Result<()> {
        let now = self.now();
        let Some(due_time) = next_occurrence_after(reminder.due_time, reminder.recurrence, now)
        else {
            tracing::warn!(reminder_id = %reminder.id, "recurrence has no further storable occurrence");
            return Ok(());
        };
        let next = Reminder {
            id: Uuid::now_v7().to_string(),
            due_time,
            status: ReminderStatus::Pending,
            parent_id: Some(reminder.id.clone()),
            created_at: now,
            triggered_at: None,
            completed_at: None,
            snoozed_at: None,
            ..reminder.clone()
        };

        let row = next.clone();
        let created = with_conn(&self.inner.db, move |conn| store::insert_successor(conn, &row)).await?;
        if created {
            self.arm(&next.id, next.due_time);
            tracing::info!(reminder_id = %next.id, parent_id = %reminder.id, due = %due_time, "next occurrence scheduled");
        }
        Ok(())
    }

    fn arm(&self, id: &str, at: chrono::DateTime<chrono::Utc>) {
        let engine = self.clone();
        let key = id.to_string();
        self.inner
            .timer
            .schedule_at(TaskKey::ReminderDue(id.to_string()), at, async move {
                if let Err(e) = engine.trigger_reminder(&key).await {
                    tracing::error!(reminder_id = %key, error = %e, "timer trigger failed");
                }
            });
    }

    // ── Location reminders ───────────────────────────────────────────────────

    pub async fn create_location_reminder(
        &self,
        input: NewLocationReminder,
    ) -> Result<LocationReminder> {
        require("owner", &input.owner)?;
        require("title", &input.title)?;

        let radius_m = input
            .radius_m
            .unwrap_or(self.inner.config.location.default_radius_m);
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(EngineError::validation(format!(
                "radius must be a positive number of meters, got {radius_m}"
            )));
        }

        let (location_name, target) = match input.target {
            TargetLocation::Coordinates(point) => (None, point),
            TargetLocation::Named(name) => {
                require("location name", &name)?;
                let resolver = self.inner.resolver.as_ref().ok_or_else(|| {
                    EngineError::validation("no location resolver configured for named places")
                })?;
                let point = resolver.resolve(&name).ok_or_else(|| {
                    EngineError::validation(format!("unknown location: {name}"))
                })?;
                (Some(name), point)
            }
        };
        if !target.is_valid() {
            return Err(EngineError::validation(format!(
                "invalid coordinates: {}, {}",
                target.latitude, target.longitude
            )));
        }

        let reminder = LocationReminder {
            id: Uuid::now_v7().to_string(),
            owner: input.owner.trim().to_string(),
            title: input.title.trim().to_string(),
            description: input.description,
            location_name,
            target,
            radius_m,
            status: LocationStatus::Pending,
            created_at: self.now(),
            triggered_at: None,
        };
        let row = reminder.clone();
        with_conn(&self.inner.db, move |conn| store::insert_location_reminder(conn, &row)).await?;

        tracing::info!(reminder_id = %reminder.id, owner = %reminder.owner, radius_m, "location reminder created");
        Ok(reminder)
    }

    pub async fn get_location_reminders(
        &self,
        owner: &str,
        status: Option<LocationStatus>,
    ) -> Result<Vec<LocationReminder>> {
        let owner = owner.to_string();
        with_conn(&self.inner.db, move |conn| {
            store::list_location_reminders(conn, &owner, status)
        })
        .await
    }

    pub async fn delete_location_reminder(&self, id: &str) -> Result<()> {
        let key = id.to_string();
        let deleted =
            with_conn(&self.inner.db, move |conn| store::delete_location_reminder(conn, &key)).await?;
        self.inner.escalation.cancel(id);
        if !deleted {
            return Err(EngineError::location_reminder_not_found(id));
        }
        Ok(())
    }

    /// Check an owner's pending location reminders against a reported
    /// position. Each reminder within its radius triggers once and starts
    /// escalating. Returns the reminders this report triggered.
    pub async fn evaluate_position(
        &self,
        owner: &str,
        position: GeoPoint,
    ) -> Result<Vec<LocationReminder>> {
        if !position.is_valid() {
            return Err(EngineError::validation(format!(
                "invalid position: {}, {}",
                position.latitude, position.longitude
            )));
        }

        let now = self.now();
        let owner_key = owner.to_string();
        let triggered = with_conn(&self.inner.db, move |conn| {
            let pending =
                store::list_location_reminders(conn, &owner_key, Some(LocationStatus::Pending))?;
            let mut triggered = Vec::new();
            for reminder in pending {
                if !geofence::within_radius(position, reminder.target, reminder.radius_m) {
                    continue;
                }
                if store::mark_location_triggered(conn, &reminder.id, now)? {
                    if let Some(updated) = store::get_location_reminder(conn, &reminder.id)? {
                        triggered.push(updated);
                    }
                }
            }
            Ok(triggered)
        })
        .await?;

        for reminder in &triggered {
            tracing::info!(
                reminder_id = %reminder.id,
                owner = %owner,
                distance_m = geofence::distance_m(position, reminder.target),
                "location reminder triggered"
            );
            if let Some(alert) = Alert::from_location(reminder) {
                self.inner.escalation.begin(alert).await;
            }
        }
        Ok(triggered)
    }

    /// Consume position reports until the sender closes or the engine shuts
    /// down. Per-report failures are logged and skipped.
    pub async fn run_position_feed(&self, mut reports: mpsc::Receiver<PositionReport>) {
        let cancel = self.inner.shutdown.clone();
        loop {
            tokio::select! {
                report = reports.recv() => {
                    let Some(report) = report else {
                        tracing::debug!("position feed closed");
                        break;
                    };
                    if let Err(e) = self.evaluate_position(&report.owner, report.position).await {
                        tracing::warn!(owner = %report.owner, error = %e, "position evaluation failed");
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    }

    // ── Escalation ───────────────────────────────────────────────────────────

    /// Highest escalation level requested so far for a triggered reminder.
    pub fn escalation_level(&self, id: &str) -> Option<u8> {
        self.inner.escalation.level(id)
    }

    // ── Notifications ────────────────────────────────────────────────────────

    pub async fn send_notification(
        &self,
        owner: &str,
        notification: Notification,
    ) -> Result<SendOutcome> {
        require("owner", owner)?;
        self.inner.pipeline.send(owner, notification).await
    }

    pub async fn get_preferences(&self, owner: &str) -> Result<NotificationPreferences> {
        self.inner.pipeline.preferences(owner).await
    }

    pub async fn set_preferences(&self, owner: &str, prefs: NotificationPreferences) -> Result<()> {
        require("owner", owner)?;
        let now = self.now();
        let owner = owner.to_string();
        with_conn(&self.inner.db, move |conn| {
            preferences::set_preferences(conn, &owner, &prefs, now)
        })
        .await
    }

    /// Drop stored preferences; the owner falls back to the defaults.
    pub async fn delete_preferences(&self, owner: &str) -> Result<bool> {
        let owner = owner.to_string();
        with_conn(&self.inner.db, move |conn| preferences::delete_preferences(conn, &owner)).await
    }

    pub async fn get_delivery_logs(&self, owner: &str, limit: usize) -> Result<Vec<DeliveryLog>> {
        let owner = owner.to_string();
        with_conn(&self.inner.db, move |conn| {
            delivery_log::get_delivery_logs(conn, &owner, limit)
        })
        .await
    }

    pub async fn delivery_stats(&self) -> Result<DeliveryStats> {
        with_conn(&self.inner.db, |conn| delivery_log::delivery_stats(conn)).await
    }
}
