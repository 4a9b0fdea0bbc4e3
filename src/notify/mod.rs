//! Notification pipeline: filter, time, batch, route.
//!
//! [`Pipeline::send`] runs each step in order and stops at the first one that
//! decides the notification's fate:
//!
//! 1. preference filter (disabled priority, quiet hours, do-not-disturb)
//! 2. optimal time, deferring to the `notification_queue` table
//! 3. batching of medium/low notifications per owner
//! 4. immediate delivery across the owner's enabled channels
//!
//! Immediate delivery is fire-and-forget: `send` returns as soon as the
//! channels are chosen, and per-channel outcomes land in the delivery log.

pub mod batch;
pub mod channel;
pub mod log;
pub mod preferences;
pub mod queue;
pub mod timing;
pub mod types;

use chrono::Duration;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;

use self::channel::DeliveryChannel;
use self::preferences::{NotificationPreferences, MAX_BATCH_WINDOW_SECS};
use self::timing::{AvailabilitySource, TimingPolicy};
use self::types::{
    Channel, ChannelResult, DeliveryReport, FilterReason, Notification, NotificationPriority,
    SendOutcome,
};
use crate::config::NotificationsConfig;
use crate::db::{with_conn, Db};
use crate::error::{EngineError, Result};
use crate::timer::{TaskKey, Timer};

#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    db: Db,
    timer: Timer,
    transports: HashMap<Channel, Arc<dyn DeliveryChannel>>,
    availability: Arc<dyn AvailabilitySource>,
    defaults: NotificationPreferences,
    timing: TimingPolicy,
    /// Pending batch per owner. Only the pipeline writes here.
    batches: DashMap<String, Vec<Notification>>,
}

impl Pipeline {
    pub fn new(
        db: Db,
        timer: Timer,
        transports: Vec<Arc<dyn DeliveryChannel>>,
        availability: Arc<dyn AvailabilitySource>,
        config: &NotificationsConfig,
    ) -> Self {
        let transports = transports
            .into_iter()
            .map(|t| (t.kind(), t))
            .collect();
        Self {
            inner: Arc::new(PipelineInner {
                db,
                timer,
                transports,
                availability,
                defaults: NotificationPreferences::from_config(config),
                timing: TimingPolicy::from_config(config),
                batches: DashMap::new(),
            }),
        }
    }

    /// Stored preferences for `owner`, or the configured defaults.
    pub async fn preferences(&self, owner: &str) -> Result<NotificationPreferences> {
        let owner_key = owner.to_string();
        let stored = with_conn(&self.inner.db, move |conn| {
            preferences::get_preferences(conn, &owner_key)
        })
        .await?;
        Ok(stored.unwrap_or_else(|| self.inner.defaults.clone()))
    }

    pub fn default_preferences(&self) -> &NotificationPreferences {
        &self.inner.defaults
    }

    pub async fn send(&self, owner: &str, notification: Notification) -> Result<SendOutcome> {
        let prefs = self.preferences(owner).await?;
        let now = self.inner.timer.clock().now();

        if let Some(reason) = filter_reason(&prefs, &notification, now) {
            tracing::debug!(
                owner = %owner,
                kind = %notification.kind,
                priority = %notification.priority,
                reason = ?reason,
                "notification filtered"
            );
            return Ok(SendOutcome::Filtered { reason });
        }

        if !timing::is_immediate(&notification) {
            let availability = match self.inner.availability.availability(owner).await {
                Ok(a) => a,
                Err(e) => {
                    tracing::warn!(owner = %owner, error = %e, "availability lookup failed, delivering now");
                    timing::Availability::available()
                }
            };
            let deliver_at = timing::optimal_time(&notification, &availability, now, &self.inner.timing);
            if deliver_at > now {
                let owner_key = owner.to_string();
                let queued = notification.clone();
                with_conn(&self.inner.db, move |conn| {
                    queue::enqueue(conn, &owner_key, &queued, deliver_at, now)
                })
                .await?;
                tracing::info!(owner = %owner, kind = %notification.kind, deliver_at = %deliver_at, "notification queued");
                return Ok(SendOutcome::Queued { deliver_at });
            }
        }

        if prefs.batching_enabled && notification.priority.is_batchable() && !notification.urgent {
            let pending = self.add_to_batch(owner, notification, prefs.batch_window_secs)?;
            return Ok(SendOutcome::Batched { pending });
        }

        let channels = self.eligible_channels(&prefs, &notification);
        if channels.is_empty() {
            tracing::debug!(owner = %owner, priority = %notification.priority, "no channel accepts notification");
            return Ok(SendOutcome::Filtered {
                reason: FilterReason::NoChannel,
            });
        }

        let pipeline = self.clone();
        let owner_key = owner.to_string();
        let dispatched = channels.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline.deliver_to(&owner_key, notification, dispatched).await {
                tracing::error!(owner = %owner_key, error = %e, "failed to record delivery");
            }
        });

        Ok(SendOutcome::Sent { channels })
    }

    /// Deliver now across every eligible channel and wait for the outcome.
    /// Skips filtering, timing and batching.
    pub async fn deliver(&self, owner: &str, notification: Notification) -> Result<DeliveryReport> {
        let prefs = self.preferences(owner).await?;
        let channels = self.eligible_channels(&prefs, &notification);
        self.deliver_to(owner, notification, channels).await
    }

    /// Flush an owner's pending batch as one grouped notification.
    /// Returns `None` when the batch was already empty.
    pub async fn flush_batch(&self, owner: &str) -> Result<Option<DeliveryReport>> {
        self.inner.timer.cancel(&TaskKey::BatchFlush(owner.to_string()));
        let Some((_, items)) = self.inner.batches.remove(owner) else {
            return Ok(None);
        };
        let count = items.len();
        let Some(grouped) = batch::summarize(items) else {
            return Ok(None);
        };

        tracing::info!(owner = %owner, items = count, "flushing notification batch");
        self.deliver(owner, grouped).await.map(Some)
    }

    pub fn pending_batch_len(&self, owner: &str) -> usize {
        self.inner.batches.get(owner).map_or(0, |b| b.len())
    }

    /// Deliver every queued notification whose time has come. Returns how many
    /// were handed to channels.
    pub async fn run_queue_sweep(&self) -> Result<usize> {
        let now = self.inner.timer.clock().now();
        let due = with_conn(&self.inner.db, move |conn| queue::claim_due(conn, now)).await?;

        let mut delivered = 0;
        for item in due {
            match self.deliver(&item.owner, item.notification).await {
                Ok(_) => delivered += 1,
                Err(e) => {
                    tracing::error!(owner = %item.owner, queue_id = item.id, error = %e, "queued delivery failed")
                }
            }
        }
        if delivered > 0 {
            tracing::info!(delivered, "queue sweep delivered notifications");
        }
        Ok(delivered)
    }

    fn add_to_batch(&self, owner: &str, notification: Notification, window_secs: u64) -> Result<usize> {
        let now = self.inner.timer.clock().now();
        let flush_at = (window_secs <= MAX_BATCH_WINDOW_SECS)
            .then_some(window_secs)
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds)
            .and_then(|window| now.checked_add_signed(window))
            .ok_or_else(|| {
                EngineError::validation(format!("batch window of {window_secs} seconds is out of range"))
            })?;

        let pending = {
            let mut entry = self.inner.batches.entry(owner.to_string()).or_default();
            entry.push(notification);
            entry.len()
        };

        if pending == 1 {
            let pipeline = self.clone();
            let owner_key = owner.to_string();
            self.inner
                .timer
                .schedule_at(TaskKey::BatchFlush(owner.to_string()), flush_at, async move {
                    if let Err(e) = pipeline.flush_batch(&owner_key).await {
                        tracing::error!(owner = %owner_key, error = %e, "batch flush failed");
                    }
                });
        }
        tracing::debug!(owner = %owner, pending, "notification batched");
        Ok(pending)
    }

    /// Enabled channels that accept this notification and have a transport.
    fn eligible_channels(
        &self,
        prefs: &NotificationPreferences,
        notification: &Notification,
    ) -> Vec<Channel> {
        let mut channels: Vec<Channel> = Vec::new();
        for channel in &prefs.channels {
            if channels.contains(channel) || !channel.accepts(notification) {
                continue;
            }
            if !self.inner.transports.contains_key(channel) {
                tracing::debug!(channel = %channel, "no transport registered, skipping");
                continue;
            }
            channels.push(*channel);
        }
        channels
    }

    async fn deliver_to(
        &self,
        owner: &str,
        notification: Notification,
        channels: Vec<Channel>,
    ) -> Result<DeliveryReport> {
        let shared = Arc::new(notification);
        let mut attempts = JoinSet::new();
        for channel in &channels {
            let Some(transport) = self.inner.transports.get(channel).cloned() else {
                continue;
            };
            let owner = owner.to_string();
            let notification = Arc::clone(&shared);
            let channel = *channel;
            attempts.spawn(async move {
                let outcome = transport.deliver(&owner, &notification).await;
                (channel, outcome)
            });
        }

        let mut outcomes = HashMap::new();
        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok((channel, outcome)) => {
                    outcomes.insert(channel, outcome);
                }
                Err(e) => tracing::error!(owner = %owner, error = %e, "delivery task aborted"),
            }
        }

        let results: Vec<ChannelResult> = channels
            .iter()
            .map(|channel| match outcomes.remove(channel) {
                Some(Ok(())) => ChannelResult {
                    channel: *channel,
                    success: true,
                    error: None,
                },
                Some(Err(e)) => {
                    tracing::warn!(owner = %owner, channel = %channel, error = %e, "channel delivery failed");
                    ChannelResult {
                        channel: *channel,
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
                None => ChannelResult {
                    channel: *channel,
                    success: false,
                    error: Some("delivery task aborted".into()),
                },
            })
            .collect();

        let report = DeliveryReport {
            owner: owner.to_string(),
            results,
        };
        let now = self.inner.timer.clock().now();
        let logged = report.clone();
        with_conn(&self.inner.db, move |conn| {
            log::insert_log(conn, &shared, &logged, now).map(|_| ())
        })
        .await?;

        tracing::debug!(owner = %owner, success = report.success(), "delivery recorded");
        Ok(report)
    }
}

/// First preference rule that rejects the notification, if any.
pub fn filter_reason(
    prefs: &NotificationPreferences,
    notification: &Notification,
    now: chrono::DateTime<chrono::Utc>,
) -> Option<FilterReason> {
    let critical = notification.priority == NotificationPriority::Critical;
    if !prefs.allows_priority(notification.priority) {
        Some(FilterReason::PriorityDisabled)
    } else if prefs.in_quiet_hours(now) && !critical && !notification.urgent {
        Some(FilterReason::QuietHours)
    } else if prefs.do_not_disturb && !critical {
        Some(FilterReason::DoNotDisturb)
    } else {
        None
    }
}
