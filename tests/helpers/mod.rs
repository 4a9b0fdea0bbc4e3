#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nudge::clock::Clock;
use nudge::config::NudgeConfig;
use nudge::db::{self, Db};
use nudge::error::{EngineError, Result};
use nudge::notify::timing::{Availability, AvailabilitySource};
use nudge::notify::types::{Channel, Notification};
use nudge::notify::channel::DeliveryChannel;
use nudge::Engine;

/// Open a fresh, fully migrated in-memory database behind the shared handle.
pub fn test_db() -> Db {
    db::shared(db::open_memory_database().unwrap())
}

/// 2026-06-01 12:00 UTC. Outside the default 22:00-07:00 quiet hours.
pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
}

/// A wall clock that follows tokio's (pausable) clock from a fixed start.
pub struct TokioClock {
    base: DateTime<Utc>,
    start: tokio::time::Instant,
}

impl TokioClock {
    /// Must be called inside a tokio runtime.
    pub fn starting_at(base: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            base,
            start: tokio::time::Instant::now(),
        })
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now() - self.start;
        self.base + chrono::Duration::from_std(elapsed).unwrap()
    }
}

/// Records every delivery. Optionally fails every attempt.
pub struct RecordingChannel {
    kind: Channel,
    fail: AtomicBool,
    delivered: Mutex<Vec<(String, Notification)>>,
}

impl RecordingChannel {
    pub fn new(kind: Channel) -> Arc<Self> {
        Arc::new(Self {
            kind,
            fail: AtomicBool::new(false),
            delivered: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(kind: Channel) -> Arc<Self> {
        let channel = Self::new(kind);
        channel.fail.store(true, Ordering::SeqCst);
        channel
    }

    pub fn deliveries(&self) -> Vec<(String, Notification)> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.deliveries().into_iter().map(|(_, n)| n).collect()
    }

    pub fn count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    fn kind(&self) -> Channel {
        self.kind
    }

    async fn deliver(&self, owner: &str, notification: &Notification) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::Delivery {
                channel: self.kind.to_string(),
                message: "transport unavailable".into(),
            });
        }
        self.delivered
            .lock()
            .unwrap()
            .push((owner.to_string(), notification.clone()));
        Ok(())
    }
}

/// Availability that tests can change between calls.
#[derive(Default)]
pub struct StubAvailability {
    current: Mutex<Availability>,
}

impl StubAvailability {
    pub fn set(&self, availability: Availability) {
        *self.current.lock().unwrap() = availability;
    }
}

#[async_trait]
impl AvailabilitySource for StubAvailability {
    async fn availability(&self, _owner: &str) -> Result<Availability> {
        Ok(self.current.lock().unwrap().clone())
    }
}

/// An engine wired to recording transports for every channel kind.
pub struct Harness {
    pub engine: Engine,
    pub db: Db,
    pub clock: Arc<TokioClock>,
    pub availability: Arc<StubAvailability>,
    pub push: Arc<RecordingChannel>,
    pub sms: Arc<RecordingChannel>,
    pub email: Arc<RecordingChannel>,
    pub in_app: Arc<RecordingChannel>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(NudgeConfig::default())
    }

    pub fn with_config(config: NudgeConfig) -> Self {
        Self::build(test_db(), config, RecordingChannel::new(Channel::Push))
    }

    /// Same as [`Harness::new`] but the push transport always fails.
    pub fn with_failing_push() -> Self {
        Self::build(
            test_db(),
            NudgeConfig::default(),
            RecordingChannel::failing(Channel::Push),
        )
    }

    pub fn on_db(db: Db) -> Self {
        Self::build(db, NudgeConfig::default(), RecordingChannel::new(Channel::Push))
    }

    fn build(db: Db, config: NudgeConfig, push: Arc<RecordingChannel>) -> Self {
        let clock = TokioClock::starting_at(noon());
        let availability = Arc::new(StubAvailability::default());
        let sms = RecordingChannel::new(Channel::Sms);
        let email = RecordingChannel::new(Channel::Email);
        let in_app = RecordingChannel::new(Channel::InApp);

        let engine = Engine::builder(Arc::clone(&db), config)
            .clock(clock.clone())
            .availability(availability.clone())
            .channel(push.clone())
            .channel(sms.clone())
            .channel(email.clone())
            .channel(in_app.clone())
            .build();

        Self {
            engine,
            db,
            clock,
            availability,
            push,
            sms,
            email,
            in_app,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// Let spawned work (timers, fire-and-forget deliveries, blocking DB calls)
/// run to completion. Under a paused clock this advances time only slightly.
pub async fn settle() {
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Advance the paused clock by `secs` and let everything that became due run.
pub async fn advance_secs(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
    settle().await;
}

/// Format a time the way `NewReminder::due_time` accepts it.
pub fn due(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}
