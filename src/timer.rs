//! Delayed-task facility.
//!
//! [`Timer::schedule_at`] runs a future once its wall-clock deadline has been
//! reached. Deadlines in the past fire on the next scheduling opportunity.
//! Firing is "due, not earlier"; nothing guarantees "due, not later", which is
//! why the engine also runs a periodic due sweep over the store.
//!
//! Every task is registered under a [`TaskKey`]. Scheduling an occupied key
//! replaces the previous task, and [`Timer::cancel`] stops a task before it
//! fires. The registry is in-memory only and is rebuilt from the store on
//! startup.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskKey {
    /// Fire a time-based reminder.
    ReminderDue(String),
    /// Re-check acknowledgement for a triggered reminder.
    EscalationCheck(String),
    /// Flush an owner's pending batch.
    BatchFlush(String),
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReminderDue(id) => write!(f, "reminder_due:{id}"),
            Self::EscalationCheck(id) => write!(f, "escalation_check:{id}"),
            Self::BatchFlush(owner) => write!(f, "batch_flush:{owner}"),
        }
    }
}

struct Entry {
    generation: u64,
    token: CancellationToken,
}

#[derive(Clone)]
pub struct Timer {
    inner: Arc<TimerInner>,
}

struct TimerInner {
    clock: Arc<dyn Clock>,
    tasks: DashMap<TaskKey, Entry>,
    next_generation: AtomicU64,
}

impl Timer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(TimerInner {
                clock,
                tasks: DashMap::new(),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Run `task` at `at`. Replaces any task already registered under `key`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule_at<F>(&self, key: TaskKey, at: DateTime<Utc>, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = (at - self.inner.clock.now()).to_std().unwrap_or_default();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        if let Some(previous) = self.inner.tasks.insert(
            key.clone(),
            Entry {
                generation,
                token: token.clone(),
            },
        ) {
            previous.token.cancel();
        }

        tracing::debug!(key = %key, delay_ms = delay.as_millis() as u64, "task scheduled");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(key = %key, "task cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    // Deregister first so the task may reschedule its own key.
                    inner.tasks.remove_if(&key, |_, entry| entry.generation == generation);
                    task.await;
                }
            }
        });
    }

    /// Cancel a pending task. Returns `true` if one was registered.
    pub fn cancel(&self, key: &TaskKey) -> bool {
        match self.inner.tasks.remove(key) {
            Some((_, entry)) => {
                entry.token.cancel();
                tracing::debug!(key = %key, "task cancel requested");
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, key: &TaskKey) -> bool {
        self.inner.tasks.contains_key(key)
    }

    pub fn scheduled_count(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Cancel every pending task.
    pub fn cancel_all(&self) {
        let keys: Vec<TaskKey> = self.inner.tasks.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.cancel(&key);
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }
}
