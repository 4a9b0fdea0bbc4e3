//! Durable reminders and notification delivery for a personal assistant backend.
//!
//! Nudge turns "remind me at..." and "notify me when..." requests into
//! persisted, time- or location-triggered events. Unacknowledged reminders
//! escalate through three levels, and every notification passes through a
//! pipeline that applies the owner's preferences before reaching a delivery
//! channel.
//!
//! # Architecture
//!
//! - **Storage**: SQLite (WAL) is the single source of truth for reminder status.
//!   In-memory timers are an index over it and are rebuilt on startup.
//! - **Timers**: tokio tasks keyed by [`timer::TaskKey`], cancellable, backed by a
//!   periodic due sweep for reminders whose timer was lost.
//! - **Escalation**: visual, then audible, then repeated, one interval apart,
//!   re-checking the store before each step.
//! - **Pipeline**: preference filter, optimal time, batching, then immediate
//!   delivery across the owner's channels.
//!
//! # Modules
//!
//! - [`config`]: configuration loading from TOML files and environment variables
//! - [`db`]: SQLite initialization, schema, migrations, and health checks
//! - [`engine`]: the operations other components call
//! - [`escalation`]: the three-level escalation controller
//! - [`notify`]: the notification pipeline and delivery channels
//! - [`reminder`]: reminder records, due-time parsing, geofencing, persistence
//! - [`timer`]: the delayed-task facility

pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod notify;
pub mod reminder;
pub mod timer;

pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, Result};
