//! Reminder records, their persistence, and the pure helpers around them.
//!
//! Lifecycle orchestration (timers, escalation, recurrence spawning) lives in
//! [`crate::engine`]; this module only knows how to validate, store and
//! transition records.

pub mod due;
pub mod geofence;
pub mod store;
pub mod types;
