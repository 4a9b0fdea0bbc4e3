//! Due-time parsing and recurrence arithmetic.

use chrono::{DateTime, Duration, Months, NaiveDateTime, Utc};

use super::types::Recurrence;
use crate::db::is_storable;
use crate::error::{EngineError, Result};

/// Longest accepted snooze: 30 days.
pub const MAX_SNOOZE_MINUTES: u32 = 30 * 24 * 60;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Parse a due time. Accepts RFC 3339, or `YYYY-MM-DD HH:MM[:SS]` (with a space
/// or `T`) interpreted as UTC.
pub fn parse_due_time(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(EngineError::validation("due time is required"));
    }

    let due = match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(_) => NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
            .ok_or_else(|| EngineError::validation(format!("unparseable due time: {raw}")))?,
    };
    if !is_storable(due) {
        return Err(EngineError::validation(format!(
            "due time {raw} is outside the years 1-9999"
        )));
    }
    Ok(due)
}

/// The new due time for a reminder snoozed at `now` for `minutes`.
pub fn snooze_until(now: DateTime<Utc>, minutes: u32) -> Result<DateTime<Utc>> {
    if minutes == 0 || minutes > MAX_SNOOZE_MINUTES {
        return Err(EngineError::validation(format!(
            "snooze minutes must be between 1 and {MAX_SNOOZE_MINUTES}, got {minutes}"
        )));
    }
    now.checked_add_signed(Duration::minutes(i64::from(minutes)))
        .filter(|until| is_storable(*until))
        .ok_or_else(|| EngineError::validation(format!("snooze of {minutes} minutes is out of range")))
}

/// The due time of the occurrence after `due`.
///
/// Always advances from the previous due time, never from "now", so repeated
/// cycles do not drift. Returns `None` for non-recurring reminders or when the
/// next occurrence falls past the year 9999.
pub fn next_occurrence(due: DateTime<Utc>, recurrence: Recurrence) -> Option<DateTime<Utc>> {
    match recurrence {
        Recurrence::None => None,
        Recurrence::Daily => due.checked_add_signed(Duration::days(1)),
        Recurrence::Weekly => due.checked_add_signed(Duration::weeks(1)),
        Recurrence::Monthly => due.checked_add_months(Months::new(1)),
    }
    .filter(|next| is_storable(*next))
}

/// The first occurrence on `due`'s schedule that is strictly after `now`.
/// Slots missed while the reminder was overdue are skipped, not replayed.
pub fn next_occurrence_after(
    due: DateTime<Utc>,
    recurrence: Recurrence,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let step = match recurrence {
        Recurrence::None => return None,
        Recurrence::Daily => Duration::days(1),
        Recurrence::Weekly => Duration::weeks(1),
        // months differ in length, so walk them from the original due time
        Recurrence::Monthly => {
            return (1u32..)
                .map_while(|k| due.checked_add_months(Months::new(k)))
                .take_while(|at| is_storable(*at))
                .find(|at| *at > now);
        }
    };
    if now < due {
        return next_occurrence(due, recurrence);
    }

    let steps = (now - due).num_seconds() / step.num_seconds() + 1;
    i32::try_from(steps)
        .ok()
        .and_then(|n| step.checked_mul(n))
        .and_then(|offset| due.checked_add_signed(offset))
        .filter(|next| is_storable(*next))
}
