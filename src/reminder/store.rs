//! SQLite persistence for reminders and location reminders.
//!
//! The store is the single source of truth for status. Every state transition
//! is a guarded `UPDATE ... WHERE status IN (...)`, so the timer and the due
//! sweep can race on the same reminder and exactly one of them wins.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;

use super::types::{
    GeoPoint, LocationReminder, LocationStatus, Reminder, ReminderStatus,
};
use crate::db::{checked_ts, parse_opt_ts, parse_ts, ts};
use crate::error::{EngineError, Result};

const REMINDER_COLUMNS: &str = "id, owner, title, description, due_time, priority, \
     recurrence_pattern, status, parent_id, created_at, triggered_at, completed_at, snoozed_at";

const LOCATION_COLUMNS: &str = "id, owner, title, description, location_name, latitude, \
     longitude, radius_m, status, created_at, triggered_at";

/// Outcome of a guarded transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The row moved to the new state.
    Applied(Reminder),
    /// The row was already in the target state.
    Unchanged(Reminder),
}

impl Transition {
    pub fn reminder(&self) -> &Reminder {
        match self {
            Self::Applied(r) | Self::Unchanged(r) => r,
        }
    }

    pub fn applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })
}

fn reminder_from_row(row: &Row<'_>) -> rusqlite::Result<Reminder> {
    Ok(Reminder {
        id: row.get(0)?,
        owner: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        due_time: parse_ts(&row.get::<_, String>(4)?)?,
        priority: parse_col(row, 5)?,
        recurrence: parse_col(row, 6)?,
        status: parse_col(row, 7)?,
        parent_id: row.get(8)?,
        created_at: parse_ts(&row.get::<_, String>(9)?)?,
        triggered_at: parse_opt_ts(row.get(10)?)?,
        completed_at: parse_opt_ts(row.get(11)?)?,
        snoozed_at: parse_opt_ts(row.get(12)?)?,
    })
}

fn location_from_row(row: &Row<'_>) -> rusqlite::Result<LocationReminder> {
    Ok(LocationReminder {
        id: row.get(0)?,
        owner: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        location_name: row.get(4)?,
        target: GeoPoint::new(row.get(5)?, row.get(6)?),
        radius_m: row.get(7)?,
        status: parse_col(row, 8)?,
        created_at: parse_ts(&row.get::<_, String>(9)?)?,
        triggered_at: parse_opt_ts(row.get(10)?)?,
    })
}

// ── Reminders ────────────────────────────────────────────────────────────────

pub fn insert_reminder(conn: &Connection, reminder: &Reminder) -> Result<()> {
    let due_time = checked_ts(reminder.due_time)?;
    conn.execute(
        "INSERT INTO reminders (id, owner, title, description, due_time, priority, recurring, \
         recurrence_pattern, status, parent_id, created_at, triggered_at, completed_at, snoozed_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            reminder.id,
            reminder.owner,
            reminder.title,
            reminder.description,
            due_time,
            reminder.priority.as_str(),
            reminder.recurring(),
            reminder.recurrence.as_str(),
            reminder.status.as_str(),
            reminder.parent_id,
            ts(reminder.created_at),
            reminder.triggered_at.map(ts),
            reminder.completed_at.map(ts),
            reminder.snoozed_at.map(ts),
        ],
    )?;
    Ok(())
}

pub fn get_reminder(conn: &Connection, id: &str) -> Result<Option<Reminder>> {
    let reminder = conn
        .query_row(
            &format!("SELECT {REMINDER_COLUMNS} FROM reminders WHERE id = ?1"),
            params![id],
            reminder_from_row,
        )
        .optional()?;
    Ok(reminder)
}

/// All reminders for an owner, optionally filtered by status, soonest first.
pub fn list_reminders(
    conn: &Connection,
    owner: &str,
    status: Option<ReminderStatus>,
) -> Result<Vec<Reminder>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REMINDER_COLUMNS} FROM reminders \
         WHERE owner = ?1 AND (?2 IS NULL OR status = ?2) \
         ORDER BY due_time, created_at"
    ))?;
    let rows = stmt
        .query_map(params![owner, status.map(|s| s.as_str())], reminder_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// IDs of pending or snoozed reminders whose due time has passed.
pub fn list_due_ids(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM reminders \
         WHERE status IN ('pending','snoozed') AND due_time <= ?1 \
         ORDER BY due_time",
    )?;
    let ids = stmt
        .query_map(params![ts(now)], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

/// Pending or snoozed reminders still in the future; these get in-memory timers on startup.
pub fn list_future_armed(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<Reminder>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REMINDER_COLUMNS} FROM reminders \
         WHERE status IN ('pending','snoozed') AND due_time > ?1 \
         ORDER BY due_time"
    ))?;
    let rows = stmt
        .query_map(params![ts(now)], reminder_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Triggered, unacknowledged reminders that fired at or after `since`. Their
/// escalation is rebuilt on startup.
pub fn list_triggered_since(conn: &Connection, since: DateTime<Utc>) -> Result<Vec<Reminder>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REMINDER_COLUMNS} FROM reminders \
         WHERE status = 'triggered' AND triggered_at >= ?1 \
         ORDER BY triggered_at"
    ))?;
    let rows = stmt
        .query_map(params![ts(since)], reminder_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// `pending → triggered` once due. A snoozed reminder whose snooze has expired is
/// first re-armed to `pending`.
///
/// Returns `None` when the reminder is missing, not yet due, or some other caller
/// already triggered it.
pub fn mark_triggered(
    conn: &mut Connection,
    id: &str,
    now: DateTime<Utc>,
) -> Result<Option<Reminder>> {
    let tx = conn.transaction()?;
    let now_s = ts(now);

    tx.execute(
        "UPDATE reminders SET status = 'pending' \
         WHERE id = ?1 AND status = 'snoozed' AND due_time <= ?2",
        params![id, now_s],
    )?;
    let changed = tx.execute(
        "UPDATE reminders SET status = 'triggered', triggered_at = ?2 \
         WHERE id = ?1 AND status = 'pending' AND due_time <= ?2",
        params![id, now_s],
    )?;

    let reminder = if changed == 1 {
        get_reminder(&tx, id)?
    } else {
        None
    };
    tx.commit()?;
    Ok(reminder)
}

/// `{pending, triggered, snoozed} → completed`. Completing twice is a no-op.
pub fn mark_completed(conn: &Connection, id: &str, now: DateTime<Utc>) -> Result<Transition> {
    let changed = conn.execute(
        "UPDATE reminders SET status = 'completed', completed_at = ?2 \
         WHERE id = ?1 AND status IN ('pending','triggered','snoozed')",
        params![id, ts(now)],
    )?;

    let reminder = get_reminder(conn, id)?.ok_or_else(|| EngineError::reminder_not_found(id))?;
    if changed == 1 {
        Ok(Transition::Applied(reminder))
    } else {
        Ok(Transition::Unchanged(reminder))
    }
}

/// `{triggered, pending, snoozed} → snoozed`, moving the due time to `until`.
/// Completed reminders cannot be snoozed.
///
/// `snoozed` means "pending, re-armed for `until`": the row goes back through
/// `pending` to `triggered` once `until` has passed (see [`mark_triggered`]).
pub fn mark_snoozed(
    conn: &mut Connection,
    id: &str,
    now: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Reminder> {
    let until = checked_ts(until)?;
    let tx = conn.transaction()?;
    let changed = tx.execute(
        "UPDATE reminders SET status = 'snoozed', snoozed_at = ?2, due_time = ?3 \
         WHERE id = ?1 AND status IN ('pending','triggered','snoozed')",
        params![id, ts(now), until],
    )?;

    let reminder = get_reminder(&tx, id)?.ok_or_else(|| EngineError::reminder_not_found(id))?;
    if changed == 0 {
        return Err(EngineError::validation(format!(
            "reminder {id} is {} and cannot be snoozed",
            reminder.status
        )));
    }
    tx.commit()?;
    Ok(reminder)
}

/// Insert the next occurrence of a recurring reminder. `next.parent_id` must
/// name the reminder it follows. Returns `false` without writing when that
/// reminder already has a successor, which happens when a snoozed occurrence
/// triggers a second time.
pub fn insert_successor(conn: &mut Connection, next: &Reminder) -> Result<bool> {
    let Some(parent_id) = next.parent_id.as_deref() else {
        return Err(EngineError::validation("successor reminder needs a parent id"));
    };

    let tx = conn.transaction()?;
    let exists: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM reminders WHERE parent_id = ?1)",
        params![parent_id],
        |row| row.get(0),
    )?;
    if !exists {
        insert_reminder(&tx, next)?;
    }
    tx.commit()?;
    Ok(!exists)
}

/// Delete a reminder. Returns `false` if it did not exist.
pub fn delete_reminder(conn: &Connection, id: &str) -> Result<bool> {
    let rows = conn.execute("DELETE FROM reminders WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

/// Reminder counts keyed by status string.
pub fn status_counts(conn: &Connection) -> Result<HashMap<String, i64>> {
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM reminders GROUP BY status")?;
    let counts = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<rusqlite::Result<HashMap<_, _>>>()?;
    Ok(counts)
}

// ── Location reminders ───────────────────────────────────────────────────────

pub fn insert_location_reminder(conn: &Connection, reminder: &LocationReminder) -> Result<()> {
    conn.execute(
        "INSERT INTO location_reminders (id, owner, title, description, location_name, latitude, \
         longitude, radius_m, status, created_at, triggered_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            reminder.id,
            reminder.owner,
            reminder.title,
            reminder.description,
            reminder.location_name,
            reminder.target.latitude,
            reminder.target.longitude,
            reminder.radius_m,
            reminder.status.as_str(),
            ts(reminder.created_at),
            reminder.triggered_at.map(ts),
        ],
    )?;
    Ok(())
}

pub fn get_location_reminder(conn: &Connection, id: &str) -> Result<Option<LocationReminder>> {
    let reminder = conn
        .query_row(
            &format!("SELECT {LOCATION_COLUMNS} FROM location_reminders WHERE id = ?1"),
            params![id],
            location_from_row,
        )
        .optional()?;
    Ok(reminder)
}

pub fn list_location_reminders(
    conn: &Connection,
    owner: &str,
    status: Option<LocationStatus>,
) -> Result<Vec<LocationReminder>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LOCATION_COLUMNS} FROM location_reminders \
         WHERE owner = ?1 AND (?2 IS NULL OR status = ?2) \
         ORDER BY created_at"
    ))?;
    let rows = stmt
        .query_map(params![owner, status.map(|s| s.as_str())], location_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Location reminders, across owners, that triggered at or after `since`.
pub fn list_location_triggered_since(
    conn: &Connection,
    since: DateTime<Utc>,
) -> Result<Vec<LocationReminder>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LOCATION_COLUMNS} FROM location_reminders \
         WHERE status = 'triggered' AND triggered_at >= ?1 \
         ORDER BY triggered_at"
    ))?;
    let rows = stmt
        .query_map(params![ts(since)], location_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// `pending → triggered`. Returns `false` if already triggered or gone.
pub fn mark_location_triggered(conn: &Connection, id: &str, now: DateTime<Utc>) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE location_reminders SET status = 'triggered', triggered_at = ?2 \
         WHERE id = ?1 AND status = 'pending'",
        params![id, ts(now)],
    )?;
    Ok(rows == 1)
}

pub fn delete_location_reminder(conn: &Connection, id: &str) -> Result<bool> {
    let rows = conn.execute("DELETE FROM location_reminders WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}
