//! Notifications deferred to an optimal delivery time.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::types::Notification;
use crate::db::{checked_ts, parse_ts, ts};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct QueuedNotification {
    pub id: i64,
    pub owner: String,
    pub notification: Notification,
    pub scheduled_time: DateTime<Utc>,
}

pub fn enqueue(
    conn: &Connection,
    owner: &str,
    notification: &Notification,
    scheduled_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<i64> {
    let scheduled = checked_ts(scheduled_time)?;
    let payload = serde_json::to_string(notification)?;
    conn.execute(
        "INSERT INTO notification_queue (owner, payload, scheduled_time, created_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![owner, payload, scheduled, ts(now)],
    )?;
    Ok(conn.last_insert_rowid())
}

fn load(conn: &Connection, sql: &str, arg: &str) -> Result<Vec<QueuedNotification>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![arg], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut queued = Vec::with_capacity(rows.len());
    for (id, owner, payload, scheduled) in rows {
        match serde_json::from_str(&payload) {
            Ok(notification) => queued.push(QueuedNotification {
                id,
                owner,
                notification,
                scheduled_time: parse_ts(&scheduled)?,
            }),
            Err(e) => tracing::warn!(queue_id = id, error = %e, "dropping unreadable queued notification"),
        }
    }
    Ok(queued)
}

/// Remove and return every row whose scheduled time has passed.
///
/// Rows are deleted in the same transaction they are read in, so two
/// concurrent sweeps never deliver the same row twice.
pub fn claim_due(conn: &mut Connection, now: DateTime<Utc>) -> Result<Vec<QueuedNotification>> {
    let tx = conn.transaction()?;
    let now_s = ts(now);
    let due = load(
        &tx,
        "SELECT id, owner, payload, scheduled_time FROM notification_queue \
         WHERE scheduled_time <= ?1 ORDER BY scheduled_time, id",
        &now_s,
    )?;
    tx.execute(
        "DELETE FROM notification_queue WHERE scheduled_time <= ?1",
        params![now_s],
    )?;
    tx.commit()?;
    Ok(due)
}

/// Everything still waiting for an owner, soonest first.
pub fn list_queued(conn: &Connection, owner: &str) -> Result<Vec<QueuedNotification>> {
    load(
        conn,
        "SELECT id, owner, payload, scheduled_time FROM notification_queue \
         WHERE owner = ?1 ORDER BY scheduled_time, id",
        owner,
    )
}
