//! Delivery log: one row per immediate delivery, with per-channel outcomes.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::Serialize;

use super::types::{ChannelResult, DeliveryReport, Notification, NotificationPriority};
use crate::db::{parse_ts, ts};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryLog {
    pub id: i64,
    pub owner: String,
    pub kind: String,
    pub priority: NotificationPriority,
    pub results: Vec<ChannelResult>,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeliveryStats {
    pub total: i64,
    pub succeeded: i64,
    pub failed: i64,
}

impl DeliveryStats {
    /// Fraction of successful deliveries, `None` when nothing was delivered yet.
    pub fn success_rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.succeeded as f64 / self.total as f64)
    }
}

pub fn insert_log(
    conn: &Connection,
    notification: &Notification,
    report: &DeliveryReport,
    now: DateTime<Utc>,
) -> Result<i64> {
    let results = serde_json::to_string(&report.results)?;
    conn.execute(
        "INSERT INTO notification_logs (owner, type, priority, channel_results, success, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            report.owner,
            notification.kind,
            notification.priority.as_str(),
            results,
            report.success(),
            ts(now),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<DeliveryLog> {
    let conversion = |idx: usize, e: Box<dyn std::error::Error + Send + Sync>| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e)
    };
    let priority: String = row.get(3)?;
    let results: String = row.get(4)?;

    Ok(DeliveryLog {
        id: row.get(0)?,
        owner: row.get(1)?,
        kind: row.get(2)?,
        priority: priority.parse().map_err(|e: String| conversion(3, e.into()))?,
        results: serde_json::from_str(&results).map_err(|e| conversion(4, Box::new(e)))?,
        success: row.get(5)?,
        created_at: parse_ts(&row.get::<_, String>(6)?)?,
    })
}

/// The most recent `limit` log rows for an owner, newest first.
pub fn get_delivery_logs(conn: &Connection, owner: &str, limit: usize) -> Result<Vec<DeliveryLog>> {
    let mut stmt = conn.prepare(
        "SELECT id, owner, type, priority, channel_results, success, created_at \
         FROM notification_logs WHERE owner = ?1 ORDER BY id DESC LIMIT ?2",
    )?;
    let logs = stmt
        .query_map(params![owner, limit as i64], log_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(logs)
}

pub fn delivery_stats(conn: &Connection) -> Result<DeliveryStats> {
    let (total, succeeded): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(success), 0) FROM notification_logs",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(DeliveryStats {
        total,
        succeeded,
        failed: total - succeeded,
    })
}
