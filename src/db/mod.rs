pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::EngineError;

/// Shared database handle. The connection is synchronous; async callers go
/// through [`with_conn`].
pub type Db = Arc<Mutex<Connection>>;

/// Open (or create) the nudge database at the given path with schema
/// initialized and migrations applied.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    // WAL lets the CLI read while `serve` holds the writer
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&mut conn).context("failed to run migrations")?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open a fully migrated in-memory database.
pub fn open_memory_database() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&mut conn).context("failed to run migrations")?;
    Ok(conn)
}

/// Wrap a connection into the shared handle.
pub fn shared(conn: Connection) -> Db {
    Arc::new(Mutex::new(conn))
}

/// Run a synchronous closure against the shared connection on the blocking pool.
pub async fn with_conn<T, F>(db: &Db, f: F) -> crate::error::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> crate::error::Result<T> + Send + 'static,
{
    let db = Arc::clone(db);
    tokio::task::spawn_blocking(move || {
        let mut conn = db
            .lock()
            .map_err(|e| EngineError::persistence(format!("db lock poisoned: {e}")))?;
        f(&mut conn)
    })
    .await?
}

/// Canonical timestamp encoding. Fixed width and UTC, so text comparison in
/// SQL is chronological.
pub fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Whether [`ts`] encodes `at` as a fixed-width, four-digit-year string.
pub fn is_storable(at: DateTime<Utc>) -> bool {
    (1..=9999).contains(&at.year())
}

/// [`ts`] for values written into ordered columns. Rejects times whose year
/// would break the fixed-width encoding.
pub fn checked_ts(at: DateTime<Utc>) -> crate::error::Result<String> {
    if !is_storable(at) {
        return Err(EngineError::validation(format!(
            "time {at} is outside the supported range (years 1-9999)"
        )));
    }
    Ok(ts(at))
}

/// Decode a timestamp written by [`ts`].
pub fn parse_ts(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Decode an optional timestamp column.
pub fn parse_opt_ts(raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

/// Summary produced by [`check_database_health`].
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub integrity_ok: bool,
    pub integrity_details: String,
    pub schema_version: u32,
    pub reminder_count: i64,
    pub location_reminder_count: i64,
    pub queued_count: i64,
    pub log_count: i64,
}

/// Run `PRAGMA integrity_check` and gather row counts.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let integrity_details: String = conn
        .query_row("PRAGMA integrity_check", [], |row| row.get(0))
        .context("integrity check failed to run")?;
    let count = |table: &str| -> Result<i64> {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .with_context(|| format!("failed to count {table}"))
    };

    Ok(HealthReport {
        integrity_ok: integrity_details == "ok",
        integrity_details,
        schema_version: migrations::get_schema_version(conn)?,
        reminder_count: count("reminders")?,
        location_reminder_count: count("location_reminders")?,
        queued_count: count("notification_queue")?,
        log_count: count("notification_logs")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_sort_chronologically_as_text() {
        let a = Utc.with_ymd_and_hms(2026, 1, 2, 9, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 1, 10, 8, 0, 0).unwrap();
        assert!(ts(a) < ts(b));
        assert_eq!(parse_ts(&ts(a)).unwrap(), a);
    }

    #[test]
    fn five_digit_years_are_not_storable() {
        let last = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(checked_ts(last).unwrap(), ts(last));

        let beyond = last + chrono::Duration::days(1);
        assert!(!is_storable(beyond));
        assert!(matches!(checked_ts(beyond), Err(EngineError::Validation(_))));
    }

    #[test]
    fn health_check_on_fresh_db() {
        let conn = open_memory_database().unwrap();
        let report = check_database_health(&conn).unwrap();
        assert!(report.integrity_ok);
        assert_eq!(report.schema_version, migrations::CURRENT_SCHEMA_VERSION);
        assert_eq!(report.reminder_count, 0);
    }
}
