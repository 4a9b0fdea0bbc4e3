//! SQL DDL for all nudge tables.
//!
//! Defines `reminders`, `location_reminders`, `notification_queue`,
//! `notification_logs`, `notification_preferences` and `schema_meta`. All DDL
//! uses `IF NOT EXISTS` for idempotent initialization. This is the v1 layout;
//! later columns arrive through [`super::migrations`].

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Time-triggered reminders
CREATE TABLE IF NOT EXISTS reminders (
    id TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    due_time TEXT NOT NULL,
    priority TEXT NOT NULL DEFAULT 'medium' CHECK(priority IN ('low','medium','high')),
    recurring INTEGER NOT NULL DEFAULT 0,
    recurrence_pattern TEXT NOT NULL DEFAULT 'none'
        CHECK(recurrence_pattern IN ('none','daily','weekly','monthly')),
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK(status IN ('pending','triggered','completed','snoozed')),
    parent_id TEXT,
    created_at TEXT NOT NULL,
    triggered_at TEXT,
    completed_at TEXT,
    snoozed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_reminders_owner ON reminders(owner);
CREATE INDEX IF NOT EXISTS idx_reminders_status ON reminders(status);

-- Geofenced reminders, triggered by position reports only
CREATE TABLE IF NOT EXISTS location_reminders (
    id TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    location_name TEXT,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    radius_m REAL NOT NULL CHECK(radius_m > 0),
    status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending','triggered')),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_location_reminders_owner ON location_reminders(owner, status);

-- Notifications deferred to an optimal delivery time
CREATE TABLE IF NOT EXISTS notification_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner TEXT NOT NULL,
    payload TEXT NOT NULL,
    scheduled_time TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_queue_scheduled ON notification_queue(scheduled_time);

-- Outcome of every delivery attempt
CREATE TABLE IF NOT EXISTS notification_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner TEXT NOT NULL,
    type TEXT NOT NULL,
    priority TEXT NOT NULL,
    channel_results TEXT NOT NULL,
    success INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_logs_owner ON notification_logs(owner);

-- Per-owner notification preferences (JSON document)
CREATE TABLE IF NOT EXISTS notification_preferences (
    owner TEXT PRIMARY KEY,
    preferences TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
