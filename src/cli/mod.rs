pub mod add;
pub mod complete;
pub mod doctor;
pub mod list;
pub mod serve;
pub mod stats;

use anyhow::Result;
use rusqlite::Connection;

use nudge::config::NudgeConfig;

/// Open the configured database, creating and migrating it if needed.
fn open(config: &NudgeConfig) -> Result<Connection> {
    nudge::db::open_database(config.resolved_db_path())
}
