//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};

use nudge::config::NudgeConfig;
use nudge::db;

/// Run database diagnostics and print a health report.
pub fn doctor(config: &NudgeConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `nudge serve` or `nudge add` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("Nudge Health Report");
    println!("===================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!(
        "Schema version:    {} (current {})",
        report.schema_version,
        db::migrations::CURRENT_SCHEMA_VERSION
    );
    println!();
    println!("Row counts:");
    println!("  Reminders:       {}", report.reminder_count);
    println!("  Location:        {}", report.location_reminder_count);
    println!("  Queued:          {}", report.queued_count);
    println!("  Delivery log:    {}", report.log_count);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery steps:");
        println!("  1. Stop `nudge serve`.");
        println!("  2. Restore from a backup: cp backup.db ~/.nudge/nudge.db");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
