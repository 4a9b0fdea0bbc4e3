use anyhow::{anyhow, Result};

use nudge::config::NudgeConfig;
use nudge::reminder::store;
use nudge::reminder::types::ReminderStatus;

/// Print an owner's reminders, optionally filtered by status.
pub fn list(config: &NudgeConfig, owner: &str, status: Option<&str>) -> Result<()> {
    let status = status
        .map(|s| s.parse::<ReminderStatus>())
        .transpose()
        .map_err(|e| anyhow!(e))?;

    let conn = super::open(config)?;
    let reminders = store::list_reminders(&conn, owner, status)?;

    if reminders.is_empty() {
        println!("No reminders for {owner}.");
        return Ok(());
    }

    println!("{:<36}  {:<10}  {:<8}  {:<20}  TITLE", "ID", "STATUS", "PRIORITY", "DUE");
    for r in &reminders {
        println!(
            "{:<36}  {:<10}  {:<8}  {:<20}  {}{}",
            r.id,
            r.status,
            r.priority,
            r.due_time.format("%Y-%m-%d %H:%M UTC"),
            r.title,
            if r.recurring() {
                format!(" ({})", r.recurrence)
            } else {
                String::new()
            }
        );
    }
    println!();
    println!("{} reminder(s)", reminders.len());
    Ok(())
}
