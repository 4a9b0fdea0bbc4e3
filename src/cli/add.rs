use anyhow::{anyhow, Context, Result};

use nudge::config::NudgeConfig;
use nudge::reminder::store;
use nudge::reminder::types::NewReminder;

pub struct AddArgs {
    pub owner: String,
    pub title: String,
    pub due: String,
    pub description: String,
    pub priority: String,
    pub recurrence: String,
}

/// Persist a reminder. A running `serve` picks it up on its next due sweep.
pub fn add(config: &NudgeConfig, args: AddArgs) -> Result<()> {
    let input = NewReminder {
        owner: args.owner,
        title: args.title,
        description: args.description,
        due_time: args.due,
        priority: args.priority.parse().map_err(|e: String| anyhow!(e))?,
        recurrence: args.recurrence.parse().map_err(|e: String| anyhow!(e))?,
    };
    let reminder = input.into_reminder(chrono::Utc::now())?;

    let conn = super::open(config)?;
    store::insert_reminder(&conn, &reminder).context("failed to save reminder")?;

    println!("Created reminder {}", reminder.id);
    println!("  Title:       {}", reminder.title);
    println!("  Due:         {}", reminder.due_time.to_rfc3339());
    println!("  Priority:    {}", reminder.priority);
    println!("  Recurrence:  {}", reminder.recurrence);
    Ok(())
}
