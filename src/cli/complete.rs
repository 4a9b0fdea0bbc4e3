//! CLI `complete` and `snooze` commands.
//!
//! Both write the store directly. A running `serve` observes the new status
//! on its next trigger attempt or escalation re-check.

use anyhow::{Context, Result};
use chrono::Utc;

use nudge::config::NudgeConfig;
use nudge::reminder::due::snooze_until;
use nudge::reminder::store;

pub fn complete(config: &NudgeConfig, id: &str) -> Result<()> {
    let conn = super::open(config)?;
    let transition = store::mark_completed(&conn, id, Utc::now())
        .with_context(|| format!("failed to complete reminder {id}"))?;

    if transition.applied() {
        println!("Completed: {}", transition.reminder().title);
    } else {
        println!("Already completed: {}", transition.reminder().title);
    }
    Ok(())
}

pub fn snooze(config: &NudgeConfig, id: &str, minutes: Option<u32>) -> Result<()> {
    let minutes = minutes.unwrap_or(config.scheduler.default_snooze_minutes);
    let now = Utc::now();
    let until = snooze_until(now, minutes)?;

    let mut conn = super::open(config)?;
    let reminder = store::mark_snoozed(&mut conn, id, now, until)
        .with_context(|| format!("failed to snooze reminder {id}"))?;

    println!(
        "Snoozed \"{}\" until {}",
        reminder.title,
        reminder.due_time.format("%Y-%m-%d %H:%M UTC")
    );
    Ok(())
}
