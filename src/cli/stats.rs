use anyhow::Result;

use nudge::config::NudgeConfig;
use nudge::notify::log::delivery_stats;
use nudge::reminder::store::status_counts;

/// Display reminder and delivery statistics in the terminal.
pub fn stats(config: &NudgeConfig) -> Result<()> {
    let conn = super::open(config)?;
    let counts = status_counts(&conn)?;
    let deliveries = delivery_stats(&conn)?;

    println!("Reminder Statistics");
    println!("{}", "=".repeat(40));
    let total: i64 = counts.values().sum();
    println!("  Total reminders:     {total}");
    for s in &["pending", "triggered", "snoozed", "completed"] {
        let count = counts.get(*s).copied().unwrap_or(0);
        println!("  {:<12}         {}", s, count);
    }
    println!();

    println!("Deliveries:");
    println!("  Total:               {}", deliveries.total);
    println!("  Succeeded:           {}", deliveries.succeeded);
    println!("  Failed:              {}", deliveries.failed);
    match deliveries.success_rate() {
        Some(rate) => println!("  Success rate:        {:.1}%", rate * 100.0),
        None => println!("  Success rate:        n/a"),
    }

    Ok(())
}
