//! Grouping of deferred medium/low notifications into a single delivery.

use serde_json::json;
use std::collections::HashSet;

use super::types::Notification;

/// How many items the grouped body lists by title.
pub const SUMMARY_ITEMS: usize = 3;

/// Dedup by `(type, source id or title)` keeping the first occurrence, then
/// order by priority descending. The sort is stable, so equal priorities keep
/// arrival order.
pub fn prepare(items: Vec<Notification>) -> Vec<Notification> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Notification> = items
        .into_iter()
        .filter(|n| {
            let (kind, id) = n.dedup_key();
            seen.insert((kind.to_string(), id.to_string()))
        })
        .collect();
    unique.sort_by(|a, b| b.priority.cmp(&a.priority));
    unique
}

/// Build the grouped notification for a flushed batch. `None` for an empty batch.
pub fn summarize(items: Vec<Notification>) -> Option<Notification> {
    let items = prepare(items);
    let top = items.first()?;
    let priority = top.priority;

    let mut lines: Vec<String> = items
        .iter()
        .take(SUMMARY_ITEMS)
        .map(|n| format!("- {}", n.title))
        .collect();
    let remainder = items.len().saturating_sub(SUMMARY_ITEMS);
    if remainder > 0 {
        lines.push(format!("and {remainder} more"));
    }

    let title = match items.len() {
        1 => "You have 1 notification".to_string(),
        n => format!("You have {n} notifications"),
    };
    let refs: Vec<serde_json::Value> = items
        .iter()
        .map(|n| {
            json!({
                "type": n.kind,
                "source_id": n.source_id,
                "title": n.title,
                "priority": n.priority,
            })
        })
        .collect();

    Some(
        Notification::new("batch", &title, &lines.join("\n"), priority)
            .with_payload(json!({ "count": items.len(), "items": refs })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::types::NotificationPriority;

    fn item(kind: &str, title: &str, priority: NotificationPriority) -> Notification {
        Notification::new(kind, title, "", priority)
    }

    #[test]
    fn duplicates_collapse_to_first() {
        let items = vec![
            item("news", "First", NotificationPriority::Low).with_source("a1"),
            item("news", "Second", NotificationPriority::Medium).with_source("a1"),
            item("weather", "Rain", NotificationPriority::Low).with_source("a1"),
        ];
        let prepared = prepare(items);
        assert_eq!(prepared.len(), 2);
        assert!(prepared.iter().any(|n| n.title == "First"));
        assert!(!prepared.iter().any(|n| n.title == "Second"));
    }

    #[test]
    fn title_is_dedup_fallback() {
        let items = vec![
            item("news", "Same", NotificationPriority::Low),
            item("news", "Same", NotificationPriority::Low),
        ];
        assert_eq!(prepare(items).len(), 1);
    }

    #[test]
    fn sorted_by_priority_descending() {
        let items = vec![
            item("a", "low", NotificationPriority::Low),
            item("b", "medium", NotificationPriority::Medium),
            item("c", "low2", NotificationPriority::Low),
        ];
        let titles: Vec<_> = prepare(items).into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["medium", "low", "low2"]);
    }

    #[test]
    fn five_items_summarize_three_and_remainder() {
        let items: Vec<_> = (1..=5)
            .map(|i| item("task", &format!("Task {i}"), NotificationPriority::Medium))
            .collect();
        let grouped = summarize(items).unwrap();

        assert_eq!(grouped.kind, "batch");
        assert_eq!(grouped.title, "You have 5 notifications");
        assert_eq!(grouped.priority, NotificationPriority::Medium);
        assert_eq!(grouped.body, "- Task 1\n- Task 2\n- Task 3\nand 2 more");
        assert_eq!(grouped.payload["count"], 5);
    }

    #[test]
    fn empty_batch_has_no_summary() {
        assert!(summarize(Vec::new()).is_none());
    }
}
