mod helpers;

use chrono::Duration;
use helpers::{advance_secs, due, settle, Harness};
use nudge::error::EngineError;
use nudge::notify::types::{Channel, NotificationPriority};
use nudge::reminder::types::{NewReminder, Recurrence, ReminderPriority, ReminderStatus};
use nudge::timer::TaskKey;

fn reminder(h: &Harness, title: &str, offset_secs: i64, priority: ReminderPriority) -> NewReminder {
    NewReminder {
        owner: "alice".into(),
        title: title.into(),
        due_time: due(h.now() + Duration::seconds(offset_secs)),
        priority,
        ..NewReminder::default()
    }
}

#[tokio::test(start_paused = true)]
async fn past_due_reminder_triggers_and_escalates_three_levels() {
    let h = Harness::new();
    let r = h
        .engine
        .create_reminder(reminder(&h, "Call the bank", -1, ReminderPriority::High))
        .await
        .unwrap();
    settle().await;

    let stored = h.engine.get_reminder(&r.id).await.unwrap();
    assert_eq!(stored.status, ReminderStatus::Triggered);
    assert!(stored.triggered_at.is_some());
    assert_eq!(h.engine.escalation_level(&r.id), Some(1));

    let sent = h.push.notifications();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].priority, NotificationPriority::High);
    assert_eq!(sent[0].payload["escalation_level"], 1);
    assert_eq!(sent[0].source_id.as_deref(), Some(r.id.as_str()));
    assert_eq!(h.in_app.count(), 1);
    // default channels are push and in-app only
    assert_eq!(h.sms.count(), 0);

    // nothing new before the interval elapses
    advance_secs(290).await;
    assert_eq!(h.push.count(), 1);

    advance_secs(10).await;
    let sent = h.push.notifications();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].priority, NotificationPriority::High);
    assert_eq!(sent[1].payload["escalation_level"], 2);
    assert_eq!(sent[1].payload["style"], "audible");
    assert_eq!(h.engine.escalation_level(&r.id), Some(2));

    advance_secs(300).await;
    let sent = h.push.notifications();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[2].payload["escalation_level"], 3);
    assert_eq!(sent[2].payload["repeat_every_minutes"], 5);

    // level 3 is the last
    advance_secs(1800).await;
    assert_eq!(h.push.count(), 3);
    assert_eq!(h.engine.escalation_level(&r.id), Some(3));
    assert!(!h
        .engine
        .timer()
        .is_scheduled(&TaskKey::EscalationCheck(r.id.clone())));
}

#[tokio::test(start_paused = true)]
async fn low_priority_reminder_keeps_its_priority_at_level_one() {
    let h = Harness::new();
    h.engine
        .create_reminder(reminder(&h, "Water plants", 0, ReminderPriority::Low))
        .await
        .unwrap();
    settle().await;

    let sent = h.push.notifications();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].priority, NotificationPriority::Low);
    assert_eq!(sent[0].kind, "reminder");

    advance_secs(300).await;
    assert_eq!(h.push.notifications()[1].priority, NotificationPriority::High);
}

#[tokio::test(start_paused = true)]
async fn future_reminder_fires_at_due_time_not_before() {
    let h = Harness::new();
    let r = h
        .engine
        .create_reminder(reminder(&h, "Stand-up", 120, ReminderPriority::Medium))
        .await
        .unwrap();
    assert!(h.engine.timer().is_scheduled(&TaskKey::ReminderDue(r.id.clone())));

    advance_secs(60).await;
    assert_eq!(h.engine.get_reminder(&r.id).await.unwrap().status, ReminderStatus::Pending);
    assert_eq!(h.push.count(), 0);

    advance_secs(61).await;
    assert_eq!(h.engine.get_reminder(&r.id).await.unwrap().status, ReminderStatus::Triggered);
    assert_eq!(h.push.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn completing_stops_escalation() {
    let h = Harness::new();
    let r = h
        .engine
        .create_reminder(reminder(&h, "Take pills", -1, ReminderPriority::High))
        .await
        .unwrap();
    settle().await;
    assert_eq!(h.push.count(), 1);

    let done = h.engine.complete_reminder(&r.id).await.unwrap();
    assert_eq!(done.status, ReminderStatus::Completed);
    assert!(done.completed_at.is_some());
    assert_eq!(h.engine.escalation_level(&r.id), None);

    advance_secs(900).await;
    assert_eq!(h.push.count(), 1);

    // completing again is a no-op
    let again = h.engine.complete_reminder(&r.id).await.unwrap();
    assert_eq!(again.status, ReminderStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn completing_before_due_cancels_the_timer() {
    let h = Harness::new();
    let r = h
        .engine
        .create_reminder(reminder(&h, "Submit report", 600, ReminderPriority::Medium))
        .await
        .unwrap();

    h.engine.complete_reminder(&r.id).await.unwrap();
    assert!(!h.engine.timer().is_scheduled(&TaskKey::ReminderDue(r.id.clone())));

    advance_secs(900).await;
    assert_eq!(h.push.count(), 0);
    assert_eq!(h.engine.get_reminder(&r.id).await.unwrap().status, ReminderStatus::Completed);

    let err = h.engine.snooze_reminder(&r.id, Some(5)).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test(start_paused = true)]
async fn snooze_rearms_and_restarts_escalation_at_level_one() {
    let h = Harness::new();
    let r = h
        .engine
        .create_reminder(reminder(&h, "Leave for airport", -1, ReminderPriority::High))
        .await
        .unwrap();
    settle().await;
    assert_eq!(h.engine.escalation_level(&r.id), Some(1));

    let snoozed = h.engine.snooze_reminder(&r.id, Some(10)).await.unwrap();
    assert_eq!(snoozed.status, ReminderStatus::Snoozed);
    assert!(snoozed.snoozed_at.is_some());
    assert_eq!(h.engine.escalation_level(&r.id), None);

    // the old re-check would have fired here
    advance_secs(300).await;
    assert_eq!(h.push.count(), 1);

    advance_secs(301).await;
    let sent = h.push.notifications();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].payload["escalation_level"], 1);
    assert_eq!(h.engine.get_reminder(&r.id).await.unwrap().status, ReminderStatus::Triggered);
    assert_eq!(h.engine.escalation_level(&r.id), Some(1));
}

#[tokio::test(start_paused = true)]
async fn snooze_uses_configured_default() {
    let h = Harness::new();
    let r = h
        .engine
        .create_reminder(reminder(&h, "Stretch", 3600, ReminderPriority::Low))
        .await
        .unwrap();

    let snoozed = h.engine.snooze_reminder(&r.id, None).await.unwrap();
    assert_eq!(snoozed.due_time, h.now() + Duration::minutes(10));

    let err = h.engine.snooze_reminder(&r.id, Some(0)).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test(start_paused = true)]
async fn deleting_mid_escalation_is_a_quiet_no_op() {
    let h = Harness::new();
    let r = h
        .engine
        .create_reminder(reminder(&h, "Pay rent", -1, ReminderPriority::Medium))
        .await
        .unwrap();
    settle().await;

    h.engine.delete_reminder(&r.id).await.unwrap();
    advance_secs(900).await;

    assert_eq!(h.push.count(), 1);
    assert!(h.engine.get_reminder(&r.id).await.unwrap_err().is_not_found());
    assert!(h.engine.delete_reminder(&r.id).await.unwrap_err().is_not_found());
}

#[tokio::test(start_paused = true)]
async fn recheck_observes_row_removed_behind_the_engines_back() {
    let h = Harness::new();
    let r = h
        .engine
        .create_reminder(reminder(&h, "Feed cat", -1, ReminderPriority::Medium))
        .await
        .unwrap();
    settle().await;

    h.db
        .lock()
        .unwrap()
        .execute("DELETE FROM reminders WHERE id = ?1", [&r.id])
        .unwrap();

    advance_secs(300).await;
    assert_eq!(h.push.count(), 1);
    assert_eq!(h.engine.escalation_level(&r.id), None);
}

#[tokio::test(start_paused = true)]
async fn failed_level_one_delivery_still_escalates() {
    let h = Harness::with_failing_push();
    let r = h
        .engine
        .create_reminder(reminder(&h, "Check oven", -1, ReminderPriority::Medium))
        .await
        .unwrap();
    settle().await;

    assert_eq!(h.push.count(), 0);
    assert_eq!(h.in_app.count(), 1);

    let logs = h.engine.get_delivery_logs("alice", 10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].success);
    let push = logs[0]
        .results
        .iter()
        .find(|r| r.channel == Channel::Push)
        .unwrap();
    assert!(!push.success);
    assert!(push.error.as_deref().unwrap().contains("transport unavailable"));

    advance_secs(300).await;
    assert_eq!(h.in_app.count(), 2);
    assert_eq!(h.engine.escalation_level(&r.id), Some(2));
}

#[tokio::test(start_paused = true)]
async fn recurring_reminder_spawns_one_successor_per_occurrence() {
    let h = Harness::new();
    let original_due = h.now() - Duration::seconds(1);
    let r = h
        .engine
        .create_reminder(NewReminder {
            recurrence: Recurrence::Daily,
            ..reminder(&h, "Journal", -1, ReminderPriority::Low)
        })
        .await
        .unwrap();
    settle().await;

    let all = h.engine.get_user_reminders("alice", None).await.unwrap();
    assert_eq!(all.len(), 2);
    let next = h
        .engine
        .get_user_reminders("alice", Some(ReminderStatus::Pending))
        .await
        .unwrap();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].parent_id.as_deref(), Some(r.id.as_str()));
    assert_eq!(next[0].due_time, original_due + Duration::days(1));
    assert_eq!(next[0].title, "Journal");
    assert_eq!(next[0].recurrence, Recurrence::Daily);

    // a snoozed occurrence triggering again does not fork the series
    h.engine.snooze_reminder(&r.id, Some(1)).await.unwrap();
    advance_secs(61).await;
    assert_eq!(h.engine.get_reminder(&r.id).await.unwrap().status, ReminderStatus::Triggered);
    assert_eq!(h.engine.get_user_reminders("alice", None).await.unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn recurrence_does_not_drift_over_cycles() {
    let h = Harness::new();
    let original_due = h.now() - Duration::seconds(1);
    h.engine
        .create_reminder(NewReminder {
            recurrence: Recurrence::Daily,
            ..reminder(&h, "Vitamins", -1, ReminderPriority::Low)
        })
        .await
        .unwrap();
    settle().await;

    advance_secs(3 * 86_400).await;

    let pending = h
        .engine
        .get_user_reminders("alice", Some(ReminderStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].due_time, original_due + Duration::days(4));
    assert_eq!(
        h.engine
            .get_user_reminders("alice", Some(ReminderStatus::Triggered))
            .await
            .unwrap()
            .len(),
        4
    );
}

#[tokio::test(start_paused = true)]
async fn timer_and_sweep_race_triggers_once() {
    let h = Harness::new();
    let r = h
        .engine
        .create_reminder(reminder(&h, "Race", -1, ReminderPriority::Medium))
        .await
        .unwrap();

    let (swept, _) = tokio::join!(h.engine.run_due_sweep(), settle());
    settle().await;

    assert!(swept.unwrap() <= 1);
    assert_eq!(h.push.count(), 1);
    assert_eq!(h.engine.escalation_level(&r.id), Some(1));
    assert_eq!(h.engine.run_due_sweep().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn invalid_input_is_rejected() {
    let h = Harness::new();

    let bad_due = NewReminder {
        due_time: "next tuesday-ish".into(),
        ..reminder(&h, "x", 0, ReminderPriority::Low)
    };
    assert!(matches!(
        h.engine.create_reminder(bad_due).await.unwrap_err(),
        EngineError::Validation(_)
    ));

    let no_title = reminder(&h, "   ", 0, ReminderPriority::Low);
    assert!(matches!(
        h.engine.create_reminder(no_title).await.unwrap_err(),
        EngineError::Validation(_)
    ));

    assert!(h.engine.complete_reminder("missing").await.unwrap_err().is_not_found());
    assert!(h.engine.snooze_reminder("missing", Some(5)).await.unwrap_err().is_not_found());
    assert!(h.engine.get_user_reminders("alice", None).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn oversized_snooze_is_rejected_and_leaves_the_reminder_intact() {
    let h = Harness::new();
    let r = h
        .engine
        .create_reminder(reminder(&h, "Renew passport", 3600, ReminderPriority::Medium))
        .await
        .unwrap();

    for minutes in [u32::MAX, 60 * 24 * 365] {
        let err = h.engine.snooze_reminder(&r.id, Some(minutes)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)), "{minutes}: {err:?}");
    }

    let listed = h.engine.get_user_reminders("alice", None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, ReminderStatus::Pending);
    assert_eq!(listed[0].due_time, r.due_time);
    assert!(listed[0].snoozed_at.is_none());
    assert!(h.engine.timer().is_scheduled(&TaskKey::ReminderDue(r.id.clone())));

    let month = h.engine.snooze_reminder(&r.id, Some(30 * 24 * 60)).await.unwrap();
    assert_eq!(month.due_time, h.now() + Duration::days(30));
}

#[tokio::test(start_paused = true)]
async fn snoozed_lists_separately_from_pending_until_it_fires() {
    let h = Harness::new();
    let waiting = h
        .engine
        .create_reminder(reminder(&h, "Call the bank", 3600, ReminderPriority::Medium))
        .await
        .unwrap();
    let r = h
        .engine
        .create_reminder(reminder(&h, "Water plants", 600, ReminderPriority::Medium))
        .await
        .unwrap();
    h.engine.snooze_reminder(&r.id, Some(20)).await.unwrap();

    let snoozed = h
        .engine
        .get_user_reminders("alice", Some(ReminderStatus::Snoozed))
        .await
        .unwrap();
    assert_eq!(snoozed.len(), 1);
    assert_eq!(snoozed[0].id, r.id);
    assert_eq!(snoozed[0].due_time, h.now() + Duration::minutes(20));

    let pending = h
        .engine
        .get_user_reminders("alice", Some(ReminderStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, waiting.id);

    // snoozed is armed like pending: nothing at the old due time, fires at the new one
    assert!(h.engine.timer().is_scheduled(&TaskKey::ReminderDue(r.id.clone())));
    advance_secs(15 * 60).await;
    assert_eq!(h.push.count(), 0);
    advance_secs(5 * 60).await;
    assert_eq!(h.engine.get_reminder(&r.id).await.unwrap().status, ReminderStatus::Triggered);
    assert_eq!(h.push.count(), 1);
}
