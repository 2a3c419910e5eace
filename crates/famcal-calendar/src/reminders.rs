//! Due-reminder polling over rows already in memory.

use chrono::{DateTime, Duration, Utc};

use crate::types::{DueReminder, Event};

/// Reminders of non-recurring events whose fire time is in `[from, to)`,
/// earliest first (ties broken by event id).
///
/// Same selection as [`SqliteEventStore::due_reminders`], for rows that
/// came from any store.
///
/// [`SqliteEventStore::due_reminders`]: crate::store::SqliteEventStore::due_reminders
pub fn due_reminders<'a, I>(events: I, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<DueReminder>
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut due: Vec<DueReminder> = events
        .into_iter()
        .filter(|event| event.recurrence_rule.is_none())
        .filter_map(|event| {
            let reminder = event.reminder?;
            let fire_at = event.start - Duration::minutes(i64::from(reminder.minutes_before));
            (from <= fire_at && fire_at < to).then(|| DueReminder {
                event_id: event.id.clone(),
                family_id: event.family_id.clone(),
                title: event.title.clone(),
                event_start: event.start,
                fire_at,
                method: reminder.method,
            })
        })
        .collect();

    due.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then_with(|| a.event_id.cmp(&b.event_id)));
    due
}
