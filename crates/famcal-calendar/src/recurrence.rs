//! Recurring event expansion.
//!
//! Supports a small RRULE subset: `FREQ=DAILY|WEEKLY|MONTHLY|YEARLY` with an
//! optional `UNTIL=YYYYMMDD`. No INTERVAL, BYDAY/BYMONTHDAY or exceptions.
//!
//! Occurrence `n` is computed as `start + n units` from the original start,
//! so month and year steps clamp to the last day of short months without
//! drifting (Jan 31, Feb 29, Mar 31, Apr 30, ...). At most
//! [`MAX_OCCURRENCES`] candidates are considered per event.

use std::fmt;

use chrono::{DateTime, Days, Duration, Months, NaiveDate, Utc};

use crate::types::{Event, EventInstance, TimeWindow};

/// Hard cap on candidate occurrences walked per recurring event.
pub const MAX_OCCURRENCES: u32 = 100;

/// Prefix on the title of every virtual occurrence.
pub const RECURRING_MARKER: &str = "🔁 ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Some(Frequency::Daily),
            "WEEKLY" => Some(Frequency::Weekly),
            "MONTHLY" => Some(Frequency::Monthly),
            "YEARLY" => Some(Frequency::Yearly),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }

    /// `start` advanced by `n` units; `None` past chrono's representable range.
    fn advance(self, start: DateTime<Utc>, n: u32) -> Option<DateTime<Utc>> {
        match self {
            Frequency::Daily => start.checked_add_days(Days::new(u64::from(n))),
            Frequency::Weekly => start.checked_add_days(Days::new(u64::from(n) * 7)),
            Frequency::Monthly => start.checked_add_months(Months::new(n)),
            Frequency::Yearly => start.checked_add_months(Months::new(n.checked_mul(12)?)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    /// Last calendar date (inclusive) an occurrence may fall on.
    pub until: Option<NaiveDate>,
}

impl RecurrenceRule {
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            until: None,
        }
    }

    pub fn until(mut self, date: NaiveDate) -> Self {
        self.until = Some(date);
        self
    }

    /// Parse an RRULE-subset string such as `FREQ=WEEKLY;UNTIL=20240115`.
    ///
    /// Returns `None` when `FREQ` is missing or not one of the supported
    /// frequencies. An unreadable `UNTIL` is dropped rather than rejecting
    /// the rule. Unsupported parts are ignored.
    pub fn parse(rule: &str) -> Option<Self> {
        let body = rule.trim();
        let body = body.strip_prefix("RRULE:").unwrap_or(body);

        let mut frequency = None;
        let mut until = None;

        for part in body.split(';') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            match key.trim().to_ascii_uppercase().as_str() {
                "FREQ" => frequency = Frequency::parse(value),
                "UNTIL" => {
                    until = parse_until(value);
                    if until.is_none() {
                        tracing::debug!(value, "Ignoring unreadable UNTIL in recurrence rule");
                    }
                }
                other => tracing::trace!(part = other, "Ignoring unsupported recurrence part"),
            }
        }

        Some(Self {
            frequency: frequency?,
            until,
        })
    }

    /// Lazy, restartable sequence of candidate start instants from `start`.
    pub fn occurrences(&self, start: DateTime<Utc>) -> Occurrences {
        Occurrences {
            start,
            frequency: self.frequency,
            next: 0,
        }
    }

    fn allows(&self, candidate: DateTime<Utc>) -> bool {
        self.until.map_or(true, |until| candidate.date_naive() <= until)
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FREQ={}", self.frequency.as_str())?;
        if let Some(until) = self.until {
            write!(f, ";UNTIL={}", until.format("%Y%m%d"))?;
        }
        Ok(())
    }
}

/// `YYYYMMDD`, optionally followed by a `THHMMSS[Z]` time which is ignored.
fn parse_until(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    let date = value.get(..8)?;
    let rest = &value[8..];
    if !rest.is_empty() && !rest.starts_with('T') {
        return None;
    }
    NaiveDate::parse_from_str(date, "%Y%m%d").ok()
}

/// Candidate occurrence starts, capped at [`MAX_OCCURRENCES`].
#[derive(Debug, Clone)]
pub struct Occurrences {
    start: DateTime<Utc>,
    frequency: Frequency,
    next: u32,
}

impl Iterator for Occurrences {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= MAX_OCCURRENCES {
            return None;
        }
        let candidate = self.frequency.advance(self.start, self.next)?;
        self.next += 1;
        Some(candidate)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some((MAX_OCCURRENCES - self.next) as usize))
    }
}

/// Expand a recurring event into the virtual instances starting inside `window`.
///
/// Returns an empty list when the event has no rule, the rule's `FREQ`
/// can't be parsed, the event does not end after it starts, or the window
/// is inverted.
pub fn expand_recurring_event(event: &Event, window: &TimeWindow) -> Vec<EventInstance> {
    if window.is_inverted() || is_degenerate(event) {
        return Vec::new();
    }
    let Some(rule) = event.recurrence_rule.as_deref().and_then(RecurrenceRule::parse) else {
        return Vec::new();
    };
    expand_with_rule(event, &rule, window)
}

fn is_degenerate(event: &Event) -> bool {
    event.end <= event.start
}

fn expand_with_rule(event: &Event, rule: &RecurrenceRule, window: &TimeWindow) -> Vec<EventInstance> {
    let duration = event.end - event.start;

    rule.occurrences(event.start)
        .take_while(|candidate| *candidate <= window.end && rule.allows(*candidate))
        .filter(|candidate| *candidate >= window.start)
        .map(|candidate| virtual_instance(event, candidate, duration))
        .collect()
}

fn virtual_instance(event: &Event, start: DateTime<Utc>, duration: Duration) -> EventInstance {
    EventInstance {
        id: EventInstance::synthetic_id(&event.id, start),
        base_event_id: event.id.clone(),
        is_virtual_instance: true,
        title: format!("{}{}", RECURRING_MARKER, event.title),
        description: event.description.clone(),
        location: event.location.clone(),
        color: event.color.clone(),
        start,
        end: start + duration,
        notes: None,
        reminder: None,
        checklist: Vec::new(),
    }
}

/// Everything a family calendar shows for `window`, sorted by start then id.
///
/// Rows with a usable rule are expanded; every other row, including rows
/// whose rule is malformed, appears once if it intersects the window. Rows
/// that do not end after they start are skipped.
pub fn instances_in_window(events: &[Event], window: &TimeWindow) -> Vec<EventInstance> {
    if window.is_inverted() {
        return Vec::new();
    }

    let mut instances = Vec::new();
    for event in events {
        if is_degenerate(event) {
            tracing::debug!(event_id = %event.id, "Skipping event that ends before it starts");
            continue;
        }
        match event.recurrence_rule.as_deref().and_then(RecurrenceRule::parse) {
            Some(rule) => instances.extend(expand_with_rule(event, &rule, window)),
            None => {
                if event.recurrence_rule.is_some() {
                    tracing::debug!(
                        event_id = %event.id,
                        "Unparseable recurrence rule, showing event once"
                    );
                }
                if window.touches(event.start, event.end) {
                    instances.push(EventInstance::single(event));
                }
            }
        }
    }

    instances.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
    instances
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::types::{ChecklistItem, Reminder, ReminderMethod};
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_rules() {
        assert_eq!(
            RecurrenceRule::parse("FREQ=WEEKLY"),
            Some(RecurrenceRule::new(Frequency::Weekly))
        );
        assert_eq!(
            RecurrenceRule::parse("RRULE:FREQ=daily;UNTIL=20240115"),
            Some(RecurrenceRule::new(Frequency::Daily).until(date(2024, 1, 15)))
        );
        assert_eq!(
            RecurrenceRule::parse("FREQ=MONTHLY;UNTIL=20240301T235959Z"),
            Some(RecurrenceRule::new(Frequency::Monthly).until(date(2024, 3, 1)))
        );
        assert_eq!(
            RecurrenceRule::parse("UNTIL=20240115;FREQ=YEARLY;INTERVAL=2"),
            Some(RecurrenceRule::new(Frequency::Yearly).until(date(2024, 1, 15)))
        );
    }

    #[test]
    fn test_parse_rejects_bad_freq() {
        assert_eq!(RecurrenceRule::parse("FREQ="), None);
        assert_eq!(RecurrenceRule::parse("FREQ=HOURLY"), None);
        assert_eq!(RecurrenceRule::parse("UNTIL=20240115"), None);
        assert_eq!(RecurrenceRule::parse(""), None);
        assert_eq!(RecurrenceRule::parse("garbage"), None);
    }

    #[test]
    fn test_bad_until_is_dropped() {
        assert_eq!(
            RecurrenceRule::parse("FREQ=DAILY;UNTIL=2024-01-15"),
            Some(RecurrenceRule::new(Frequency::Daily))
        );
        assert_eq!(
            RecurrenceRule::parse("FREQ=DAILY;UNTIL=20241345"),
            Some(RecurrenceRule::new(Frequency::Daily))
        );
    }

    #[test]
    fn test_display_is_canonical() {
        let rule = RecurrenceRule::new(Frequency::Weekly).until(date(2024, 1, 15));
        assert_eq!(rule.to_string(), "FREQ=WEEKLY;UNTIL=20240115");
        assert_eq!(RecurrenceRule::parse(&rule.to_string()), Some(rule));
        assert_eq!(RecurrenceRule::new(Frequency::Daily).to_string(), "FREQ=DAILY");
    }

    #[test]
    fn test_occurrences_are_capped_and_restartable() {
        let rule = RecurrenceRule::new(Frequency::Daily);
        let occurrences = rule.occurrences(utc(2024, 1, 1, 8));

        let first: Vec<_> = occurrences.clone().collect();
        let second: Vec<_> = occurrences.collect();

        assert_eq!(first.len(), MAX_OCCURRENCES as usize);
        assert_eq!(first, second);
        assert_eq!(first[0], utc(2024, 1, 1, 8));
        assert_eq!(first[99], utc(2024, 4, 9, 8));
    }

    #[test]
    fn test_monthly_clamps_without_drift() {
        let rule = RecurrenceRule::new(Frequency::Monthly);
        let dates: Vec<_> = rule
            .occurrences(utc(2024, 1, 31, 12))
            .take(5)
            .map(|d| d.date_naive())
            .collect();

        assert_eq!(
            dates,
            vec![
                date(2024, 1, 31),
                date(2024, 2, 29),
                date(2024, 3, 31),
                date(2024, 4, 30),
                date(2024, 5, 31),
            ]
        );
    }

    #[test]
    fn test_yearly_leap_day_clamps() {
        let rule = RecurrenceRule::new(Frequency::Yearly);
        let dates: Vec<_> = rule
            .occurrences(utc(2024, 2, 29, 12))
            .take(5)
            .map(|d| d.date_naive())
            .collect();

        assert_eq!(
            dates,
            vec![
                date(2024, 2, 29),
                date(2025, 2, 28),
                date(2026, 2, 28),
                date(2027, 2, 28),
                date(2028, 2, 29),
            ]
        );
    }

    #[test]
    fn test_virtual_instances_drop_private_state() {
        let mut event = Event::new(
            "chores",
            "fam",
            "alice",
            "Bins out",
            utc(2024, 1, 1, 19),
            utc(2024, 1, 1, 20),
        )
        .with_recurrence("FREQ=DAILY")
        .with_reminder(Reminder {
            method: ReminderMethod::Popup,
            minutes_before: 10,
        });
        event.notes = Some("green bin".into());
        event.checklist = vec![ChecklistItem {
            text: "recycling".into(),
            done: false,
        }];

        let window = TimeWindow::new(utc(2024, 1, 2, 0), utc(2024, 1, 2, 23));
        let instances = expand_recurring_event(&event, &window);

        assert_eq!(instances.len(), 1);
        let instance = &instances[0];
        assert_eq!(instance.id, "chores_2024-01-02T19:00:00Z");
        assert_eq!(instance.base_event_id, "chores");
        assert!(instance.is_virtual_instance);
        assert_eq!(instance.title, "🔁 Bins out");
        assert_eq!(instance.end - instance.start, Duration::hours(1));
        assert!(instance.notes.is_none());
        assert!(instance.reminder.is_none());
        assert!(instance.checklist.is_empty());
    }

    #[test]
    fn test_inverted_window_is_empty() {
        let event = Event::new("e", "f", "m", "Gym", utc(2024, 1, 1, 7), utc(2024, 1, 1, 8))
            .with_recurrence("FREQ=DAILY");
        let window = TimeWindow::new(utc(2024, 1, 10, 0), utc(2024, 1, 5, 0));
        assert!(expand_recurring_event(&event, &window).is_empty());
        assert!(instances_in_window(&[event], &window).is_empty());
    }

    #[test]
    fn test_no_rule_is_empty() {
        let event = Event::new("e", "f", "m", "Gym", utc(2024, 1, 1, 7), utc(2024, 1, 1, 8));
        let window = TimeWindow::new(utc(2024, 1, 1, 0), utc(2024, 1, 31, 0));
        assert!(expand_recurring_event(&event, &window).is_empty());
    }

    #[test]
    fn test_window_far_past_cap_yields_nothing() {
        let event = Event::new("e", "f", "m", "Standup", utc(2024, 1, 1, 9), utc(2024, 1, 1, 10))
            .with_recurrence("FREQ=DAILY");
        // The 100th occurrence is 2024-04-09, so the walk ends before the window.
        let window = TimeWindow::new(utc(2024, 6, 1, 0), utc(2024, 6, 30, 0));
        assert!(expand_recurring_event(&event, &window).is_empty());
    }

    #[test]
    fn test_instances_in_window_merges_and_sorts() {
        let weekly = Event::new("w", "f", "m", "Swim", utc(2024, 1, 1, 17), utc(2024, 1, 1, 18))
            .with_recurrence("FREQ=WEEKLY");
        let one_off = Event::new("o", "f", "m", "Vet", utc(2024, 1, 3, 10), utc(2024, 1, 3, 11));
        let outside = Event::new("x", "f", "m", "Trip", utc(2024, 3, 1, 10), utc(2024, 3, 2, 11));
        let broken = Event::new("b", "f", "m", "Book club", utc(2024, 1, 9, 20), utc(2024, 1, 9, 21))
            .with_recurrence("FREQ=");

        let window = TimeWindow::new(utc(2024, 1, 1, 0), utc(2024, 1, 14, 23));
        let instances = instances_in_window(&[weekly, one_off, outside, broken], &window);

        let ids: Vec<_> = instances.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["w_2024-01-01T17:00:00Z", "o", "w_2024-01-08T17:00:00Z", "b"]
        );
        assert_eq!(instances[3].title, "Book club");
        assert!(!instances[3].is_virtual_instance);
    }

    #[test]
    fn test_backwards_or_empty_event_does_not_expand() {
        let window = TimeWindow::new(utc(2024, 1, 1, 0), utc(2024, 1, 29, 23));
        let backwards = Event::new("b", "f", "m", "Late", utc(2024, 1, 1, 20), utc(2024, 1, 1, 19))
            .with_recurrence("FREQ=WEEKLY");
        let empty = Event::new("z", "f", "m", "Blink", utc(2024, 1, 1, 9), utc(2024, 1, 1, 9))
            .with_recurrence("FREQ=DAILY");

        assert!(expand_recurring_event(&backwards, &window).is_empty());
        assert!(expand_recurring_event(&empty, &window).is_empty());
        assert!(instances_in_window(&[backwards, empty], &window).is_empty());
    }
}
