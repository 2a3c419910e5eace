//! Integration tests for recurring event expansion.

use chrono::{DateTime, Duration, TimeZone, Utc};
use famcal_calendar::{
    expand_recurring_event, instances_in_window, Event, TimeWindow, MAX_OCCURRENCES,
    RECURRING_MARKER,
};

fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

/// Monday evening practice, 19:00 to 20:00.
fn practice(rule: &str) -> Event {
    Event::new(
        "practice",
        "fam1",
        "alice",
        "Soccer practice",
        utc(2024, 1, 1, 19),
        utc(2024, 1, 1, 20),
    )
    .with_recurrence(rule)
}

/// Jan 1 through the end of Jan 29.
fn january_window() -> TimeWindow {
    TimeWindow::new(
        utc(2024, 1, 1, 0),
        Utc.with_ymd_and_hms(2024, 1, 29, 23, 59, 59).unwrap(),
    )
}

fn days(instances: &[famcal_calendar::EventInstance]) -> Vec<u32> {
    use chrono::Datelike;
    instances.iter().map(|i| i.start.day()).collect()
}

#[test]
fn test_weekly_without_until() {
    let instances = expand_recurring_event(&practice("FREQ=WEEKLY"), &january_window());

    assert_eq!(days(&instances), vec![1, 8, 15, 22, 29]);
    for instance in &instances {
        assert_eq!(instance.end - instance.start, Duration::hours(1));
        assert!(instance.is_virtual_instance);
        assert_eq!(instance.base_event_id, "practice");
        assert_eq!(instance.title, format!("{}Soccer practice", RECURRING_MARKER));
    }
}

#[test]
fn test_weekly_with_until() {
    let instances =
        expand_recurring_event(&practice("FREQ=WEEKLY;UNTIL=20240115"), &january_window());

    assert_eq!(days(&instances), vec![1, 8, 15]);
}

#[test]
fn test_empty_frequency_expands_to_nothing_but_renders_once() {
    let event = practice("FREQ=");
    let window = january_window();

    assert!(expand_recurring_event(&event, &window).is_empty());

    let shown = instances_in_window(&[event], &window);
    assert_eq!(shown.len(), 1);
    assert!(!shown[0].is_virtual_instance);
    assert_eq!(shown[0].id, "practice");
    assert_eq!(shown[0].title, "Soccer practice");
}

#[test]
fn test_k_week_window_boundaries() {
    let event = practice("FREQ=WEEKLY");
    for k in 1..=10i64 {
        let start = event.start;

        // Half-open k-week window expressed as a closed one.
        let exact = TimeWindow::new(start, start + Duration::weeks(k) - Duration::seconds(1));
        assert_eq!(expand_recurring_event(&event, &exact).len() as i64, k);

        // Closed window whose end lands exactly on the next occurrence.
        let touching = TimeWindow::new(start, start + Duration::weeks(k));
        assert_eq!(expand_recurring_event(&event, &touching).len() as i64, k + 1);
    }
}

#[test]
fn test_never_more_than_cap() {
    let huge = TimeWindow::new(utc(2000, 1, 1, 0), utc(2200, 1, 1, 0));
    for rule in ["FREQ=DAILY", "FREQ=WEEKLY", "FREQ=MONTHLY", "FREQ=YEARLY"] {
        let instances = expand_recurring_event(&practice(rule), &huge);
        assert!(instances.len() <= MAX_OCCURRENCES as usize, "{}", rule);
    }
    assert_eq!(
        expand_recurring_event(&practice("FREQ=DAILY"), &huge).len(),
        MAX_OCCURRENCES as usize
    );
}

#[test]
fn test_expansion_is_deterministic() {
    let event = practice("FREQ=WEEKLY;UNTIL=20240401");
    let window = TimeWindow::new(utc(2024, 1, 10, 0), utc(2024, 6, 1, 0));

    let first = expand_recurring_event(&event, &window);
    let second = expand_recurring_event(&event, &window);
    assert_eq!(first, second);

    let events = vec![event, practice("FREQ=DAILY")];
    assert_eq!(
        instances_in_window(&events, &window),
        instances_in_window(&events, &window)
    );
}

#[test]
fn test_inverted_window_is_empty() {
    let window = TimeWindow::new(utc(2024, 2, 1, 0), utc(2024, 1, 1, 0));
    assert!(expand_recurring_event(&practice("FREQ=DAILY"), &window).is_empty());
    assert!(instances_in_window(&[practice("FREQ=DAILY")], &window).is_empty());
}

#[test]
fn test_monthly_on_the_31st_clamps() {
    let event = Event::new(
        "rent",
        "fam1",
        "alice",
        "Pay rent",
        utc(2024, 1, 31, 9),
        utc(2024, 1, 31, 10),
    )
    .with_recurrence("FREQ=MONTHLY");
    let window = TimeWindow::new(utc(2024, 1, 1, 0), utc(2024, 5, 31, 23));

    assert_eq!(
        days(&expand_recurring_event(&event, &window)),
        vec![31, 29, 31, 30, 31]
    );
}

#[test]
fn test_event_ending_before_it_starts_yields_nothing() {
    let mut backwards = practice("FREQ=WEEKLY");
    backwards.start = utc(2024, 1, 1, 20);
    backwards.end = utc(2024, 1, 1, 19);

    let mut zero_length = practice("FREQ=DAILY");
    zero_length.end = zero_length.start;

    let window = january_window();
    assert!(expand_recurring_event(&backwards, &window).is_empty());
    assert!(expand_recurring_event(&zero_length, &window).is_empty());
    assert!(instances_in_window(&[backwards, zero_length], &window).is_empty());
}
