//! Shared family calendar.
//!
//! Expands recurring events into renderable instances, detects scheduling
//! conflicts, and persists events locally (SQLite) or in the hosted family
//! database (REST).

pub mod backend;
pub mod client;
pub mod conflict;
pub mod error;
pub mod recurrence;
pub mod reminders;
pub mod retry;
pub mod store;
pub mod types;
pub mod watcher;

pub use backend::EventStore;
pub use client::RemoteEventStore;
pub use conflict::{find_conflicts, overlaps, ConflictDetector, ConflictQuery};
pub use error::{CalendarError, CalendarResult};
pub use recurrence::{
    expand_recurring_event, instances_in_window, Frequency, RecurrenceRule, MAX_OCCURRENCES,
    RECURRING_MARKER,
};
pub use reminders::due_reminders;
pub use retry::RetryConfig;
pub use store::SqliteEventStore;
pub use types::{
    ChecklistItem, ConflictingEvent, DeleteTarget, DueReminder, Event, EventInstance, Family,
    Reminder, ReminderMethod, TimeWindow,
};
pub use watcher::{ConflictCheckOutcome, ConflictWatcher};
