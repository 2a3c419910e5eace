//! Calendar data structures.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CalendarError, CalendarResult};

/// Color tag used when a row doesn't carry one.
pub const DEFAULT_COLOR: &str = "blue";

/// Family event as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub family_id: String,
    pub created_by: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub color: String,
    /// RRULE-subset string, e.g. `FREQ=WEEKLY;UNTIL=20240115`.
    pub recurrence_rule: Option<String>,
    pub reminder: Option<Reminder>,
    pub checklist: Vec<ChecklistItem>,
}

impl Event {
    /// Minimal event with the required fields; everything optional left empty.
    pub fn new(
        id: impl Into<String>,
        family_id: impl Into<String>,
        created_by: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            family_id: family_id.into(),
            created_by: created_by.into(),
            title: title.into(),
            description: None,
            location: None,
            notes: None,
            start,
            end,
            color: DEFAULT_COLOR.to_string(),
            recurrence_rule: None,
            reminder: None,
            checklist: Vec::new(),
        }
    }

    pub fn with_recurrence(mut self, rule: impl Into<String>) -> Self {
        self.recurrence_rule = Some(rule.into());
        self
    }

    pub fn with_reminder(mut self, reminder: Reminder) -> Self {
        self.reminder = Some(reminder);
        self
    }

    /// Check the invariants a persisted event must hold.
    ///
    /// # Errors
    /// Returns `CalendarError::InvalidEventData` for an empty title or
    /// when `end` is not after `start`.
    pub fn validate(&self) -> CalendarResult<()> {
        if self.title.trim().is_empty() {
            return Err(CalendarError::InvalidEventData(
                "title must not be empty".to_string(),
            ));
        }
        if self.end <= self.start {
            return Err(CalendarError::InvalidEventData(format!(
                "end ({}) must be after start ({})",
                self.end.to_rfc3339(),
                self.start.to_rfc3339()
            )));
        }
        Ok(())
    }
}

/// Per-event reminder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub method: ReminderMethod,
    pub minutes_before: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReminderMethod {
    #[default]
    Popup,
    Email,
}

impl ReminderMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ReminderMethod::Popup => "popup",
            ReminderMethod::Email => "email",
        }
    }

    /// Unknown methods fall back to a popup.
    pub fn parse(s: &str) -> Self {
        match s {
            "email" => ReminderMethod::Email,
            _ => ReminderMethod::Popup,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub text: String,
    #[serde(default)]
    pub done: bool,
}

/// Sharing boundary that owns events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Family {
    pub id: String,
    pub name: String,
    pub owner_id: String,
}

/// Closed time window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// True when `start > end`; such a window contains nothing.
    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }

    /// Inclusive intersection test against another closed interval.
    pub fn touches(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start <= self.end && end >= self.start
    }
}

/// A renderable occurrence: either a plain event or a virtual
/// occurrence generated from a recurring one. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventInstance {
    pub id: String,
    pub base_event_id: String,
    pub is_virtual_instance: bool,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub color: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub notes: Option<String>,
    pub reminder: Option<Reminder>,
    pub checklist: Vec<ChecklistItem>,
}

impl EventInstance {
    /// Projection of a non-recurring event; carries the full event state.
    pub fn single(event: &Event) -> Self {
        Self {
            id: event.id.clone(),
            base_event_id: event.id.clone(),
            is_virtual_instance: false,
            title: event.title.clone(),
            description: event.description.clone(),
            location: event.location.clone(),
            color: event.color.clone(),
            start: event.start,
            end: event.end,
            notes: event.notes.clone(),
            reminder: event.reminder,
            checklist: event.checklist.clone(),
        }
    }

    /// Synthetic id of the occurrence of `base_id` starting at `start`.
    pub fn synthetic_id(base_id: &str, start: DateTime<Utc>) -> String {
        format!("{}_{}", base_id, start.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    /// What deleting this item actually removes.
    pub fn delete_target(&self) -> DeleteTarget {
        if self.is_virtual_instance {
            DeleteTarget::Series(self.base_event_id.clone())
        } else {
            DeleteTarget::Single(self.id.clone())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    /// The whole recurring series; every virtual instance disappears with it.
    Series(String),
    Single(String),
}

impl DeleteTarget {
    /// Id of the persisted event row to delete.
    pub fn event_id(&self) -> &str {
        match self {
            DeleteTarget::Series(id) | DeleteTarget::Single(id) => id,
        }
    }

    pub fn is_series(&self) -> bool {
        matches!(self, DeleteTarget::Series(_))
    }
}

/// An existing event overlapping a proposed interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictingEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl From<&Event> for ConflictingEvent {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id.clone(),
            title: event.title.clone(),
            start: event.start,
            end: event.end,
        }
    }
}

/// A reminder whose fire time falls inside a polled window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueReminder {
    pub event_id: String,
    pub family_id: String,
    pub title: String,
    pub event_start: DateTime<Utc>,
    pub fire_at: DateTime<Utc>,
    pub method: ReminderMethod,
}

// Hosted store row types

/// Event row as exchanged with the hosted database REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    pub id: String,
    pub family_id: String,
    pub created_by: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub recurrence_rule: Option<String>,
    #[serde(default)]
    pub reminder_method: Option<String>,
    #[serde(default)]
    pub reminder_minutes: Option<u32>,
    #[serde(default)]
    pub checklist: Option<Vec<ChecklistItem>>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        let reminder = row.reminder_minutes.map(|minutes_before| Reminder {
            method: row
                .reminder_method
                .as_deref()
                .map(ReminderMethod::parse)
                .unwrap_or_default(),
            minutes_before,
        });

        Self {
            id: row.id,
            family_id: row.family_id,
            created_by: row.created_by,
            title: row.title,
            description: row.description,
            location: row.location,
            notes: row.notes,
            start: row.start_time,
            end: row.end_time,
            color: row.color.unwrap_or_else(|| DEFAULT_COLOR.to_string()),
            recurrence_rule: row.recurrence_rule.filter(|r| !r.trim().is_empty()),
            reminder,
            checklist: row.checklist.unwrap_or_default(),
        }
    }
}

impl From<&Event> for EventRow {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id.clone(),
            family_id: event.family_id.clone(),
            created_by: event.created_by.clone(),
            title: event.title.clone(),
            description: event.description.clone(),
            location: event.location.clone(),
            notes: event.notes.clone(),
            start_time: event.start,
            end_time: event.end,
            color: Some(event.color.clone()),
            recurrence_rule: event.recurrence_rule.clone(),
            reminder_method: event.reminder.map(|r| r.method.as_str().to_string()),
            reminder_minutes: event.reminder.map(|r| r.minutes_before),
            checklist: Some(event.checklist.clone()),
        }
    }
}
