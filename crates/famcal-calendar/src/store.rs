//! SQLite-based local store for family events.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::backend::EventStore;
use crate::error::{CalendarError, CalendarResult};
use crate::types::{
    ChecklistItem, DueReminder, Event, EventInstance, Family, Reminder, ReminderMethod,
    TimeWindow,
};

const EVENT_COLUMNS: &str = "id, family_id, created_by, title, description, location, notes, \
     start_ms, end_ms, color, recurrence_rule, reminder_method, reminder_minutes, checklist_json";

/// SQLite store for families and their events.
///
/// The connection sits behind a mutex so one store can be shared between
/// async tasks. Instants are stored as Unix milliseconds, so anything finer
/// than a millisecond is truncated on write.
pub struct SqliteEventStore {
    conn: Mutex<Connection>,
}

impl SqliteEventStore {
    /// Open (or create) a store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> CalendarResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store.
    pub fn in_memory() -> CalendarResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> CalendarResult<()> {
        self.conn.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS families (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                owner_id TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                family_id TEXT NOT NULL,
                created_by TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                location TEXT,
                notes TEXT,
                start_ms INTEGER NOT NULL,
                end_ms INTEGER NOT NULL,
                color TEXT NOT NULL,
                recurrence_rule TEXT,
                reminder_method TEXT,
                reminder_minutes INTEGER,
                checklist_json TEXT NOT NULL DEFAULT '[]',
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_family_start ON events(family_id, start_ms);
            CREATE INDEX IF NOT EXISTS idx_events_family_end ON events(family_id, end_ms);
            "#,
        )?;
        Ok(())
    }

    /// Insert or replace a family.
    pub fn upsert_family(&self, family: &Family) -> CalendarResult<()> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO families (id, name, owner_id) VALUES (?1, ?2, ?3)",
            params![family.id, family.name, family.owner_id],
        )?;
        Ok(())
    }

    pub fn get_family(&self, family_id: &str) -> CalendarResult<Option<Family>> {
        let family = self
            .conn
            .lock()
            .query_row(
                "SELECT id, name, owner_id FROM families WHERE id = ?1",
                params![family_id],
                |row| {
                    Ok(Family {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        owner_id: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(family)
    }

    /// Insert or replace an event after validating it.
    ///
    /// # Errors
    /// `CalendarError::InvalidEventData` when the event breaks an invariant.
    pub fn store_event(&self, event: &Event) -> CalendarResult<()> {
        event.validate()?;

        let now = Utc::now().timestamp_millis();
        let checklist_json = serde_json::to_string(&event.checklist)
            .map_err(|e| CalendarError::InvalidEventData(format!("checklist: {}", e)))?;

        self.conn.lock().execute(
            r#"
            INSERT OR REPLACE INTO events
            (id, family_id, created_by, title, description, location, notes, start_ms, end_ms,
             color, recurrence_rule, reminder_method, reminder_minutes, checklist_json, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
            params![
                event.id,
                event.family_id,
                event.created_by,
                event.title,
                event.description,
                event.location,
                event.notes,
                event.start.timestamp_millis(),
                event.end.timestamp_millis(),
                event.color,
                event.recurrence_rule,
                event.reminder.map(|r| r.method.as_str()),
                event.reminder.map(|r| r.minutes_before),
                checklist_json,
                now,
            ],
        )?;

        tracing::debug!(event_id = %event.id, family_id = %event.family_id, "Stored event");
        Ok(())
    }

    pub fn get_event(&self, family_id: &str, event_id: &str) -> CalendarResult<Option<Event>> {
        let sql = format!(
            "SELECT {} FROM events WHERE id = ?1 AND family_id = ?2",
            EVENT_COLUMNS
        );
        let event = self
            .conn
            .lock()
            .query_row(&sql, params![event_id, family_id], Self::row_to_event)
            .optional()?;
        Ok(event)
    }

    /// List a family's events, optionally narrowed to rows that could touch `range`.
    ///
    /// Rows come back ordered by start, then id.
    pub fn list_events(
        &self,
        family_id: &str,
        range: Option<TimeWindow>,
    ) -> CalendarResult<Vec<Event>> {
        let conn = self.conn.lock();

        let events = match range {
            Some(range) => {
                let sql = format!(
                    "SELECT {} FROM events \
                     WHERE family_id = ?1 AND end_ms >= ?2 AND start_ms <= ?3 \
                     ORDER BY start_ms ASC, id ASC",
                    EVENT_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(
                    params![
                        family_id,
                        range.start.timestamp_millis(),
                        range.end.timestamp_millis()
                    ],
                    Self::row_to_event,
                )?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM events WHERE family_id = ?1 ORDER BY start_ms ASC, id ASC",
                    EVENT_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![family_id], Self::row_to_event)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(events)
    }

    /// Delete an event (the whole series if it recurs).
    ///
    /// Only the event's creator or the family owner may delete it.
    ///
    /// # Errors
    /// `EventNotFound` if the event isn't in the family, `FamilyNotFound`
    /// if a non-creator asks and the family (and so its owner) is unknown,
    /// `PermissionDenied` if `requester_id` is neither creator nor owner.
    pub fn delete_event(
        &self,
        family_id: &str,
        event_id: &str,
        requester_id: &str,
    ) -> CalendarResult<()> {
        let event = self
            .get_event(family_id, event_id)?
            .ok_or_else(|| CalendarError::EventNotFound(event_id.to_string()))?;
        let allowed = event.created_by == requester_id || {
            let family = self
                .get_family(family_id)?
                .ok_or_else(|| CalendarError::FamilyNotFound(family_id.to_string()))?;
            family.owner_id == requester_id
        };
        if !allowed {
            tracing::warn!(event_id, requester_id, "Delete refused");
            return Err(CalendarError::PermissionDenied {
                event_id: event_id.to_string(),
                requester: requester_id.to_string(),
            });
        }

        self.conn.lock().execute(
            "DELETE FROM events WHERE id = ?1 AND family_id = ?2",
            params![event_id, family_id],
        )?;

        tracing::info!(
            event_id,
            family_id,
            series = event.recurrence_rule.is_some(),
            "Deleted event"
        );
        Ok(())
    }

    /// Delete whatever a rendered item stands for: the row itself, or the
    /// whole series behind a virtual occurrence.
    pub fn delete_instance(
        &self,
        family_id: &str,
        instance: &EventInstance,
        requester_id: &str,
    ) -> CalendarResult<()> {
        let target = instance.delete_target();
        self.delete_event(family_id, target.event_id(), requester_id)
    }

    /// Reminders of non-recurring events whose fire time is in `[from, to)`,
    /// earliest first.
    pub fn due_reminders(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CalendarResult<Vec<DueReminder>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, family_id, title, start_ms, reminder_method,
                   start_ms - reminder_minutes * 60000 AS fire_ms
            FROM events
            WHERE reminder_minutes IS NOT NULL
              AND recurrence_rule IS NULL
              AND start_ms - reminder_minutes * 60000 >= ?1
              AND start_ms - reminder_minutes * 60000 < ?2
            ORDER BY fire_ms ASC, id ASC
            "#,
        )?;

        let rows = stmt.query_map(
            params![from.timestamp_millis(), to.timestamp_millis()],
            |row| {
                let method: Option<String> = row.get(4)?;
                Ok(DueReminder {
                    event_id: row.get(0)?,
                    family_id: row.get(1)?,
                    title: row.get(2)?,
                    event_start: millis_column(row, 3)?,
                    fire_at: millis_column(row, 5)?,
                    method: method.as_deref().map(ReminderMethod::parse).unwrap_or_default(),
                })
            },
        )?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Clear all stored data.
    pub fn clear(&self) -> CalendarResult<()> {
        self.conn
            .lock()
            .execute_batch("DELETE FROM events; DELETE FROM families;")?;
        Ok(())
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<Event> {
        let reminder_method: Option<String> = row.get(11)?;
        let reminder_minutes: Option<u32> = row.get(12)?;
        let checklist_json: String = row.get(13)?;

        let reminder = reminder_minutes.map(|minutes_before| Reminder {
            method: reminder_method
                .as_deref()
                .map(ReminderMethod::parse)
                .unwrap_or_default(),
            minutes_before,
        });
        let checklist: Vec<ChecklistItem> = serde_json::from_str(&checklist_json).unwrap_or_default();

        Ok(Event {
            id: row.get(0)?,
            family_id: row.get(1)?,
            created_by: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            location: row.get(5)?,
            notes: row.get(6)?,
            start: millis_column(row, 7)?,
            end: millis_column(row, 8)?,
            color: row.get(9)?,
            recurrence_rule: row.get(10)?,
            reminder,
            checklist,
        })
    }
}

/// Read a Unix-millisecond column; values chrono can't represent are errors.
fn millis_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Integer,
            format!("timestamp out of range: {} ms", ms).into(),
        )
    })
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn fetch_family_events(
        &self,
        family_id: &str,
        range: Option<TimeWindow>,
    ) -> CalendarResult<Vec<Event>> {
        self.list_events(family_id, range)
    }
}
