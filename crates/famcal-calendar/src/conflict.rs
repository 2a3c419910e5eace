//! Scheduling conflict detection.
//!
//! Two intervals conflict when they share time: back-to-back events
//! (one ends exactly when the other starts) do not conflict.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::backend::EventStore;
use crate::error::CalendarResult;
use crate::types::{ConflictingEvent, Event, TimeWindow};

/// Half-open overlap test. Symmetric in its two intervals.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && a_end > b_start
}

/// A proposed slot to check against a family's calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictQuery {
    pub family_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// The event being edited, so it never conflicts with itself.
    pub exclude_event_id: Option<String>,
}

impl ConflictQuery {
    pub fn new(family_id: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            family_id: family_id.into(),
            start,
            end,
            exclude_event_id: None,
        }
    }

    pub fn excluding(mut self, event_id: impl Into<String>) -> Self {
        self.exclude_event_id = Some(event_id.into());
        self
    }

    /// Degenerate or inverted slots conflict with nothing.
    pub fn is_degenerate(&self) -> bool {
        self.start >= self.end
    }

    /// Window handed to the store's inclusive pre-filter.
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start, self.end)
    }
}

/// Filter candidate rows down to the ones that actually overlap the query.
///
/// Keeps the order of `rows`. Rows are taken as stored: recurring events
/// are compared by their base interval only.
pub fn find_conflicts<'a, I>(query: &ConflictQuery, rows: I) -> Vec<ConflictingEvent>
where
    I: IntoIterator<Item = &'a Event>,
{
    if query.is_degenerate() {
        return Vec::new();
    }

    rows.into_iter()
        .filter(|event| query.exclude_event_id.as_deref() != Some(event.id.as_str()))
        .filter(|event| overlaps(event.start, event.end, query.start, query.end))
        .map(ConflictingEvent::from)
        .collect()
}

/// Runs conflict checks against an event store.
#[derive(Clone)]
pub struct ConflictDetector {
    store: Arc<dyn EventStore>,
}

impl ConflictDetector {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// List existing events in the family that overlap the proposed slot.
    ///
    /// A degenerate slot returns `Ok(vec![])` without touching the store.
    ///
    /// # Errors
    /// Propagates store failures. An `Err` means the check could not run,
    /// not that the slot is free.
    pub async fn check(&self, query: &ConflictQuery) -> CalendarResult<Vec<ConflictingEvent>> {
        if query.is_degenerate() {
            tracing::debug!(family_id = %query.family_id, "Skipping conflict check for empty slot");
            return Ok(Vec::new());
        }

        let rows = self
            .store
            .fetch_family_events(&query.family_id, Some(query.window()))
            .await
            .map_err(|e| {
                tracing::warn!(family_id = %query.family_id, "Conflict check failed: {}", e);
                e
            })?;

        let conflicts = find_conflicts(query, &rows);
        tracing::debug!(
            family_id = %query.family_id,
            candidates = rows.len(),
            conflicts = conflicts.len(),
            "Conflict check finished"
        );
        Ok(conflicts)
    }
}
