//! Event store trait.
//!
//! Abstracts over the local SQLite store and the hosted REST store so the
//! conflict detector and agenda code work against either.

use async_trait::async_trait;

use crate::error::CalendarResult;
use crate::types::{Event, TimeWindow};

/// Family-scoped source of persisted event rows.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Fetch the family's event rows.
    ///
    /// With a `range`, only rows satisfying `end >= range.start AND
    /// start <= range.end` are returned. The filter is inclusive on both
    /// ends, so it never drops a row that strictly overlaps the range.
    ///
    /// # Errors
    /// Any storage or network failure. Callers must not treat an error as
    /// an empty result.
    async fn fetch_family_events(
        &self,
        family_id: &str,
        range: Option<TimeWindow>,
    ) -> CalendarResult<Vec<Event>>;
}
