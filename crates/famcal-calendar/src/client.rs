//! Hosted event store client.
//!
//! Talks to the family database through its PostgREST-style REST endpoint
//! (`/rest/v1/events`). Reads go through the retry layer; writes are sent
//! once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::backend::EventStore;
use crate::error::{CalendarError, CalendarResult};
use crate::retry::{with_retry, RetryConfig};
use crate::types::{Event, EventRow, TimeWindow};

const EVENTS_PATH: &str = "/rest/v1/events";

pub struct RemoteEventStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
    retry: RetryConfig,
}

impl RemoteEventStore {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            access_token: None,
            retry: RetryConfig::default(),
        }
    }

    /// Act as a signed-in member instead of the anonymous project key.
    pub fn with_access_token(mut self, token: &str) -> Self {
        self.access_token = Some(token.to_string());
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn auth_header(&self) -> String {
        format!(
            "Bearer {}",
            self.access_token.as_deref().unwrap_or(&self.api_key)
        )
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .header("Authorization", self.auth_header())
    }

    fn events_url(&self, filters: &[(&str, String)]) -> String {
        let query = filters
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}{}?{}", self.base_url, EVENTS_PATH, query)
    }

    /// List a family's events, optionally narrowed to rows that could touch `range`.
    #[instrument(skip(self), level = "info")]
    pub async fn list_events(
        &self,
        family_id: &str,
        range: Option<TimeWindow>,
    ) -> CalendarResult<Vec<Event>> {
        let mut filters = vec![("family_id", format!("eq.{}", family_id))];
        if let Some(range) = range {
            filters.push(("end_time", format!("gte.{}", range.start.to_rfc3339())));
            filters.push(("start_time", format!("lte.{}", range.end.to_rfc3339())));
        }
        filters.push(("order", "start_time.asc".to_string()));
        let url = self.events_url(&filters);

        let response = with_retry(&self.retry, || {
            self.request(reqwest::Method::GET, &url).send()
        })
        .await?;

        let rows: Vec<EventRow> = self.handle_response(response).await?;
        tracing::debug!(count = rows.len(), "Fetched events");
        Ok(rows.into_iter().map(Event::from).collect())
    }

    /// Get a single event.
    #[instrument(skip(self), level = "info")]
    pub async fn get_event(&self, event_id: &str) -> CalendarResult<Event> {
        let url = self.events_url(&[("id", format!("eq.{}", event_id))]);

        let response = with_retry(&self.retry, || {
            self.request(reqwest::Method::GET, &url).send()
        })
        .await?;

        let rows: Vec<EventRow> = self.handle_response(response).await?;
        first_row(rows, event_id)
    }

    /// Create a new event.
    #[instrument(skip(self, event), fields(event_id = %event.id), level = "info")]
    pub async fn create_event(&self, event: &Event) -> CalendarResult<Event> {
        event.validate()?;
        let url = format!("{}{}", self.base_url, EVENTS_PATH);

        let response = self
            .request(reqwest::Method::POST, &url)
            .header("Prefer", "return=representation")
            .json(&EventRow::from(event))
            .send()
            .await?;

        let rows: Vec<EventRow> = self.handle_response(response).await?;
        first_row(rows, &event.id)
    }

    /// Move an event to a new time slot.
    #[instrument(skip(self), level = "info")]
    pub async fn update_event_times(
        &self,
        event_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CalendarResult<Event> {
        if end <= start {
            return Err(CalendarError::InvalidEventData(
                "end must be after start".to_string(),
            ));
        }
        let url = self.events_url(&[("id", format!("eq.{}", event_id))]);
        let body = serde_json::json!({
            "start_time": start.to_rfc3339(),
            "end_time": end.to_rfc3339(),
        });

        let response = self
            .request(reqwest::Method::PATCH, &url)
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await?;

        let rows: Vec<EventRow> = self.handle_response(response).await?;
        first_row(rows, event_id)
    }

    /// Delete an event (the whole series if it recurs).
    #[instrument(skip(self), level = "info")]
    pub async fn delete_event(&self, event_id: &str) -> CalendarResult<()> {
        let url = self.events_url(&[("id", format!("eq.{}", event_id))]);

        let response = self.request(reqwest::Method::DELETE, &url).send().await?;

        // 204 No Content on success
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_for(response).await)
        }
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> CalendarResult<T> {
        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| CalendarError::ApiError(format!("JSON parse error: {}", e)))
        } else {
            Err(Self::error_for(response).await)
        }
    }

    async fn error_for(response: reqwest::Response) -> CalendarError {
        let status = response.status();
        match status.as_u16() {
            401 => CalendarError::TokenExpired,
            403 => CalendarError::AuthRequired,
            404 => CalendarError::EventNotFound(response.text().await.unwrap_or_default()),
            409 => CalendarError::Conflict,
            429 => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60);
                CalendarError::RateLimited(retry_after)
            }
            _ => {
                let text = response.text().await.unwrap_or_default();
                CalendarError::ApiError(format!("{}: {}", status, text))
            }
        }
    }
}

/// PostgREST answers filtered reads and writes with an array.
fn first_row(rows: Vec<EventRow>, event_id: &str) -> CalendarResult<Event> {
    rows.into_iter()
        .next()
        .map(Event::from)
        .ok_or_else(|| CalendarError::EventNotFound(event_id.to_string()))
}

#[async_trait]
impl EventStore for RemoteEventStore {
    async fn fetch_family_events(
        &self,
        family_id: &str,
        range: Option<TimeWindow>,
    ) -> CalendarResult<Vec<Event>> {
        self.list_events(family_id, range).await
    }
}
