//! Calendar-specific error types.

use famcal_core::error::{ReqwestErrorExt, RusqliteErrorExt};
use famcal_core::{AppError, NetworkError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("Authentication required")]
    AuthRequired,

    #[error("Token expired")]
    TokenExpired,

    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    #[error("Event not found: {0}")]
    EventNotFound(String),

    #[error("Family not found: {0}")]
    FamilyNotFound(String),

    #[error("Invalid event data: {0}")]
    InvalidEventData(String),

    #[error("{requester} may not delete event {event_id}")]
    PermissionDenied { event_id: String, requester: String },

    #[error("Conflict: event was modified")]
    Conflict,

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// Result type for calendar operations.
pub type CalendarResult<T> = Result<T, CalendarError>;

impl CalendarError {
    /// User-friendly error message for UI display.
    pub fn user_message(&self) -> String {
        match self {
            Self::AuthRequired => "Please sign in to your family account".to_string(),
            Self::TokenExpired => "Your session has expired. Please sign in again.".to_string(),
            Self::RateLimited(secs) => format!("Too many requests. Please wait {} seconds.", secs),
            Self::EventNotFound(_) => "Event not found".to_string(),
            Self::FamilyNotFound(_) => "Family not found".to_string(),
            Self::InvalidEventData(msg) => format!("Invalid event: {}", msg),
            Self::PermissionDenied { .. } => {
                "Only the event creator or the family owner can delete this event".to_string()
            }
            Self::Conflict => "The event was modified elsewhere. Please refresh.".to_string(),
            Self::ApiError(msg) => format!("Calendar error: {}", msg),
            Self::Storage(_) => "Local calendar data could not be read".to_string(),
            Self::NetworkError(_) => "Network error. Check your connection.".to_string(),
        }
    }

    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited(_) => true,
            Self::NetworkError(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

impl From<CalendarError> for AppError {
    fn from(e: CalendarError) -> Self {
        match e {
            CalendarError::AuthRequired | CalendarError::TokenExpired => {
                AppError::Network(NetworkError::Unauthorized)
            }
            CalendarError::RateLimited(secs) => AppError::Network(NetworkError::RateLimited(secs)),
            CalendarError::EventNotFound(id) => AppError::NotFound(format!("event {}", id)),
            CalendarError::FamilyNotFound(id) => AppError::NotFound(format!("family {}", id)),
            CalendarError::InvalidEventData(msg) => AppError::InvalidInput(msg),
            e @ CalendarError::PermissionDenied { .. } => AppError::PermissionDenied(e.to_string()),
            CalendarError::Conflict => AppError::Service("event was modified elsewhere".into()),
            CalendarError::ApiError(msg) => {
                AppError::Network(NetworkError::InvalidResponse(msg))
            }
            CalendarError::Storage(e) => AppError::Database(e.into_database_error()),
            CalendarError::NetworkError(e) => AppError::Network(e.into_network_error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use famcal_core::DatabaseError;

    #[test]
    fn test_error_user_messages() {
        let err = CalendarError::AuthRequired;
        assert!(err.user_message().contains("sign in"));

        let err = CalendarError::RateLimited(30);
        assert!(err.user_message().contains("30"));

        let err = CalendarError::Conflict;
        assert!(err.user_message().contains("modified"));
    }

    #[test]
    fn test_is_retryable() {
        assert!(CalendarError::RateLimited(10).is_retryable());
        assert!(!CalendarError::EventNotFound("x".into()).is_retryable());
        assert!(!CalendarError::Conflict.is_retryable());
    }

    #[test]
    fn test_app_error_mapping() {
        let app: AppError = CalendarError::TokenExpired.into();
        assert!(matches!(app, AppError::Network(NetworkError::Unauthorized)));

        let app: AppError = CalendarError::PermissionDenied {
            event_id: "e1".into(),
            requester: "m2".into(),
        }
        .into();
        assert!(matches!(app, AppError::PermissionDenied(_)));

        let app: AppError = CalendarError::Storage(rusqlite::Error::QueryReturnedNoRows).into();
        assert!(matches!(app, AppError::Database(DatabaseError::QueryFailed(_))));
    }
}
