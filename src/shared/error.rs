use axum::{response::IntoResponse, Json};

/// Per-request failure taxonomy for the ticket core. Nothing here is fatal
/// to the process, and the core never retries on its own.
#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("Validation error: {0}")]
    Validation(String),
    /// Optimistic-lock mismatch. Retryable: the caller should re-read the
    /// ticket and resubmit with the fresh version.
    #[error("Ticket has been modified by another user. Please refresh and try again.")]
    Conflict { expected: i32, supplied: i32 },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl IntoResponse for TicketError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        let body = match &self {
            Self::Conflict { expected, supplied } => serde_json::json!({
                "error": self.to_string(),
                "code": "version_conflict",
                "expected": expected,
                "supplied": supplied,
            }),
            _ => serde_json::json!({ "error": self.to_string() }),
        };
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(body)).into_response()
    }
}
