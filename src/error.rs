use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Coarse classification of a failed call to the metrics or describe source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchFailureKind {
    Network,
    Auth,
    Throttled,
    NotFound,
    Other,
}

impl FetchFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Auth => "auth",
            Self::Throttled => "throttled",
            Self::NotFound => "not_found",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for FetchFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Fetch failed for batch {batch_id} ({kind}): {message}")]
    FetchFailure {
        batch_id: Uuid,
        kind: FetchFailureKind,
        message: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DashboardError {
    /// Whether the failure came from the remote side throttling us.
    pub fn is_throttled(&self) -> bool {
        matches!(
            self,
            DashboardError::FetchFailure {
                kind: FetchFailureKind::Throttled,
                ..
            }
        )
    }
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let status = match self {
            DashboardError::ConfigMissing(_) | DashboardError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            DashboardError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            DashboardError::FetchFailure {
                kind: FetchFailureKind::Throttled,
                ..
            } => StatusCode::TOO_MANY_REQUESTS,
            DashboardError::FetchFailure { .. } => StatusCode::BAD_GATEWAY,
            DashboardError::NotFound(_) => StatusCode::NOT_FOUND,
            DashboardError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;
