use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AppError {
    /// The call connection no longer exists on the telephony side.
    #[error("call target is already gone")]
    TargetGone,

    #[error("provider error: {0}")]
    Provider(String),

    #[error("language model timed out")]
    ModelTimeout,

    #[error("language model failure: {0}")]
    Model(String),

    #[error("call {0} not found")]
    CallNotFound(Uuid),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::CallNotFound(_) => StatusCode::NOT_FOUND,
            AppError::TargetGone => StatusCode::GONE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error=%self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}
