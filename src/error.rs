use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

use crate::services::{auth_service::AuthServiceError, user_service::UserServiceError};

/// Failures that reach the request boundary.
///
/// Field-level problems never end up here: handlers turn them into inline
/// form errors. What remains is either a malformed request or something the
/// user cannot fix, and the details of the latter only go to the log.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("User service error: {0}")]
    UserService(#[from] UserServiceError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthServiceError),

    #[error("Malformed upload: {0}")]
    Upload(String),

    #[error("Upload exceeds the configured size limit")]
    UploadTooLarge,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Upload(_) => {
                tracing::warn!(error = %self, "rejected request");
                (StatusCode::BAD_REQUEST, "Bad request")
            }
            AppError::UploadTooLarge => {
                tracing::warn!(error = %self, "rejected request");
                (StatusCode::PAYLOAD_TOO_LARGE, "The uploaded file is too large")
            }
            AppError::Database(_)
            | AppError::Session(_)
            | AppError::UserService(_)
            | AppError::Auth(_) => {
                tracing::error!(error = %self, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (
            status,
            Html(format!(
                "<html><body><h1>{}</h1><p><a href=\"/home\">Home</a></p></body></html>",
                message
            )),
        )
            .into_response()
    }
}
