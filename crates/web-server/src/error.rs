use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use database::DbError;
use serde_json::json;
use thiserror::Error;

/// The `error` text of every response produced by the fallback path.
pub const FALLBACK_ERROR: &str = "Something broke!";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Full name and mobile number are required")]
    Validation,
    #[error("Invalid request body: {0}")]
    MalformedBody(#[from] JsonRejection),
    #[error("Registration failed: {0}")]
    Registration(#[from] DbError),
}

/// Converts our custom `AppError` into an HTTP response with a JSON body.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Validation => (
                StatusCode::BAD_REQUEST,
                json!({ "error": AppError::Validation.to_string() }),
            ),
            // An unreadable body is an uncaught failure, answered like a panic.
            AppError::MalformedBody(rejection) => {
                let details = rejection.body_text();
                tracing::error!(details = %details, "Unhandled failure while reading a request body.");
                let status = match rejection.status() {
                    StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (
                    status,
                    json!({ "error": FALLBACK_ERROR, "details": details }),
                )
            }
            AppError::Registration(db_err) => {
                tracing::error!(error = %db_err, "Registration error.");
                let status = match &db_err {
                    DbError::Saturated { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (
                    status,
                    json!({ "error": "Registration failed", "details": db_err.to_string() }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
