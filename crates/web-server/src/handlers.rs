use crate::{
    error::AppError,
    models::{HealthResponse, RegisterRequest, RegisterResponse},
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

/// # POST /register
/// Stores a new registration and returns the id the database assigned to it.
pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let request = match payload {
        Ok(Json(request)) => request,
        // A body that is not declared as JSON is treated as an empty form.
        Err(JsonRejection::MissingJsonContentType(_)) => RegisterRequest::default(),
        Err(rejection) => return Err(rejection.into()),
    };

    let user = request.into_new_user().ok_or(AppError::Validation)?;
    let user_id = state.store.insert_user(&user).await?;

    tracing::info!(user_id, "Registration stored.");
    Ok((StatusCode::CREATED, Json(RegisterResponse::created(user_id))))
}

/// # GET /api/healthcheck
/// Reports whether the database answers `SELECT 1`.
pub async fn healthcheck(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse::healthy())),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed.");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(HealthResponse::unhealthy(e.to_string())),
            )
        }
    }
}
