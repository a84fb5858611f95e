use axum::{extract::State, http::StatusCode, Extension, Json};

use crate::{
    api::AppState,
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{ImportNotification, ImportRequest, UserId},
};

/// Acknowledges at once; the import reports through the status record.
pub async fn start(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<ImportRequest>,
) -> AppResult<(StatusCode, Json<ImportNotification>)> {
    tracing::info!(request_id = %request_id, user = %user, "Import requested");

    state.imports.start(&user, request).await?;
    let status = state
        .imports
        .status(&user)
        .await?
        .ok_or_else(|| AppError::Internal("import status missing after start".to_string()))?;

    Ok((StatusCode::ACCEPTED, Json(status)))
}

pub async fn status(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
) -> AppResult<Json<ImportNotification>> {
    state
        .imports
        .status(&user)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("no import status".to_string()))
}

pub async fn acknowledge(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
) -> AppResult<Json<ImportNotification>> {
    Ok(Json(state.imports.acknowledge(&user).await?))
}
