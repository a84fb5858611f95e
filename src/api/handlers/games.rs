use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    api::AppState,
    error::AppResult,
    middleware::RequestId,
    models::{CanonicalGame, GameId, GameList, UserId},
    services::{
        library::{BatchAddReport, MoveOutcome},
        reconciliation::{BatchOptions, GameDraft},
    },
};

pub async fn add(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    Json(draft): Json<GameDraft>,
) -> AppResult<(StatusCode, Json<CanonicalGame>)> {
    let game = state.library.add_game(&user, draft).await?;
    Ok((StatusCode::CREATED, Json(game)))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    Path(id): Path<GameId>,
) -> AppResult<Json<CanonicalGame>> {
    Ok(Json(state.library.game(&user, &id).await?))
}

pub async fn edit(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    Path(id): Path<GameId>,
    Json(draft): Json<GameDraft>,
) -> AppResult<Json<MoveOutcome>> {
    Ok(Json(state.library.edit_game(&user, &id, draft).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    Path(id): Path<GameId>,
) -> AppResult<StatusCode> {
    state.library.delete_game(&user, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub list: GameList,
}

pub async fn move_to_list(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    Path(id): Path<GameId>,
    Json(body): Json<MoveRequest>,
) -> AppResult<Json<MoveOutcome>> {
    Ok(Json(state.library.move_game(&user, &id, body.list).await?))
}

#[derive(Debug, Deserialize)]
pub struct BatchAddRequest {
    pub titles: Vec<String>,
    #[serde(flatten)]
    pub options: BatchOptions,
}

#[derive(Debug, Serialize)]
pub struct BatchAddResponse {
    pub requested: usize,
    #[serde(flatten)]
    pub report: BatchAddReport,
}

pub async fn batch_add(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<BatchAddRequest>,
) -> AppResult<Json<BatchAddResponse>> {
    tracing::info!(request_id = %request_id, titles = body.titles.len(), "Batch add requested");

    let report = state
        .library
        .batch_add(&user, &body.titles, body.options)
        .await?;

    Ok(Json(BatchAddResponse {
        requested: body.titles.len(),
        report,
    }))
}
