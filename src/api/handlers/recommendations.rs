use axum::{extract::State, Extension, Json};
use serde::Deserialize;

use crate::{
    api::AppState,
    error::AppResult,
    models::{ChallengeIdea, Discovery, Suggestion, UserId},
};

#[derive(Debug, Deserialize)]
pub struct MoodRequest {
    pub mood: String,
}

pub async fn by_mood(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    Json(body): Json<MoodRequest>,
) -> AppResult<Json<Vec<Suggestion>>> {
    Ok(Json(state.recommendations.by_mood(&user, &body.mood).await?))
}

pub async fn up_next(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
) -> AppResult<Json<Vec<Suggestion>>> {
    Ok(Json(state.recommendations.up_next(&user).await?))
}

pub async fn discover(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
) -> AppResult<Json<Discovery>> {
    Ok(Json(state.recommendations.discover(&user).await?))
}

pub async fn challenge_ideas(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
) -> AppResult<Json<Vec<ChallengeIdea>>> {
    Ok(Json(state.recommendations.challenge_ideas(&user).await?))
}
