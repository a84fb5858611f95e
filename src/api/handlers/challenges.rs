use axum::{extract::State, http::StatusCode, Extension, Json};

use crate::{
    api::AppState,
    error::AppResult,
    models::{Challenge, ChallengeIdea, UserId},
};

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
) -> AppResult<Json<Vec<Challenge>>> {
    Ok(Json(state.library.snapshot(&user).await?.challenges))
}

/// Creates a challenge, user-authored or accepted from the idea generator
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    Json(idea): Json<ChallengeIdea>,
) -> AppResult<(StatusCode, Json<Challenge>)> {
    let challenge = state.library.add_challenge(&user, idea).await?;
    Ok((StatusCode::CREATED, Json(challenge)))
}
