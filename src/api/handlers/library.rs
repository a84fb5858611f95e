use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use futures::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use crate::{
    api::AppState,
    db::LibrarySnapshot,
    error::AppResult,
    models::{UserId, UserPreferences},
    services::library::Deal,
};

pub async fn snapshot(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
) -> AppResult<Json<LibrarySnapshot>> {
    Ok(Json(state.library.snapshot(&user).await?))
}

/// Server-sent events: the current library, then a full snapshot after every change.
pub async fn changes(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let receiver = state.store.subscribe(&user);
    let initial = state.library.snapshot(&user).await?;

    let updates = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(snapshot) => return Some((snapshot, receiver)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Library stream lagged; next snapshot supersedes");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    let events = stream::once(async move { initial })
        .chain(updates)
        .map(|snapshot| Event::default().event("library").json_data(&snapshot));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Deserialize)]
pub struct AddGenreRequest {
    pub genre: String,
}

pub async fn genres(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
) -> AppResult<Json<Vec<String>>> {
    Ok(Json(state.library.genres(&user).await?))
}

pub async fn add_genre(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    Json(body): Json<AddGenreRequest>,
) -> AppResult<Json<Vec<String>>> {
    Ok(Json(state.library.add_genre(&user, &body.genre).await?))
}

pub async fn preferences(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
) -> AppResult<Json<UserPreferences>> {
    Ok(Json(state.library.preferences(&user).await?))
}

pub async fn set_preferences(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    Json(preferences): Json<UserPreferences>,
) -> AppResult<Json<UserPreferences>> {
    Ok(Json(state.library.set_preferences(&user, preferences).await?))
}

pub async fn deals(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
) -> AppResult<Json<Vec<Deal>>> {
    Ok(Json(state.library.find_deals(&user).await?))
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub updated: usize,
}

pub async fn refresh_compatibility(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
) -> AppResult<Json<RefreshResponse>> {
    let updated = state.library.refresh_compatibility(&user).await?;
    Ok(Json(RefreshResponse { updated }))
}
