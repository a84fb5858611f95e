//! Recommendation input assembly and oracle transport.
//!
//! The oracle ranks; this module decides what it sees and what of its answer
//! is trusted. Every suggestion must point at a record that was in the request.

use reqwest::Client as HttpClient;
use serde::{de::DeserializeOwned, Deserialize};
use std::{collections::HashSet, sync::Arc};

use crate::{
    db::{GameStore, LibrarySnapshot},
    error::{AppError, AppResult},
    models::{
        CanonicalGame, ChallengeIdea, Discovery, OracleChallenge, OracleGame, OraclePreferences,
        OracleRequest, RawDiscovery, RawSuggestion, Suggestion, UserId, UserPreferences,
    },
    services::providers::check_status,
};

pub const MOOD_SUGGESTIONS: usize = 3;
pub const UP_NEXT_SUGGESTIONS: usize = 5;
pub const MAX_CHALLENGE_IDEAS: usize = 5;
pub const MAX_IDEA_GOAL: u32 = 5;

const PROVIDER: &str = "oracle";

/// Opaque ranking service
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecommendationOracle: Send + Sync {
    async fn mood_recommendations(&self, request: &OracleRequest) -> AppResult<Vec<RawSuggestion>>;

    async fn up_next(&self, request: &OracleRequest) -> AppResult<Vec<RawSuggestion>>;

    async fn external_discovery(&self, request: &OracleRequest) -> AppResult<RawDiscovery>;

    async fn challenge_ideas(&self, request: &OracleRequest) -> AppResult<Vec<ChallengeIdea>>;
}

#[derive(Debug, Deserialize)]
struct RecommendationsEnvelope {
    #[serde(default)]
    recommendations: Vec<RawSuggestion>,
}

#[derive(Debug, Deserialize)]
struct SuggestionsEnvelope {
    #[serde(default)]
    suggestions: Vec<RawSuggestion>,
}

#[derive(Debug, Deserialize)]
struct IdeasEnvelope {
    #[serde(default)]
    ideas: Vec<ChallengeIdea>,
}

/// Oracle reached over HTTP: one POST per flow under a base URL
#[derive(Clone)]
pub struct HttpOracle {
    http_client: HttpClient,
    base_url: String,
    api_key: Option<String>,
}

impl HttpOracle {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            http_client: HttpClient::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn post<T: DeserializeOwned>(&self, flow: &str, request: &OracleRequest) -> AppResult<T> {
        let url = format!("{}/{}", self.base_url, flow);
        let mut builder = self.http_client.post(&url).json(request);
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let response = check_status(response, PROVIDER).await?;

        tracing::debug!(flow, games = request.game_library.len(), "Oracle responded");
        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl RecommendationOracle for HttpOracle {
    async fn mood_recommendations(&self, request: &OracleRequest) -> AppResult<Vec<RawSuggestion>> {
        let envelope: RecommendationsEnvelope = self.post("game-recommendations", request).await?;
        Ok(envelope.recommendations)
    }

    async fn up_next(&self, request: &OracleRequest) -> AppResult<Vec<RawSuggestion>> {
        let envelope: SuggestionsEnvelope = self.post("up-next-suggestions", request).await?;
        Ok(envelope.suggestions)
    }

    async fn external_discovery(&self, request: &OracleRequest) -> AppResult<RawDiscovery> {
        self.post("external-recommendation", request).await
    }

    async fn challenge_ideas(&self, request: &OracleRequest) -> AppResult<Vec<ChallengeIdea>> {
        let envelope: IdeasEnvelope = self.post("challenge-ideas", request).await?;
        Ok(envelope.ideas)
    }
}

/// Serializes a library into the oracle's input shape
pub fn build_request(
    snapshot: &LibrarySnapshot,
    preferences: &UserPreferences,
    with_challenges: bool,
    mood_text: Option<String>,
) -> OracleRequest {
    OracleRequest {
        game_library: snapshot.games.iter().map(OracleGame::from).collect(),
        active_challenges: with_challenges
            .then(|| snapshot.active_challenges().map(OracleChallenge::from).collect()),
        user_preferences: OraclePreferences::from(preferences),
        mood_text,
    }
}

/// Keeps suggestions that reference a library game, first occurrence only,
/// up to `limit`.
pub fn validate_suggestions(
    raw: Vec<RawSuggestion>,
    library: &[CanonicalGame],
    limit: usize,
) -> Vec<Suggestion> {
    let mut seen = HashSet::new();
    let mut suggestions = Vec::with_capacity(limit);

    for suggestion in raw {
        let Some(game) = library.iter().find(|g| g.id.as_str() == suggestion.game_id) else {
            tracing::debug!(id = %suggestion.game_id, "Dropping suggestion for unknown game");
            continue;
        };
        if !seen.insert(game.id.clone()) {
            continue;
        }
        suggestions.push(Suggestion {
            game: game.clone(),
            reason: suggestion.reason,
        });
        if suggestions.len() == limit {
            break;
        }
    }

    suggestions
}

/// Flags a "new" game whose title is already in the library
pub fn check_discovery(raw: RawDiscovery, library: &[CanonicalGame]) -> Discovery {
    let wanted = raw.title.trim().to_lowercase();
    let collision = library
        .iter()
        .any(|g| g.record.title.trim().to_lowercase() == wanted);

    if collision {
        tracing::warn!(title = %raw.title, "Oracle suggested a game already in the library");
    }

    Discovery {
        title: raw.title,
        reason: raw.reason,
        genres: raw.genres,
        low_confidence: collision,
    }
}

/// Drops ideas without a goal, clamps goals and caps the list
pub fn normalize_ideas(raw: Vec<ChallengeIdea>) -> Vec<ChallengeIdea> {
    raw.into_iter()
        .filter(|idea| idea.goal > 0 && !idea.title.trim().is_empty())
        .map(|idea| ChallengeIdea {
            goal: idea.goal.min(MAX_IDEA_GOAL),
            ..idea
        })
        .take(MAX_CHALLENGE_IDEAS)
        .collect()
}

pub struct RecommendationAssembler {
    store: Arc<dyn GameStore>,
    oracle: Arc<dyn RecommendationOracle>,
}

impl RecommendationAssembler {
    pub fn new(store: Arc<dyn GameStore>, oracle: Arc<dyn RecommendationOracle>) -> Self {
        Self { store, oracle }
    }

    async fn load(
        &self,
        user: &UserId,
        with_challenges: bool,
        mood_text: Option<String>,
    ) -> AppResult<(LibrarySnapshot, OracleRequest)> {
        let snapshot = self.store.snapshot(user).await?;
        let preferences = self.store.profile(user).await?.preferences;
        let request = build_request(&snapshot, &preferences, with_challenges, mood_text);
        Ok((snapshot, request))
    }

    pub async fn by_mood(&self, user: &UserId, mood: &str) -> AppResult<Vec<Suggestion>> {
        let mood = mood.trim();
        if mood.is_empty() {
            return Err(AppError::InvalidInput("mood must not be empty".to_string()));
        }

        let (snapshot, request) = self.load(user, true, Some(mood.to_string())).await?;
        if snapshot.games.is_empty() {
            return Ok(Vec::new());
        }

        let raw = self.oracle.mood_recommendations(&request).await?;
        Ok(validate_suggestions(raw, &snapshot.games, MOOD_SUGGESTIONS))
    }

    pub async fn up_next(&self, user: &UserId) -> AppResult<Vec<Suggestion>> {
        let (snapshot, request) = self.load(user, true, None).await?;
        if snapshot.games.is_empty() {
            return Ok(Vec::new());
        }

        let raw = self.oracle.up_next(&request).await?;
        Ok(validate_suggestions(raw, &snapshot.games, UP_NEXT_SUGGESTIONS))
    }

    pub async fn discover(&self, user: &UserId) -> AppResult<Discovery> {
        let (snapshot, request) = self.load(user, false, None).await?;
        let raw = self.oracle.external_discovery(&request).await?;
        Ok(check_discovery(raw, &snapshot.games))
    }

    pub async fn challenge_ideas(&self, user: &UserId) -> AppResult<Vec<ChallengeIdea>> {
        let (_, request) = self.load(user, true, None).await?;
        let ideas = normalize_ideas(self.oracle.challenge_ideas(&request).await?);
        if ideas.len() < 3 {
            tracing::warn!(ideas = ideas.len(), "Oracle returned fewer challenge ideas than expected");
        }
        Ok(ideas)
    }
}
