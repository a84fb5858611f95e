/// Time-to-beat provider (IGDB-compatible API)
///
/// API Flow:
/// 1. Token: client-credential exchange, cached until shortly before expiry
/// 2. Identify: POST /games with `search "..."` → numeric game ids
/// 3. Estimate: POST /multiquery with one labelled `game_time_to_beats` query
///    per id → normally/completely durations in seconds
///
/// Identification runs for every title first; estimates are then queried once
/// per distinct id.
use crate::{
    error::{AppError, AppResult},
    models::PlaytimeEstimate,
    services::{
        batch::{fetch_in_chunks, RateLimit},
        clock::Clock,
        credentials::{CachedToken, TokenCache},
        providers::{absorb, check_status, pick_best_match, require_key, PlaytimeProvider},
    },
};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const PROVIDER: &str = "playtime";
const SEARCH_LIMIT: usize = 10;
const LABEL_PREFIX: &str = "ttb_";

/// Client credentials for the token exchange
#[derive(Debug, Clone, Default)]
pub struct PlaytimeCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct ApiGame {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiMultiqueryResult {
    name: String,
    #[serde(default)]
    result: Vec<ApiTimeToBeat>,
}

#[derive(Debug, Deserialize)]
struct ApiTimeToBeat {
    #[serde(default)]
    normally: Option<u64>,
    #[serde(default)]
    completely: Option<u64>,
}

/// Output of the identification phase: each input title with its game id, if found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedIdentifiers {
    pub by_title: Vec<(String, Option<u64>)>,
}

impl ResolvedIdentifiers {
    /// Distinct ids in first-seen order
    pub fn unique_ids(&self) -> Vec<u64> {
        let mut seen = HashSet::new();
        self.by_title
            .iter()
            .filter_map(|(_, id)| *id)
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Joins per-id estimates back onto titles. Unidentified titles get an empty estimate.
    pub fn join(&self, estimates: &HashMap<u64, PlaytimeEstimate>) -> HashMap<String, PlaytimeEstimate> {
        self.by_title
            .iter()
            .map(|(title, id)| {
                let estimate = id
                    .and_then(|id| estimates.get(&id).copied())
                    .unwrap_or_default();
                (title.clone(), estimate)
            })
            .collect()
    }
}

/// Body for one multiquery request covering `ids`
pub fn multiquery_body(ids: &[u64]) -> String {
    ids.iter()
        .map(|id| {
            format!(
                "query game_time_to_beats \"{prefix}{id}\" {{ fields normally, completely; where game_id = {id}; }};",
                prefix = LABEL_PREFIX,
                id = id
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn search_body(title: &str) -> String {
    let escaped = title.replace('\\', "\\\\").replace('"', "\\\"");
    format!("search \"{}\"; fields id, name; limit {};", escaped, SEARCH_LIMIT)
}

pub struct IgdbPlaytime {
    http_client: HttpClient,
    credentials: PlaytimeCredentials,
    api_url: String,
    token_url: String,
    tokens: Arc<dyn TokenCache>,
    clock: Arc<dyn Clock>,
    search_limit: RateLimit,
    query_limit: RateLimit,
}

impl IgdbPlaytime {
    pub fn new(
        credentials: PlaytimeCredentials,
        api_url: String,
        token_url: String,
        tokens: Arc<dyn TokenCache>,
        clock: Arc<dyn Clock>,
        search_limit: RateLimit,
        query_limit: RateLimit,
    ) -> Self {
        Self {
            http_client: HttpClient::new(),
            credentials,
            api_url,
            token_url,
            tokens,
            clock,
            search_limit,
            query_limit,
        }
    }

    fn client_id(&self) -> AppResult<&str> {
        require_key(&self.credentials.client_id, "PLAYTIME_CLIENT_ID")
    }

    /// Returns a valid bearer token, exchanging credentials only on a cache miss.
    async fn access_token(&self) -> AppResult<String> {
        if let Some(token) = self.tokens.get(self.clock.now()) {
            return Ok(token);
        }

        let client_id = self.client_id()?;
        let client_secret =
            require_key(&self.credentials.client_secret, "PLAYTIME_CLIENT_SECRET")?;

        let response = self
            .http_client
            .post(&self.token_url)
            .query(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| AppError::AuthConfiguration(format!("Token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::AuthConfiguration(format!(
                "Token exchange returned status {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::AuthConfiguration(format!("Malformed token response: {}", e)))?;

        tracing::info!(expires_in = token.expires_in, provider = PROVIDER, "Obtained access token");

        let cached = CachedToken::issued(token.access_token, self.clock.now(), token.expires_in);
        let access_token = cached.token.clone();
        self.tokens.set(cached);
        Ok(access_token)
    }

    async fn post(&self, endpoint: &str, body: String) -> AppResult<reqwest::Response> {
        let token = self.access_token().await?;
        let response = self
            .http_client
            .post(format!("{}/{}", self.api_url, endpoint))
            .header("Client-ID", self.client_id()?)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .body(body)
            .send()
            .await?;
        check_status(response, PROVIDER).await
    }

    async fn identify(&self, title: &str) -> AppResult<Option<u64>> {
        let result = async {
            let response = self.post("games", search_body(title)).await?;
            let candidates: Vec<ApiGame> = response.json().await?;
            Ok::<_, AppError>(pick_best_match(candidates, title, |c| c.name.as_str()).map(|c| c.id))
        }
        .await;

        absorb(PROVIDER, title, result)
    }

    /// Phase one: a game id per title, at the search rate limit
    pub async fn resolve_identifiers(&self, titles: &[String]) -> AppResult<ResolvedIdentifiers> {
        let ids = fetch_in_chunks(PROVIDER, titles, self.search_limit, |title| {
            self.identify(title)
        })
        .await?;

        Ok(ResolvedIdentifiers {
            by_title: titles.iter().cloned().zip(ids).collect(),
        })
    }

    async fn query_chunk(&self, ids: &[u64]) -> AppResult<Option<HashMap<u64, PlaytimeEstimate>>> {
        let response = self.post("multiquery", multiquery_body(ids)).await?;
        let results: Vec<ApiMultiqueryResult> = response.json().await?;

        let estimates = results
            .into_iter()
            .filter_map(|r| {
                let id = r.name.strip_prefix(LABEL_PREFIX)?.parse::<u64>().ok()?;
                let ttb = r.result.into_iter().next()?;
                let estimate = PlaytimeEstimate::from_seconds(ttb.normally, ttb.completely);
                (!estimate.is_empty()).then_some((id, estimate))
            })
            .collect();

        Ok(Some(estimates))
    }

    /// Phase two: estimates for distinct ids, one multiquery per chunk
    pub async fn query_estimates(&self, ids: &[u64]) -> AppResult<HashMap<u64, PlaytimeEstimate>> {
        let groups: Vec<Vec<u64>> = ids
            .chunks(self.query_limit.chunk_size())
            .map(<[u64]>::to_vec)
            .collect();
        let one_request_at_a_time = RateLimit::new(1, self.query_limit.delay());

        let outcomes = fetch_in_chunks(PROVIDER, &groups, one_request_at_a_time, |group| {
            self.query_chunk(group)
        })
        .await?;

        Ok(outcomes.into_iter().flatten().flatten().collect())
    }
}

#[async_trait::async_trait]
impl PlaytimeProvider for IgdbPlaytime {
    async fn resolve(&self, title: &str) -> AppResult<PlaytimeEstimate> {
        let titles = [title.to_string()];
        let estimates = self.resolve_batch(&titles).await?;
        Ok(estimates.get(title).copied().unwrap_or_default())
    }

    async fn resolve_batch(
        &self,
        titles: &[String],
    ) -> AppResult<HashMap<String, PlaytimeEstimate>> {
        let identifiers = self.resolve_identifiers(titles).await?;
        let ids = identifiers.unique_ids();

        tracing::info!(
            titles = titles.len(),
            identified = ids.len(),
            provider = PROVIDER,
            "Identified titles for playtime lookup"
        );

        let estimates = self.query_estimates(&ids).await?;
        Ok(identifiers.join(&estimates))
    }
}
