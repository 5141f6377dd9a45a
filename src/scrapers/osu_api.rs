//! osu! API v2 client
//! Client-credentials auth, country performance ranking, best scores and
//! user lookups. One HTTP request per call, no retries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::source::ScoreSource;
use crate::error::{Result, TrackerError};
use crate::models::{EntityId, Grade, PlayerProfile, RankingEntry, ResultSummary};

pub const OSU_API_BASE: &str = "https://osu.ppy.sh";

// Refresh the token this long before the server-side expiry.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct OsuApiConfig {
    pub base_url: String,
    pub client_id: u64,
    pub client_secret: String,
    /// ISO country code, e.g. "UA"
    pub country: String,
    /// Ruleset name: osu, taiko, fruits, mania
    pub mode: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct RankingsResponse {
    ranking: Vec<RankingRow>,
}

#[derive(Debug, Deserialize)]
struct RankingRow {
    global_rank: Option<u32>,
    user: UserCompact,
}

#[derive(Debug, Deserialize)]
struct UserCompact {
    id: EntityId,
    username: String,
    #[serde(default)]
    is_restricted: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ScoreRow {
    id: u64,
    pp: Option<f64>,
    accuracy: f64,
    rank: Grade,
    #[serde(default)]
    mods: Vec<String>,
    created_at: DateTime<Utc>,
    beatmap: BeatmapCompact,
}

#[derive(Debug, Deserialize)]
struct BeatmapCompact {
    id: u64,
}

impl ScoreRow {
    fn into_summary(self) -> ResultSummary {
        ResultSummary {
            id: self.id,
            beatmap_id: self.beatmap.id,
            pp: self.pp,
            accuracy: self.accuracy,
            grade: self.rank,
            mods: self.mods,
            created_at: self.created_at,
        }
    }
}

/// osu! API client with a cached client-credentials token
pub struct OsuApiClient {
    client: Client,
    config: OsuApiConfig,
    token: Mutex<Option<CachedToken>>,
}

impl OsuApiClient {
    pub fn new(config: OsuApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("leaderboard-tracker/0.1")
            .build()?;

        Ok(Self {
            client,
            config,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let url = format!("{}/oauth/token", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "client_id": self.config.client_id,
                "client_secret": self.config.client_secret,
                "grant_type": "client_credentials",
                "scope": "public",
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrackerError::Transport(format!(
                "token request failed {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        info!(expires_in = token.expires_in, "🔑 osu! API token acquired");

        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        let token = self.access_token().await?;
        let url = format!("{}/api/v2{}", self.config.base_url, path);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrackerError::Transport(format!(
                "GET {} failed {}: {}",
                path, status, body
            )));
        }

        let text = response.text().await?;
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| TrackerError::Transport(format!("malformed response from {}: {}", path, e)))
    }
}

#[async_trait]
impl ScoreSource for OsuApiClient {
    async fn ranking_page(&self, page: u32) -> Result<Vec<RankingEntry>> {
        let path = format!("/rankings/{}/performance", self.config.mode);
        let query = [
            ("country", self.config.country.clone()),
            ("cursor[page]", page.to_string()),
        ];

        let rankings: RankingsResponse = self
            .get_json(&path, &query)
            .await?
            .ok_or_else(|| TrackerError::Transport(format!("ranking page {} not found", page)))?;

        Ok(rankings
            .ranking
            .into_iter()
            .map(|row| RankingEntry {
                id: row.user.id,
                username: row.user.username,
                global_rank: row.global_rank,
            })
            .collect())
    }

    async fn recent_results(&self, id: EntityId, limit: u32) -> Result<Vec<ResultSummary>> {
        let path = format!("/users/{}/scores/best", id);
        let query = [
            ("mode", self.config.mode.clone()),
            ("limit", limit.to_string()),
        ];

        // An empty list would be persisted and later re-announce every result.
        let rows: Vec<ScoreRow> = self
            .get_json(&path, &query)
            .await?
            .ok_or_else(|| TrackerError::Transport(format!("scores for {} not found", id)))?;
        debug!(entity_id = id, results = rows.len(), "Fetched results");
        Ok(rows.into_iter().map(ScoreRow::into_summary).collect())
    }

    async fn profile(&self, id: EntityId) -> Result<PlayerProfile> {
        let path = format!("/users/{}/{}", id, self.config.mode);

        match self.get_json::<UserCompact>(&path, &[]).await? {
            Some(user) => Ok(PlayerProfile {
                id: user.id,
                username: user.username,
                is_restricted: user.is_restricted.unwrap_or(false),
            }),
            // Restricted users disappear from public lookups.
            None => Ok(PlayerProfile {
                id,
                username: String::new(),
                is_restricted: true,
            }),
        }
    }
}
