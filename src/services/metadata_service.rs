//! Game metadata lookup against the IGDB v4 API.
//!
//! Requests are authenticated with a Twitch client-credentials token, cached
//! until shortly before it expires. Successful lookups are memoized in a
//! [`QueryCache`]; failures are never cached.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use crate::{
    cache::QueryCache, config::IgdbCredentials, error::ServiceError,
    services::game_service::slugify,
};

const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
const API_BASE_URL: &str = "https://api.igdb.com/v4";
/// Refresh the access token this long before Twitch says it expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub const MIN_QUERY_LEN: usize = 2;
pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const MAX_SEARCH_LIMIT: usize = 50;

const SEARCH_FIELDS: &str = "name,slug,summary,first_release_date,cover.url,genres.name,\
game_modes.name,multiplayer_modes.lancoop,multiplayer_modes.offlinecoop,\
multiplayer_modes.onlinecoop,rating,rating_count";
const DETAIL_FIELDS: &str = "name,slug,summary,first_release_date,cover.url,genres.name,\
game_modes.name,multiplayer_modes.onlinecoop,multiplayer_modes.offlinecoop,\
multiplayer_modes.lancoop,rating,rating_count,websites.url,websites.category";

pub type MetadataResult<T> = Result<T, MetadataError>;

/// Failures raised while talking to Twitch or IGDB.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// No IGDB credentials were configured.
    #[error("metadata service not configured")]
    NotConfigured,
    /// The lookup parameters were rejected before any request was sent.
    #[error("{0}")]
    InvalidRequest(String),
    /// Building the HTTP client failed.
    #[error("failed to build metadata HTTP client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// The token request could not be sent or decoded.
    #[error("failed to obtain IGDB access token")]
    TokenRequest {
        #[source]
        source: reqwest::Error,
    },
    /// Twitch answered the token request with an unexpected status.
    #[error("unexpected token response status {status}")]
    TokenStatus { status: StatusCode },
    /// An IGDB request could not be sent.
    #[error("failed to send IGDB request to `{endpoint}`")]
    RequestSend {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    /// IGDB answered with an unexpected status.
    #[error("unexpected IGDB response status {status} for `{endpoint}`")]
    RequestStatus {
        endpoint: &'static str,
        status: StatusCode,
    },
    /// The IGDB payload was not the expected list of games.
    #[error("failed to decode IGDB response for `{endpoint}`")]
    DecodeResponse {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    /// No game carries the requested IGDB id.
    #[error("IGDB game `{id}` not found")]
    GameNotFound { id: u64 },
}

impl From<MetadataError> for ServiceError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::InvalidRequest(message) => ServiceError::ValidationFailure(message),
            MetadataError::GameNotFound { id } => {
                ServiceError::NotFound(format!("IGDB game `{id}` not found"))
            }
            other => ServiceError::UpstreamFailure(other.to_string()),
        }
    }
}

/// One game as returned by a search or detail lookup. Optional upstream fields
/// that are missing stay empty.
#[derive(Debug, Clone, PartialEq)]
pub struct GameCandidate {
    pub igdb_id: u64,
    pub name: String,
    pub slug: String,
    pub summary: Option<String>,
    pub release_year: Option<i32>,
    pub cover_url: Option<String>,
    pub genres: Vec<String>,
    pub game_modes: Vec<String>,
    pub online: bool,
    pub offline: bool,
    pub rating: Option<f64>,
    pub rating_count: u64,
    /// Only filled by detail lookups.
    pub websites: Vec<GameWebsite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameWebsite {
    pub url: String,
    pub category: i64,
}

/// Editable game attributes pre-filled from a metadata record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameDraft {
    pub title: String,
    pub slug: String,
    pub genre: Option<String>,
    pub subgenre: Option<String>,
    pub release_year: Option<i32>,
    pub online: bool,
    pub offline: bool,
    pub image_url: Option<String>,
    pub summary: Option<String>,
    pub system_requirements: Option<String>,
}

/// First genre becomes the genre, the second the subgenre.
pub fn map_to_game_draft(candidate: &GameCandidate) -> GameDraft {
    GameDraft {
        title: candidate.name.clone(),
        slug: candidate.slug.clone(),
        genre: candidate.genres.first().cloned(),
        subgenre: candidate.genres.get(1).cloned(),
        release_year: candidate.release_year,
        online: candidate.online,
        offline: candidate.offline,
        image_url: candidate.cover_url.clone(),
        summary: candidate.summary.clone(),
        system_requirements: candidate.summary.clone(),
    }
}

#[derive(Debug, Deserialize)]
struct RawGame {
    id: u64,
    name: Option<String>,
    slug: Option<String>,
    summary: Option<String>,
    first_release_date: Option<i64>,
    cover: Option<RawCover>,
    #[serde(default)]
    genres: Vec<RawNamed>,
    #[serde(default)]
    game_modes: Vec<RawNamed>,
    #[serde(default)]
    multiplayer_modes: Vec<RawMultiplayerMode>,
    rating: Option<f64>,
    rating_count: Option<u64>,
    #[serde(default)]
    websites: Vec<RawWebsite>,
}

#[derive(Debug, Deserialize)]
struct RawCover {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawNamed {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMultiplayerMode {
    onlinecoop: bool,
    offlinecoop: bool,
    lancoop: bool,
}

#[derive(Debug, Deserialize)]
struct RawWebsite {
    url: Option<String>,
    category: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Upgrade a protocol-relative thumbnail URL to an absolute big cover.
fn cover_url(raw: &str) -> String {
    let url = raw.replace("t_thumb", "t_cover_big");
    if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url
    }
}

fn names(raw: Vec<RawNamed>) -> Vec<String> {
    raw.into_iter().filter_map(|named| named.name).collect()
}

/// Normalize one raw IGDB game. Records without a name are dropped.
fn process_game(raw: RawGame, detailed: bool) -> Option<GameCandidate> {
    let name = raw.name.filter(|name| !name.trim().is_empty())?;
    let online = raw.multiplayer_modes.iter().any(|mode| mode.onlinecoop);
    let offline = raw
        .multiplayer_modes
        .iter()
        .any(|mode| mode.offlinecoop || mode.lancoop);
    let websites = if detailed {
        raw.websites
            .into_iter()
            .filter_map(|site| {
                Some(GameWebsite {
                    url: site.url?,
                    category: site.category?,
                })
            })
            .collect()
    } else {
        Vec::new()
    };

    Some(GameCandidate {
        igdb_id: raw.id,
        slug: raw.slug.unwrap_or_else(|| slugify(&name)),
        name,
        summary: raw.summary.filter(|summary| !summary.is_empty()),
        release_year: raw
            .first_release_date
            .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
            .map(|date| date.year()),
        cover_url: raw.cover.and_then(|cover| cover.url).map(|url| cover_url(&url)),
        genres: names(raw.genres),
        game_modes: names(raw.game_modes),
        online,
        offline,
        rating: raw.rating.map(|rating| (rating * 10.0).round() / 10.0),
        rating_count: raw.rating_count.unwrap_or_default(),
        websites,
    })
}

/// Quote a string for an Apicalypse `search` clause.
fn apicalypse_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn search_body(query: &str, limit: usize) -> String {
    format!(
        "search {}; fields {SEARCH_FIELDS}; where category = 0; limit {limit};",
        apicalypse_string(query)
    )
}

fn details_body(id: u64) -> String {
    format!("fields {DETAIL_FIELDS}; where id = {id};")
}

#[derive(Debug, Clone)]
enum MetadataHit {
    Search(Arc<Vec<GameCandidate>>),
    Details(Arc<GameCandidate>),
}

struct AccessToken {
    value: String,
    refresh_at: Instant,
}

/// IGDB client shared through the application state.
pub struct IgdbClient {
    credentials: Option<IgdbCredentials>,
    http: OnceCell<Client>,
    token: Mutex<Option<AccessToken>>,
    cache: QueryCache<MetadataHit>,
}

impl IgdbClient {
    pub fn new(credentials: Option<IgdbCredentials>, cache_ttl: Duration) -> Self {
        Self {
            credentials,
            http: OnceCell::new(),
            token: Mutex::new(None),
            cache: QueryCache::new(cache_ttl),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    /// Search games by name. `limit` is clamped to `1..=MAX_SEARCH_LIMIT`.
    pub async fn search(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> MetadataResult<Arc<Vec<GameCandidate>>> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LEN {
            return Err(MetadataError::InvalidRequest(format!(
                "search query must be at least {MIN_QUERY_LEN} characters"
            )));
        }
        let limit = limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT);

        let key = format!("search:{limit}:{query}");
        if let Some(MetadataHit::Search(hits)) = self.cache.get(&key) {
            return Ok(hits);
        }

        let raw = self.post_games(search_body(query, limit)).await?;
        let hits = Arc::new(
            raw.into_iter()
                .filter_map(|game| process_game(game, false))
                .collect::<Vec<_>>(),
        );
        debug!(query, results = hits.len(), "IGDB search finished");
        self.cache.set(key, MetadataHit::Search(hits.clone()));
        Ok(hits)
    }

    /// Fetch the full record of one IGDB game.
    pub async fn details(&self, id: u64) -> MetadataResult<Arc<GameCandidate>> {
        if id == 0 {
            return Err(MetadataError::InvalidRequest(
                "IGDB id must be positive".into(),
            ));
        }

        let key = format!("details:{id}");
        if let Some(MetadataHit::Details(game)) = self.cache.get(&key) {
            return Ok(game);
        }

        let game = self
            .post_games(details_body(id))
            .await?
            .into_iter()
            .find_map(|game| process_game(game, true))
            .ok_or(MetadataError::GameNotFound { id })?;
        let game = Arc::new(game);
        self.cache.set(key, MetadataHit::Details(game.clone()));
        Ok(game)
    }

    /// Drop every memoized lookup.
    pub fn clear_cache(&self) {
        self.cache.invalidate_all();
    }

    async fn http(&self) -> MetadataResult<&Client> {
        self.http
            .get_or_try_init(|| async {
                Client::builder()
                    .timeout(REQUEST_TIMEOUT)
                    .build()
                    .map_err(|source| MetadataError::ClientBuilder { source })
            })
            .await
    }

    async fn access_token(&self, credentials: &IgdbCredentials) -> MetadataResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| Instant::now() < t.refresh_at) {
            return Ok(token.value.clone());
        }

        let response = self
            .http()
            .await?
            .post(TOKEN_URL)
            .form(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|source| MetadataError::TokenRequest { source })?;

        if response.status() != StatusCode::OK {
            return Err(MetadataError::TokenStatus {
                status: response.status(),
            });
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|source| MetadataError::TokenRequest { source })?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        debug!(expires_in = token.expires_in, "IGDB access token refreshed");
        *cached = Some(AccessToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    async fn post_games(&self, body: String) -> MetadataResult<Vec<RawGame>> {
        const ENDPOINT: &str = "games";
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(MetadataError::NotConfigured)?;
        let token = self.access_token(credentials).await?;

        let response = self
            .http()
            .await?
            .post(format!("{API_BASE_URL}/{ENDPOINT}"))
            .header("Client-ID", &credentials.client_id)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await
            .map_err(|source| MetadataError::RequestSend {
                endpoint: ENDPOINT,
                source,
            })?;

        match response.status() {
            StatusCode::OK => response
                .json::<Vec<RawGame>>()
                .await
                .map_err(|source| MetadataError::DecodeResponse {
                    endpoint: ENDPOINT,
                    source,
                }),
            StatusCode::UNAUTHORIZED => {
                // Token revoked early; fetch a new one on the next call.
                self.token.lock().await.take();
                Err(MetadataError::RequestStatus {
                    endpoint: ENDPOINT,
                    status: StatusCode::UNAUTHORIZED,
                })
            }
            status => {
                warn!(%status, "IGDB request rejected");
                Err(MetadataError::RequestStatus {
                    endpoint: ENDPOINT,
                    status,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOOM_PAYLOAD: &str = r#"[{
        "id": 7351,
        "name": "Doom",
        "slug": "doom--2",
        "summary": "Demons on Mars.",
        "first_release_date": 1463097600,
        "cover": {"id": 1, "url": "//images.igdb.com/igdb/image/upload/t_thumb/co1nqv.jpg"},
        "genres": [{"id": 5, "name": "Shooter"}, {"id": 31, "name": "Adventure"}],
        "game_modes": [{"id": 1, "name": "Single player"}, {"id": 2, "name": "Multiplayer"}],
        "multiplayer_modes": [{"id": 1, "onlinecoop": false}, {"id": 2, "lancoop": true}],
        "rating": 84.5623,
        "rating_count": 1200,
        "websites": [{"url": "https://bethesda.net/doom", "category": 1}, {"url": "https://x.test"}]
    }]"#;

    fn doom(detailed: bool) -> GameCandidate {
        let raw: Vec<RawGame> = serde_json::from_str(DOOM_PAYLOAD).unwrap();
        raw.into_iter()
            .find_map(|game| process_game(game, detailed))
            .unwrap()
    }

    #[test]
    fn normalizes_a_full_record() {
        let game = doom(true);
        assert_eq!(game.igdb_id, 7351);
        assert_eq!(game.release_year, Some(2016));
        assert_eq!(
            game.cover_url.as_deref(),
            Some("https://images.igdb.com/igdb/image/upload/t_cover_big/co1nqv.jpg")
        );
        assert_eq!(game.genres, ["Shooter", "Adventure"]);
        assert!(!game.online);
        assert!(game.offline);
        assert_eq!(game.rating, Some(84.6));
        assert_eq!(
            game.websites,
            [GameWebsite {
                url: "https://bethesda.net/doom".into(),
                category: 1,
            }]
        );
    }

    #[test]
    fn search_results_omit_websites() {
        assert!(doom(false).websites.is_empty());
    }

    #[test]
    fn tolerates_missing_optional_fields() {
        let raw: Vec<RawGame> =
            serde_json::from_str(r#"[{"id": 1, "name": "Bare Game"}, {"id": 2}]"#).unwrap();
        let games: Vec<_> = raw
            .into_iter()
            .filter_map(|game| process_game(game, false))
            .collect();

        assert_eq!(games.len(), 1);
        let game = &games[0];
        assert_eq!(game.slug, "bare-game");
        assert_eq!(game.release_year, None);
        assert_eq!(game.cover_url, None);
        assert!(game.genres.is_empty());
        assert!(!game.online && !game.offline);
        assert_eq!(game.rating_count, 0);
    }

    #[test]
    fn error_payloads_are_not_game_lists() {
        let payload = r#"{"title": "Syntax Error", "status": 400}"#;
        assert!(serde_json::from_str::<Vec<RawGame>>(payload).is_err());
    }

    #[test]
    fn draft_takes_first_two_genres() {
        let draft = map_to_game_draft(&doom(true));
        assert_eq!(draft.title, "Doom");
        assert_eq!(draft.genre.as_deref(), Some("Shooter"));
        assert_eq!(draft.subgenre.as_deref(), Some("Adventure"));
        assert_eq!(draft.release_year, Some(2016));
        assert_eq!(draft.system_requirements, draft.summary);
    }

    #[test]
    fn search_strings_are_escaped() {
        let body = search_body(r#"Tom "Clancy's" \ Rainbow"#, 5);
        assert!(body.starts_with(r#"search "Tom \"Clancy's\" \\ Rainbow";"#));
        assert!(body.ends_with("limit 5;"));
        assert_eq!(
            details_body(42),
            format!("fields {DETAIL_FIELDS}; where id = 42;")
        );
    }

    #[tokio::test]
    async fn rejects_bad_input_before_any_request() {
        let client = IgdbClient::new(None, Duration::from_secs(60));
        assert!(matches!(
            client.search(" a ", None).await,
            Err(MetadataError::InvalidRequest(_))
        ));
        assert!(matches!(
            client.details(0).await,
            Err(MetadataError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn unconfigured_client_reports_upstream_failure() {
        let client = IgdbClient::new(None, Duration::from_secs(60));
        assert!(!client.is_configured());

        let err = client.search("doom", Some(500)).await.unwrap_err();
        assert!(matches!(err, MetadataError::NotConfigured));
        assert!(matches!(
            ServiceError::from(err),
            ServiceError::UpstreamFailure(message) if message == "metadata service not configured"
        ));
    }
}
