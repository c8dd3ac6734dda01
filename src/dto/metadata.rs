//! IGDB lookup payloads for the admin enrichment flow.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::services::metadata_service::{GameCandidate, GameDraft, GameWebsite};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct IgdbSearchParams {
    /// Game name, at least two characters.
    pub query: String,
    /// Maximum number of candidates (1 to 50, default 10).
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebsiteResponse {
    pub url: String,
    /// IGDB website category code.
    pub category: i64,
}

impl From<&GameWebsite> for WebsiteResponse {
    fn from(site: &GameWebsite) -> Self {
        Self {
            url: site.url.clone(),
            category: site.category,
        }
    }
}

/// One IGDB match.
#[derive(Debug, Serialize, ToSchema)]
pub struct CandidateResponse {
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
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub websites: Vec<WebsiteResponse>,
}

impl From<&GameCandidate> for CandidateResponse {
    fn from(game: &GameCandidate) -> Self {
        Self {
            igdb_id: game.igdb_id,
            name: game.name.clone(),
            slug: game.slug.clone(),
            summary: game.summary.clone(),
            release_year: game.release_year,
            cover_url: game.cover_url.clone(),
            genres: game.genres.clone(),
            game_modes: game.game_modes.clone(),
            online: game.online,
            offline: game.offline,
            rating: game.rating,
            rating_count: game.rating_count,
            websites: game.websites.iter().map(WebsiteResponse::from).collect(),
        }
    }
}

/// Game form values pre-filled from an IGDB record.
#[derive(Debug, Serialize, ToSchema)]
pub struct GameDraftResponse {
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

impl From<GameDraft> for GameDraftResponse {
    fn from(draft: GameDraft) -> Self {
        Self {
            title: draft.title,
            slug: draft.slug,
            genre: draft.genre,
            subgenre: draft.subgenre,
            release_year: draft.release_year,
            online: draft.online,
            offline: draft.offline,
            image_url: draft.image_url,
            summary: draft.summary,
            system_requirements: draft.system_requirements,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IgdbDetailsResponse {
    pub game: CandidateResponse,
    pub draft: GameDraftResponse,
}
