//! Catalog listing, game editing and import payloads.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidateUrl, ValidationError, ValidationErrors};

use crate::{
    dao::{
        models::{GameEntity, GameFields, GameId},
        query::{GameFilter, GameQuery, SortDirective},
    },
    dto::{
        format_system_time,
        validation::{validate_not_blank, validate_slug},
    },
    services::{
        game_service::{ImportReport, ImportRow, slugify},
        image_service::StoredImage,
    },
};

/// Listing filters and sort keys, as sent by the listing page.
///
/// Every value is optional and taken as text: numbers that fail to parse and empty
/// strings are ignored rather than rejected. Flags are enabled by `yes`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GameListParams {
    /// Case-insensitive substring of the title or genre.
    pub search: Option<String>,
    /// Minimum player limit.
    pub p_min: Option<String>,
    /// Maximum player limit.
    pub p_max: Option<String>,
    /// Minimum same-PC player limit.
    pub p_samepc_min: Option<String>,
    /// Earliest release year.
    pub r_min: Option<String>,
    /// Latest release year.
    pub r_max: Option<String>,
    pub online: Option<String>,
    pub offline: Option<String>,
    pub free: Option<String>,
    pub standalone: Option<String>,
    /// Primary sort column (`title`, `p_limit`, `p_samepc`, `genre`, `r_year`).
    pub s1: Option<String>,
    /// Primary sort direction; `asc` is ascending, anything else descending.
    pub so1: Option<String>,
    pub s2: Option<String>,
    pub so2: Option<String>,
    pub s3: Option<String>,
    pub so3: Option<String>,
}

fn lenient<T: FromStr>(raw: Option<&str>) -> Option<T> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse().ok())
}

fn flag(raw: Option<&str>) -> bool {
    raw.is_some_and(|value| value.trim().eq_ignore_ascii_case("yes"))
}

impl GameListParams {
    pub fn into_query(self) -> GameQuery {
        let filter = GameFilter {
            search: self.search.clone(),
            player_min: lenient(self.p_min.as_deref()),
            player_max: lenient(self.p_max.as_deref()),
            same_pc_min: lenient(self.p_samepc_min.as_deref()),
            year_min: lenient(self.r_min.as_deref()),
            year_max: lenient(self.r_max.as_deref()),
            online_only: flag(self.online.as_deref()),
            offline_only: flag(self.offline.as_deref()),
            free_only: flag(self.free.as_deref()),
            standalone_only: flag(self.standalone.as_deref()),
        };
        let sort = [
            (&self.s1, &self.so1),
            (&self.s2, &self.so2),
            (&self.s3, &self.so3),
        ]
        .into_iter()
        .filter_map(|(column, direction)| {
            SortDirective::parse(column.as_deref(), direction.as_deref())
        });

        GameQuery::new(filter, sort)
    }
}

/// Public projection of a game record.
#[derive(Debug, Serialize, ToSchema)]
pub struct GameSummary {
    pub id: GameId,
    pub slug: String,
    pub title: String,
    pub genre: String,
    pub subgenre: Option<String>,
    pub release_year: i32,
    pub player_limit: u32,
    pub same_pc_limit: u32,
    pub online: bool,
    pub offline: bool,
    pub price: Option<String>,
    pub price_url: Option<String>,
    pub image_url: Option<String>,
    pub system_requirements: Option<String>,
    pub vote_count: u64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&GameEntity> for GameSummary {
    fn from(game: &GameEntity) -> Self {
        Self {
            id: game.id,
            slug: game.slug.clone(),
            title: game.title.clone(),
            genre: game.genre.clone(),
            subgenre: game.subgenre.clone(),
            release_year: game.release_year,
            player_limit: game.player_limit,
            same_pc_limit: game.same_pc_limit,
            online: game.online,
            offline: game.offline,
            price: game.price.clone(),
            price_url: game.price_url.clone(),
            image_url: game.image_url.clone(),
            system_requirements: game.system_requirements.clone(),
            vote_count: game.vote_count,
            created_at: format_system_time(game.created_at),
            updated_at: format_system_time(game.updated_at),
        }
    }
}

impl From<GameEntity> for GameSummary {
    fn from(game: GameEntity) -> Self {
        Self::from(&game)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GameListResponse {
    pub games: Vec<GameSummary>,
    /// Number of games in `games`.
    pub total: usize,
}

impl GameListResponse {
    pub fn new<'a>(games: impl IntoIterator<Item = &'a GameEntity>) -> Self {
        let games: Vec<GameSummary> = games.into_iter().map(GameSummary::from).collect();
        Self {
            total: games.len(),
            games,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TopVotedParams {
    /// Number of games to return (1 to 100, default 20).
    pub limit: Option<usize>,
}

/// Game attributes submitted by an administrator.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GameInput {
    /// Derived from the title when omitted.
    #[serde(default)]
    pub slug: Option<String>,
    pub title: String,
    pub genre: String,
    #[serde(default)]
    pub subgenre: Option<String>,
    pub release_year: i32,
    pub player_limit: u32,
    pub same_pc_limit: u32,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub offline: bool,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub price_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub system_requirements: Option<String>,
}

fn at_least_one(value: u32) -> Result<(), ValidationError> {
    if value < 1 {
        let mut err = ValidationError::new("range");
        err.message = Some("Value must be at least 1".into());
        return Err(err);
    }
    Ok(())
}

fn optional_url(value: Option<&String>) -> Result<(), ValidationError> {
    match value
        .map(|url| url.trim().to_owned())
        .filter(|url| !url.is_empty())
    {
        Some(url) if !url.validate_url() => {
            let mut err = ValidationError::new("url");
            err.message = Some("Value must be a valid URL".into());
            Err(err)
        }
        _ => Ok(()),
    }
}

impl Validate for GameInput {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let mut check = |field: &'static str, result: Result<(), ValidationError>| {
            if let Err(e) = result {
                errors.add(field, e);
            }
        };

        check("title", validate_not_blank(&self.title));
        check("genre", validate_not_blank(&self.genre));
        check("player_limit", at_least_one(self.player_limit));
        check("same_pc_limit", at_least_one(self.same_pc_limit));
        check("price_url", optional_url(self.price_url.as_ref()));
        check("image_url", optional_url(self.image_url.as_ref()));
        if let Some(ref slug) = self.slug {
            if !slug.trim().is_empty() {
                check("slug", validate_slug(slug.trim()));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

impl From<GameInput> for GameFields {
    fn from(input: GameInput) -> Self {
        let title = input.title.trim().to_owned();
        let slug = non_empty(input.slug).unwrap_or_else(|| slugify(&title));
        Self {
            slug,
            title,
            genre: input.genre.trim().to_owned(),
            subgenre: non_empty(input.subgenre),
            release_year: input.release_year,
            player_limit: input.player_limit,
            same_pc_limit: input.same_pc_limit,
            online: input.online,
            offline: input.offline,
            price: non_empty(input.price),
            price_url: non_empty(input.price_url),
            image_url: non_empty(input.image_url),
            system_requirements: non_empty(input.system_requirements),
        }
    }
}

/// One spreadsheet row of a bulk import. Flags are `yes` / `no`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ImportRowInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub player_limit: Option<u32>,
    #[serde(default)]
    pub same_pc_limit: Option<u32>,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub subgenre: Option<String>,
    #[serde(default)]
    pub release_year: Option<i32>,
    #[serde(default)]
    pub online: Option<String>,
    #[serde(default)]
    pub offline: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
}

impl From<ImportRowInput> for ImportRow {
    fn from(row: ImportRowInput) -> Self {
        Self {
            title: row.title,
            player_limit: row.player_limit,
            same_pc_limit: row.same_pc_limit,
            genre: row.genre,
            subgenre: row.subgenre,
            release_year: row.release_year,
            online: row.online,
            offline: row.offline,
            price: row.price,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ImportRequest {
    pub rows: Vec<ImportRowInput>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ImportReportResponse {
    pub total: usize,
    pub imported: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub errors: usize,
}

impl From<ImportReport> for ImportReportResponse {
    fn from(report: ImportReport) -> Self {
        Self {
            total: report.total,
            imported: report.imported,
            skipped: report.skipped,
            duplicates: report.duplicates,
            errors: report.errors,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ImageDownloadRequest {
    #[validate(url)]
    pub image_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ImageDownloadResponse {
    pub file_name: String,
    pub local_path: String,
}

impl From<StoredImage> for ImageDownloadResponse {
    fn from(image: StoredImage) -> Self {
        Self {
            file_name: image.file_name,
            local_path: image.local_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::query::{SortColumn, SortDirection};

    fn params(pairs: &[(&str, &str)]) -> GameListParams {
        serde_json::from_value(serde_json::Value::Object(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
                .collect(),
        ))
        .unwrap()
    }

    #[test]
    fn malformed_numbers_are_ignored() {
        let query = params(&[("p_min", "abc"), ("p_max", ""), ("r_min", " 2016 ")]).into_query();
        let filter = query.filter();
        assert_eq!(filter.player_min, None);
        assert_eq!(filter.player_max, None);
        assert_eq!(filter.year_min, Some(2016));
    }

    #[test]
    fn flags_need_yes() {
        let query = params(&[("online", "yes"), ("offline", "no"), ("free", "YES")]).into_query();
        let filter = query.filter();
        assert!(filter.online_only);
        assert!(!filter.offline_only);
        assert!(filter.free_only);
        assert!(!filter.standalone_only);
    }

    #[test]
    fn sort_keys_keep_their_order() {
        let query = params(&[
            ("s1", "r_year"),
            ("so1", "desc"),
            ("s2", "bogus"),
            ("s3", "title"),
            ("so3", "ASC"),
        ])
        .into_query();
        assert_eq!(
            query.sort(),
            [
                SortDirective::new(SortColumn::ReleaseYear, SortDirection::Desc),
                SortDirective::new(SortColumn::Title, SortDirection::Asc),
            ]
        );
    }

    fn input() -> GameInput {
        GameInput {
            slug: None,
            title: " Atomic Bomberman ".into(),
            genre: "Party".into(),
            subgenre: Some(" ".into()),
            release_year: 1997,
            player_limit: 10,
            same_pc_limit: 10,
            online: false,
            offline: true,
            price: Some("Free".into()),
            price_url: None,
            image_url: Some("https://example.com/bomberman.png".into()),
            system_requirements: None,
        }
    }

    #[test]
    fn missing_slug_is_derived_from_title() {
        let fields = GameFields::from(input());
        assert_eq!(fields.slug, "atomic-bomberman");
        assert_eq!(fields.title, "Atomic Bomberman");
        assert_eq!(fields.subgenre, None);
    }

    #[test]
    fn game_input_validation_reports_fields() {
        assert!(input().validate().is_ok());

        let bad = GameInput {
            slug: Some("Not A Slug".into()),
            genre: " ".into(),
            same_pc_limit: 0,
            image_url: Some("not a url".into()),
            ..input()
        };
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        for field in ["slug", "genre", "same_pc_limit", "image_url"] {
            assert!(fields.contains_key(field), "missing error for {field}");
        }
        assert!(!fields.contains_key("title"));
    }
}
