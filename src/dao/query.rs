//! Typed game listing query shared by every storage backend.
//!
//! A [`GameQuery`] is built once from caller input, normalized so that equivalent
//! requests compare (and hash) equal, then either evaluated in memory or translated
//! into a backend-native filter by the store implementation.

use std::cmp::Ordering;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::dao::models::GameEntity;

/// Hard cap on the number of rows a listing returns.
pub const RESULT_LIMIT: usize = 1000;
/// Number of sort keys honoured (primary, secondary, tertiary).
pub const MAX_SORT_DIRECTIVES: usize = 3;
/// Literal price value that marks a game as free.
pub const FREE_PRICE: &str = "Free";

/// Optional constraints on a game listing. Absent fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GameFilter {
    /// Case-insensitive substring matched against title or genre.
    pub search: Option<String>,
    pub player_min: Option<u32>,
    pub player_max: Option<u32>,
    pub same_pc_min: Option<u32>,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub online_only: bool,
    pub offline_only: bool,
    pub free_only: bool,
    pub standalone_only: bool,
}

impl GameFilter {
    fn normalized(mut self) -> Self {
        self.search = self
            .search
            .map(|text| text.trim().to_lowercase())
            .filter(|text| !text.is_empty());
        self
    }

    /// Conjunction of predicates implied by the active filters.
    pub fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = Vec::new();
        if let Some(text) = &self.search {
            predicates.push(Predicate::TitleOrGenreContains(text.clone()));
        }
        if let Some(min) = self.player_min {
            predicates.push(Predicate::PlayerLimitAtLeast(min));
        }
        if let Some(max) = self.player_max {
            predicates.push(Predicate::PlayerLimitAtMost(max));
        }
        if let Some(min) = self.same_pc_min {
            predicates.push(Predicate::SamePcLimitAtLeast(min));
        }
        if let Some(min) = self.year_min {
            predicates.push(Predicate::ReleasedFrom(min));
        }
        if let Some(max) = self.year_max {
            predicates.push(Predicate::ReleasedUntil(max));
        }
        if self.online_only {
            predicates.push(Predicate::Online);
        }
        if self.offline_only {
            predicates.push(Predicate::Offline);
        }
        if self.free_only {
            predicates.push(Predicate::Free);
        }
        if self.standalone_only {
            predicates.push(Predicate::Priced);
        }
        predicates
    }
}

/// Single condition over a game record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Title OR genre contains the (already lowercased) needle.
    TitleOrGenreContains(String),
    PlayerLimitAtLeast(u32),
    PlayerLimitAtMost(u32),
    SamePcLimitAtLeast(u32),
    ReleasedFrom(i32),
    ReleasedUntil(i32),
    Online,
    Offline,
    /// Price empty, absent or exactly [`FREE_PRICE`].
    Free,
    /// Price present, non-empty and not [`FREE_PRICE`].
    Priced,
}

impl Predicate {
    /// Evaluate the predicate against an in-memory record.
    pub fn matches(&self, game: &GameEntity) -> bool {
        match self {
            Predicate::TitleOrGenreContains(needle) => {
                game.title.to_lowercase().contains(needle.as_str())
                    || game.genre.to_lowercase().contains(needle.as_str())
            }
            Predicate::PlayerLimitAtLeast(min) => game.player_limit >= *min,
            Predicate::PlayerLimitAtMost(max) => game.player_limit <= *max,
            Predicate::SamePcLimitAtLeast(min) => game.same_pc_limit >= *min,
            Predicate::ReleasedFrom(min) => game.release_year >= *min,
            Predicate::ReleasedUntil(max) => game.release_year <= *max,
            Predicate::Online => game.online,
            Predicate::Offline => game.offline,
            Predicate::Free => is_free_price(game.price.as_deref()),
            Predicate::Priced => !is_free_price(game.price.as_deref()),
        }
    }
}

/// `true` when the price is absent, empty or the literal "Free".
pub fn is_free_price(price: Option<&str>) -> bool {
    matches!(price, None | Some("") | Some(FREE_PRICE))
}

/// Columns a listing can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    Title,
    PlayerLimit,
    SamePcLimit,
    Genre,
    ReleaseYear,
}

impl SortColumn {
    /// Parse the short column names used in listing URLs (`title`, `p_limit`, ...).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "title" => Some(SortColumn::Title),
            "p_limit" => Some(SortColumn::PlayerLimit),
            "p_samepc" => Some(SortColumn::SamePcLimit),
            "genre" => Some(SortColumn::Genre),
            "r_year" => Some(SortColumn::ReleaseYear),
            _ => None,
        }
    }

    fn compare(self, a: &GameEntity, b: &GameEntity) -> Ordering {
        match self {
            SortColumn::Title => a.title.cmp(&b.title),
            SortColumn::PlayerLimit => a.player_limit.cmp(&b.player_limit),
            SortColumn::SamePcLimit => a.same_pc_limit.cmp(&b.same_pc_limit),
            SortColumn::Genre => a.genre.cmp(&b.genre),
            SortColumn::ReleaseYear => a.release_year.cmp(&b.release_year),
        }
    }
}

/// Sort direction of a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// `asc` in any case is ascending; anything else, including nothing, is descending.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(value) if value.trim().eq_ignore_ascii_case("asc") => SortDirection::Asc,
            _ => SortDirection::Desc,
        }
    }
}

/// One `(column, direction)` sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SortDirective {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl SortDirective {
    pub fn new(column: SortColumn, direction: SortDirection) -> Self {
        Self { column, direction }
    }

    /// Build a directive from raw URL values; unknown or missing columns yield `None`.
    pub fn parse(column: Option<&str>, direction: Option<&str>) -> Option<Self> {
        let column = SortColumn::parse(column?)?;
        Some(Self::new(column, SortDirection::parse(direction)))
    }

    fn compare(&self, a: &GameEntity, b: &GameEntity) -> Ordering {
        let ordering = self.column.compare(a, b);
        match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// Normalized listing request: filters, resolved sort keys and row cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameQuery {
    filter: GameFilter,
    sort: Vec<SortDirective>,
    limit: usize,
}

impl GameQuery {
    /// Normalize a filter and up to three sort directives.
    ///
    /// Only the first [`MAX_SORT_DIRECTIVES`] directives are considered. A column that
    /// already appears earlier in the list cannot break ties and is dropped. When no
    /// directive survives, the listing is ordered by title ascending.
    pub fn new(filter: GameFilter, sort: impl IntoIterator<Item = SortDirective>) -> Self {
        let mut directives: Vec<SortDirective> = Vec::with_capacity(MAX_SORT_DIRECTIVES);
        for directive in sort.into_iter().take(MAX_SORT_DIRECTIVES) {
            if directives.iter().all(|seen| seen.column != directive.column) {
                directives.push(directive);
            }
        }
        if directives.is_empty() {
            directives.push(SortDirective::new(SortColumn::Title, SortDirection::Asc));
        }

        Self {
            filter: filter.normalized(),
            sort: directives,
            limit: RESULT_LIMIT,
        }
    }

    pub fn filter(&self) -> &GameFilter {
        &self.filter
    }

    pub fn sort(&self) -> &[SortDirective] {
        &self.sort
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn predicates(&self) -> Vec<Predicate> {
        self.filter.predicates()
    }

    /// Deterministic cache key: SHA-256 over the serialized normalized query.
    pub fn cache_key(&self) -> String {
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&encoded);
        format!("games:{}", hex::encode(hasher.finalize()))
    }

    /// Total order used by in-memory evaluation; ties after every key fall back to id.
    pub fn compare(&self, a: &GameEntity, b: &GameEntity) -> Ordering {
        self.sort
            .iter()
            .map(|directive| directive.compare(a, b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| a.id.cmp(&b.id))
    }

    /// Filter, sort and cap a set of records in memory.
    pub fn apply<'a>(&self, games: impl IntoIterator<Item = &'a GameEntity>) -> Vec<GameEntity> {
        let predicates = self.predicates();
        let mut matching: Vec<GameEntity> = games
            .into_iter()
            .filter(|game| predicates.iter().all(|predicate| predicate.matches(game)))
            .cloned()
            .collect();
        matching.sort_by(|a, b| self.compare(a, b));
        matching.truncate(self.limit);
        matching
    }
}

impl Default for GameQuery {
    fn default() -> Self {
        Self::new(GameFilter::default(), [])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn game(id: i64, title: &str, genre: &str, players: u32, year: i32) -> GameEntity {
        let now = SystemTime::UNIX_EPOCH;
        GameEntity {
            id,
            slug: title.to_lowercase().replace(' ', "-"),
            title: title.into(),
            genre: genre.into(),
            subgenre: None,
            release_year: year,
            player_limit: players,
            same_pc_limit: 1,
            online: true,
            offline: false,
            price: None,
            price_url: None,
            image_url: None,
            system_requirements: None,
            vote_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn empty_sort_defaults_to_title_ascending() {
        let query = GameQuery::new(GameFilter::default(), []);
        assert_eq!(
            query.sort(),
            &[SortDirective::new(SortColumn::Title, SortDirection::Asc)]
        );
        assert_eq!(query.limit(), RESULT_LIMIT);
    }

    #[test]
    fn unknown_sort_columns_are_skipped() {
        let directives = [
            SortDirective::parse(Some("bogus"), Some("asc")),
            SortDirective::parse(Some("r_year"), Some("ASC")),
            SortDirective::parse(None, Some("desc")),
        ];
        let query = GameQuery::new(GameFilter::default(), directives.into_iter().flatten());
        assert_eq!(
            query.sort(),
            &[SortDirective::new(SortColumn::ReleaseYear, SortDirection::Asc)]
        );
    }

    #[test]
    fn direction_other_than_asc_is_descending() {
        assert_eq!(SortDirection::parse(Some("aSc")), SortDirection::Asc);
        assert_eq!(SortDirection::parse(Some("up")), SortDirection::Desc);
        assert_eq!(SortDirection::parse(None), SortDirection::Desc);
    }

    #[test]
    fn repeated_column_is_dropped() {
        let query = GameQuery::new(
            GameFilter::default(),
            [
                SortDirective::new(SortColumn::Genre, SortDirection::Asc),
                SortDirective::new(SortColumn::Genre, SortDirection::Desc),
                SortDirective::new(SortColumn::Title, SortDirection::Desc),
            ],
        );
        assert_eq!(query.sort().len(), 2);
        assert_eq!(query.sort()[1].column, SortColumn::Title);
    }

    #[test]
    fn equivalent_requests_share_cache_key() {
        let a = GameQuery::new(
            GameFilter {
                search: Some("  Doom ".into()),
                ..GameFilter::default()
            },
            [],
        );
        let b = GameQuery::new(
            GameFilter {
                search: Some("doom".into()),
                ..GameFilter::default()
            },
            [SortDirective::new(SortColumn::Title, SortDirection::Asc)],
        );
        assert_eq!(a.cache_key(), b.cache_key());

        let c = GameQuery::new(
            GameFilter {
                search: Some("doom".into()),
                ..GameFilter::default()
            },
            [SortDirective::new(SortColumn::Title, SortDirection::Desc)],
        );
        assert_ne!(a.cache_key(), c.cache_key());
    }

    #[test]
    fn blank_search_is_no_constraint() {
        let query = GameQuery::new(
            GameFilter {
                search: Some("   ".into()),
                ..GameFilter::default()
            },
            [],
        );
        assert!(query.predicates().is_empty());
        assert_eq!(query.cache_key(), GameQuery::default().cache_key());
    }

    #[test]
    fn search_matches_title_or_genre_case_insensitively() {
        let predicate = Predicate::TitleOrGenreContains("fps".into());
        assert!(predicate.matches(&game(1, "Doom", "FPS", 12, 2016)));
        assert!(!predicate.matches(&game(2, "Minecraft", "Open world", 8, 2011)));

        let predicate = Predicate::TitleOrGenreContains("mine".into());
        assert!(predicate.matches(&game(2, "Minecraft", "Open world", 8, 2011)));
    }

    #[test]
    fn free_and_priced_partition_prices() {
        assert!(is_free_price(None));
        assert!(is_free_price(Some("")));
        assert!(is_free_price(Some("Free")));
        assert!(!is_free_price(Some("free")));
        assert!(!is_free_price(Some("€ 62.95")));
    }

    #[test]
    fn every_result_satisfies_every_active_predicate() {
        let games = vec![
            game(1, "Doom (2016)", "FPS", 12, 2016),
            game(2, "Quake", "FPS", 16, 1996),
            game(3, "Awesomenauts", "Platformer", 6, 2012),
            game(4, "Unreal Tournament", "FPS", 32, 1999),
        ];
        let filter = GameFilter {
            search: Some("fps".into()),
            player_min: Some(12),
            player_max: Some(20),
            year_max: Some(2010),
            ..GameFilter::default()
        };
        let query = GameQuery::new(filter, []);
        let result = query.apply(&games);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].title, "Quake");
        let predicates = query.predicates();
        assert!(
            result
                .iter()
                .all(|g| predicates.iter().all(|p| p.matches(g)))
        );
    }

    #[test]
    fn secondary_key_breaks_primary_ties() {
        let games = vec![
            game(1, "B", "FPS", 8, 2000),
            game(2, "A", "FPS", 8, 2005),
            game(3, "C", "RTS", 16, 1998),
        ];
        let query = GameQuery::new(
            GameFilter::default(),
            [
                SortDirective::new(SortColumn::PlayerLimit, SortDirection::Desc),
                SortDirective::new(SortColumn::Title, SortDirection::Asc),
            ],
        );
        let titles: Vec<_> = query
            .apply(&games)
            .into_iter()
            .map(|g| g.title)
            .collect();
        assert_eq!(titles, ["C", "A", "B"]);
    }

    #[test]
    fn free_and_standalone_together_yield_nothing() {
        let mut priced = game(1, "Doom", "FPS", 12, 2016);
        priced.price = Some("€ 62.95".into());
        let mut free = game(2, "Minecraft", "Open world", 8, 2011);
        free.price = Some("Free".into());

        let query = GameQuery::new(
            GameFilter {
                free_only: true,
                standalone_only: true,
                ..GameFilter::default()
            },
            [],
        );
        assert!(query.apply(&[priced, free]).is_empty());
    }
}
