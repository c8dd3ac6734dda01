//! Write side of the catalog. Every successful mutation flushes the listing cache.

use tracing::{info, warn};

use crate::{
    dao::models::{GameEntity, GameFields, GameId},
    error::ServiceError,
    state::SharedState,
};

/// Release years at or below this value mark an import row as unusable.
const MIN_IMPORT_YEAR: i32 = 1900;

/// Derive a URL-safe slug: lowercase ASCII alphanumerics, every other run collapsed to `-`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Reject records the store must never hold.
pub fn validate_fields(fields: &GameFields) -> Result<(), ServiceError> {
    let mut problems = Vec::new();
    if fields.title.trim().is_empty() {
        problems.push("title must not be empty");
    }
    if fields.genre.trim().is_empty() {
        problems.push("genre must not be empty");
    }
    if fields.slug.trim().is_empty() {
        problems.push("slug must not be empty");
    }
    if fields.player_limit < 1 {
        problems.push("player limit must be at least 1");
    }
    if fields.same_pc_limit < 1 {
        problems.push("same-pc limit must be at least 1");
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::ValidationFailure(problems.join(", ")))
    }
}

/// Insert a game, or replace the one holding the same slug.
pub async fn insert_game(
    state: &SharedState,
    fields: GameFields,
) -> Result<GameEntity, ServiceError> {
    validate_fields(&fields)?;
    let store = state.require_catalog_store().await?;
    let game = store.upsert_game(fields).await?;
    state.query_cache().invalidate_all();
    info!(game_id = game.id, slug = %game.slug, "game saved");
    Ok(game)
}

/// Overwrite the editable attributes of an existing game.
pub async fn update_game(
    state: &SharedState,
    id: GameId,
    fields: GameFields,
) -> Result<GameEntity, ServiceError> {
    validate_fields(&fields)?;
    let store = state.require_catalog_store().await?;
    let game = store
        .update_game(id, fields)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("game `{id}` not found")))?;
    state.query_cache().invalidate_all();
    info!(game_id = id, "game updated");
    Ok(game)
}

/// Delete a game and its votes.
pub async fn delete_game(state: &SharedState, id: GameId) -> Result<(), ServiceError> {
    let store = state.require_catalog_store().await?;
    if !store.delete_game(id).await? {
        return Err(ServiceError::NotFound(format!("game `{id}` not found")));
    }
    state.query_cache().invalidate_all();
    info!(game_id = id, "game deleted");
    Ok(())
}

/// Drop the remote image URL once a local copy exists.
pub async fn clear_image_url(state: &SharedState, id: GameId) -> Result<(), ServiceError> {
    let store = state.require_catalog_store().await?;
    if !store.clear_game_image(id).await? {
        return Err(ServiceError::NotFound(format!("game `{id}` not found")));
    }
    state.query_cache().invalidate_all();
    Ok(())
}

/// One tabular import row, as read from a spreadsheet export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportRow {
    pub title: String,
    pub player_limit: Option<u32>,
    pub same_pc_limit: Option<u32>,
    pub genre: String,
    pub subgenre: Option<String>,
    pub release_year: Option<i32>,
    /// `yes` (any case) enables the flag; anything else disables it.
    pub online: Option<String>,
    pub offline: Option<String>,
    pub price: Option<String>,
}

impl ImportRow {
    fn into_fields(self) -> GameFields {
        GameFields {
            slug: slugify(&self.title),
            title: self.title.trim().to_owned(),
            genre: self.genre.trim().to_owned(),
            subgenre: non_empty(self.subgenre),
            release_year: self.release_year.unwrap_or_default(),
            player_limit: self.player_limit.unwrap_or(1),
            same_pc_limit: self.same_pc_limit.unwrap_or(1),
            online: is_yes(self.online.as_deref()),
            offline: is_yes(self.offline.as_deref()),
            price: non_empty(self.price),
            price_url: None,
            image_url: None,
            system_requirements: None,
        }
    }

    fn is_usable(&self) -> bool {
        !self.title.trim().is_empty()
            && !self.genre.trim().is_empty()
            && self.release_year.unwrap_or_default() > MIN_IMPORT_YEAR
    }
}

fn is_yes(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case("yes"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Outcome of a bulk import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub total: usize,
    pub imported: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub errors: usize,
}

/// Insert every usable row whose slug is not taken yet.
///
/// Rows missing a title or genre, or released in or before 1900, are skipped. Rows that
/// fail validation or the write itself are counted as errors; the batch carries on.
pub async fn import_games(
    state: &SharedState,
    rows: Vec<ImportRow>,
) -> Result<ImportReport, ServiceError> {
    let store = state.require_catalog_store().await?;
    let mut report = ImportReport {
        total: rows.len(),
        ..ImportReport::default()
    };

    for row in rows {
        if !row.is_usable() {
            report.skipped += 1;
            continue;
        }

        let fields = row.into_fields();
        if let Err(err) = validate_fields(&fields) {
            warn!(title = %fields.title, error = %err, "import row rejected");
            report.errors += 1;
            continue;
        }

        match store.find_game_by_slug(fields.slug.clone()).await {
            Ok(Some(_)) => {
                report.duplicates += 1;
                continue;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(slug = %fields.slug, error = %err, "import duplicate check failed");
                report.errors += 1;
                continue;
            }
        }

        match store.upsert_game(fields).await {
            Ok(_) => report.imported += 1,
            Err(err) => {
                warn!(error = %err, "import row could not be stored");
                report.errors += 1;
            }
        }
    }

    if report.imported > 0 {
        state.query_cache().invalidate_all();
    }
    info!(
        total = report.total,
        imported = report.imported,
        skipped = report.skipped,
        duplicates = report.duplicates,
        errors = report.errors,
        "game import finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::{catalog_store::CatalogStore, query::GameQuery},
        services::{query_service, test_support},
    };

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Doom (2016)"), "doom-2016");
        assert_eq!(slugify("  Counter-Strike: Global Offensive "), "counter-strike-global-offensive");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn validation_lists_every_problem() {
        let mut fields = test_support::doom_fields();
        fields.title = " ".into();
        fields.genre = String::new();
        fields.player_limit = 0;

        let Err(ServiceError::ValidationFailure(message)) = validate_fields(&fields) else {
            panic!("expected a validation failure");
        };
        assert!(message.contains("title"));
        assert!(message.contains("genre"));
        assert!(message.contains("player limit"));
    }

    #[tokio::test]
    async fn insert_is_an_upsert_by_slug() {
        let (state, _) = test_support::memory_state().await;
        let first = insert_game(&state, test_support::doom_fields()).await.unwrap();

        let mut fields = test_support::doom_fields();
        fields.player_limit = 16;
        let second = insert_game(&state, fields).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.player_limit, 16);
        assert_eq!(query_service::count_games(&state).await, 1);
    }

    #[tokio::test]
    async fn invalid_fields_never_reach_the_store() {
        let (state, store) = test_support::memory_state().await;
        let mut fields = test_support::doom_fields();
        fields.genre = String::new();

        assert!(matches!(
            insert_game(&state, fields).await,
            Err(ServiceError::ValidationFailure(_))
        ));
        assert_eq!(store.count_games().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_ids() {
        let (state, _) = test_support::memory_state().await;
        assert!(matches!(
            update_game(&state, 404, test_support::doom_fields()).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            delete_game(&state, 404).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn failed_write_is_reported() {
        let (state, store) = test_support::memory_state().await;
        store.set_online(false);
        assert!(matches!(
            insert_game(&state, test_support::doom_fields()).await,
            Err(ServiceError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn delete_flushes_cached_listing() {
        let (state, _) = test_support::memory_state().await;
        let game = insert_game(&state, test_support::doom_fields()).await.unwrap();
        assert_eq!(query_service::list_games(&state, GameQuery::default()).await.len(), 1);

        delete_game(&state, game.id).await.unwrap();
        assert!(query_service::list_games(&state, GameQuery::default()).await.is_empty());
    }

    #[tokio::test]
    async fn import_counts_each_outcome() {
        let (state, _) = test_support::memory_state().await;
        insert_game(&state, test_support::doom_fields()).await.unwrap();

        let row = |title: &str, genre: &str, year: i32| ImportRow {
            title: title.into(),
            genre: genre.into(),
            release_year: Some(year),
            player_limit: Some(4),
            online: Some("Yes".into()),
            ..ImportRow::default()
        };
        let rows = vec![
            row("Minecraft", "Sandbox", 2011),
            row("Doom (2016)", "FPS", 2016),
            row("", "FPS", 2000),
            row("Ancient", "Board", 1900),
            ImportRow {
                player_limit: Some(0),
                ..row("Zero Players", "Puzzle", 2001)
            },
        ];

        let report = import_games(&state, rows).await.unwrap();
        assert_eq!(
            report,
            ImportReport {
                total: 5,
                imported: 1,
                skipped: 2,
                duplicates: 1,
                errors: 1,
            }
        );

        let minecraft = query_service::list_games(&state, GameQuery::default())
            .await
            .iter()
            .find(|game| game.slug == "minecraft")
            .cloned()
            .unwrap();
        assert!(minecraft.online);
        assert!(!minecraft.offline);
    }
}
