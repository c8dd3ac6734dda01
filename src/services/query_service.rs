//! Cached, fail-soft read side of the catalog.
//!
//! Listing reads consult the [`QueryCache`](crate::cache::QueryCache) first and only
//! store successful results. A store failure is logged and turned into an empty
//! result so the listing page keeps rendering; nothing is cached in that case, so
//! the first request after recovery goes back to the store.

use std::{sync::Arc, time::Duration};

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

use crate::{
    dao::{
        models::{GameEntity, GameId, VotingStatsEntity},
        query::GameQuery,
    },
    error::ServiceError,
    state::SharedState,
};

/// Fixed cache key of the total game count.
pub const COUNT_CACHE_KEY: &str = "games:count";
pub const TOP_VOTED_DEFAULT_LIMIT: usize = 20;
pub const TOP_VOTED_MAX_LIMIT: usize = 100;

/// Value stored in the listing cache.
#[derive(Debug, Clone)]
pub enum CachedQuery {
    Games(Arc<Vec<GameEntity>>),
    Count(u64),
}

/// Run a listing query, serving it from the cache when a fresh entry exists.
pub async fn list_games(state: &SharedState, query: GameQuery) -> Arc<Vec<GameEntity>> {
    let key = query.cache_key();
    if let Some(CachedQuery::Games(games)) = state.query_cache().get(&key) {
        return games;
    }

    let Some(store) = state.catalog_store().await else {
        warn!(cache_key = %key, "game listing skipped: storage unavailable (degraded mode)");
        return Arc::new(Vec::new());
    };

    match store.query_games(query).await {
        Ok(games) => {
            let games = Arc::new(games);
            state
                .query_cache()
                .set(key, CachedQuery::Games(games.clone()));
            games
        }
        Err(err) => {
            warn!(cache_key = %key, error = %err, "game listing failed; returning empty result");
            Arc::new(Vec::new())
        }
    }
}

/// Total number of games, cached under [`COUNT_CACHE_KEY`]; 0 when the store fails.
pub async fn count_games(state: &SharedState) -> u64 {
    if let Some(CachedQuery::Count(count)) = state.query_cache().get(COUNT_CACHE_KEY) {
        return count;
    }

    let Some(store) = state.catalog_store().await else {
        warn!("game count skipped: storage unavailable (degraded mode)");
        return 0;
    };

    match store.count_games().await {
        Ok(count) => {
            state
                .query_cache()
                .set(COUNT_CACHE_KEY, CachedQuery::Count(count));
            count
        }
        Err(err) => {
            warn!(error = %err, "game count failed; returning 0");
            0
        }
    }
}

/// Load one game by id. Not cached.
pub async fn get_game(state: &SharedState, id: GameId) -> Result<GameEntity, ServiceError> {
    let store = state.require_catalog_store().await?;
    store
        .find_game(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("game `{id}` not found")))
}

/// Clamp a requested ranking size to `1..=TOP_VOTED_MAX_LIMIT`.
pub fn clamp_top_limit(limit: Option<usize>) -> usize {
    limit
        .unwrap_or(TOP_VOTED_DEFAULT_LIMIT)
        .clamp(1, TOP_VOTED_MAX_LIMIT)
}

/// Games ordered by vote count, then title; empty when the store fails.
pub async fn top_voted(state: &SharedState, limit: Option<usize>) -> Vec<GameEntity> {
    let limit = clamp_top_limit(limit);
    let Some(store) = state.catalog_store().await else {
        warn!("top voted games skipped: storage unavailable (degraded mode)");
        return Vec::new();
    };

    store.top_voted_games(limit).await.unwrap_or_else(|err| {
        warn!(limit, error = %err, "top voted games failed; returning empty result");
        Vec::new()
    })
}

/// Aggregate voting figures; zeros when the store fails.
pub async fn voting_statistics(state: &SharedState) -> VotingStatsEntity {
    let Some(store) = state.catalog_store().await else {
        warn!("voting statistics skipped: storage unavailable (degraded mode)");
        return VotingStatsEntity::default();
    };

    store.voting_stats().await.unwrap_or_else(|err| {
        warn!(error = %err, "voting statistics failed; returning zeros");
        VotingStatsEntity::default()
    })
}

/// Drop stale listing entries once per cache lifetime. Runs until the task is dropped.
pub async fn run_cache_pruner(state: SharedState) {
    let period = state.config().cache_ttl.max(Duration::from_secs(1));
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let removed = state.query_cache().invalidate_expired();
        if removed > 0 {
            debug!(removed, "expired listing entries pruned");
        }
    }
}
