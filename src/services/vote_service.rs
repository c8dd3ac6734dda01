//! One toggleable vote per user and game.

use std::time::SystemTime;

use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    dao::{
        models::{GameId, UserId, VoteEntity, VoteKind},
        storage::StorageError,
    },
    error::ServiceError,
    state::SharedState,
};

/// What a toggle did to the caller's vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VoteAction {
    Added,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteOutcome {
    pub action: VoteAction,
    /// Authoritative number of votes on the game after the toggle.
    pub vote_count: u64,
}

/// Add the caller's vote on `game_id`, or remove it when one already exists.
///
/// The game's counter is recomputed from the vote rows after every change.
pub async fn toggle_vote(
    state: &SharedState,
    caller: Option<UserId>,
    game_id: GameId,
) -> Result<VoteOutcome, ServiceError> {
    let user_id =
        caller.ok_or_else(|| ServiceError::Unauthorized("login required to vote".into()))?;
    let store = state.require_catalog_store().await?;

    if store.find_game(game_id).await?.is_none() {
        return Err(ServiceError::NotFound(format!("game `{game_id}` not found")));
    }

    let action = if store.delete_vote(user_id, game_id).await? {
        VoteAction::Removed
    } else {
        let now = SystemTime::now();
        let vote = VoteEntity {
            user_id,
            game_id,
            kind: VoteKind::ThumbsUp,
            created_at: now,
            updated_at: now,
        };
        match store.insert_vote(vote).await {
            // A concurrent request already recorded this vote.
            Ok(()) | Err(StorageError::Conflict(_)) => VoteAction::Added,
            Err(err) => return Err(err.into()),
        }
    };

    let vote_count = store.recount_votes(game_id).await?;
    state.query_cache().invalidate_all();
    info!(user_id, game_id, ?action, vote_count, "vote toggled");

    Ok(VoteOutcome { action, vote_count })
}

/// Whether `user_id` currently holds a vote on `game_id`.
pub async fn user_vote(
    state: &SharedState,
    user_id: UserId,
    game_id: GameId,
) -> Result<bool, ServiceError> {
    let store = state.require_catalog_store().await?;
    Ok(store.find_vote(user_id, game_id).await?.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{query_service, test_support};

    #[tokio::test]
    async fn user_seven_toggles_vote_on_game_forty_two() {
        let (state, store) = test_support::memory_state().await;
        store.seed_game(test_support::game_with_id(42)).await;
        store.seed_user(test_support::user_with_id(7)).await;

        let first = toggle_vote(&state, Some(7), 42).await.unwrap();
        assert_eq!(
            first,
            VoteOutcome {
                action: VoteAction::Added,
                vote_count: 1
            }
        );

        let second = toggle_vote(&state, Some(7), 42).await.unwrap();
        assert_eq!(
            second,
            VoteOutcome {
                action: VoteAction::Removed,
                vote_count: 0
            }
        );
    }

    #[tokio::test]
    async fn counter_tracks_rows_after_every_toggle() {
        let (state, store) = test_support::memory_state().await;
        store.seed_game(test_support::game_with_id(42)).await;

        for round in 0..5 {
            for user in [1, 2, 3] {
                let outcome = toggle_vote(&state, Some(user), 42).await.unwrap();
                assert_eq!(outcome.vote_count, store.vote_rows(42).await);
            }
            let present = round % 2 == 0;
            assert_eq!(user_vote(&state, 2, 42).await.unwrap(), present);
        }

        let game = query_service::get_game(&state, 42).await.unwrap();
        assert_eq!(game.vote_count, store.vote_rows(42).await);
    }

    #[tokio::test]
    async fn anonymous_votes_are_rejected() {
        let (state, store) = test_support::memory_state().await;
        store.seed_game(test_support::game_with_id(42)).await;
        assert!(matches!(
            toggle_vote(&state, None, 42).await,
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn votes_on_unknown_games_are_rejected() {
        let (state, _) = test_support::memory_state().await;
        assert!(matches!(
            toggle_vote(&state, Some(7), 42).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn statistics_follow_votes() {
        let (state, store) = test_support::memory_state().await;
        store.seed_game(test_support::game_with_id(42)).await;
        let mut other = test_support::game_with_id(43);
        other.slug = "quake".into();
        other.title = "Quake".into();
        store.seed_game(other).await;

        toggle_vote(&state, Some(1), 42).await.unwrap();
        toggle_vote(&state, Some(2), 42).await.unwrap();
        toggle_vote(&state, Some(2), 43).await.unwrap();

        let stats = query_service::voting_statistics(&state).await;
        assert_eq!(stats.total_votes, 3);
        assert_eq!(stats.games_with_votes, 2);
        assert_eq!(stats.users_who_voted, 2);
        assert_eq!(stats.most_voted, Some(("Doom (2016)".to_owned(), 2)));

        let top = query_service::top_voted(&state, Some(1)).await;
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].id, 42);
    }
}
