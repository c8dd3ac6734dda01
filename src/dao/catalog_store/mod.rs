#[cfg(test)]
pub mod counting;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;

use crate::dao::{
    models::{
        GameEntity, GameFields, GameId, NewUserEntity, SessionEntity, UserEntity, UserId,
        VoteEntity, VotingStatsEntity,
    },
    query::GameQuery,
    storage::StorageResult,
};

/// Abstraction over the persistence layer for games, accounts, sessions and votes.
pub trait CatalogStore: Send + Sync {
    /// Run a normalized listing query (filters, sort keys, row cap).
    fn query_games(&self, query: GameQuery) -> BoxFuture<'static, StorageResult<Vec<GameEntity>>>;
    fn count_games(&self) -> BoxFuture<'static, StorageResult<u64>>;
    fn find_game(&self, id: GameId) -> BoxFuture<'static, StorageResult<Option<GameEntity>>>;
    fn find_game_by_slug(
        &self,
        slug: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameEntity>>>;
    /// Insert, or replace the record holding the same slug (id, votes and creation time kept).
    fn upsert_game(&self, fields: GameFields) -> BoxFuture<'static, StorageResult<GameEntity>>;
    /// Overwrite a record by id; `None` when no record has that id.
    fn update_game(
        &self,
        id: GameId,
        fields: GameFields,
    ) -> BoxFuture<'static, StorageResult<Option<GameEntity>>>;
    /// Delete a record and every vote referencing it.
    fn delete_game(&self, id: GameId) -> BoxFuture<'static, StorageResult<bool>>;
    fn clear_game_image(&self, id: GameId) -> BoxFuture<'static, StorageResult<bool>>;
    /// Games ordered by vote count descending, then title ascending.
    fn top_voted_games(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<GameEntity>>>;

    fn find_vote(
        &self,
        user_id: UserId,
        game_id: GameId,
    ) -> BoxFuture<'static, StorageResult<Option<VoteEntity>>>;
    fn insert_vote(&self, vote: VoteEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn delete_vote(
        &self,
        user_id: UserId,
        game_id: GameId,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Count the vote rows of a game and write the result to its denormalized counter.
    fn recount_votes(&self, game_id: GameId) -> BoxFuture<'static, StorageResult<u64>>;
    fn voting_stats(&self) -> BoxFuture<'static, StorageResult<VotingStatsEntity>>;

    fn count_users(&self) -> BoxFuture<'static, StorageResult<u64>>;
    fn find_user(&self, id: UserId) -> BoxFuture<'static, StorageResult<Option<UserEntity>>>;
    fn find_user_by_username(
        &self,
        username: String,
    ) -> BoxFuture<'static, StorageResult<Option<UserEntity>>>;
    /// Whether any user already holds this username or this email.
    fn identity_taken(
        &self,
        username: String,
        email: String,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Whether a user other than `exclude` holds this email.
    fn email_taken(
        &self,
        email: String,
        exclude: UserId,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    fn insert_user(&self, user: NewUserEntity) -> BoxFuture<'static, StorageResult<UserEntity>>;
    fn record_login(&self, id: UserId, at: SystemTime) -> BoxFuture<'static, StorageResult<()>>;
    fn update_user_email(
        &self,
        id: UserId,
        email: String,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Delete a user together with its sessions and votes; vote counters are recomputed.
    fn delete_user(&self, id: UserId) -> BoxFuture<'static, StorageResult<bool>>;

    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_session(
        &self,
        token_hash: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    fn delete_session(&self, token_hash: String) -> BoxFuture<'static, StorageResult<bool>>;
    /// Remove every session whose expiry is at or before `now`; returns how many went.
    fn delete_expired_sessions(&self, now: SystemTime) -> BoxFuture<'static, StorageResult<u64>>;

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
