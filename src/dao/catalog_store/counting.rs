//! Test double that forwards to [`MemoryCatalogStore`] and counts listing reads.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::SystemTime,
};

use futures::future::BoxFuture;

use super::{CatalogStore, memory::MemoryCatalogStore};
use crate::dao::{
    models::{
        GameEntity, GameFields, GameId, NewUserEntity, SessionEntity, UserEntity, UserId,
        VoteEntity, VotingStatsEntity,
    },
    query::GameQuery,
    storage::StorageResult,
};

#[derive(Clone, Default)]
pub struct CountingStore {
    pub inner: MemoryCatalogStore,
    listings: Arc<AtomicUsize>,
    counts: Arc<AtomicUsize>,
}

impl CountingStore {
    pub fn new(inner: MemoryCatalogStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Number of `query_games` calls that reached the store.
    pub fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    /// Number of `count_games` calls that reached the store.
    pub fn counts(&self) -> usize {
        self.counts.load(Ordering::SeqCst)
    }
}

impl CatalogStore for CountingStore {
    fn query_games(&self, query: GameQuery) -> BoxFuture<'static, StorageResult<Vec<GameEntity>>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        self.inner.query_games(query)
    }

    fn count_games(&self) -> BoxFuture<'static, StorageResult<u64>> {
        self.counts.fetch_add(1, Ordering::SeqCst);
        self.inner.count_games()
    }

    fn find_game(&self, id: GameId) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        self.inner.find_game(id)
    }

    fn find_game_by_slug(
        &self,
        slug: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        self.inner.find_game_by_slug(slug)
    }

    fn upsert_game(&self, fields: GameFields) -> BoxFuture<'static, StorageResult<GameEntity>> {
        self.inner.upsert_game(fields)
    }

    fn update_game(
        &self,
        id: GameId,
        fields: GameFields,
    ) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        self.inner.update_game(id, fields)
    }

    fn delete_game(&self, id: GameId) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.delete_game(id)
    }

    fn clear_game_image(&self, id: GameId) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.clear_game_image(id)
    }

    fn top_voted_games(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<GameEntity>>> {
        self.inner.top_voted_games(limit)
    }

    fn find_vote(
        &self,
        user_id: UserId,
        game_id: GameId,
    ) -> BoxFuture<'static, StorageResult<Option<VoteEntity>>> {
        self.inner.find_vote(user_id, game_id)
    }

    fn insert_vote(&self, vote: VoteEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.insert_vote(vote)
    }

    fn delete_vote(
        &self,
        user_id: UserId,
        game_id: GameId,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.delete_vote(user_id, game_id)
    }

    fn recount_votes(&self, game_id: GameId) -> BoxFuture<'static, StorageResult<u64>> {
        self.inner.recount_votes(game_id)
    }

    fn voting_stats(&self) -> BoxFuture<'static, StorageResult<VotingStatsEntity>> {
        self.inner.voting_stats()
    }

    fn count_users(&self) -> BoxFuture<'static, StorageResult<u64>> {
        self.inner.count_users()
    }

    fn find_user(&self, id: UserId) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        self.inner.find_user(id)
    }

    fn find_user_by_username(
        &self,
        username: String,
    ) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        self.inner.find_user_by_username(username)
    }

    fn identity_taken(
        &self,
        username: String,
        email: String,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.identity_taken(username, email)
    }

    fn email_taken(
        &self,
        email: String,
        exclude: UserId,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.email_taken(email, exclude)
    }

    fn insert_user(&self, user: NewUserEntity) -> BoxFuture<'static, StorageResult<UserEntity>> {
        self.inner.insert_user(user)
    }

    fn record_login(&self, id: UserId, at: SystemTime) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.record_login(id, at)
    }

    fn update_user_email(
        &self,
        id: UserId,
        email: String,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.update_user_email(id, email)
    }

    fn delete_user(&self, id: UserId) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.delete_user(id)
    }

    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.insert_session(session)
    }

    fn find_session(
        &self,
        token_hash: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        self.inner.find_session(token_hash)
    }

    fn delete_session(&self, token_hash: String) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.delete_session(token_hash)
    }

    fn delete_expired_sessions(&self, now: SystemTime) -> BoxFuture<'static, StorageResult<u64>> {
        self.inner.delete_expired_sessions(now)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.try_reconnect()
    }
}
