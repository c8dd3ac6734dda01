//! In-memory implementation of [`CatalogStore`].
//!
//! State lives in maps guarded by a single `tokio::sync::RwLock`; nothing survives a
//! restart. Used by the test-suite and by `STORE_BACKEND=memory` for local runs.
//! Unique constraints and delete cascades mirror the MongoDB backend.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::SystemTime,
};

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::RwLock;

use super::CatalogStore;
use crate::dao::{
    models::{
        GameEntity, GameFields, GameId, NewUserEntity, SessionEntity, UserEntity, UserId,
        UserRole, VoteEntity, VotingStatsEntity,
    },
    query::GameQuery,
    storage::{StorageError, StorageResult},
};

/// Failure injected while the store is switched offline.
#[derive(Debug, Error)]
#[error("in-memory store is offline")]
pub struct MemoryStoreOffline;

#[derive(Default)]
struct MemoryState {
    games: BTreeMap<GameId, GameEntity>,
    users: BTreeMap<UserId, UserEntity>,
    sessions: HashMap<String, SessionEntity>,
    votes: BTreeMap<(UserId, GameId), VoteEntity>,
    last_game_id: GameId,
    last_user_id: UserId,
}

impl MemoryState {
    fn slug_owner(&self, slug: &str) -> Option<GameId> {
        self.games
            .values()
            .find(|game| game.slug == slug)
            .map(|game| game.id)
    }

    fn vote_count(&self, game_id: GameId) -> u64 {
        self.votes.keys().filter(|(_, g)| *g == game_id).count() as u64
    }
}

#[derive(Clone)]
pub struct MemoryCatalogStore {
    state: Arc<RwLock<MemoryState>>,
    online: Arc<AtomicBool>,
}

impl Default for MemoryCatalogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            online: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate an outage (`false`) or a recovery (`true`). Every call fails while offline.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Insert a game with an explicit id, bypassing id allocation.
    pub async fn seed_game(&self, game: GameEntity) {
        let mut state = self.state.write().await;
        state.last_game_id = state.last_game_id.max(game.id);
        state.games.insert(game.id, game);
    }

    /// Insert a user with an explicit id, bypassing id allocation.
    pub async fn seed_user(&self, user: UserEntity) {
        let mut state = self.state.write().await;
        state.last_user_id = state.last_user_id.max(user.id);
        state.users.insert(user.id, user);
    }

    /// Number of stored sessions, expired ones included.
    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    /// Number of vote rows for a game.
    pub async fn vote_rows(&self, game_id: GameId) -> u64 {
        self.state.read().await.vote_count(game_id)
    }

    fn ensure_online(&self) -> StorageResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::unavailable(
                "memory store offline".into(),
                MemoryStoreOffline,
            ))
        }
    }

    /// Run a read-only closure against the state once the store is known to be online.
    fn read<T, F>(&self, f: F) -> BoxFuture<'static, StorageResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(&MemoryState) -> StorageResult<T> + Send + 'static,
    {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            let state = store.state.read().await;
            f(&state)
        })
    }

    /// Run a mutating closure against the state once the store is known to be online.
    fn write<T, F>(&self, f: F) -> BoxFuture<'static, StorageResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut MemoryState) -> StorageResult<T> + Send + 'static,
    {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            let mut state = store.state.write().await;
            f(&mut state)
        })
    }
}

impl CatalogStore for MemoryCatalogStore {
    fn query_games(&self, query: GameQuery) -> BoxFuture<'static, StorageResult<Vec<GameEntity>>> {
        self.read(move |state| Ok(query.apply(state.games.values())))
    }

    fn count_games(&self) -> BoxFuture<'static, StorageResult<u64>> {
        self.read(|state| Ok(state.games.len() as u64))
    }

    fn find_game(&self, id: GameId) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        self.read(move |state| Ok(state.games.get(&id).cloned()))
    }

    fn find_game_by_slug(
        &self,
        slug: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        self.read(move |state| {
            Ok(state
                .slug_owner(&slug)
                .and_then(|id| state.games.get(&id).cloned()))
        })
    }

    fn upsert_game(&self, fields: GameFields) -> BoxFuture<'static, StorageResult<GameEntity>> {
        self.write(move |state| {
            let now = SystemTime::now();
            let owner = state.slug_owner(&fields.slug);
            if let Some(game) = owner.and_then(|id| state.games.get_mut(&id)) {
                game.apply_fields(fields, now);
                return Ok(game.clone());
            }

            state.last_game_id += 1;
            let game = GameEntity::from_fields(state.last_game_id, fields, now);
            state.games.insert(game.id, game.clone());
            Ok(game)
        })
    }

    fn update_game(
        &self,
        id: GameId,
        fields: GameFields,
    ) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        self.write(move |state| {
            if state
                .slug_owner(&fields.slug)
                .is_some_and(|owner| owner != id)
            {
                return Err(StorageError::conflict("games.slug"));
            }
            let Some(game) = state.games.get_mut(&id) else {
                return Ok(None);
            };
            game.apply_fields(fields, SystemTime::now());
            Ok(Some(game.clone()))
        })
    }

    fn delete_game(&self, id: GameId) -> BoxFuture<'static, StorageResult<bool>> {
        self.write(move |state| {
            let removed = state.games.remove(&id).is_some();
            state.votes.retain(|(_, game_id), _| *game_id != id);
            Ok(removed)
        })
    }

    fn clear_game_image(&self, id: GameId) -> BoxFuture<'static, StorageResult<bool>> {
        self.write(move |state| {
            let Some(game) = state.games.get_mut(&id) else {
                return Ok(false);
            };
            game.image_url = None;
            game.updated_at = SystemTime::now();
            Ok(true)
        })
    }

    fn top_voted_games(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<GameEntity>>> {
        self.read(move |state| {
            let mut games: Vec<GameEntity> = state.games.values().cloned().collect();
            games.sort_by(|a, b| {
                b.vote_count
                    .cmp(&a.vote_count)
                    .then_with(|| a.title.cmp(&b.title))
                    .then_with(|| a.id.cmp(&b.id))
            });
            games.truncate(limit);
            Ok(games)
        })
    }

    fn find_vote(
        &self,
        user_id: UserId,
        game_id: GameId,
    ) -> BoxFuture<'static, StorageResult<Option<VoteEntity>>> {
        self.read(move |state| Ok(state.votes.get(&(user_id, game_id)).cloned()))
    }

    fn insert_vote(&self, vote: VoteEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.write(move |state| {
            let key = (vote.user_id, vote.game_id);
            if state.votes.contains_key(&key) {
                return Err(StorageError::conflict("votes.user_id_game_id"));
            }
            state.votes.insert(key, vote);
            Ok(())
        })
    }

    fn delete_vote(
        &self,
        user_id: UserId,
        game_id: GameId,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        self.write(move |state| Ok(state.votes.remove(&(user_id, game_id)).is_some()))
    }

    fn recount_votes(&self, game_id: GameId) -> BoxFuture<'static, StorageResult<u64>> {
        self.write(move |state| {
            let count = state.vote_count(game_id);
            if let Some(game) = state.games.get_mut(&game_id) {
                game.vote_count = count;
            }
            Ok(count)
        })
    }

    fn voting_stats(&self) -> BoxFuture<'static, StorageResult<VotingStatsEntity>> {
        self.read(|state| {
            let games: BTreeSet<GameId> = state.votes.keys().map(|(_, g)| *g).collect();
            let users: BTreeSet<UserId> = state.votes.keys().map(|(u, _)| *u).collect();
            let most_voted = games
                .iter()
                .filter_map(|id| state.games.get(id))
                .map(|game| (game.title.clone(), state.vote_count(game.id)))
                .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)));
            Ok(VotingStatsEntity {
                total_votes: state.votes.len() as u64,
                games_with_votes: games.len() as u64,
                users_who_voted: users.len() as u64,
                most_voted,
            })
        })
    }

    fn count_users(&self) -> BoxFuture<'static, StorageResult<u64>> {
        self.read(|state| Ok(state.users.len() as u64))
    }

    fn find_user(&self, id: UserId) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        self.read(move |state| Ok(state.users.get(&id).cloned()))
    }

    fn find_user_by_username(
        &self,
        username: String,
    ) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        self.read(move |state| {
            Ok(state
                .users
                .values()
                .find(|user| user.username == username)
                .cloned())
        })
    }

    fn identity_taken(
        &self,
        username: String,
        email: String,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        self.read(move |state| {
            Ok(state
                .users
                .values()
                .any(|user| user.username == username || user.email == email))
        })
    }

    fn email_taken(
        &self,
        email: String,
        exclude: UserId,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        self.read(move |state| {
            Ok(state
                .users
                .values()
                .any(|user| user.email == email && user.id != exclude))
        })
    }

    fn insert_user(&self, user: NewUserEntity) -> BoxFuture<'static, StorageResult<UserEntity>> {
        self.write(move |state| {
            if state.users.values().any(|u| u.username == user.username) {
                return Err(StorageError::conflict("users.username"));
            }
            if state.users.values().any(|u| u.email == user.email) {
                return Err(StorageError::conflict("users.email"));
            }
            let role = if state.users.is_empty() {
                UserRole::Admin
            } else {
                UserRole::Member
            };
            state.last_user_id += 1;
            let now = SystemTime::now();
            let entity = UserEntity {
                id: state.last_user_id,
                username: user.username,
                email: user.email,
                password_hash: user.password_hash,
                role,
                active: true,
                last_login: None,
                created_at: now,
                updated_at: now,
            };
            state.users.insert(entity.id, entity.clone());
            Ok(entity)
        })
    }

    fn record_login(&self, id: UserId, at: SystemTime) -> BoxFuture<'static, StorageResult<()>> {
        self.write(move |state| {
            if let Some(user) = state.users.get_mut(&id) {
                user.last_login = Some(at);
                user.updated_at = at;
            }
            Ok(())
        })
    }

    fn update_user_email(
        &self,
        id: UserId,
        email: String,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        self.write(move |state| {
            if state.users.values().any(|u| u.email == email && u.id != id) {
                return Err(StorageError::conflict("users.email"));
            }
            let Some(user) = state.users.get_mut(&id) else {
                return Ok(false);
            };
            user.email = email;
            user.updated_at = SystemTime::now();
            Ok(true)
        })
    }

    fn delete_user(&self, id: UserId) -> BoxFuture<'static, StorageResult<bool>> {
        self.write(move |state| {
            let Some(target) = state.users.get(&id) else {
                return Ok(false);
            };
            if target.is_active_admin()
                && !state
                    .users
                    .values()
                    .any(|user| user.id != id && user.is_active_admin())
            {
                return Err(StorageError::conflict("users.last_admin"));
            }
            state.users.remove(&id);
            state.sessions.retain(|_, session| session.user_id != id);
            let voted: Vec<GameId> = state
                .votes
                .keys()
                .filter(|(user_id, _)| *user_id == id)
                .map(|(_, game_id)| *game_id)
                .collect();
            state.votes.retain(|(user_id, _), _| *user_id != id);
            for game_id in voted {
                let count = state.vote_count(game_id);
                if let Some(game) = state.games.get_mut(&game_id) {
                    game.vote_count = count;
                }
            }
            Ok(true)
        })
    }

    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.write(move |state| {
            if state.sessions.contains_key(&session.token_hash) {
                return Err(StorageError::conflict("sessions.token_hash"));
            }
            state.sessions.insert(session.token_hash.clone(), session);
            Ok(())
        })
    }

    fn find_session(
        &self,
        token_hash: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        self.read(move |state| Ok(state.sessions.get(&token_hash).cloned()))
    }

    fn delete_session(&self, token_hash: String) -> BoxFuture<'static, StorageResult<bool>> {
        self.write(move |state| Ok(state.sessions.remove(&token_hash).is_some()))
    }

    fn delete_expired_sessions(&self, now: SystemTime) -> BoxFuture<'static, StorageResult<u64>> {
        self.write(move |state| {
            let before = state.sessions.len();
            state.sessions.retain(|_, session| session.expires_at > now);
            Ok((before - state.sessions.len()) as u64)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_online() })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.health_check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(slug: &str, title: &str) -> GameFields {
        GameFields {
            slug: slug.into(),
            title: title.into(),
            genre: "FPS".into(),
            subgenre: None,
            release_year: 2016,
            player_limit: 12,
            same_pc_limit: 1,
            online: true,
            offline: false,
            price: None,
            price_url: None,
            image_url: None,
            system_requirements: None,
        }
    }

    #[tokio::test]
    async fn upsert_by_slug_keeps_identity() {
        let store = MemoryCatalogStore::new();
        let first = store.upsert_game(fields("doom", "Doom")).await.unwrap();
        let second = store
            .upsert_game(fields("doom", "Doom (2016)"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.title, "Doom (2016)");
        assert_eq!(store.count_games().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_rejects_slug_of_another_game() {
        let store = MemoryCatalogStore::new();
        store.upsert_game(fields("doom", "Doom")).await.unwrap();
        let quake = store.upsert_game(fields("quake", "Quake")).await.unwrap();

        let err = store
            .update_game(quake.id, fields("doom", "Quake"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn deleting_game_cascades_votes() {
        let store = MemoryCatalogStore::new();
        let game = store.upsert_game(fields("doom", "Doom")).await.unwrap();
        let now = SystemTime::now();
        store
            .insert_vote(VoteEntity {
                user_id: 1,
                game_id: game.id,
                kind: Default::default(),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        assert!(store.delete_game(game.id).await.unwrap());
        assert_eq!(store.vote_rows(game.id).await, 0);
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let store = MemoryCatalogStore::new();
        store.set_online(false);
        assert!(store.count_games().await.is_err());
        assert!(store.health_check().await.is_err());

        store.set_online(true);
        assert_eq!(store.count_games().await.unwrap(), 0);
    }
}
