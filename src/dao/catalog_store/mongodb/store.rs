use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{DateTime, Document, doc},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use tracing::info;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult, is_duplicate_key},
    models::{
        MongoGameDocument, MongoSessionDocument, MongoUserDocument, MongoVoteDocument, clamp_i64,
        doc_id, game_fields_update, game_upsert, vote_key,
    },
    query::{filter_document, sort_document},
};
use crate::dao::{
    catalog_store::CatalogStore,
    models::{
        GameEntity, GameFields, GameId, NewUserEntity, SessionEntity, UserEntity, UserId,
        UserRole, VoteEntity, VotingStatsEntity,
    },
    query::GameQuery,
    storage::StorageResult,
};

const GAMES: &str = "games";
const USERS: &str = "users";
const SESSIONS: &str = "sessions";
const VOTES: &str = "votes";
const COUNTERS: &str = "counters";

#[derive(Clone)]
pub struct MongoCatalogStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        info!(database = %self.config.database_name, "MongoDB client replaced");
        Ok(())
    }
}

fn unique_index(keys: Document, name: &str) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .name(Some(name.to_owned()))
                .unique(Some(true))
                .build(),
        )
        .build()
}

fn plain_index(keys: Document, name: &str) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().name(Some(name.to_owned())).build())
        .build()
}

impl MongoCatalogStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;
        let indexes: [(&'static str, &'static str, IndexModel); 6] = [
            (GAMES, "slug", unique_index(doc! {"slug": 1}, "game_slug_idx")),
            (
                USERS,
                "username",
                unique_index(doc! {"username": 1}, "user_username_idx"),
            ),
            (USERS, "email", unique_index(doc! {"email": 1}, "user_email_idx")),
            (
                VOTES,
                "user_id,game_id",
                unique_index(doc! {"user_id": 1, "game_id": 1}, "vote_pair_idx"),
            ),
            (VOTES, "game_id", plain_index(doc! {"game_id": 1}, "vote_game_idx")),
            (
                SESSIONS,
                "expires_at",
                plain_index(doc! {"expires_at": 1}, "session_expiry_idx"),
            ),
        ];

        for (collection, index, model) in indexes {
            database
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index,
                    source,
                })?;
        }
        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn games(&self) -> Collection<MongoGameDocument> {
        self.database().await.collection(GAMES)
    }

    async fn users(&self) -> Collection<MongoUserDocument> {
        self.database().await.collection(USERS)
    }

    async fn sessions(&self) -> Collection<MongoSessionDocument> {
        self.database().await.collection(SESSIONS)
    }

    async fn votes(&self) -> Collection<MongoVoteDocument> {
        self.database().await.collection(VOTES)
    }

    /// Atomically allocate the next value of a named id sequence.
    async fn next_id(&self, name: &'static str) -> MongoResult<i64> {
        let counters = self.database().await.collection::<Document>(COUNTERS);
        let counter = counters
            .find_one_and_update(doc! {"_id": name}, doc! {"$inc": {"seq": 1_i64}})
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(MongoDaoError::operation(COUNTERS, "allocate id", "_id"))?
            .ok_or(MongoDaoError::Counter { name })?;
        counter
            .get_i64("seq")
            .map_err(|_| MongoDaoError::Counter { name })
    }

    async fn query_games(&self, query: GameQuery) -> MongoResult<Vec<GameEntity>> {
        let documents: Vec<MongoGameDocument> = self
            .games()
            .await
            .find(filter_document(&query))
            .sort(sort_document(query.sort()))
            .limit(query.limit() as i64)
            .await
            .map_err(MongoDaoError::operation(GAMES, "query games", "-"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::operation(GAMES, "query games", "-"))?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn count_games(&self) -> MongoResult<u64> {
        self.games()
            .await
            .count_documents(doc! {})
            .await
            .map_err(MongoDaoError::operation(GAMES, "count games", "-"))
    }

    async fn find_game_where(&self, filter: Document) -> MongoResult<Option<GameEntity>> {
        let document = self
            .games()
            .await
            .find_one(filter)
            .await
            .map_err(MongoDaoError::operation(GAMES, "load game", "-"))?;
        Ok(document.map(Into::into))
    }

    /// Insert or overwrite by slug in one server-side write.
    ///
    /// The id is allocated up front and only used when the slug is new.
    async fn upsert_game(&self, fields: GameFields) -> MongoResult<GameEntity> {
        let now = DateTime::from_system_time(SystemTime::now());
        let id = self.next_id(GAMES).await?;
        let games = self.games().await;
        let by_slug = doc! {"slug": fields.slug.as_str()};

        let upserted = games
            .find_one_and_update(by_slug.clone(), game_upsert(&fields, id, now))
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await;
        let document = match upserted {
            Ok(document) => document,
            // Another upsert created the slug between our match and insert.
            Err(err) if is_duplicate_key(&err) => games
                .find_one_and_update(by_slug, game_fields_update(&fields, now))
                .return_document(ReturnDocument::After)
                .await
                .map_err(MongoDaoError::operation(GAMES, "update game", "slug"))?,
            Err(err) => return Err(MongoDaoError::operation(GAMES, "upsert game", "slug")(err)),
        };

        document
            .map(Into::into)
            .ok_or(MongoDaoError::MissingUpsert { collection: GAMES })
    }

    async fn update_game(&self, id: GameId, fields: GameFields) -> MongoResult<Option<GameEntity>> {
        let now = DateTime::from_system_time(SystemTime::now());
        let document = self
            .games()
            .await
            .find_one_and_update(doc_id(id), game_fields_update(&fields, now))
            .return_document(ReturnDocument::After)
            .await
            .map_err(MongoDaoError::operation(GAMES, "update game", "slug"))?;
        Ok(document.map(Into::into))
    }

    async fn delete_game(&self, id: GameId) -> MongoResult<bool> {
        let result = self
            .games()
            .await
            .delete_one(doc_id(id))
            .await
            .map_err(MongoDaoError::operation(GAMES, "delete game", "-"))?;
        self.votes()
            .await
            .delete_many(doc! {"game_id": id})
            .await
            .map_err(MongoDaoError::operation(VOTES, "delete game votes", "-"))?;
        Ok(result.deleted_count > 0)
    }

    async fn clear_game_image(&self, id: GameId) -> MongoResult<bool> {
        let now = DateTime::from_system_time(SystemTime::now());
        let result = self
            .games()
            .await
            .update_one(
                doc_id(id),
                doc! {"$set": {"image_url": mongodb::bson::Bson::Null, "updated_at": now}},
            )
            .await
            .map_err(MongoDaoError::operation(GAMES, "clear image url", "-"))?;
        Ok(result.matched_count > 0)
    }

    async fn top_voted_games(&self, limit: usize) -> MongoResult<Vec<GameEntity>> {
        let documents: Vec<MongoGameDocument> = self
            .games()
            .await
            .find(doc! {})
            .sort(doc! {"vote_count": -1, "title": 1, "_id": 1})
            .limit(limit as i64)
            .await
            .map_err(MongoDaoError::operation(GAMES, "rank games", "-"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::operation(GAMES, "rank games", "-"))?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn find_vote(&self, user_id: UserId, game_id: GameId) -> MongoResult<Option<VoteEntity>> {
        let document = self
            .votes()
            .await
            .find_one(vote_key(user_id, game_id))
            .await
            .map_err(MongoDaoError::operation(VOTES, "load vote", "-"))?;
        Ok(document.map(Into::into))
    }

    async fn insert_vote(&self, vote: VoteEntity) -> MongoResult<()> {
        let document: MongoVoteDocument = vote.into();
        self.votes()
            .await
            .insert_one(&document)
            .await
            .map_err(MongoDaoError::operation(VOTES, "insert vote", "user_id_game_id"))?;
        Ok(())
    }

    async fn delete_vote(&self, user_id: UserId, game_id: GameId) -> MongoResult<bool> {
        let result = self
            .votes()
            .await
            .delete_one(vote_key(user_id, game_id))
            .await
            .map_err(MongoDaoError::operation(VOTES, "delete vote", "-"))?;
        Ok(result.deleted_count > 0)
    }

    async fn recount_votes(&self, game_id: GameId) -> MongoResult<u64> {
        let count = self
            .votes()
            .await
            .count_documents(doc! {"game_id": game_id})
            .await
            .map_err(MongoDaoError::operation(VOTES, "count votes", "-"))?;
        self.games()
            .await
            .update_one(
                doc_id(game_id),
                doc! {"$set": {"vote_count": clamp_i64(count)}},
            )
            .await
            .map_err(MongoDaoError::operation(GAMES, "store vote count", "-"))?;
        Ok(count)
    }

    async fn voting_stats(&self) -> MongoResult<VotingStatsEntity> {
        let votes = self.votes().await;
        let total_votes = votes
            .count_documents(doc! {})
            .await
            .map_err(MongoDaoError::operation(VOTES, "count votes", "-"))?;
        let games_with_votes = votes
            .distinct("game_id", doc! {})
            .await
            .map_err(MongoDaoError::operation(VOTES, "collect voted games", "-"))?
            .len() as u64;
        let users_who_voted = votes
            .distinct("user_id", doc! {})
            .await
            .map_err(MongoDaoError::operation(VOTES, "collect voters", "-"))?
            .len() as u64;
        let most_voted = self
            .games()
            .await
            .find_one(doc! {"vote_count": {"$gt": 0_i64}})
            .sort(doc! {"vote_count": -1, "title": 1})
            .await
            .map_err(MongoDaoError::operation(GAMES, "find most voted game", "-"))?
            .map(GameEntity::from)
            .map(|game| (game.title, game.vote_count));

        Ok(VotingStatsEntity {
            total_votes,
            games_with_votes,
            users_who_voted,
            most_voted,
        })
    }

    async fn find_user_where(&self, filter: Document) -> MongoResult<Option<UserEntity>> {
        let document = self
            .users()
            .await
            .find_one(filter)
            .await
            .map_err(MongoDaoError::operation(USERS, "load user", "-"))?;
        Ok(document.map(Into::into))
    }

    async fn count_users_where(&self, filter: Document) -> MongoResult<u64> {
        self.users()
            .await
            .count_documents(filter)
            .await
            .map_err(MongoDaoError::operation(USERS, "count users", "-"))
    }

    /// The counter hands out 1 exactly once, so only one signup can claim the admin role.
    async fn insert_user(&self, user: NewUserEntity) -> MongoResult<UserEntity> {
        let id = self.next_id(USERS).await?;
        let role = if id == 1 {
            UserRole::Admin
        } else {
            UserRole::Member
        };
        let now = SystemTime::now();
        let entity = UserEntity {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            role,
            active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        let document: MongoUserDocument = entity.clone().into();
        self.users()
            .await
            .insert_one(&document)
            .await
            .map_err(MongoDaoError::operation(USERS, "insert user", "username_or_email"))?;
        Ok(entity)
    }

    async fn record_login(&self, id: UserId, at: SystemTime) -> MongoResult<()> {
        let at = DateTime::from_system_time(at);
        self.users()
            .await
            .update_one(doc_id(id), doc! {"$set": {"last_login": at, "updated_at": at}})
            .await
            .map_err(MongoDaoError::operation(USERS, "record login", "-"))?;
        Ok(())
    }

    async fn update_user_email(&self, id: UserId, email: String) -> MongoResult<bool> {
        let now = DateTime::from_system_time(SystemTime::now());
        let result = self
            .users()
            .await
            .update_one(doc_id(id), doc! {"$set": {"email": email, "updated_at": now}})
            .await
            .map_err(MongoDaoError::operation(USERS, "update email", "email"))?;
        Ok(result.matched_count > 0)
    }

    async fn delete_user(&self, id: UserId) -> MongoResult<bool> {
        let Some(target) = self.find_user_where(doc_id(id)).await? else {
            return Ok(false);
        };
        if target.is_active_admin() {
            let other_admins = doc! {"role": "admin", "active": true, "_id": {"$ne": id}};
            if self.count_users_where(other_admins).await? == 0 {
                return Err(MongoDaoError::LastAdmin { collection: USERS });
            }
        }

        let result = self
            .users()
            .await
            .delete_one(doc_id(id))
            .await
            .map_err(MongoDaoError::operation(USERS, "delete user", "-"))?;
        if result.deleted_count == 0 {
            return Ok(false);
        }

        self.sessions()
            .await
            .delete_many(doc! {"user_id": id})
            .await
            .map_err(MongoDaoError::operation(SESSIONS, "delete user sessions", "-"))?;

        let votes = self.votes().await;
        let voted = votes
            .distinct("game_id", doc! {"user_id": id})
            .await
            .map_err(MongoDaoError::operation(VOTES, "collect user votes", "-"))?;
        votes
            .delete_many(doc! {"user_id": id})
            .await
            .map_err(MongoDaoError::operation(VOTES, "delete user votes", "-"))?;
        for game_id in voted.iter().filter_map(|value| value.as_i64()) {
            self.recount_votes(game_id).await?;
        }
        Ok(true)
    }

    async fn insert_session(&self, session: SessionEntity) -> MongoResult<()> {
        let document: MongoSessionDocument = session.into();
        self.sessions()
            .await
            .insert_one(&document)
            .await
            .map_err(MongoDaoError::operation(SESSIONS, "insert session", "token_hash"))?;
        Ok(())
    }

    async fn find_session(&self, token_hash: String) -> MongoResult<Option<SessionEntity>> {
        let document = self
            .sessions()
            .await
            .find_one(doc! {"_id": token_hash})
            .await
            .map_err(MongoDaoError::operation(SESSIONS, "load session", "-"))?;
        Ok(document.map(Into::into))
    }

    async fn delete_session(&self, token_hash: String) -> MongoResult<bool> {
        let result = self
            .sessions()
            .await
            .delete_one(doc! {"_id": token_hash})
            .await
            .map_err(MongoDaoError::operation(SESSIONS, "delete session", "-"))?;
        Ok(result.deleted_count > 0)
    }

    async fn delete_expired_sessions(&self, now: SystemTime) -> MongoResult<u64> {
        let result = self
            .sessions()
            .await
            .delete_many(doc! {"expires_at": {"$lte": DateTime::from_system_time(now)}})
            .await
            .map_err(MongoDaoError::operation(SESSIONS, "sweep sessions", "-"))?;
        Ok(result.deleted_count)
    }
}

impl CatalogStore for MongoCatalogStore {
    fn query_games(&self, query: GameQuery) -> BoxFuture<'static, StorageResult<Vec<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.query_games(query).await.map_err(Into::into) })
    }

    fn count_games(&self) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.count_games().await.map_err(Into::into) })
    }

    fn find_game(&self, id: GameId) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_game_where(doc_id(id)).await.map_err(Into::into) })
    }

    fn find_game_by_slug(
        &self,
        slug: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_game_where(doc! {"slug": slug})
                .await
                .map_err(Into::into)
        })
    }

    fn upsert_game(&self, fields: GameFields) -> BoxFuture<'static, StorageResult<GameEntity>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_game(fields).await.map_err(Into::into) })
    }

    fn update_game(
        &self,
        id: GameId,
        fields: GameFields,
    ) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.update_game(id, fields).await.map_err(Into::into) })
    }

    fn delete_game(&self, id: GameId) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_game(id).await.map_err(Into::into) })
    }

    fn clear_game_image(&self, id: GameId) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.clear_game_image(id).await.map_err(Into::into) })
    }

    fn top_voted_games(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.top_voted_games(limit).await.map_err(Into::into) })
    }

    fn find_vote(
        &self,
        user_id: UserId,
        game_id: GameId,
    ) -> BoxFuture<'static, StorageResult<Option<VoteEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_vote(user_id, game_id).await.map_err(Into::into) })
    }

    fn insert_vote(&self, vote: VoteEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_vote(vote).await.map_err(Into::into) })
    }

    fn delete_vote(
        &self,
        user_id: UserId,
        game_id: GameId,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_vote(user_id, game_id).await.map_err(Into::into) })
    }

    fn recount_votes(&self, game_id: GameId) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.recount_votes(game_id).await.map_err(Into::into) })
    }

    fn voting_stats(&self) -> BoxFuture<'static, StorageResult<VotingStatsEntity>> {
        let store = self.clone();
        Box::pin(async move { store.voting_stats().await.map_err(Into::into) })
    }

    fn count_users(&self) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.count_users_where(doc! {}).await.map_err(Into::into) })
    }

    fn find_user(&self, id: UserId) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_user_where(doc_id(id)).await.map_err(Into::into) })
    }

    fn find_user_by_username(
        &self,
        username: String,
    ) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_user_where(doc! {"username": username})
                .await
                .map_err(Into::into)
        })
    }

    fn identity_taken(
        &self,
        username: String,
        email: String,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let filter = doc! {"$or": [{"username": username}, {"email": email}]};
            let count = store.count_users_where(filter).await?;
            Ok(count > 0)
        })
    }

    fn email_taken(
        &self,
        email: String,
        exclude: UserId,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let filter = doc! {"email": email, "_id": {"$ne": exclude}};
            let count = store.count_users_where(filter).await?;
            Ok(count > 0)
        })
    }

    fn insert_user(&self, user: NewUserEntity) -> BoxFuture<'static, StorageResult<UserEntity>> {
        let store = self.clone();
        Box::pin(async move { store.insert_user(user).await.map_err(Into::into) })
    }

    fn record_login(&self, id: UserId, at: SystemTime) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.record_login(id, at).await.map_err(Into::into) })
    }

    fn update_user_email(
        &self,
        id: UserId,
        email: String,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.update_user_email(id, email).await.map_err(Into::into) })
    }

    fn delete_user(&self, id: UserId) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_user(id).await.map_err(Into::into) })
    }

    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_session(session).await.map_err(Into::into) })
    }

    fn find_session(
        &self,
        token_hash: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_session(token_hash).await.map_err(Into::into) })
    }

    fn delete_session(&self, token_hash: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_session(token_hash).await.map_err(Into::into) })
    }

    fn delete_expired_sessions(&self, now: SystemTime) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.delete_expired_sessions(now).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
