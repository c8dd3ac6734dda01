use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};

use crate::dao::models::{
    GameEntity, GameFields, GameId, SessionEntity, UserEntity, UserId, UserRole, VoteEntity,
    VoteKind,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoGameDocument {
    #[serde(rename = "_id")]
    id: GameId,
    slug: String,
    title: String,
    genre: String,
    subgenre: Option<String>,
    release_year: i32,
    player_limit: i64,
    same_pc_limit: i64,
    online: bool,
    offline: bool,
    price: Option<String>,
    price_url: Option<String>,
    image_url: Option<String>,
    system_requirements: Option<String>,
    #[serde(default)]
    vote_count: i64,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<MongoGameDocument> for GameEntity {
    fn from(value: MongoGameDocument) -> Self {
        Self {
            id: value.id,
            slug: value.slug,
            title: value.title,
            genre: value.genre,
            subgenre: value.subgenre,
            release_year: value.release_year,
            player_limit: clamp_u32(value.player_limit),
            same_pc_limit: clamp_u32(value.same_pc_limit),
            online: value.online,
            offline: value.offline,
            price: value.price,
            price_url: value.price_url,
            image_url: value.image_url,
            system_requirements: value.system_requirements,
            vote_count: u64::try_from(value.vote_count).unwrap_or(0),
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

/// `$set` payload overwriting every editable attribute of a game.
pub fn game_fields_update(fields: &GameFields, now: DateTime) -> Document {
    doc! {
        "$set": {
            "slug": fields.slug.as_str(),
            "title": fields.title.as_str(),
            "genre": fields.genre.as_str(),
            "subgenre": fields.subgenre.as_deref(),
            "release_year": fields.release_year,
            "player_limit": i64::from(fields.player_limit),
            "same_pc_limit": i64::from(fields.same_pc_limit),
            "online": fields.online,
            "offline": fields.offline,
            "price": fields.price.as_deref(),
            "price_url": fields.price_url.as_deref(),
            "image_url": fields.image_url.as_deref(),
            "system_requirements": fields.system_requirements.as_deref(),
            "updated_at": now,
        }
    }
}

/// Upsert payload keyed by slug: editable attributes always, identity and counters only
/// when the record is created.
pub fn game_upsert(fields: &GameFields, id: GameId, now: DateTime) -> Document {
    let mut update = game_fields_update(fields, now);
    update.insert(
        "$setOnInsert",
        doc! {
            "_id": id,
            "vote_count": 0_i64,
            "created_at": now,
        },
    );
    update
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoUserDocument {
    #[serde(rename = "_id")]
    id: UserId,
    username: String,
    email: String,
    password_hash: String,
    #[serde(default)]
    role: UserRole,
    active: bool,
    last_login: Option<DateTime>,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<UserEntity> for MongoUserDocument {
    fn from(value: UserEntity) -> Self {
        Self {
            id: value.id,
            username: value.username,
            email: value.email,
            password_hash: value.password_hash,
            role: value.role,
            active: value.active,
            last_login: value.last_login.map(DateTime::from_system_time),
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoUserDocument> for UserEntity {
    fn from(value: MongoUserDocument) -> Self {
        Self {
            id: value.id,
            username: value.username,
            email: value.email,
            password_hash: value.password_hash,
            role: value.role,
            active: value.active,
            last_login: value.last_login.map(DateTime::to_system_time),
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    /// SHA-256 digest of the bearer token.
    #[serde(rename = "_id")]
    token_hash: String,
    user_id: UserId,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime,
    expires_at: DateTime,
}

impl From<SessionEntity> for MongoSessionDocument {
    fn from(value: SessionEntity) -> Self {
        Self {
            token_hash: value.token_hash,
            user_id: value.user_id,
            ip_address: value.ip_address,
            user_agent: value.user_agent,
            created_at: DateTime::from_system_time(value.created_at),
            expires_at: DateTime::from_system_time(value.expires_at),
        }
    }
}

impl From<MongoSessionDocument> for SessionEntity {
    fn from(value: MongoSessionDocument) -> Self {
        Self {
            token_hash: value.token_hash,
            user_id: value.user_id,
            ip_address: value.ip_address,
            user_agent: value.user_agent,
            created_at: value.created_at.to_system_time(),
            expires_at: value.expires_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoVoteDocument {
    user_id: UserId,
    game_id: GameId,
    #[serde(default)]
    kind: VoteKind,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<VoteEntity> for MongoVoteDocument {
    fn from(value: VoteEntity) -> Self {
        Self {
            user_id: value.user_id,
            game_id: value.game_id,
            kind: value.kind,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoVoteDocument> for VoteEntity {
    fn from(value: MongoVoteDocument) -> Self {
        Self {
            user_id: value.user_id,
            game_id: value.game_id,
            kind: value.kind,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

pub fn doc_id(id: i64) -> Document {
    doc! {"_id": id}
}

pub fn vote_key(user_id: UserId, game_id: GameId) -> Document {
    doc! {"user_id": user_id, "game_id": game_id}
}

pub fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn clamp_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> GameFields {
        GameFields {
            slug: "awesomenauts".into(),
            title: "Awesomenauts".into(),
            genre: "Platformer".into(),
            subgenre: None,
            release_year: 2012,
            player_limit: 6,
            same_pc_limit: 3,
            online: true,
            offline: false,
            price: None,
            price_url: None,
            image_url: None,
            system_requirements: None,
        }
    }

    #[test]
    fn upsert_only_sets_identity_on_insert() {
        let now = DateTime::from_millis(0);
        let update = game_upsert(&fields(), 7, now);

        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("slug").unwrap(), "awesomenauts");
        assert!(!set.contains_key("_id"));
        assert!(!set.contains_key("vote_count"));

        let on_insert = update.get_document("$setOnInsert").unwrap();
        assert_eq!(on_insert.get_i64("_id").unwrap(), 7);
        assert_eq!(on_insert.get_i64("vote_count").unwrap(), 0);
        assert!(!on_insert.contains_key("slug"));
    }
}
