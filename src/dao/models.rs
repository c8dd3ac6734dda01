use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Store-assigned identifier of a game record.
pub type GameId = i64;
/// Store-assigned identifier of a user record.
pub type UserId = i64;

/// Game record persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameEntity {
    /// Primary key, immutable once assigned.
    pub id: GameId,
    /// Unique URL-safe identifier.
    pub slug: String,
    pub title: String,
    pub genre: String,
    pub subgenre: Option<String>,
    pub release_year: i32,
    /// Maximum number of participants in one match.
    pub player_limit: u32,
    /// Maximum number of players sharing one physical machine.
    pub same_pc_limit: u32,
    pub online: bool,
    /// Offline / LAN capable.
    pub offline: bool,
    /// Free-form price ("Free", "€ 62.95", ...).
    pub price: Option<String>,
    pub price_url: Option<String>,
    /// Remote cover image; cleared once a local copy is stored.
    pub image_url: Option<String>,
    pub system_requirements: Option<String>,
    /// Denormalized count of votes, recomputed on every vote mutation.
    pub vote_count: u64,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl GameEntity {
    /// Build a fresh entity from validated fields.
    pub fn from_fields(id: GameId, fields: GameFields, now: SystemTime) -> Self {
        Self {
            id,
            slug: fields.slug,
            title: fields.title,
            genre: fields.genre,
            subgenre: fields.subgenre,
            release_year: fields.release_year,
            player_limit: fields.player_limit,
            same_pc_limit: fields.same_pc_limit,
            online: fields.online,
            offline: fields.offline,
            price: fields.price,
            price_url: fields.price_url,
            image_url: fields.image_url,
            system_requirements: fields.system_requirements,
            vote_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite every editable attribute, keeping identity, votes and creation time.
    pub fn apply_fields(&mut self, fields: GameFields, now: SystemTime) {
        self.slug = fields.slug;
        self.title = fields.title;
        self.genre = fields.genre;
        self.subgenre = fields.subgenre;
        self.release_year = fields.release_year;
        self.player_limit = fields.player_limit;
        self.same_pc_limit = fields.same_pc_limit;
        self.online = fields.online;
        self.offline = fields.offline;
        self.price = fields.price;
        self.price_url = fields.price_url;
        self.image_url = fields.image_url;
        self.system_requirements = fields.system_requirements;
        self.updated_at = now;
    }
}

/// Editable attributes of a game, as written by inserts and updates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameFields {
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
}

/// Authorization role carried by every user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    Member,
    Admin,
}

/// User record persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserEntity {
    pub id: UserId,
    pub username: String,
    pub email: String,
    /// PHC-formatted argon2id hash. Never leaves the service layer.
    pub password_hash: String,
    pub role: UserRole,
    pub active: bool,
    pub last_login: Option<SystemTime>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl UserEntity {
    pub fn is_active_admin(&self) -> bool {
        self.active && self.role == UserRole::Admin
    }
}

/// Data needed to create a user; the store assigns the id, role and timestamps.
///
/// The first account written to an empty store becomes the administrator.
#[derive(Debug, Clone)]
pub struct NewUserEntity {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Server-side session row. Only the SHA-256 digest of the token is stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    pub token_hash: String,
    pub user_id: UserId,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: SystemTime,
    /// Absolute expiry, fixed at issuance.
    pub expires_at: SystemTime,
}

/// Kind of vote a user can cast. Only one exists today.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum VoteKind {
    #[default]
    ThumbsUp,
}

/// One user's vote on one game. At most one exists per (user, game) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteEntity {
    pub user_id: UserId,
    pub game_id: GameId,
    pub kind: VoteKind,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Aggregate figures over the vote relation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VotingStatsEntity {
    pub total_votes: u64,
    pub games_with_votes: u64,
    pub users_who_voted: u64,
    /// Title and vote count of the most voted game, if any game has votes.
    pub most_voted: Option<(String, u64)>,
}
