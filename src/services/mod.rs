/// Accounts, credentials and sessions.
pub mod auth_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Game inserts, updates, deletes and bulk import.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Local cover image storage.
pub mod image_service;
/// IGDB metadata lookup.
pub mod metadata_service;
/// Cached, fail-soft catalog reads.
pub mod query_service;
/// Storage connection supervisor with reconnect backoff.
pub mod storage_supervisor;
/// Toggleable votes.
pub mod vote_service;

#[cfg(test)]
pub(crate) mod test_support {
    use std::{sync::Arc, time::SystemTime};

    use crate::{
        config::AppConfig,
        dao::{
            catalog_store::{CatalogStore, memory::MemoryCatalogStore},
            models::{GameEntity, GameFields, GameId, UserEntity, UserId, UserRole},
        },
        state::{AppState, SharedState},
    };

    pub async fn state_with(store: Arc<dyn CatalogStore>) -> SharedState {
        AppState::with_store(AppConfig::default(), store).await
    }

    pub async fn memory_state() -> (SharedState, MemoryCatalogStore) {
        let store = MemoryCatalogStore::new();
        let state = state_with(Arc::new(store.clone())).await;
        (state, store)
    }

    pub fn doom_fields() -> GameFields {
        GameFields {
            slug: "doom-2016".into(),
            title: "Doom (2016)".into(),
            genre: "FPS".into(),
            subgenre: None,
            release_year: 2016,
            player_limit: 12,
            same_pc_limit: 1,
            online: true,
            offline: false,
            price: Some("€ 19.99".into()),
            price_url: None,
            image_url: Some("https://images.example.com/doom.jpg".into()),
            system_requirements: None,
        }
    }

    pub fn game_with_id(id: GameId) -> GameEntity {
        GameEntity::from_fields(id, doom_fields(), SystemTime::now())
    }

    pub fn user_with_id(id: UserId) -> UserEntity {
        let now = SystemTime::now();
        UserEntity {
            id,
            username: format!("user{id}"),
            email: format!("user{id}@example.com"),
            password_hash: "$argon2id$placeholder".into(),
            role: UserRole::Member,
            active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }
}
