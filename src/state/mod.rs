use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    cache::QueryCache,
    config::AppConfig,
    dao::catalog_store::CatalogStore,
    error::ServiceError,
    services::{
        image_service::ImageFetcher, metadata_service::IgdbClient, query_service::CachedQuery,
    },
};

pub type SharedState = Arc<AppState>;

/// Central application context: store handle, caches, configuration and outbound clients.
pub struct AppState {
    catalog_store: RwLock<Option<Arc<dyn CatalogStore>>>,
    degraded: watch::Sender<bool>,
    query_cache: QueryCache<CachedQuery>,
    metadata: IgdbClient,
    images: ImageFetcher,
    config: AppConfig,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            catalog_store: RwLock::new(None),
            degraded: degraded_tx,
            query_cache: QueryCache::new(config.cache_ttl),
            metadata: IgdbClient::new(config.igdb.clone(), config.metadata_cache_ttl),
            images: ImageFetcher::new(config.image_dir.clone()),
            config,
        })
    }

    /// Construct a state with `store` already installed (tests and the seeding tool).
    pub async fn with_store(config: AppConfig, store: Arc<dyn CatalogStore>) -> SharedState {
        let state = Self::new(config);
        state.set_catalog_store(store).await;
        state
    }

    /// Obtain a handle to the current catalog store, if one is installed.
    pub async fn catalog_store(&self) -> Option<Arc<dyn CatalogStore>> {
        let guard = self.catalog_store.read().await;
        guard.as_ref().cloned()
    }

    /// Like [`Self::catalog_store`] but fails with [`ServiceError::Degraded`] when none is installed.
    pub async fn require_catalog_store(&self) -> Result<Arc<dyn CatalogStore>, ServiceError> {
        self.catalog_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn set_catalog_store(&self, store: Arc<dyn CatalogStore>) {
        {
            let mut guard = self.catalog_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_catalog_store(&self) {
        {
            let mut guard = self.catalog_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Memoized listing and count results.
    pub fn query_cache(&self) -> &QueryCache<CachedQuery> {
        &self.query_cache
    }

    pub fn metadata(&self) -> &IgdbClient {
        &self.metadata
    }

    pub fn images(&self) -> &ImageFetcher {
        &self.images
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::catalog_store::memory::MemoryCatalogStore;

    #[tokio::test]
    async fn starts_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default());
        assert!(state.is_degraded());
        assert!(matches!(
            state.require_catalog_store().await,
            Err(ServiceError::Degraded)
        ));

        let mut watcher = state.degraded_watcher();
        state
            .set_catalog_store(Arc::new(MemoryCatalogStore::new()))
            .await;
        assert!(!state.is_degraded());
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());

        state.clear_catalog_store().await;
        assert!(state.is_degraded());
        assert!(state.catalog_store().await.is_none());
    }
}
