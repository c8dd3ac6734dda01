//! Insert the sample catalog into the configured store.

use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_game_list::{
    config::{AppConfig, StoreBackend},
    dao::{
        catalog_store::{CatalogStore, memory::MemoryCatalogStore},
        models::GameFields,
    },
    services::game_service,
    state::AppState,
};

fn sample_games() -> Vec<GameFields> {
    let game = |slug: &str, title: &str, limits: (u32, u32), genre: &str, subgenre: &str, year| {
        GameFields {
            slug: slug.into(),
            title: title.into(),
            genre: genre.into(),
            subgenre: Some(subgenre.into()),
            release_year: year,
            player_limit: limits.0,
            same_pc_limit: limits.1,
            online: false,
            offline: false,
            price: None,
            price_url: None,
            image_url: None,
            system_requirements: None,
        }
    };

    vec![
        GameFields {
            online: true,
            price: Some("€ 62.95".into()),
            price_url: Some("http://www.gamesrocket.de/download/DOOM.html?ref=986".into()),
            image_url: Some(
                "http://www.gamesrocket.de/images/product_images/49349/images/covers/DOOM_big.jpg"
                    .into(),
            ),
            ..game("doom-2016", "Doom (2016)", (12, 1), "FPS", "Action", 2016)
        },
        GameFields {
            online: true,
            offline: true,
            price: Some("Free".into()),
            price_url: Some("https://minecraft.net".into()),
            system_requirements: Some("System requirements available on PCGamingWiki".into()),
            ..game("minecraft", "Minecraft", (8, 1), "Open world", "Sandbox", 2011)
        },
        GameFields {
            offline: true,
            ..game(
                "atomic-bomberman",
                "Atomic Bomberman",
                (10, 10),
                "Action",
                "Bomberman",
                1997,
            )
        },
        GameFields {
            online: true,
            ..game("awesomenauts", "Awesomenauts", (6, 3), "Platformer", "MOBA", 2012)
        },
    ]
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn CatalogStore>> {
    match config.store {
        StoreBackend::Memory => {
            warn!("seeding the in-memory store; nothing will be kept");
            Ok(Arc::new(MemoryCatalogStore::new()))
        }
        #[cfg(feature = "mongo-store")]
        StoreBackend::Mongo => {
            use lan_game_list::dao::catalog_store::mongodb::{MongoCatalogStore, MongoConfig};

            let mongo = MongoConfig::from_uri(&config.mongo_uri, Some(&config.mongo_db))
                .await
                .context("parsing MongoDB URI")?;
            let store = MongoCatalogStore::connect(mongo)
                .await
                .context("connecting to MongoDB")?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "mongo-store"))]
        StoreBackend::Mongo => bail!("built without the `mongo-store` feature"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load();
    let store = open_store(&config).await?;
    let state = AppState::with_store(config, store).await;

    let mut failed = 0;
    for fields in sample_games() {
        let title = fields.title.clone();
        match game_service::insert_game(&state, fields).await {
            Ok(game) => info!(game_id = game.id, %title, "sample game inserted"),
            Err(err) => {
                warn!(%title, error = %err, "sample game rejected");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} sample games could not be inserted");
    }
    info!("sample games inserted");
    Ok(())
}
