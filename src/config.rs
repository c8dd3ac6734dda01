//! Application-level configuration loading: JSON file first, then environment overrides.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationSeconds, serde_as};
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "LAN_GAME_LIST_CONFIG_PATH";

/// Persistence backend selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Mongo,
    Memory,
}

impl StoreBackend {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Some(StoreBackend::Mongo),
            "memory" => Some(StoreBackend::Memory),
            _ => None,
        }
    }
}

/// Twitch application credentials used by the IGDB metadata client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IgdbCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Immutable runtime configuration shared across the application.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub port: u16,
    pub store: StoreBackend,
    pub mongo_uri: String,
    pub mongo_db: String,
    /// Lifetime of cached listing results.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "cache_ttl_secs")]
    pub cache_ttl: Duration,
    /// Absolute lifetime of a session, fixed at issuance.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "session_ttl_secs")]
    pub session_ttl: Duration,
    /// Max-age of the remember-me cookie.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "remember_me_secs")]
    pub remember_me: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "session_sweep_interval_secs")]
    pub session_sweep_interval: Duration,
    /// Directory holding locally stored cover images.
    pub image_dir: PathBuf,
    pub igdb: Option<IgdbCredentials>,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "metadata_cache_ttl_secs")]
    pub metadata_cache_ttl: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            store: StoreBackend::Mongo,
            mongo_uri: "mongodb://localhost:27017".into(),
            mongo_db: "lan_game_list".into(),
            cache_ttl: Duration::from_secs(300),
            session_ttl: Duration::from_secs(24 * 60 * 60),
            remember_me: Duration::from_secs(30 * 24 * 60 * 60),
            session_sweep_interval: Duration::from_secs(60 * 60),
            image_dir: PathBuf::from("img"),
            igdb: None,
            metadata_cache_ttl: Duration::from_secs(60 * 60),
        }
    }
}

impl AppConfig {
    /// Load the configuration file (falling back to defaults) and apply environment overrides.
    pub fn load() -> Self {
        let mut config = Self::from_file();
        config.apply_overrides(|key| env::var(key).ok());
        config
    }

    fn from_file() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded configuration file");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Override individual fields from `lookup` (the process environment in production).
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(raw) = lookup("PORT").or_else(|| lookup("SERVER_PORT")) {
            match raw.trim().parse() {
                Ok(port) => self.port = port,
                Err(_) => warn!(value = %raw, "ignoring invalid port override"),
            }
        }
        if let Some(raw) = lookup("STORE_BACKEND") {
            match StoreBackend::parse(&raw) {
                Some(store) => self.store = store,
                None => warn!(value = %raw, "ignoring unknown STORE_BACKEND"),
            }
        }
        if let Some(uri) = lookup("MONGO_URI") {
            self.mongo_uri = uri;
        }
        if let Some(db) = lookup("MONGO_DB") {
            self.mongo_db = db;
        }
        for (key, target) in [
            ("CACHE_TTL_SECS", &mut self.cache_ttl),
            ("SESSION_TTL_SECS", &mut self.session_ttl),
            ("REMEMBER_ME_SECS", &mut self.remember_me),
        ] {
            if let Some(raw) = lookup(key) {
                match raw.trim().parse::<u64>() {
                    Ok(secs) => *target = Duration::from_secs(secs),
                    Err(_) => warn!(key, value = %raw, "ignoring invalid duration override"),
                }
            }
        }
        if let Some(dir) = lookup("IMAGE_DIR") {
            self.image_dir = PathBuf::from(dir);
        }
        if let (Some(client_id), Some(client_secret)) =
            (lookup("IGDB_CLIENT_ID"), lookup("IGDB_CLIENT_SECRET"))
        {
            self.igdb = Some(IgdbCredentials {
                client_id,
                client_secret,
            });
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
