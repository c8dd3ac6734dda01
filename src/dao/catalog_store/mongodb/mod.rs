mod config;
mod connection;
mod error;
mod models;
mod query;
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoCatalogStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::Duplicate { collection, index } => {
                StorageError::conflict(format!("{collection}.{index}"))
            }
            MongoDaoError::LastAdmin { collection } => {
                StorageError::conflict(format!("{collection}.last_admin"))
            }
            err => StorageError::unavailable(err.to_string(), err),
        }
    }
}
