use std::time::Duration;

use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Server error code reported when a unique index rejects a write.
const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB did not answer the initial ping")]
    InitialPing {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping timed out after {timeout:?}")]
    PingTimeout { timeout: Duration },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("unique index `{index}` rejected a write to `{collection}`")]
    Duplicate {
        collection: &'static str,
        index: &'static str,
    },
    #[error("failed to {operation} in collection `{collection}`")]
    Operation {
        collection: &'static str,
        operation: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("id counter `{name}` returned no sequence value")]
    Counter { name: &'static str },
    #[error("refusing to delete the last administrator in `{collection}`")]
    LastAdmin { collection: &'static str },
    #[error("upsert into `{collection}` returned no document")]
    MissingUpsert { collection: &'static str },
}

impl MongoDaoError {
    /// Map a driver error raised while running `operation` on `collection`.
    ///
    /// Duplicate-key rejections become [`MongoDaoError::Duplicate`] naming `index`.
    pub fn operation(
        collection: &'static str,
        operation: &'static str,
        index: &'static str,
    ) -> impl FnOnce(MongoError) -> Self {
        move |source| {
            if is_duplicate_key(&source) {
                MongoDaoError::Duplicate { collection, index }
            } else {
                MongoDaoError::Operation {
                    collection,
                    operation,
                    source,
                }
            }
        }
    }
}

pub(super) fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write)) => write.code == DUPLICATE_KEY_CODE,
        ErrorKind::Command(command) => command.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}
