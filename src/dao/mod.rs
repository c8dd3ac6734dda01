/// Persistence backends for games, accounts, sessions and votes.
pub mod catalog_store;
/// Database model definitions.
pub mod models;
/// Typed listing query shared by every backend.
pub mod query;
/// Storage abstraction layer for database operations.
pub mod storage;
