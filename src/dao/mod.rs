/// Database model definitions.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
/// Party and vote storage backends.
pub mod vote_store;
