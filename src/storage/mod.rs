//! Storage implementations for different backends

pub mod in_memory;
pub mod matcher;
#[cfg(feature = "mongodb_backend")]
pub mod mongodb;

pub use in_memory::InMemoryStore;
#[cfg(feature = "mongodb_backend")]
pub use mongodb::{MongoOptions, MongoStore, Relation, connect};
