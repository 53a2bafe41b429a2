//! Database module for the farming advice service
//!
//! This module implements the stores behind users, recommendations and
//! growing activities: a MongoDB-backed primary store, and an in-memory
//! plus file-backed fallback used when MongoDB cannot be reached.

mod accessors;
mod collection;
pub mod entities;
mod error;
mod manager;
mod memory_db;
mod models;
mod mongo_db;
mod record_store;

pub use collection::{generate_id, DocumentCollection, Mutation};
pub use error::{DatabaseError, DbResult};
pub use manager::{DatabaseManager, StoreBackend};
pub use memory_db::MemoryCollection;
pub use models::{Entity, Query};
pub use mongo_db::{MongoCollection, MongoDb};
pub use record_store::RecordStore;
