use uuid::Uuid;

use super::error::DbResult;
use super::models::{Entity, Query};

/// In-place change applied to a single stored record
///
/// Backends may apply it more than once when the record changes under them,
/// so it must only depend on the record it is given.
pub type Mutation<T> = Box<dyn Fn(&mut T) -> DbResult<()> + Send + Sync>;

/// Trait for document collection operations
///
/// Implemented by the primary MongoDB adapter, the in-memory fallback and
/// the file-backed record store, so accessors never need to know which
/// backend is active.
#[async_trait::async_trait]
pub trait DocumentCollection<T: Entity>: Send + Sync {
    /// Collection name
    fn name(&self) -> &str;

    /// Get the first record matching the query
    async fn find_one(&self, query: &Query) -> DbResult<Option<T>>;

    /// Get every record matching the query
    async fn find(&self, query: &Query) -> DbResult<Vec<T>>;

    /// Insert a new record under a freshly generated id and return the id
    async fn insert_one(&self, entity: T) -> DbResult<String>;

    /// Apply `mutation` to the record with the given id and persist the result
    ///
    /// The read-modify-write is atomic with respect to other updates of the
    /// same record.
    async fn update_one(&self, id: &str, mutation: Mutation<T>) -> DbResult<T>;

    /// Delete the first record matching the query, returning the number removed
    async fn delete_one(&self, query: &Query) -> DbResult<u64>;

    /// Declare an index on `field`
    async fn create_index(&self, field: &str, unique: bool) -> DbResult<()>;
}

/// Generate a fresh record id
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
