use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// Trait for database entity types
///
/// This trait defines the requirements for records that can be stored
/// in any of the document stores. Every record carries an optional
/// string identifier that the store assigns on insert.
pub trait Entity: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + Unpin + 'static {
    /// Name of the collection (and backing file) holding this entity
    const COLLECTION: &'static str;

    /// Get the unique identifier, if one has been assigned
    fn id(&self) -> Option<&str>;

    /// Assign the unique identifier
    fn set_id(&mut self, id: String);

    /// Identifier of the owning user, for user-scoped records
    fn owner_id(&self) -> Option<&str> {
        None
    }

    /// Email address, for records looked up by email
    fn email(&self) -> Option<&str> {
        None
    }

    /// Lifecycle status, for records that carry one
    fn status(&self) -> Option<&str> {
        None
    }
}

/// Equality filter understood by every store
///
/// Each populated field must match exactly. An empty query matches
/// every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub id: Option<String>,
    pub email: Option<String>,
    pub user_id: Option<String>,
    pub status: Option<String>,
}

impl Query {
    /// Match all records
    pub fn all() -> Self {
        Self::default()
    }

    /// Match the record with the given id
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Match the record with the given email
    pub fn by_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Self::default()
        }
    }

    /// Match every record owned by the given user
    pub fn by_owner(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// Restrict the query to the given owner
    pub fn owned_by(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Restrict the query to records in the given status
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.email.is_none() && self.user_id.is_none() && self.status.is_none()
    }

    /// Evaluate the query against an in-memory record
    pub fn matches<T: Entity>(&self, entity: &T) -> bool {
        fn field_matches(wanted: &Option<String>, actual: Option<&str>) -> bool {
            match wanted {
                Some(wanted) => actual == Some(wanted.as_str()),
                None => true,
            }
        }

        field_matches(&self.id, entity.id())
            && field_matches(&self.email, entity.email())
            && field_matches(&self.user_id, entity.owner_id())
            && field_matches(&self.status, entity.status())
    }
}
