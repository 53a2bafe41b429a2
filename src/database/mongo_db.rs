use std::time::Duration;

use futures_util::TryStreamExt;
use log::{debug, info};
use mongodb::bson::{doc, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};

use super::collection::{generate_id, DocumentCollection, Mutation};
use super::error::{DatabaseError, DbResult};
use super::models::{Entity, Query};
use crate::core::config::MongoConfig;

/// MongoDB server error code for unique index violations
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Read-modify-write rounds tried before an update gives up on a busy record
const MAX_UPDATE_ATTEMPTS: usize = 5;

/// Connection to the primary document database
pub struct MongoDb {
    /// MongoDB client
    client: Client,

    /// MongoDB database
    database: Database,
}

impl MongoDb {
    /// Connect and verify the server answers a ping
    ///
    /// Exactly one attempt is made. Both the connect and server selection
    /// timeouts come from the configuration, and the whole handshake is
    /// bounded by their sum.
    pub async fn connect(config: &MongoConfig) -> DbResult<Self> {
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        let selection_timeout = Duration::from_secs(config.server_selection_timeout_secs);

        let handshake = async {
            let mut client_options = ClientOptions::parse(config.connection_string.as_str())
                .await
                .map_err(|e| {
                    DatabaseError::ConnectionError(format!(
                        "Failed to parse MongoDB connection string: {}",
                        e
                    ))
                })?;
            client_options.connect_timeout = Some(connect_timeout);
            client_options.server_selection_timeout = Some(selection_timeout);
            client_options.app_name = config.app_name.clone();

            let client = Client::with_options(client_options).map_err(|e| {
                DatabaseError::ConnectionError(format!("Failed to create MongoDB client: {}", e))
            })?;

            client
                .database("admin")
                .run_command(doc! { "ping": 1 })
                .await
                .map_err(|e| DatabaseError::ConnectionError(format!("MongoDB ping failed: {}", e)))?;

            Ok::<_, DatabaseError>(client)
        };

        let client = tokio::time::timeout(connect_timeout + selection_timeout, handshake)
            .await
            .map_err(|_| {
                DatabaseError::ConnectionError(format!(
                    "MongoDB handshake timed out after {:?}",
                    connect_timeout + selection_timeout
                ))
            })??;

        let database = client.database(&config.database);
        info!("Connected to MongoDB database: {}", config.database);

        Ok(Self { client, database })
    }

    /// Get the typed collection for `T`
    pub fn collection<T: Entity>(&self) -> MongoCollection<T> {
        let inner = self.database.collection::<T>(T::COLLECTION);
        MongoCollection {
            name: T::COLLECTION.to_string(),
            raw: inner.clone_with_type::<Document>(),
            inner,
        }
    }

    /// Name of the selected database
    pub fn database_name(&self) -> &str {
        self.database.name()
    }

    /// Names of the collections currently present
    pub async fn collection_names(&self) -> DbResult<Vec<String>> {
        Ok(self.database.list_collection_names().await?)
    }

    /// Insert and remove a throwaway document to prove the connection accepts writes
    pub async fn write_probe(&self) -> DbResult<String> {
        let probe = self.database.collection::<Document>("test_collection");
        let id = generate_id();

        probe
            .insert_one(doc! { "_id": id.as_str(), "test": "data", "timestamp": "probe" })
            .await?;
        probe.delete_one(doc! { "_id": id.as_str() }).await?;

        debug!("Write probe {} inserted and removed", id);
        Ok(id)
    }

    /// Close the client, waiting for in-flight operations
    pub async fn shutdown(self) {
        self.client.shutdown().await;
    }
}

/// A MongoDB collection holding one entity type
pub struct MongoCollection<T: Entity> {
    name: String,
    inner: Collection<T>,

    /// Same collection, untyped, for compare-and-swap filters
    raw: Collection<Document>,
}

/// Translate an equality query into a MongoDB filter document
fn filter_document(query: &Query) -> Document {
    let mut filter = Document::new();
    if let Some(id) = &query.id {
        filter.insert("_id", id.as_str());
    }
    if let Some(email) = &query.email {
        filter.insert("email", email.as_str());
    }
    if let Some(user_id) = &query.user_id {
        filter.insert("user_id", user_id.as_str());
    }
    if let Some(status) = &query.status {
        filter.insert("status", status.as_str());
    }
    filter
}

fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    matches!(
        error.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY_CODE
    )
}

#[async_trait::async_trait]
impl<T: Entity> DocumentCollection<T> for MongoCollection<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_one(&self, query: &Query) -> DbResult<Option<T>> {
        Ok(self.inner.find_one(filter_document(query)).await?)
    }

    async fn find(&self, query: &Query) -> DbResult<Vec<T>> {
        let cursor = self.inner.find(filter_document(query)).await?;
        let records = cursor.try_collect().await?;
        Ok(records)
    }

    async fn insert_one(&self, mut entity: T) -> DbResult<String> {
        // Check if the email is already taken
        if let Some(email) = entity.email() {
            let exists = self.inner.find_one(doc! { "email": email }).await?;
            if exists.is_some() {
                return Err(DatabaseError::DuplicateKey(email.to_string()));
            }
        }

        let id = generate_id();
        entity.set_id(id.clone());

        match self.inner.insert_one(&entity).await {
            Ok(_) => {
                debug!("Inserted record with ID: {} into {}", id, self.name);
                Ok(id)
            }
            Err(e) if is_duplicate_key(&e) => Err(DatabaseError::DuplicateKey(
                entity.email().unwrap_or(id.as_str()).to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Read, mutate and replace the record, retrying if it changed in between
    ///
    /// The replacement only matches the document exactly as it was read, so
    /// a concurrent writer makes the replace miss instead of being overwritten.
    async fn update_one(&self, id: &str, mutation: Mutation<T>) -> DbResult<T> {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let current = self
                .raw
                .find_one(doc! { "_id": id })
                .await?
                .ok_or_else(|| DatabaseError::NotFound(id.to_string()))?;

            let mut entity: T = mongodb::bson::from_document(current.clone()).map_err(|e| {
                DatabaseError::InvalidRecord(format!("record {} in {} cannot be decoded: {}", id, self.name, e))
            })?;
            mutation(&mut entity)?;

            let result = self.inner.replace_one(current, &entity).await?;
            if result.matched_count == 1 {
                debug!("Updated record with ID: {} in {}", id, self.name);
                return Ok(entity);
            }

            debug!(
                "Record {} in {} changed during update, retrying ({}/{})",
                id, self.name, attempt, MAX_UPDATE_ATTEMPTS
            );
        }

        Err(DatabaseError::WriteConflict(id.to_string()))
    }

    async fn delete_one(&self, query: &Query) -> DbResult<u64> {
        if query.is_empty() {
            return Ok(0);
        }

        let result = self.inner.delete_one(filter_document(query)).await?;
        Ok(result.deleted_count)
    }

    async fn create_index(&self, field: &str, unique: bool) -> DbResult<()> {
        let mut keys = Document::new();
        keys.insert(field, 1);

        let index = IndexModel::builder()
            .keys(keys)
            .options(Some(
                IndexOptions::builder()
                    .unique(unique)
                    .name(format!("{}_{}", field, if unique { "unique" } else { "idx" }))
                    .build(),
            ))
            .build();

        self.inner.create_index(index).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::entities::{GrowingActivity, WeeklyTask};
    use chrono::NaiveDate;
    use std::sync::Arc;

    #[test]
    fn test_filter_document_uses_populated_fields() {
        let filter = filter_document(&Query::by_owner("u-1").with_status("active"));
        assert_eq!(filter, doc! { "user_id": "u-1", "status": "active" });

        let filter = filter_document(&Query::by_id("a-1"));
        assert_eq!(filter, doc! { "_id": "a-1" });

        assert!(filter_document(&Query::all()).is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_within_timeout() {
        let config = MongoConfig {
            enabled: true,
            connection_string: "mongodb://127.0.0.1:1/?directConnection=true".to_string(),
            database: "smart_farming".to_string(),
            connect_timeout_secs: 1,
            server_selection_timeout_secs: 1,
            app_name: None,
        };

        let started = std::time::Instant::now();
        let result = MongoDb::connect(&config).await;

        assert!(matches!(result, Err(DatabaseError::ConnectionError(_))));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_malformed_uri_is_a_connection_error() {
        let config = MongoConfig {
            connection_string: "not-a-uri".to_string(),
            ..MongoConfig::default()
        };

        let result = MongoDb::connect(&config).await;
        assert!(matches!(result, Err(DatabaseError::ConnectionError(_))));
    }

    /// Runs only when `AGRISTORE_TEST_MONGODB_URI` points at a live server
    #[tokio::test]
    async fn test_concurrent_updates_keep_every_change() -> anyhow::Result<()> {
        let Ok(uri) = std::env::var("AGRISTORE_TEST_MONGODB_URI") else {
            return Ok(());
        };
        let config = MongoConfig {
            connection_string: uri,
            database: format!("agristore_test_{}", generate_id().replace('-', "")),
            ..MongoConfig::default()
        };
        let mongo = MongoDb::connect(&config).await?;
        let activities = Arc::new(mongo.collection::<GrowingActivity>());

        let tasks = (1..=4).map(|week| WeeklyTask::new(week, format!("Week {} round", week))).collect();
        let id = activities
            .insert_one(GrowingActivity::new(
                "u-1",
                "Sugarcane",
                NaiveDate::from_ymd_opt(2031, 2, 1).unwrap(),
                tasks,
            ))
            .await?;

        let handles: Vec<_> = (0..4)
            .map(|index| {
                let activities = activities.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    activities
                        .update_one(
                            &id,
                            Box::new(move |activity: &mut GrowingActivity| {
                                activity.complete_task(index);
                                Ok(())
                            }),
                        )
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await??;
        }

        let stored = activities.find_one(&Query::by_id(&id)).await?.unwrap();
        mongo.database.drop().await?;

        assert!(stored.tasks.iter().all(|task| task.completed));
        Ok(())
    }
}
