use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info, warn};

use crate::core::config::{Config, StorageConfig};
use crate::core::credentials::PasswordPolicy;
use crate::database::entities::{
    CropRecommendation, DiseaseDetection, FertilizerRecommendation, GrowingActivity, User,
};
use crate::database::{DocumentCollection, MemoryCollection, MongoDb, RecordStore};

/// Which store the accessors are routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// The primary MongoDB database
    Primary,
    /// Process memory plus local record files
    Fallback,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Primary => write!(f, "primary (MongoDB)"),
            StoreBackend::Fallback => write!(f, "fallback (memory + local files)"),
        }
    }
}

/// Database Manager coordinates access to all collections
///
/// Built once at startup; the backend chosen then is fixed for the life
/// of the manager. Every accessor is a method on this handle.
pub struct DatabaseManager {
    users_db: Arc<dyn DocumentCollection<User>>,
    crops_db: Arc<dyn DocumentCollection<CropRecommendation>>,
    fertilizers_db: Arc<dyn DocumentCollection<FertilizerRecommendation>>,
    diseases_db: Arc<dyn DocumentCollection<DiseaseDetection>>,
    growing_db: Arc<dyn DocumentCollection<GrowingActivity>>,

    /// Type of store being used
    backend: StoreBackend,

    passwords: PasswordPolicy,
}

impl DatabaseManager {
    /// Connect to the primary database, or fall back to local storage
    ///
    /// A failed connection is logged and never returned as an error; only
    /// an unusable local data directory is fatal.
    pub async fn connect(config: &Config) -> Result<Self> {
        let passwords = PasswordPolicy::new(
            config.security.password_storage,
            config.security.bcrypt_cost,
        );

        if config.mongodb.enabled {
            info!("Connecting to MongoDB database {}", config.mongodb.database);

            match MongoDb::connect(&config.mongodb).await {
                Ok(mongo) => {
                    info!("Successfully connected to MongoDB");
                    let manager = Self::primary(&mongo, passwords);

                    match manager.users_db.create_index("email", true).await {
                        Ok(()) => info!("Database indexes created successfully"),
                        Err(e) => warn!("Index creation note: {}", e),
                    }

                    return Ok(manager);
                }
                Err(e) => {
                    error!("MongoDB connection failed: {}", e);
                    info!("Using local fallback storage");
                }
            }
        } else {
            info!("MongoDB disabled in configuration, using local fallback storage");
        }

        Self::fallback(&config.storage, passwords).await
    }

    /// Route every collection to the primary database
    pub fn primary(mongo: &MongoDb, passwords: PasswordPolicy) -> Self {
        Self {
            users_db: Arc::new(mongo.collection::<User>()),
            crops_db: Arc::new(mongo.collection::<CropRecommendation>()),
            fertilizers_db: Arc::new(mongo.collection::<FertilizerRecommendation>()),
            diseases_db: Arc::new(mongo.collection::<DiseaseDetection>()),
            growing_db: Arc::new(mongo.collection::<GrowingActivity>()),
            backend: StoreBackend::Primary,
            passwords,
        }
    }

    /// Route users to process memory and records to files under the data directory
    pub async fn fallback(storage: &StorageConfig, passwords: PasswordPolicy) -> Result<Self> {
        let data_dir = &storage.data_dir;
        info!("Initializing fallback storage in {:?}", data_dir);

        let growing_db = RecordStore::<GrowingActivity>::open(data_dir)
            .context("Failed to open growing activities record file")?;

        let (crops_db, fertilizers_db, diseases_db): (
            Arc<dyn DocumentCollection<CropRecommendation>>,
            Arc<dyn DocumentCollection<FertilizerRecommendation>>,
            Arc<dyn DocumentCollection<DiseaseDetection>>,
        ) = if storage.durable_fallback {
            (
                Arc::new(
                    RecordStore::<CropRecommendation>::open(data_dir)
                        .context("Failed to open crops record file")?,
                ),
                Arc::new(
                    RecordStore::<FertilizerRecommendation>::open(data_dir)
                        .context("Failed to open fertilizers record file")?,
                ),
                Arc::new(
                    RecordStore::<DiseaseDetection>::open(data_dir)
                        .context("Failed to open diseases record file")?,
                ),
            )
        } else {
            warn!("Recommendations are kept in memory only and will be lost on restart");
            (
                Arc::new(MemoryCollection::<CropRecommendation>::listed()),
                Arc::new(MemoryCollection::<FertilizerRecommendation>::listed()),
                Arc::new(MemoryCollection::<DiseaseDetection>::listed()),
            )
        };

        let users_db: Arc<dyn DocumentCollection<User>> = Arc::new(MemoryCollection::<User>::keyed());
        users_db
            .create_index("email", true)
            .await
            .context("Failed to declare user email index")?;

        info!("Fallback storage initialized");

        Ok(Self {
            users_db,
            crops_db,
            fertilizers_db,
            diseases_db,
            growing_db: Arc::new(growing_db),
            backend: StoreBackend::Fallback,
            passwords,
        })
    }

    /// Get the users collection
    pub fn users(&self) -> Arc<dyn DocumentCollection<User>> {
        self.users_db.clone()
    }

    /// Get the crop recommendations collection
    pub fn crops(&self) -> Arc<dyn DocumentCollection<CropRecommendation>> {
        self.crops_db.clone()
    }

    /// Get the fertilizer recommendations collection
    pub fn fertilizers(&self) -> Arc<dyn DocumentCollection<FertilizerRecommendation>> {
        self.fertilizers_db.clone()
    }

    /// Get the disease detections collection
    pub fn diseases(&self) -> Arc<dyn DocumentCollection<DiseaseDetection>> {
        self.diseases_db.clone()
    }

    /// Get the growing activities collection
    pub fn growing_activities(&self) -> Arc<dyn DocumentCollection<GrowingActivity>> {
        self.growing_db.clone()
    }

    /// Get the type of store being used
    pub fn backend(&self) -> StoreBackend {
        self.backend
    }

    pub(crate) fn passwords(&self) -> &PasswordPolicy {
        &self.passwords
    }
}
