use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::Mutex;

use super::collection::{generate_id, DocumentCollection, Mutation};
use super::error::{DatabaseError, DbResult};
use super::models::{Entity, Query};

/// On-disk layout: owner id to that owner's raw records in insertion order
///
/// Records stay raw until read so that one record which no longer decodes
/// does not make the rest of the file unreadable.
type Ledger = BTreeMap<String, Vec<Value>>;

fn record_id(raw: &Value) -> Option<&str> {
    raw.get("_id").and_then(Value::as_str)
}

/// A file-backed store of user-owned records
///
/// The whole file is read and rewritten on every mutation. A per-store
/// mutex serializes the read-modify-write cycles of this process, and
/// writes go through a temporary file that is renamed over the original,
/// so readers never observe a half-written document.
pub struct RecordStore<T: Entity> {
    /// Path of the JSON document
    path: PathBuf,

    /// Name of the collection (used as filename)
    name: String,

    /// Guards every load-modify-persist cycle
    lock: Mutex<()>,

    _phantom: PhantomData<T>,
}

impl<T: Entity> RecordStore<T> {
    /// Open the store for `T` under `data_dir`, creating an empty file if needed
    pub fn open(data_dir: impl AsRef<Path>) -> DbResult<Self> {
        Self::open_named(data_dir, T::COLLECTION)
    }

    /// Open a store with an explicit collection name
    pub fn open_named(data_dir: impl AsRef<Path>, name: &str) -> DbResult<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;

        let path = data_dir.join(format!("{}.json", name));
        if !path.exists() {
            fs::write(&path, "{}")?;
            info!("Initialized empty record file {:?}", path);
        }

        Ok(Self {
            path,
            name: name.to_string(),
            lock: Mutex::new(()),
            _phantom: PhantomData,
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> DbResult<Ledger> {
        if !self.path.exists() {
            debug!("Record file {:?} missing, treating as empty", self.path);
            return Ok(Ledger::new());
        }

        let file = File::open(&self.path)?;
        let ledger = serde_json::from_reader(BufReader::new(file))?;
        Ok(ledger)
    }

    fn persist(&self, ledger: &Ledger) -> DbResult<()> {
        let temp_path = self.path.with_extension("tmp");

        let mut writer = BufWriter::new(File::create(&temp_path)?);
        serde_json::to_writer_pretty(&mut writer, ledger)?;
        writer.flush()?;
        drop(writer);

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    /// Decode one stored record, skipping it with a warning if it does not fit `T`
    ///
    /// Skipped records are left in the file untouched.
    fn decode(&self, owner: &str, raw: &Value) -> Option<T> {
        match serde_json::from_value(raw.clone()) {
            Ok(entity) => Some(entity),
            Err(e) => {
                warn!(
                    "Skipping undecodable record {} of user {} in {}: {}",
                    record_id(raw).unwrap_or("<no id>"),
                    owner,
                    self.name,
                    e
                );
                None
            }
        }
    }

    /// Decoded records matching `query`, paired with the owner key they are filed under
    fn matching<'a>(&'a self, ledger: &'a Ledger, query: &'a Query) -> impl Iterator<Item = (&'a str, T)> + 'a {
        ledger
            .iter()
            .filter(move |(owner, _)| query.user_id.as_deref().map_or(true, |user_id| user_id == owner.as_str()))
            .flat_map(|(owner, records)| records.iter().map(move |raw| (owner.as_str(), raw)))
            .filter_map(move |(owner, raw)| self.decode(owner, raw).map(|entity| (owner, entity)))
            .filter(move |(_, entity)| query.matches(entity))
    }
}

#[async_trait::async_trait]
impl<T: Entity> DocumentCollection<T> for RecordStore<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_one(&self, query: &Query) -> DbResult<Option<T>> {
        let _guard = self.lock.lock().await;
        let ledger = self.load()?;
        let found = self.matching(&ledger, query).next().map(|(_, entity)| entity);
        Ok(found)
    }

    async fn find(&self, query: &Query) -> DbResult<Vec<T>> {
        let _guard = self.lock.lock().await;
        let ledger = self.load()?;
        let found = self.matching(&ledger, query).map(|(_, entity)| entity).collect();
        Ok(found)
    }

    /// Append a record to its owner's sequence under a fresh id
    async fn insert_one(&self, mut entity: T) -> DbResult<String> {
        let owner = match entity.owner_id() {
            Some(owner) if !owner.is_empty() => owner.to_string(),
            _ => {
                return Err(DatabaseError::InvalidRecord(format!(
                    "{} records require an owning user id",
                    self.name
                )))
            }
        };

        let _guard = self.lock.lock().await;
        let mut ledger = self.load()?;

        let id = loop {
            let candidate = generate_id();
            if !ledger.values().flatten().any(|raw| record_id(raw) == Some(candidate.as_str())) {
                break candidate;
            }
        };
        entity.set_id(id.clone());

        ledger.entry(owner).or_default().push(serde_json::to_value(&entity)?);
        self.persist(&ledger)?;

        debug!("Saved record {} to {}", id, self.name);
        Ok(id)
    }

    /// Apply `mutation` to the record `id`, whoever owns it
    async fn update_one(&self, id: &str, mutation: Mutation<T>) -> DbResult<T> {
        let _guard = self.lock.lock().await;
        let mut ledger = self.load()?;

        let slot = ledger
            .values_mut()
            .flatten()
            .find(|raw| record_id(raw) == Some(id))
            .ok_or_else(|| DatabaseError::NotFound(id.to_string()))?;

        let mut updated: T = serde_json::from_value(slot.clone()).map_err(|e| {
            DatabaseError::InvalidRecord(format!("record {} in {} cannot be decoded: {}", id, self.name, e))
        })?;
        mutation(&mut updated)?;
        *slot = serde_json::to_value(&updated)?;

        self.persist(&ledger)?;
        Ok(updated)
    }

    /// Remove the first matching record
    ///
    /// The file is only rewritten when something was removed.
    async fn delete_one(&self, query: &Query) -> DbResult<u64> {
        if query.is_empty() {
            return Ok(0);
        }

        let _guard = self.lock.lock().await;
        let mut ledger = self.load()?;

        let target = self
            .matching(&ledger, query)
            .next()
            .and_then(|(owner, entity)| Some((owner.to_string(), entity.id()?.to_string())));

        let Some((owner, id)) = target else {
            warn!("No record matching {:?} in {}", query, self.name);
            return Ok(0);
        };

        if let Some(records) = ledger.get_mut(&owner) {
            records.retain(|raw| record_id(raw) != Some(id.as_str()));
        }
        self.persist(&ledger)?;

        info!("Deleted record {} for user {} from {}", id, owner, self.name);
        Ok(1)
    }

    async fn create_index(&self, field: &str, unique: bool) -> DbResult<()> {
        debug!("Record store {} ignores index on {} (unique: {})", self.name, field, unique);
        Ok(())
    }
}
