use std::collections::BTreeMap;

use log::{debug, info};
use tokio::sync::RwLock;

use super::collection::{generate_id, DocumentCollection, Mutation};
use super::error::{DatabaseError, DbResult};
use super::models::{Entity, Query};

/// Storage layout of a memory collection
enum Slots<T> {
    /// Records keyed by email, for user-like collections
    Keyed(BTreeMap<String, T>),
    /// Records in insertion order
    Listed(Vec<T>),
}

/// Process-local stand-in for a document collection
///
/// Used when the primary database cannot be reached. Nothing here
/// survives a restart.
pub struct MemoryCollection<T: Entity> {
    name: String,
    slots: RwLock<Slots<T>>,
}

impl<T: Entity> MemoryCollection<T> {
    /// Create a collection keyed by each record's email
    pub fn keyed() -> Self {
        debug!("In-memory collection {} initialized (keyed by email)", T::COLLECTION);
        Self {
            name: T::COLLECTION.to_string(),
            slots: RwLock::new(Slots::Keyed(BTreeMap::new())),
        }
    }

    /// Create a collection storing records in insertion order
    pub fn listed() -> Self {
        debug!("In-memory collection {} initialized", T::COLLECTION);
        Self {
            name: T::COLLECTION.to_string(),
            slots: RwLock::new(Slots::Listed(Vec::new())),
        }
    }
}

impl<T: Entity> Slots<T> {
    fn iter(&self) -> Box<dyn Iterator<Item = &T> + '_> {
        match self {
            Slots::Keyed(map) => Box::new(map.values()),
            Slots::Listed(list) => Box::new(list.iter()),
        }
    }

    fn contains_id(&self, id: &str) -> bool {
        self.iter().any(|entity| entity.id() == Some(id))
    }

    fn fresh_id(&self) -> String {
        loop {
            let id = generate_id();
            if !self.contains_id(&id) {
                return id;
            }
        }
    }
}

#[async_trait::async_trait]
impl<T: Entity> DocumentCollection<T> for MemoryCollection<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_one(&self, query: &Query) -> DbResult<Option<T>> {
        let slots = self.slots.read().await;

        // Direct key lookup when the layout allows it
        if let (Slots::Keyed(map), Some(email)) = (&*slots, &query.email) {
            return Ok(map.get(email).filter(|entity| query.matches(*entity)).cloned());
        }

        let found = slots.iter().find(|entity| query.matches(*entity)).cloned();
        Ok(found)
    }

    async fn find(&self, query: &Query) -> DbResult<Vec<T>> {
        let slots = self.slots.read().await;
        let found = slots.iter().filter(|entity| query.matches(*entity)).cloned().collect();
        Ok(found)
    }

    async fn insert_one(&self, mut entity: T) -> DbResult<String> {
        let mut slots = self.slots.write().await;

        let id = slots.fresh_id();
        entity.set_id(id.clone());

        match &mut *slots {
            Slots::Keyed(map) => {
                let email = entity
                    .email()
                    .ok_or_else(|| {
                        DatabaseError::InvalidRecord(format!("{} records require an email", self.name))
                    })?
                    .to_string();

                if map.contains_key(&email) {
                    return Err(DatabaseError::DuplicateKey(email));
                }
                map.insert(email, entity);
            }
            Slots::Listed(list) => list.push(entity),
        }

        debug!("Inserted record {} into in-memory {}", id, self.name);
        Ok(id)
    }

    async fn update_one(&self, id: &str, mutation: Mutation<T>) -> DbResult<T> {
        let mut slots = self.slots.write().await;

        match &mut *slots {
            Slots::Keyed(map) => {
                let (key, current) = map
                    .iter()
                    .find(|(_, entity)| entity.id() == Some(id))
                    .map(|(key, entity)| (key.clone(), entity.clone()))
                    .ok_or_else(|| DatabaseError::NotFound(id.to_string()))?;

                let mut updated = current;
                mutation(&mut updated)?;

                let new_key = updated.email().unwrap_or(&key).to_string();
                if new_key != key && map.contains_key(&new_key) {
                    return Err(DatabaseError::DuplicateKey(new_key));
                }

                map.remove(&key);
                map.insert(new_key, updated.clone());
                Ok(updated)
            }
            Slots::Listed(list) => {
                let slot = list
                    .iter_mut()
                    .find(|entity| entity.id() == Some(id))
                    .ok_or_else(|| DatabaseError::NotFound(id.to_string()))?;

                let mut updated = slot.clone();
                mutation(&mut updated)?;
                *slot = updated.clone();
                Ok(updated)
            }
        }
    }

    async fn delete_one(&self, query: &Query) -> DbResult<u64> {
        if query.is_empty() {
            return Ok(0);
        }

        let mut slots = self.slots.write().await;

        let removed = match &mut *slots {
            Slots::Keyed(map) => {
                let key = map
                    .iter()
                    .find(|(_, entity)| query.matches(*entity))
                    .map(|(key, _)| key.clone());
                key.and_then(|key| map.remove(&key)).is_some()
            }
            Slots::Listed(list) => match list.iter().position(|entity| query.matches(entity)) {
                Some(index) => {
                    list.remove(index);
                    true
                }
                None => false,
            },
        };

        Ok(u64::from(removed))
    }

    async fn create_index(&self, field: &str, unique: bool) -> DbResult<()> {
        info!("Mock index created for {} on {} (unique: {})", field, self.name, unique);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::entities::{CropRecommendation, User};
    use chrono::Utc;
    use proptest::prelude::*;

    fn user(email: &str) -> User {
        User {
            id: None,
            name: "Ravi".into(),
            email: email.into(),
            password: "pw".into(),
            phone: "+91 9000000000".into(),
            state: "Tamil Nadu".into(),
            district: "Salem".into(),
            created_at: Utc::now(),
            saved_crops: vec![],
            saved_fertilizers: vec![],
            disease_history: vec![],
        }
    }

    #[tokio::test]
    async fn test_keyed_lookup_by_email_and_id() {
        let users = MemoryCollection::<User>::keyed();

        let id = users.insert_one(user("ravi@example.com")).await.unwrap();

        let by_email = users.find_one(&Query::by_email("ravi@example.com")).await.unwrap().unwrap();
        assert_eq!(by_email.id.as_deref(), Some(id.as_str()));

        let by_id = users.find_one(&Query::by_id(&id)).await.unwrap().unwrap();
        assert_eq!(by_id.email, "ravi@example.com");

        assert!(users.find_one(&Query::by_email("nobody@example.com")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let users = MemoryCollection::<User>::keyed();

        users.insert_one(user("dup@example.com")).await.unwrap();
        let err = users.insert_one(user("dup@example.com")).await.unwrap_err();

        assert!(matches!(err, DatabaseError::DuplicateKey(ref email) if email == "dup@example.com"));
        assert_eq!(users.find(&Query::all()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_listed_find_by_owner_and_delete() {
        let crops = MemoryCollection::<CropRecommendation>::listed();

        let mut rice = CropRecommendation::new("Rice", 0.89);
        rice.user_id = "u-1".into();
        let mut maize = CropRecommendation::new("Maize", 0.61);
        maize.user_id = "u-2".into();

        let rice_id = crops.insert_one(rice).await.unwrap();
        crops.insert_one(maize).await.unwrap();

        let owned = crops.find(&Query::by_owner("u-1")).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].crop_name, "Rice");
        assert_eq!(crops.find(&Query::all()).await.unwrap().len(), 2);

        assert_eq!(crops.delete_one(&Query::by_id(&rice_id)).await.unwrap(), 1);
        assert_eq!(crops.delete_one(&Query::by_id(&rice_id)).await.unwrap(), 0);
        assert_eq!(crops.delete_one(&Query::all()).await.unwrap(), 0);
        assert_eq!(crops.find(&Query::all()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_record_untouched() {
        let crops = MemoryCollection::<CropRecommendation>::listed();
        let id = crops.insert_one(CropRecommendation::new("Rice", 0.5)).await.unwrap();

        let result = crops
            .update_one(
                &id,
                Box::new(|crop: &mut CropRecommendation| {
                    crop.crop_name = "Wheat".into();
                    Err(DatabaseError::InvalidRecord("rejected".into()))
                }),
            )
            .await;
        assert!(result.is_err());

        let stored = crops.find_one(&Query::by_id(&id)).await.unwrap().unwrap();
        assert_eq!(stored.crop_name, "Rice");

        let missing = crops.update_one("nope", Box::new(|_: &mut CropRecommendation| Ok(()))).await;
        assert!(matches!(missing, Err(DatabaseError::NotFound(_))));
    }

    proptest! {
        #[test]
        fn prop_find_by_email_returns_inserted_record(
            local in "[a-z]{1,12}",
            domain in "[a-z]{1,8}",
            name in "[A-Za-z ]{1,20}",
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let users = MemoryCollection::<User>::keyed();
                let email = format!("{}@{}.org", local, domain);
                let mut record = user(&email);
                record.name = name.clone();

                let id = users.insert_one(record.clone()).await.unwrap();
                let found = users.find_one(&Query::by_email(&email)).await.unwrap().unwrap();

                record.id = Some(id);
                prop_assert_eq!(found, record);
                Ok(())
            })?;
        }
    }
}
