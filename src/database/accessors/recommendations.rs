use chrono::Utc;
use log::{info, warn};
use serde_json::Value;

use crate::database::entities::{
    CropRecommendation, DiseaseDetection, FertilizerRecommendation, User,
};
use crate::database::{DatabaseError, DatabaseManager, DbResult, DocumentCollection, Entity, Query};

/// The list on a user that points back at one kind of record
#[derive(Debug, Clone, Copy)]
enum BackRef {
    SavedCrops,
    SavedFertilizers,
    DiseaseHistory,
}

impl BackRef {
    fn list_mut(self, user: &mut User) -> &mut Vec<String> {
        match self {
            BackRef::SavedCrops => &mut user.saved_crops,
            BackRef::SavedFertilizers => &mut user.saved_fertilizers,
            BackRef::DiseaseHistory => &mut user.disease_history,
        }
    }
}

impl DatabaseManager {
    /// Save a crop recommendation for `user_id`, with its cultivation timeline
    pub async fn save_crop_recommendation(
        &self,
        user_id: &str,
        mut crop: CropRecommendation,
        timeline: Option<Value>,
    ) -> DbResult<String> {
        crop.user_id = user_id.to_string();
        crop.created_at = Utc::now();
        if timeline.is_some() {
            crop.timeline = timeline;
        }

        let crop_name = crop.crop_name.clone();
        let id = self.save_owned(&*self.crops(), crop, BackRef::SavedCrops).await?;

        info!("Crop recommendation saved for user {}: {}", user_id, crop_name);
        Ok(id)
    }

    /// Crop recommendations saved by `user_id`
    pub async fn get_user_crops(&self, user_id: &str) -> DbResult<Vec<CropRecommendation>> {
        self.crops().find(&Query::by_owner(user_id)).await
    }

    pub async fn delete_crop(&self, crop_id: &str) -> DbResult<()> {
        self.delete_owned(&*self.crops(), crop_id, BackRef::SavedCrops).await?;
        info!("Crop deleted: {}", crop_id);
        Ok(())
    }

    /// Save a fertilizer recommendation for `user_id`
    pub async fn save_fertilizer_recommendation(
        &self,
        user_id: &str,
        mut fertilizer: FertilizerRecommendation,
    ) -> DbResult<String> {
        fertilizer.user_id = user_id.to_string();
        fertilizer.created_at = Utc::now();

        let name = fertilizer.fertilizer_name.clone();
        let id = self
            .save_owned(&*self.fertilizers(), fertilizer, BackRef::SavedFertilizers)
            .await?;

        info!("Fertilizer recommendation saved for user {}: {}", user_id, name);
        Ok(id)
    }

    pub async fn get_user_fertilizers(&self, user_id: &str) -> DbResult<Vec<FertilizerRecommendation>> {
        self.fertilizers().find(&Query::by_owner(user_id)).await
    }

    pub async fn delete_fertilizer(&self, fertilizer_id: &str) -> DbResult<()> {
        self.delete_owned(&*self.fertilizers(), fertilizer_id, BackRef::SavedFertilizers)
            .await?;
        info!("Fertilizer recommendation deleted: {}", fertilizer_id);
        Ok(())
    }

    /// Record a disease detection for `user_id`
    ///
    /// `detected_at` is kept as given; it describes the scan, not the save.
    pub async fn save_disease_detection(&self, user_id: &str, mut disease: DiseaseDetection) -> DbResult<String> {
        disease.user_id = user_id.to_string();

        let name = disease.disease_name.clone();
        let id = self
            .save_owned(&*self.diseases(), disease, BackRef::DiseaseHistory)
            .await?;

        info!("Disease detection saved for user {}: {}", user_id, name);
        Ok(id)
    }

    pub async fn get_user_diseases(&self, user_id: &str) -> DbResult<Vec<DiseaseDetection>> {
        self.diseases().find(&Query::by_owner(user_id)).await
    }

    pub async fn delete_disease(&self, disease_id: &str) -> DbResult<()> {
        self.delete_owned(&*self.diseases(), disease_id, BackRef::DiseaseHistory)
            .await?;
        info!("Disease detection deleted: {}", disease_id);
        Ok(())
    }

    async fn save_owned<T: Entity>(
        &self,
        collection: &dyn DocumentCollection<T>,
        record: T,
        backref: BackRef,
    ) -> DbResult<String> {
        let owner = record.owner_id().unwrap_or_default().to_string();
        if owner.is_empty() {
            return Err(DatabaseError::InvalidRecord(format!(
                "{} records require an owning user id",
                collection.name()
            )));
        }

        let id = collection.insert_one(record).await?;
        self.update_backref(&owner, &id, backref, true).await;
        Ok(id)
    }

    async fn delete_owned<T: Entity>(
        &self,
        collection: &dyn DocumentCollection<T>,
        id: &str,
        backref: BackRef,
    ) -> DbResult<()> {
        let record = collection
            .find_one(&Query::by_id(id))
            .await?
            .ok_or_else(|| DatabaseError::NotFound(id.to_string()))?;

        if collection.delete_one(&Query::by_id(id)).await? == 0 {
            return Err(DatabaseError::NotFound(id.to_string()));
        }

        if let Some(owner) = record.owner_id() {
            self.update_backref(owner, id, backref, false).await;
        }
        Ok(())
    }

    /// Add or remove `record_id` on the owner's back-reference list
    ///
    /// The record itself is already stored, so failures here are logged only.
    async fn update_backref(&self, user_id: &str, record_id: &str, backref: BackRef, attach: bool) {
        let record_id = record_id.to_string();

        let result = self
            .users()
            .update_one(
                user_id,
                Box::new(move |user: &mut User| {
                    let list = backref.list_mut(user);
                    if attach {
                        if !list.contains(&record_id) {
                            list.push(record_id.clone());
                        }
                    } else {
                        list.retain(|id| id != &record_id);
                    }
                    Ok(())
                }),
            )
            .await;

        match result {
            Ok(_) => {}
            Err(DatabaseError::NotFound(_)) => {
                warn!("User {} not found, {:?} not updated", user_id, backref)
            }
            Err(e) => warn!("Failed to update {:?} for user {}: {}", backref, user_id, e),
        }
    }
}
