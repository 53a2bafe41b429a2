use chrono::Utc;
use log::{info, warn};

use crate::database::entities::{GrowingActivity, STATUS_ACTIVE};
use crate::database::{DatabaseError, DatabaseManager, DbResult, Query};
use crate::notifications::{derive_notifications, Notification};

impl DatabaseManager {
    /// Store a new growing activity and return its generated id
    pub async fn save_growing_activity(&self, activity: GrowingActivity) -> DbResult<String> {
        if activity.user_id.is_empty() {
            return Err(DatabaseError::InvalidRecord(
                "growing activities require an owning user id".to_string(),
            ));
        }

        let name = activity.crop_display_name.clone();
        let id = self.growing_activities().insert_one(activity).await?;

        info!("Growing activity saved: {} [ID: {}]", name, id);
        Ok(id)
    }

    /// A user's growing activities, optionally only those in `status`
    pub async fn get_user_growing_activities(
        &self,
        user_id: &str,
        status: Option<&str>,
    ) -> DbResult<Vec<GrowingActivity>> {
        let query = match status {
            Some(status) => Query::by_owner(user_id).with_status(status),
            None => Query::by_owner(user_id),
        };
        self.growing_activities().find(&query).await
    }

    /// Mark the task at `task_index` of an activity as completed
    pub async fn update_growing_activity(&self, activity_id: &str, task_index: usize) -> DbResult<GrowingActivity> {
        let id = activity_id.to_string();

        let updated = self
            .growing_activities()
            .update_one(
                activity_id,
                Box::new(move |activity: &mut GrowingActivity| {
                    let len = activity.tasks.len();
                    match activity.complete_task(task_index) {
                        Some(_) => Ok(()),
                        None => Err(DatabaseError::TaskIndexOutOfRange {
                            activity_id: id.clone(),
                            index: task_index,
                            len,
                        }),
                    }
                }),
            )
            .await?;

        info!("Task {} completed for activity {}", task_index, activity_id);
        Ok(updated)
    }

    /// Delete one of a user's growing activities
    pub async fn delete_growing_activity(&self, activity_id: &str, user_id: &str) -> DbResult<()> {
        let removed = self
            .growing_activities()
            .delete_one(&Query::by_id(activity_id).owned_by(user_id))
            .await?;

        if removed == 0 {
            warn!("Activity {} not found for user {}", activity_id, user_id);
            return Err(DatabaseError::NotFound(activity_id.to_string()));
        }

        info!("Successfully deleted activity {} for user {}", activity_id, user_id);
        Ok(())
    }

    /// Due tasks and approaching harvests across the user's active activities
    pub async fn get_dashboard_notifications(&self, user_id: &str) -> DbResult<Vec<Notification>> {
        let activities = self
            .get_user_growing_activities(user_id, Some(STATUS_ACTIVE))
            .await?;
        Ok(derive_notifications(&activities, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::database::entities::WeeklyTask;
    use crate::notifications::NotificationKind;
    use chrono::{Duration, NaiveDate};
    use tempfile::tempdir;

    fn rice(user_id: &str) -> GrowingActivity {
        GrowingActivity::new(
            user_id,
            "Rice (Sona Masuri)",
            NaiveDate::from_ymd_opt(2031, 11, 20).unwrap(),
            vec![WeeklyTask::new(1, "Nursery sowing"), WeeklyTask::new(2, "Transplanting")],
        )
    }

    #[tokio::test]
    async fn test_update_marks_task_and_checks_bounds() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let manager = DatabaseManager::connect(&Config::offline(temp_dir.path())).await?;
        let id = manager.save_growing_activity(rice("u-1")).await?;

        let updated = manager.update_growing_activity(&id, 1).await?;
        assert!(updated.tasks[1].completed);

        let err = manager.update_growing_activity(&id, 2).await.unwrap_err();
        assert!(matches!(err, DatabaseError::TaskIndexOutOfRange { index: 2, len: 2, .. }));

        let err = manager.update_growing_activity("missing", 0).await.unwrap_err();
        assert!(err.is_not_found());

        let stored = manager.get_user_growing_activities("u-1", None).await?;
        assert!(!stored[0].tasks[0].completed);
        assert!(stored[0].tasks[1].completed);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_is_scoped_to_owner() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let manager = DatabaseManager::connect(&Config::offline(temp_dir.path())).await?;
        let id = manager.save_growing_activity(rice("u-1")).await?;

        assert!(manager.delete_growing_activity(&id, "u-2").await.unwrap_err().is_not_found());
        manager.delete_growing_activity(&id, "u-1").await?;
        assert!(manager.delete_growing_activity(&id, "u-1").await.unwrap_err().is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn test_notifications_only_cover_active_activities() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let manager = DatabaseManager::connect(&Config::offline(temp_dir.path())).await?;

        let mut near = rice("u-1");
        near.harvest_date = (Utc::now() + Duration::days(3)).date_naive();
        manager.save_growing_activity(near.clone()).await?;

        let mut finished = near;
        finished.status = "harvested".into();
        manager.save_growing_activity(finished).await?;

        let notifications = manager.get_dashboard_notifications("u-1").await?;
        let harvest: Vec<_> = notifications
            .iter()
            .filter(|n| n.kind == NotificationKind::Harvest)
            .collect();
        assert_eq!(harvest.len(), 1);

        let tasks: Vec<_> = notifications
            .iter()
            .filter(|n| n.kind == NotificationKind::Task)
            .collect();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].message, "Week 1 task: Nursery sowing");

        assert!(manager.get_dashboard_notifications("u-9").await?.is_empty());
        Ok(())
    }
}
