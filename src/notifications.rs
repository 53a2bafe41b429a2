//! Dashboard notifications derived from growing activities
//!
//! Nothing here is stored: notifications are recomputed from the
//! activities every time they are requested.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::entities::GrowingActivity;

/// Harvests this many days away or fewer are announced
pub const HARVEST_WINDOW_DAYS: i64 = 7;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// A weekly task falls in the current week
    Task,
    /// The harvest date is near
    Harvest,
}

/// Urgency shown next to a notification; everything derived today is urgent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
}

/// A single dashboard notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,

    /// Display name of the crop the notification is about
    pub crop: String,

    pub message: String,
    pub priority: Priority,
}

/// The 1-based week an activity started at `created_at` is in at `now`
pub fn current_week(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let days_passed = (now - created_at).num_seconds().div_euclid(SECONDS_PER_DAY);
    days_passed.div_euclid(7) + 1
}

/// Whole days from `now` until the activity's harvest date
pub fn days_to_harvest(activity: &GrowingActivity, now: DateTime<Utc>) -> i64 {
    (activity.harvest_date - now.date_naive()).num_days()
}

/// Notifications for the given activities as of `now`
///
/// Each open task scheduled for the current week yields a task
/// notification, and a harvest between today and
/// [`HARVEST_WINDOW_DAYS`] days out yields a harvest notification.
pub fn derive_notifications(activities: &[GrowingActivity], now: DateTime<Utc>) -> Vec<Notification> {
    let mut notifications = Vec::new();

    for activity in activities {
        let week = current_week(activity.created_at, now);

        for task in activity.tasks.iter().filter(|task| !task.completed) {
            if i64::from(task.week) == week {
                notifications.push(Notification {
                    kind: NotificationKind::Task,
                    crop: activity.crop_display_name.clone(),
                    message: format!("Week {} task: {}", task.week, task.description),
                    priority: Priority::High,
                });
            }
        }

        let days = days_to_harvest(activity, now);
        if (0..=HARVEST_WINDOW_DAYS).contains(&days) {
            notifications.push(Notification {
                kind: NotificationKind::Harvest,
                crop: activity.crop_display_name.clone(),
                message: format!("Harvest ready in {} days!", days),
                priority: Priority::High,
            });
        }
    }

    notifications
}
