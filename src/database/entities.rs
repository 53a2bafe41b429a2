use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::database::models::Entity;

/// Status given to a growing activity when it is started
pub const STATUS_ACTIVE: &str = "active";

/// Parse an RFC 3339 timestamp, or a zone-less ISO one taken to be UTC
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(stamp.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
}

/// A registered user, as stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub name: String,

    /// Lookup key for login, unique across users
    pub email: String,

    /// Stored credential, verbatim or hashed depending on the password policy
    pub password: String,

    pub phone: String,
    pub state: String,
    pub district: String,
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub saved_crops: Vec<String>,

    #[serde(default)]
    pub saved_fertilizers: Vec<String>,

    #[serde(default)]
    pub disease_history: Vec<String>,
}

/// Signup form for a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub state: String,
    pub district: String,
}

/// A user without the credential field, safe to hand to a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub state: String,
    pub district: String,
    pub created_at: DateTime<Utc>,
    pub saved_crops: Vec<String>,
    pub saved_fertilizers: Vec<String>,
    pub disease_history: Vec<String>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id.unwrap_or_default(),
            name: user.name,
            email: user.email,
            phone: user.phone,
            state: user.state,
            district: user.district,
            created_at: user.created_at,
            saved_crops: user.saved_crops,
            saved_fertilizers: user.saved_fertilizers,
            disease_history: user.disease_history,
        }
    }
}

impl Entity for User {
    const COLLECTION: &'static str = "users";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn email(&self) -> Option<&str> {
        Some(&self.email)
    }
}

/// A crop suggested to a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CropRecommendation {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub user_id: String,

    pub crop_name: String,

    /// Model confidence in the range 0..=1
    pub probability: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sowing_date: Option<NaiveDate>,

    #[serde(default = "default_crop_status")]
    pub status: String,

    /// Cultivation timeline produced alongside the recommendation
    #[serde(rename = "timeline_data", default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<Value>,

    pub created_at: DateTime<Utc>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_crop_status() -> String {
    "monitoring".to_string()
}

impl CropRecommendation {
    pub fn new(crop_name: impl Into<String>, probability: f64) -> Self {
        Self {
            id: None,
            user_id: String::new(),
            crop_name: crop_name.into(),
            probability,
            sowing_date: None,
            status: default_crop_status(),
            timeline: None,
            created_at: Utc::now(),
            extra: Map::new(),
        }
    }
}

impl Entity for CropRecommendation {
    const COLLECTION: &'static str = "crops";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn owner_id(&self) -> Option<&str> {
        Some(&self.user_id)
    }

    fn status(&self) -> Option<&str> {
        Some(&self.status)
    }
}

/// A fertilizer suggested to a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FertilizerRecommendation {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub user_id: String,

    #[serde(alias = "name")]
    pub fertilizer_name: String,

    pub crop_type: String,

    /// Free-form priority label such as "High"
    pub priority: String,

    pub created_at: DateTime<Utc>,
}

impl FertilizerRecommendation {
    pub fn new(
        fertilizer_name: impl Into<String>,
        crop_type: impl Into<String>,
        priority: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            user_id: String::new(),
            fertilizer_name: fertilizer_name.into(),
            crop_type: crop_type.into(),
            priority: priority.into(),
            created_at: Utc::now(),
        }
    }
}

impl Entity for FertilizerRecommendation {
    const COLLECTION: &'static str = "fertilizers";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn owner_id(&self) -> Option<&str> {
        Some(&self.user_id)
    }
}

/// A plant disease detected from a user's upload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiseaseDetection {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub user_id: String,

    pub disease_name: String,
    pub plant_type: String,
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
}

impl DiseaseDetection {
    pub fn new(disease_name: impl Into<String>, plant_type: impl Into<String>, confidence: f64) -> Self {
        Self {
            id: None,
            user_id: String::new(),
            disease_name: disease_name.into(),
            plant_type: plant_type.into(),
            confidence,
            detected_at: Utc::now(),
        }
    }
}

impl Entity for DiseaseDetection {
    const COLLECTION: &'static str = "diseases";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn owner_id(&self) -> Option<&str> {
        Some(&self.user_id)
    }
}

/// One scheduled task in a growing activity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeeklyTask {
    /// 1-based week number counted from the activity's creation
    pub week: u32,

    #[serde(rename = "task")]
    pub description: String,

    #[serde(default)]
    pub completed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WeeklyTask {
    pub fn new(week: u32, description: impl Into<String>) -> Self {
        Self {
            week,
            description: description.into(),
            completed: false,
            completed_at: None,
        }
    }
}

/// A tracked cultivation timeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GrowingActivity {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub user_id: String,
    pub crop_display_name: String,

    #[serde(deserialize_with = "lenient_timestamp")]
    pub created_at: DateTime<Utc>,

    pub harvest_date: NaiveDate,

    /// Empty for records written without one; such records are never active
    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub tasks: Vec<WeeklyTask>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GrowingActivity {
    /// Start a new active timeline today
    pub fn new(
        user_id: impl Into<String>,
        crop_display_name: impl Into<String>,
        harvest_date: NaiveDate,
        tasks: Vec<WeeklyTask>,
    ) -> Self {
        Self {
            id: None,
            user_id: user_id.into(),
            crop_display_name: crop_display_name.into(),
            created_at: Utc::now(),
            harvest_date,
            status: STATUS_ACTIVE.to_string(),
            tasks,
            extra: Map::new(),
        }
    }

    /// Mark the task at `index` complete
    pub fn complete_task(&mut self, index: usize) -> Option<&WeeklyTask> {
        let task = self.tasks.get_mut(index)?;
        task.completed = true;
        task.completed_at = Some(Utc::now());
        Some(task)
    }
}

impl Entity for GrowingActivity {
    const COLLECTION: &'static str = "growing_activities";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn owner_id(&self) -> Option<&str> {
        Some(&self.user_id)
    }

    fn status(&self) -> Option<&str> {
        Some(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::Query;
    use chrono::TimeZone;

    #[test]
    fn test_growing_activity_json_layout() {
        let json = r#"{
            "_id": "a-1",
            "user_id": "u-1",
            "crop_display_name": "Rice (Kharif)",
            "crop_name": "rice",
            "created_at": "2024-06-01T08:00:00Z",
            "harvest_date": "2024-10-15",
            "status": "active",
            "tasks": [{"week": 1, "task": "Prepare nursery beds"}]
        }"#;

        let activity: GrowingActivity = serde_json::from_str(json).unwrap();
        assert_eq!(activity.id.as_deref(), Some("a-1"));
        assert_eq!(activity.tasks[0].description, "Prepare nursery beds");
        assert!(!activity.tasks[0].completed);
        assert_eq!(activity.extra.get("crop_name"), Some(&Value::from("rice")));

        let back = serde_json::to_value(&activity).unwrap();
        assert_eq!(back["crop_name"], "rice");
        assert_eq!(back["harvest_date"], "2024-10-15");
        assert_eq!(back["tasks"][0]["task"], "Prepare nursery beds");
    }

    #[test]
    fn test_profile_drops_password() {
        let user = User {
            id: Some("u-1".into()),
            name: "Asha".into(),
            email: "asha@example.com".into(),
            password: "secret".into(),
            phone: "+91 9876543210".into(),
            state: "Karnataka".into(),
            district: "Mysuru".into(),
            created_at: Utc::now(),
            saved_crops: vec![],
            saved_fertilizers: vec![],
            disease_history: vec![],
        };

        let profile = UserProfile::from(user);
        let json = serde_json::to_value(&profile).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["_id"], "u-1");
    }

    #[test]
    fn test_fertilizer_accepts_short_name_field() {
        let json = r#"{"name": "Urea", "crop_type": "Rice", "priority": "High",
                       "created_at": "2024-06-01T08:00:00Z"}"#;
        let fertilizer: FertilizerRecommendation = serde_json::from_str(json).unwrap();
        assert_eq!(fertilizer.fertilizer_name, "Urea");
    }

    #[test]
    fn test_query_matches_on_populated_fields_only() {
        let mut activity = GrowingActivity::new(
            "u-1",
            "Tomato",
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            vec![],
        );
        activity.set_id("a-1".into());

        assert!(Query::all().matches(&activity));
        assert!(Query::by_owner("u-1").with_status(STATUS_ACTIVE).matches(&activity));
        assert!(Query::by_id("a-1").owned_by("u-1").matches(&activity));
        assert!(!Query::by_id("a-1").owned_by("u-2").matches(&activity));
        assert!(!Query::by_owner("u-1").with_status("harvested").matches(&activity));
        assert!(!Query::by_email("x@example.com").matches(&activity));
    }

    #[test]
    fn test_complete_task_bounds() {
        let mut activity = GrowingActivity::new(
            "u-1",
            "Tomato",
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            vec![WeeklyTask::new(1, "Transplant seedlings")],
        );

        assert!(activity.complete_task(1).is_none());
        let task = activity.complete_task(0).unwrap();
        assert!(task.completed);
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn test_timestamps_without_zone_are_utc() {
        let expected = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();

        assert_eq!(parse_timestamp("2024-06-01T08:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-06-01 08:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-06-01T13:30:00+05:30"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-06-01T08:00:00.250000"),
            Some(expected + chrono::Duration::milliseconds(250))
        );
        assert!(parse_timestamp("June 1st").is_none());
    }

    #[test]
    fn test_activity_without_status_is_not_active() {
        let json = r#"{
            "_id": "a-2",
            "user_id": "u-1",
            "crop_display_name": "Jowar",
            "created_at": "2024-06-02T09:30:00",
            "harvest_date": "2024-10-01"
        }"#;

        let activity: GrowingActivity = serde_json::from_str(json).unwrap();
        assert_eq!(activity.status, "");
        assert!(activity.tasks.is_empty());
        assert!(!Query::by_owner("u-1").with_status(STATUS_ACTIVE).matches(&activity));
    }
}
