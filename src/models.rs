use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, NoneAsEmptyString, PickFirst};
use uuid::Uuid;

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Course {
    pub id: Uuid,
    pub canvas_id: i64,
    pub course_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub canvas_id: i64,
    pub sortable_name: Option<String>,
    pub sis_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Quiz {
    pub id: Uuid,
    pub course_id: Uuid,
    pub canvas_id: i64,
    pub title: Option<String>,
    /// Last known limit in minutes; null or 0 means no limit.
    pub time_limit: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Extension {
    pub id: Uuid,
    pub course_id: Uuid,
    pub user_id: Uuid,
    pub percent: Option<i32>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// An extension joined with the beneficiary it belongs to.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct CourseExtension {
    pub id: Uuid,
    pub percent: Option<i32>,
    pub active: bool,
    pub user_canvas_id: i64,
    pub sortable_name: Option<String>,
}

/// Body of an update request, e.g. `{"percent": "300", "user_ids": ["0123456", "1234567"]}`.
///
/// Numbers may arrive as JSON numbers or numeric strings. A non-numeric user id
/// fails deserialization and with it the whole request.
#[serde_as]
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ExtensionRequest {
    #[serde_as(as = "PickFirst<(_, NoneAsEmptyString)>")]
    #[serde(default)]
    pub percent: Option<i32>,
    #[serde_as(as = "Vec<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default)]
    pub user_ids: Vec<i64>,
}

impl ExtensionRequest {
    /// Requested percentage, treating zero like a missing value.
    pub fn percent(&self) -> Option<i32> {
        self.percent.filter(|p| *p > 0)
    }
}

/// A quiz that received extra time during an update run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct QuizChange {
    pub title: String,
    pub added_time: i64,
}

/// A quiz left alone because it has no time limit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UnchangedQuiz {
    pub title: String,
}
