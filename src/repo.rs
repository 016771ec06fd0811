use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Course, CourseExtension, Extension, Quiz, User};

/// Local cache of courses, users, quizzes and extensions.
///
/// Every `get_or_create_*` call is a single atomic step and reports whether
/// a row was created.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn find_course(&self, canvas_id: i64) -> Result<Option<Course>, sqlx::Error>;
    async fn get_or_create_course(&self, canvas_id: i64) -> Result<(Course, bool), sqlx::Error>;
    async fn set_course_name(&self, id: Uuid, name: &str) -> Result<(), sqlx::Error>;

    async fn get_or_create_user(&self, canvas_id: i64) -> Result<(User, bool), sqlx::Error>;
    async fn update_user(
        &self,
        id: Uuid,
        sortable_name: &str,
        sis_id: Option<&str>,
    ) -> Result<(), sqlx::Error>;

    async fn find_quiz(&self, course_id: Uuid, canvas_id: i64) -> Result<Option<Quiz>, sqlx::Error>;
    /// Creates or overwrites the cached title and time limit of a quiz.
    async fn upsert_quiz(
        &self,
        course_id: Uuid,
        canvas_id: i64,
        title: &str,
        time_limit: Option<i64>,
    ) -> Result<Quiz, sqlx::Error>;

    /// Sets `percent` on the active extension for a course/user pair, creating
    /// the row when none is active. Inactive rows are kept as history.
    async fn upsert_extension(
        &self,
        course_id: Uuid,
        user_id: Uuid,
        percent: i32,
    ) -> Result<(Extension, bool), sqlx::Error>;
    async fn set_extension_active(&self, id: Uuid, active: bool) -> Result<(), sqlx::Error>;
    /// All extensions of a course in creation order, active or not.
    async fn course_extensions(&self, course_id: Uuid) -> Result<Vec<CourseExtension>, sqlx::Error>;
    async fn count_extensions(&self, course_id: Uuid) -> Result<i64, sqlx::Error>;

    async fn ping(&self) -> Result<(), sqlx::Error>;
}
