//! In-memory fakes shared by the unit tests.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use uuid::Uuid;

use crate::canvas::CanvasClient;
use crate::jobs::{JobMeta, ProgressSink};
use crate::models::{Course, CourseExtension, Extension, Quiz, User};
use crate::repo::Repository;

#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<JobMeta>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<JobMeta> {
        self.records.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn publish(&self, meta: &JobMeta) {
        self.records.lock().unwrap().push(meta.clone());
    }
}

#[derive(Default)]
struct Tables {
    courses: Vec<Course>,
    users: Vec<User>,
    quizzes: Vec<Quiz>,
    extensions: Vec<Extension>,
}

#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn course(&self, canvas_id: i64, name: &str) -> Course {
        let course = Course {
            id: Uuid::new_v4(),
            canvas_id,
            course_name: Some(name.to_string()),
            created_at: Utc::now(),
        };
        self.tables.lock().unwrap().courses.push(course.clone());
        course
    }

    pub fn user(&self, canvas_id: i64, sortable_name: &str) -> User {
        let user = User {
            id: Uuid::new_v4(),
            canvas_id,
            sortable_name: Some(sortable_name.to_string()),
            sis_id: None,
            created_at: Utc::now(),
        };
        self.tables.lock().unwrap().users.push(user.clone());
        user
    }

    pub fn extension(&self, course: &Course, user: &User, percent: i32, active: bool) -> Extension {
        let ext = Extension {
            id: Uuid::new_v4(),
            course_id: course.id,
            user_id: user.id,
            percent: Some(percent),
            active,
            created_at: Utc::now(),
        };
        self.tables.lock().unwrap().extensions.push(ext.clone());
        ext
    }

    pub fn quiz(&self, course: &Course, canvas_id: i64, time_limit: Option<i64>) -> Quiz {
        let quiz = Quiz {
            id: Uuid::new_v4(),
            course_id: course.id,
            canvas_id,
            title: Some(format!("Quiz {canvas_id}")),
            time_limit,
            created_at: Utc::now(),
        };
        self.tables.lock().unwrap().quizzes.push(quiz.clone());
        quiz
    }

    pub fn courses(&self) -> Vec<Course> {
        self.tables.lock().unwrap().courses.clone()
    }

    pub fn users(&self) -> Vec<User> {
        self.tables.lock().unwrap().users.clone()
    }

    pub fn quizzes(&self) -> Vec<Quiz> {
        self.tables.lock().unwrap().quizzes.clone()
    }

    pub fn extensions(&self) -> Vec<Extension> {
        self.tables.lock().unwrap().extensions.clone()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_course(&self, canvas_id: i64) -> Result<Option<Course>, sqlx::Error> {
        let t = self.tables.lock().unwrap();
        Ok(t.courses.iter().find(|c| c.canvas_id == canvas_id).cloned())
    }

    async fn get_or_create_course(&self, canvas_id: i64) -> Result<(Course, bool), sqlx::Error> {
        let mut t = self.tables.lock().unwrap();
        if let Some(c) = t.courses.iter().find(|c| c.canvas_id == canvas_id) {
            return Ok((c.clone(), false));
        }
        let course = Course { id: Uuid::new_v4(), canvas_id, course_name: None, created_at: Utc::now() };
        t.courses.push(course.clone());
        Ok((course, true))
    }

    async fn set_course_name(&self, id: Uuid, name: &str) -> Result<(), sqlx::Error> {
        let mut t = self.tables.lock().unwrap();
        if let Some(c) = t.courses.iter_mut().find(|c| c.id == id) {
            c.course_name = Some(name.to_string());
        }
        Ok(())
    }

    async fn get_or_create_user(&self, canvas_id: i64) -> Result<(User, bool), sqlx::Error> {
        let mut t = self.tables.lock().unwrap();
        if let Some(u) = t.users.iter().find(|u| u.canvas_id == canvas_id) {
            return Ok((u.clone(), false));
        }
        let user = User {
            id: Uuid::new_v4(),
            canvas_id,
            sortable_name: None,
            sis_id: None,
            created_at: Utc::now(),
        };
        t.users.push(user.clone());
        Ok((user, true))
    }

    async fn update_user(
        &self,
        id: Uuid,
        sortable_name: &str,
        sis_id: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let mut t = self.tables.lock().unwrap();
        if let Some(u) = t.users.iter_mut().find(|u| u.id == id) {
            u.sortable_name = Some(sortable_name.to_string());
            u.sis_id = sis_id.map(str::to_string);
        }
        Ok(())
    }

    async fn find_quiz(&self, course_id: Uuid, canvas_id: i64) -> Result<Option<Quiz>, sqlx::Error> {
        let t = self.tables.lock().unwrap();
        Ok(t.quizzes
            .iter()
            .find(|q| q.course_id == course_id && q.canvas_id == canvas_id)
            .cloned())
    }

    async fn upsert_quiz(
        &self,
        course_id: Uuid,
        canvas_id: i64,
        title: &str,
        time_limit: Option<i64>,
    ) -> Result<Quiz, sqlx::Error> {
        let mut t = self.tables.lock().unwrap();
        if let Some(q) = t
            .quizzes
            .iter_mut()
            .find(|q| q.course_id == course_id && q.canvas_id == canvas_id)
        {
            q.title = Some(title.to_string());
            q.time_limit = time_limit;
            return Ok(q.clone());
        }
        let quiz = Quiz {
            id: Uuid::new_v4(),
            course_id,
            canvas_id,
            title: Some(title.to_string()),
            time_limit,
            created_at: Utc::now(),
        };
        t.quizzes.push(quiz.clone());
        Ok(quiz)
    }

    async fn upsert_extension(
        &self,
        course_id: Uuid,
        user_id: Uuid,
        percent: i32,
    ) -> Result<(Extension, bool), sqlx::Error> {
        let mut t = self.tables.lock().unwrap();
        if let Some(e) = t
            .extensions
            .iter_mut()
            .find(|e| e.course_id == course_id && e.user_id == user_id && e.active)
        {
            e.percent = Some(percent);
            return Ok((e.clone(), false));
        }
        let ext = Extension {
            id: Uuid::new_v4(),
            course_id,
            user_id,
            percent: Some(percent),
            active: true,
            created_at: Utc::now(),
        };
        t.extensions.push(ext.clone());
        Ok((ext, true))
    }

    async fn set_extension_active(&self, id: Uuid, active: bool) -> Result<(), sqlx::Error> {
        let mut t = self.tables.lock().unwrap();
        if let Some(e) = t.extensions.iter_mut().find(|e| e.id == id) {
            e.active = active;
        }
        Ok(())
    }

    async fn course_extensions(&self, course_id: Uuid) -> Result<Vec<CourseExtension>, sqlx::Error> {
        let t = self.tables.lock().unwrap();
        Ok(t.extensions
            .iter()
            .filter(|e| e.course_id == course_id)
            .filter_map(|e| {
                let user = t.users.iter().find(|u| u.id == e.user_id)?;
                Some(CourseExtension {
                    id: e.id,
                    percent: e.percent,
                    active: e.active,
                    user_canvas_id: user.canvas_id,
                    sortable_name: user.sortable_name.clone(),
                })
            })
            .collect())
    }

    async fn count_extensions(&self, course_id: Uuid) -> Result<i64, sqlx::Error> {
        let t = self.tables.lock().unwrap();
        Ok(t.extensions.iter().filter(|e| e.course_id == course_id).count() as i64)
    }

    async fn ping(&self) -> Result<(), sqlx::Error> {
        Ok(())
    }
}

pub fn canvas(server: &httpmock::MockServer) -> CanvasClient {
    CanvasClient::new(server.base_url(), "DUMMY", 100).unwrap()
}
