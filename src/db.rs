use async_trait::async_trait;
use sqlx::{query, query_as, query_scalar, Pool, Postgres};
use uuid::Uuid;

use crate::models::{Course, CourseExtension, Extension, Quiz, User};
use crate::repo::Repository;

pub type Db = Pool<Postgres>;

pub async fn connect(url: &str) -> Result<Db, sqlx::Error> {
    Pool::<Postgres>::connect(url).await
}

#[derive(sqlx::FromRow)]
struct UpsertedExtension {
    #[sqlx(flatten)]
    extension: Extension,
    inserted: bool,
}

/// Postgres-backed cache.
#[derive(Clone)]
pub struct PgRepository {
    db: Db,
}

impl PgRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn find_course(&self, canvas_id: i64) -> Result<Option<Course>, sqlx::Error> {
        query_as::<_, Course>("SELECT * FROM courses WHERE canvas_id=$1")
            .bind(canvas_id)
            .fetch_optional(&self.db)
            .await
    }

    async fn get_or_create_course(&self, canvas_id: i64) -> Result<(Course, bool), sqlx::Error> {
        let created = query_as::<_, Course>(
            r#"
            INSERT INTO courses (id, canvas_id) VALUES ($1,$2)
            ON CONFLICT (canvas_id) DO NOTHING
            RETURNING id, canvas_id, course_name, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(canvas_id)
        .fetch_optional(&self.db)
        .await?;

        match created {
            Some(course) => Ok((course, true)),
            None => {
                let course = query_as::<_, Course>("SELECT * FROM courses WHERE canvas_id=$1")
                    .bind(canvas_id)
                    .fetch_one(&self.db)
                    .await?;
                Ok((course, false))
            }
        }
    }

    async fn set_course_name(&self, id: Uuid, name: &str) -> Result<(), sqlx::Error> {
        query("UPDATE courses SET course_name=$2 WHERE id=$1")
            .bind(id)
            .bind(name)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn get_or_create_user(&self, canvas_id: i64) -> Result<(User, bool), sqlx::Error> {
        let created = query_as::<_, User>(
            r#"
            INSERT INTO users (id, canvas_id) VALUES ($1,$2)
            ON CONFLICT (canvas_id) DO NOTHING
            RETURNING id, canvas_id, sortable_name, sis_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(canvas_id)
        .fetch_optional(&self.db)
        .await?;

        match created {
            Some(user) => Ok((user, true)),
            None => {
                let user = query_as::<_, User>("SELECT * FROM users WHERE canvas_id=$1")
                    .bind(canvas_id)
                    .fetch_one(&self.db)
                    .await?;
                Ok((user, false))
            }
        }
    }

    async fn update_user(
        &self,
        id: Uuid,
        sortable_name: &str,
        sis_id: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        query("UPDATE users SET sortable_name=$2, sis_id=$3 WHERE id=$1")
            .bind(id)
            .bind(sortable_name)
            .bind(sis_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn find_quiz(&self, course_id: Uuid, canvas_id: i64) -> Result<Option<Quiz>, sqlx::Error> {
        query_as::<_, Quiz>("SELECT * FROM quizzes WHERE course_id=$1 AND canvas_id=$2")
            .bind(course_id)
            .bind(canvas_id)
            .fetch_optional(&self.db)
            .await
    }

    async fn upsert_quiz(
        &self,
        course_id: Uuid,
        canvas_id: i64,
        title: &str,
        time_limit: Option<i64>,
    ) -> Result<Quiz, sqlx::Error> {
        query_as::<_, Quiz>(
            r#"
            INSERT INTO quizzes (id, course_id, canvas_id, title, time_limit)
            VALUES ($1,$2,$3,$4,$5)
            ON CONFLICT (course_id, canvas_id)
            DO UPDATE SET title=EXCLUDED.title, time_limit=EXCLUDED.time_limit
            RETURNING id, course_id, canvas_id, title, time_limit, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(course_id)
        .bind(canvas_id)
        .bind(title)
        .bind(time_limit)
        .fetch_one(&self.db)
        .await
    }

    async fn upsert_extension(
        &self,
        course_id: Uuid,
        user_id: Uuid,
        percent: i32,
    ) -> Result<(Extension, bool), sqlx::Error> {
        // partial unique index: at most one active row per (course, user)
        let row = query_as::<_, UpsertedExtension>(
            r#"
            INSERT INTO extensions (id, course_id, user_id, percent, active)
            VALUES ($1,$2,$3,$4,true)
            ON CONFLICT (course_id, user_id) WHERE active
            DO UPDATE SET percent=EXCLUDED.percent
            RETURNING id, course_id, user_id, percent, active, created_at, (xmax = 0) AS inserted
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(course_id)
        .bind(user_id)
        .bind(percent)
        .fetch_one(&self.db)
        .await?;
        Ok((row.extension, row.inserted))
    }

    async fn set_extension_active(&self, id: Uuid, active: bool) -> Result<(), sqlx::Error> {
        query("UPDATE extensions SET active=$2 WHERE id=$1")
            .bind(id)
            .bind(active)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn course_extensions(&self, course_id: Uuid) -> Result<Vec<CourseExtension>, sqlx::Error> {
        query_as::<_, CourseExtension>(
            r#"
            SELECT e.id, e.percent, e.active, u.canvas_id AS user_canvas_id, u.sortable_name
            FROM extensions e
            JOIN users u ON u.id = e.user_id
            WHERE e.course_id=$1
            ORDER BY e.created_at, e.id
            "#,
        )
        .bind(course_id)
        .fetch_all(&self.db)
        .await
    }

    async fn count_extensions(&self, course_id: Uuid) -> Result<i64, sqlx::Error> {
        query_scalar::<_, i64>("SELECT COUNT(*) FROM extensions WHERE course_id=$1")
            .bind(course_id)
            .fetch_one(&self.db)
            .await
    }

    async fn ping(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }
}
