use crate::assessment::{Assessment, ClassicQuiz, NewQuiz};
use crate::canvas::CanvasClient;
use crate::error::JobError;
use crate::models::Course;
use crate::repo::Repository;

/// Live quizzes of a course, both engines.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub classic: Vec<ClassicQuiz>,
    pub new: Vec<NewQuiz>,
}

impl Catalog {
    pub fn len(&self) -> usize {
        self.classic.len() + self.new.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Classic quizzes first, then New Quizzes.
    pub fn into_assessments(self) -> Vec<Assessment> {
        self.classic
            .into_iter()
            .map(Assessment::Classic)
            .chain(self.new.into_iter().map(Assessment::New))
            .collect()
    }
}

/// Fetches every quiz in the course. New Quizzes are optional: if the
/// installation rejects the request, the course is treated as having none.
pub async fn fetch_catalog(canvas: &CanvasClient, course_id: i64) -> Result<Catalog, JobError> {
    let classic = canvas.list_quizzes(course_id).await?;

    let new = match canvas.list_new_quizzes(course_id).await {
        Ok(quizzes) => quizzes,
        Err(e) => {
            tracing::error!(
                course_id,
                error = %e,
                "Error fetching New Quizzes. Your Canvas installation may not support them."
            );
            Vec::new()
        }
    };

    Ok(Catalog { classic, new })
}

/// Live quizzes with no cached row (missing) or whose cached time limit no
/// longer matches (stale), in catalog order. `quick_check` stops at the first hit.
pub async fn missing_and_stale_quizzes(
    canvas: &CanvasClient,
    repo: &dyn Repository,
    course: &Course,
    quick_check: bool,
) -> Result<Vec<Assessment>, JobError> {
    let catalog = fetch_catalog(canvas, course.canvas_id).await?;
    let mut missing = Vec::new();

    for quiz in catalog.into_assessments() {
        let cached = repo.find_quiz(course.id, quiz.id()).await?;
        let needs_update = match cached {
            None => true,
            Some(row) => row.time_limit != quiz.time_limit_minutes(),
        };

        if needs_update {
            tracing::debug!(quiz_id = quiz.id(), style = %quiz.style(), "quiz is missing or stale");
            missing.push(quiz);
            if quick_check {
                break;
            }
        }
    }

    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{canvas, MemoryRepository};
    use httpmock::prelude::*;
    use serde_json::{json, Value};

    async fn serve_catalog(server: &MockServer, classic: Value, new: Option<Value>) {
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/courses/1/quizzes");
                then.status(200).json_body(classic);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/quiz/v1/courses/1/quizzes");
                match new {
                    Some(body) => then.status(200).json_body(body),
                    None => then.status(500),
                };
            })
            .await;
    }

    fn ids(quizzes: &[Assessment]) -> Vec<i64> {
        quizzes.iter().map(Assessment::id).collect()
    }

    #[tokio::test]
    async fn uncached_quizzes_are_missing() {
        let server = MockServer::start_async().await;
        serve_catalog(
            &server,
            json!([
                {"id": 1, "title": "Quiz 1", "time_limit": 10},
                {"id": 2, "title": "Quiz 2", "time_limit": 30}
            ]),
            None,
        )
        .await;
        let repo = MemoryRepository::default();
        let course = repo.course(1, "Example Course");

        let found = missing_and_stale_quizzes(&canvas(&server), &repo, &course, false)
            .await
            .unwrap();
        assert_eq!(ids(&found), vec![1, 2]);
        assert!(repo.quizzes().is_empty());
    }

    #[tokio::test]
    async fn cached_quizzes_with_matching_limits_are_skipped() {
        let server = MockServer::start_async().await;
        serve_catalog(
            &server,
            json!([
                {"id": 1, "title": "Quiz 1", "time_limit": 10},
                {"id": 2, "title": "Quiz 2", "time_limit": null}
            ]),
            Some(json!([])),
        )
        .await;
        let repo = MemoryRepository::default();
        let course = repo.course(1, "Example Course");
        repo.quiz(&course, 1, Some(10));
        repo.quiz(&course, 2, None);

        let found = missing_and_stale_quizzes(&canvas(&server), &repo, &course, false)
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn changed_time_limits_are_stale() {
        let server = MockServer::start_async().await;
        serve_catalog(
            &server,
            json!([
                {"id": 1, "title": "Quiz 1", "time_limit": 20},
                {"id": 2, "title": "Quiz 2", "time_limit": 15}
            ]),
            None,
        )
        .await;
        let repo = MemoryRepository::default();
        let course = repo.course(1, "Example Course");
        repo.quiz(&course, 1, Some(10));
        repo.quiz(&course, 2, None);

        let found = missing_and_stale_quizzes(&canvas(&server), &repo, &course, false)
            .await
            .unwrap();
        assert_eq!(ids(&found), vec![1, 2]);
    }

    #[tokio::test]
    async fn new_quizzes_compare_in_minutes_after_classic() {
        let server = MockServer::start_async().await;
        serve_catalog(
            &server,
            json!([{"id": 1, "title": "Quiz 1", "time_limit": 10}]),
            Some(json!([
                {"id": 8, "title": "Quiz 8", "quiz_settings": {"session_time_limit_in_seconds": 600, "has_time_limit": true}},
                {"id": 9, "title": "Quiz 9", "quiz_settings": {"session_time_limit_in_seconds": 0, "has_time_limit": false}}
            ])),
        )
        .await;
        let repo = MemoryRepository::default();
        let course = repo.course(1, "Example Course");
        repo.quiz(&course, 8, Some(10));

        let found = missing_and_stale_quizzes(&canvas(&server), &repo, &course, false)
            .await
            .unwrap();
        assert_eq!(ids(&found), vec![1, 9]);
        assert!(!found[0].is_new());
        assert!(found[1].is_new());
    }

    #[tokio::test]
    async fn quick_check_returns_first_hit_only() {
        let server = MockServer::start_async().await;
        serve_catalog(
            &server,
            json!([
                {"id": 1, "title": "Quiz 1", "time_limit": 10},
                {"id": 2, "title": "Quiz 2", "time_limit": 30},
                {"id": 3, "title": "Quiz 3", "time_limit": 45}
            ]),
            None,
        )
        .await;
        let repo = MemoryRepository::default();
        let course = repo.course(1, "Example Course");
        repo.quiz(&course, 1, Some(10));

        let found = missing_and_stale_quizzes(&canvas(&server), &repo, &course, true)
            .await
            .unwrap();
        assert_eq!(ids(&found), vec![2]);
    }

    #[tokio::test]
    async fn unsupported_new_quizzes_count_as_none() {
        let server = MockServer::start_async().await;
        serve_catalog(&server, json!([{"id": 1, "title": "Quiz 1", "time_limit": 10}]), None).await;

        let catalog = fetch_catalog(&canvas(&server), 1).await.unwrap();
        assert_eq!(catalog.classic.len(), 1);
        assert!(catalog.new.is_empty());
        assert_eq!(catalog.len(), 1);
    }
}
