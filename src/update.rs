use serde_json::Value;

use crate::canvas::CanvasClient;
use crate::catalog::fetch_catalog;
use crate::error::JobError;
use crate::extend::extend_quiz;
use crate::jobs::{JobMeta, Progress, ProgressSink};
use crate::models::{ExtensionRequest, QuizChange, UnchangedQuiz};
use crate::repo::Repository;

/// Gives the requested students `percent`% time on every quiz in the course.
///
/// `request` is the raw JSON body, e.g. `{"percent": "300", "user_ids": ["0123456"]}`.
/// Always returns the final progress record.
pub async fn update_background(
    canvas: &CanvasClient,
    repo: &dyn Repository,
    sink: &dyn ProgressSink,
    course_id: i64,
    request: Option<Value>,
) -> JobMeta {
    let mut progress = Progress::start(sink);

    match run(canvas, repo, &mut progress, course_id, request).await {
        Ok(message) => progress.complete(message),
        Err(e) => {
            match &e {
                JobError::Extension(_) => tracing::error!(course_id, error = %e, "extension failed"),
                _ => tracing::warn!(course_id, error = %e, "update failed"),
            }
            progress.fail(e.to_string())
        }
    }
}

async fn run(
    canvas: &CanvasClient,
    repo: &dyn Repository,
    progress: &mut Progress<'_>,
    course_id: i64,
    request: Option<Value>,
) -> Result<String, JobError> {
    let request: ExtensionRequest = match request {
        Some(body) if !body.is_null() => serde_json::from_value(body).map_err(|e| {
            tracing::warn!(course_id, error = %e, "invalid update request");
            JobError::InvalidRequest
        })?,
        _ => return Err(JobError::InvalidRequest),
    };

    let course_obj = canvas.get_course(course_id).await.map_err(|e| {
        if e.is_not_found() {
            JobError::CourseNotFound
        } else {
            JobError::Canvas(e)
        }
    })?;

    let (course, _) = repo.get_or_create_course(course_id).await?;
    repo.set_course_name(course.id, &course_obj.name).await?;

    let Some(percent) = request.percent() else {
        return Err(JobError::PercentRequired);
    };

    let mut user_ids = Vec::with_capacity(request.user_ids.len());
    for &user_id in &request.user_ids {
        let canvas_user = match canvas.get_user(course_id, user_id, false).await {
            Ok(u) => u,
            Err(e) if e.is_not_found() => {
                tracing::warn!(user_id, course_id, "Unable to find user in course, skipping");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let (user, _) = repo.get_or_create_user(user_id).await?;
        repo.update_user(user.id, canvas_user.display_name(), canvas_user.sis_user_id.as_deref())
            .await?;

        repo.upsert_extension(course.id, user.id, percent).await?;
        user_ids.push(user_id);
    }

    let catalog = fetch_catalog(canvas, course_id).await?;
    if catalog.is_empty() {
        return Err(JobError::NoQuizzes);
    }
    let num_classic = catalog.classic.len();
    let total = catalog.len();

    let mut quiz_time_list = Vec::new();
    let mut unchanged_quiz_time_list = Vec::new();

    for (index, quiz) in catalog.into_assessments().into_iter().enumerate() {
        let time_limit = quiz.time_limit_minutes();
        if quiz.is_new() {
            tracing::debug!(quiz_id = quiz.id(), ?time_limit, "new quiz time limit in minutes");
        }

        // progress is measured against the classic quiz count
        let denominator = if num_classic > 0 { num_classic } else { total };
        let comp_perc = (index * 100 / denominator).min(100) as u8;
        progress.processing(
            comp_perc,
            format!(
                "Updating quiz #{} - {} [{} of {}]",
                quiz.id(),
                quiz.title(),
                index + 1,
                total
            ),
        );

        let outcome = extend_quiz(canvas, course_id, &quiz, percent, &user_ids).await;
        if !outcome.success {
            return Err(JobError::Extension(outcome.message));
        }

        repo.upsert_quiz(course.id, quiz.id(), quiz.title(), time_limit).await?;

        match outcome.added_time {
            Some(added_time) => quiz_time_list.push(QuizChange {
                title: quiz.title().to_string(),
                added_time,
            }),
            None => unchanged_quiz_time_list.push(UnchangedQuiz {
                title: quiz.title().to_string(),
            }),
        }
    }

    let message = format!(
        "Success! {} {} been updated for {} student(s) to have {}% time. \
         {} {} no time limit and were left unchanged.",
        quiz_time_list.len(),
        quizzes_have(quiz_time_list.len()),
        user_ids.len(),
        percent,
        unchanged_quiz_time_list.len(),
        quizzes_have(unchanged_quiz_time_list.len()),
    );
    progress.set_lists(quiz_time_list, unchanged_quiz_time_list);
    Ok(message)
}

fn quizzes_have(count: usize) -> &'static str {
    if count == 1 {
        "quiz has"
    } else {
        "quizzes have"
    }
}
