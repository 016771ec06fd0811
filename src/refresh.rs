use crate::canvas::{CanvasClient, CanvasUser, Enrollment};
use crate::catalog::missing_and_stale_quizzes;
use crate::error::{CanvasError, JobError};
use crate::extend::extend_quiz;
use crate::jobs::{JobMeta, Progress, ProgressSink};
use crate::repo::Repository;

/// Re-applies stored extensions to quizzes that are new or whose time limit
/// changed since they were last seen. Always returns the final progress record.
pub async fn refresh_background(
    canvas: &CanvasClient,
    repo: &dyn Repository,
    sink: &dyn ProgressSink,
    course_id: i64,
) -> JobMeta {
    let mut progress = Progress::start(sink);

    match run(canvas, repo, &mut progress, course_id).await {
        Ok(message) => progress.complete(message),
        Err(e) => {
            tracing::warn!(course_id, error = %e, "refresh failed");
            progress.fail(e.to_string())
        }
    }
}

async fn run(
    canvas: &CanvasClient,
    repo: &dyn Repository,
    progress: &mut Progress<'_>,
    course_id: i64,
) -> Result<String, JobError> {
    let (course, _) = repo.get_or_create_course(course_id).await?;
    let course_obj = match canvas.get_course(course_id).await {
        Ok(c) => c,
        Err(e) if e.is_not_found() => return Err(JobError::CourseNotFound),
        Err(e) => return Err(e.into()),
    };
    repo.set_course_name(course.id, &course_obj.name).await?;

    let quizzes = missing_and_stale_quizzes(canvas, repo, &course, false).await?;
    if quizzes.is_empty() {
        return Ok("Complete. No quizzes required updates.".to_string());
    }

    progress.processing(0, "Getting past extensions.");

    // percentage groups in first-seen order
    let mut percent_groups: Vec<(i32, Vec<i64>)> = Vec::new();
    let mut inactive_list: Vec<String> = Vec::new();

    for extension in repo.course_extensions(course.id).await? {
        let mut name = extension.sortable_name.clone().unwrap_or_default();
        if !extension.active {
            tracing::debug!(extension = %extension.id, "extension is inactive");
            inactive_list.push(name);
            continue;
        }

        let user_id = extension.user_canvas_id;
        let still_student = match canvas.get_user(course_id, user_id, true).await {
            Ok(user) => {
                let (cached, _) = repo.get_or_create_user(user_id).await?;
                repo.update_user(cached.id, user.display_name(), user.sis_user_id.as_deref())
                    .await?;
                name = user.display_name().to_string();

                let enrollments = course_enrollments(canvas, course_id, user).await?;
                let current = enrollments.iter().any(Enrollment::is_current_student);
                if !current {
                    let roles: Vec<&str> = enrollments
                        .iter()
                        .filter(|e| matches!(e.enrollment_state.as_str(), "active" | "invited"))
                        .map(|e| e.kind.as_str())
                        .collect();
                    tracing::info!(
                        user_id,
                        course_id,
                        extension = %extension.id,
                        roles = %roles.join(", "),
                        "user is not an active student, deactivating extension"
                    );
                }
                current
            }
            Err(e) if e.is_not_found() => {
                tracing::info!(
                    user_id,
                    course_id,
                    extension = %extension.id,
                    "user not in course, deactivating extension"
                );
                false
            }
            Err(e) => return Err(e.into()),
        };

        if !still_student {
            repo.set_extension_active(extension.id, false).await?;
            inactive_list.push(name);
            continue;
        }

        match extension.percent {
            Some(percent) => match percent_groups.iter_mut().find(|(p, _)| *p == percent) {
                Some((_, users)) => users.push(user_id),
                None => percent_groups.push((percent, vec![user_id])),
            },
            None => tracing::warn!(extension = %extension.id, "active extension has no percentage"),
        }
    }

    if percent_groups.is_empty() {
        let mut msg = String::from("No active extensions were found.<br>");
        if !inactive_list.is_empty() {
            msg.push_str("Extensions for the following students are inactive:<br>");
            msg.push_str(&inactive_list.join("<br>"));
        }
        return Ok(msg);
    }

    let num_quizzes = quizzes.len();
    for (index, quiz) in quizzes.iter().enumerate() {
        let comp_perc = (index * 100 / num_quizzes) as u8;
        progress.processing(
            comp_perc,
            format!(
                "Refreshing quiz #{} - {} [{} of {}]",
                quiz.id(),
                quiz.title(),
                index + 1,
                num_quizzes
            ),
        );

        for (percent, user_list) in &percent_groups {
            let percent = *percent;
            let outcome = extend_quiz(canvas, course_id, quiz, percent, user_list).await;
            if !outcome.success {
                return Err(JobError::Extension(format!(
                    "Some quizzes couldn't be updated. {}",
                    outcome.message
                )));
            }
            repo.upsert_quiz(course.id, quiz.id(), quiz.title(), quiz.time_limit_minutes())
                .await?;
        }
    }

    Ok(format!("{num_quizzes} quizzes have been updated."))
}

/// The user's enrollments in this course. Uses the enrollments embedded in the
/// user record when Canvas sent them, otherwise asks for them directly.
async fn course_enrollments(
    canvas: &CanvasClient,
    course_id: i64,
    user: CanvasUser,
) -> Result<Vec<Enrollment>, CanvasError> {
    let enrollments = match user.enrollments {
        Some(enrollments) => enrollments,
        None => canvas.get_user_enrollments(user.id).await?,
    };
    Ok(enrollments
        .into_iter()
        .filter(|e| e.course_id.map_or(true, |id| id == course_id))
        .collect())
}
