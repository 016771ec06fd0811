use serde::Serialize;

use crate::assessment::Assessment;
use crate::canvas::{CanvasClient, QuizExtension};

/// Result of extending one quiz for a batch of students.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ExtendOutcome {
    pub success: bool,
    pub message: String,
    /// Minutes added per student, `None` when nothing was added.
    pub added_time: Option<i64>,
}

/// Extra minutes for a quiz of `time_limit` minutes at `percent` of normal time.
/// 200 is double time, 100 is normal time.
pub fn added_minutes(time_limit: Option<i64>, percent: i32) -> Option<i64> {
    let limit = time_limit.filter(|t| *t >= 1)?;
    let extra = limit as f64 * (f64::from(percent) - 100.0) / 100.0;
    Some(extra.ceil() as i64)
}

/// Gives every listed student `percent`% of the quiz's time limit, using the
/// submission endpoint that matches the quiz style.
pub async fn extend_quiz(
    canvas: &CanvasClient,
    course_id: i64,
    quiz: &Assessment,
    percent: i32,
    user_ids: &[i64],
) -> ExtendOutcome {
    let tag = quiz.style();
    let quiz_id = quiz.id();

    let Some(added_time) = added_minutes(quiz.time_limit_minutes(), percent) else {
        return ExtendOutcome {
            success: true,
            message: format!("{tag} Quiz #{quiz_id} has no time limit, so there is no time to add."),
            added_time: None,
        };
    };

    let extensions: Vec<QuizExtension> = user_ids
        .iter()
        .map(|&user_id| QuizExtension { user_id, extra_time: added_time })
        .collect();

    let submitted = match quiz {
        Assessment::Classic(_) => canvas
            .create_quiz_extensions(course_id, quiz_id, &extensions)
            .await
            .map(|_| ()),
        Assessment::New(_) => canvas
            .set_accommodations(course_id, quiz_id, &extensions)
            .await
            .map(|_| ()),
    };

    match submitted {
        Ok(()) => ExtendOutcome {
            success: true,
            message: format!("Successfully added {added_time} minutes to {tag} Quiz #{quiz_id}"),
            added_time: Some(added_time),
        },
        Err(e) => {
            tracing::warn!(course_id, quiz_id, style = %tag, error = %e, "extension request rejected");
            ExtendOutcome {
                success: false,
                message: format!(
                    "Error creating extension for {tag} Quiz #{quiz_id}. Canvas status code: {e}"
                ),
                added_time: None,
            }
        }
    }
}
