use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    canvas::{CanvasClient, CanvasUser},
    catalog::missing_and_stale_quizzes,
    error::CanvasError,
    jobs::{JobQueue, JobState},
    refresh::refresh_background,
    repo::Repository,
    update::update_background,
};

#[derive(Clone)]
pub struct AppState {
    pub canvas: CanvasClient,
    pub repo: Arc<dyn Repository>,
    pub queue: Arc<JobQueue>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        // background jobs
        .route("/refresh/:course_id", post(refresh))
        .route("/update/:course_id", post(update))
        .route("/jobs/:job_key", get(job_status))
        // course helpers
        .route("/missing_and_stale_quizzes/:course_id", get(missing_and_stale))
        .route("/filter/:course_id", get(filter))
        .with_state(state)
}

fn job_url(id: Uuid) -> String {
    format!("/jobs/{id}")
}

fn enqueue_refresh(state: &AppState, course_id: i64) -> Uuid {
    let canvas = state.canvas.clone();
    let repo = Arc::clone(&state.repo);
    state.queue.enqueue("refresh", None, move |reporter| async move {
        refresh_background(&canvas, repo.as_ref(), &reporter, course_id).await
    })
}

async fn refresh(State(state): State<AppState>, Path(course_id): Path<i64>) -> impl IntoResponse {
    let refresh_id = enqueue_refresh(&state, course_id);
    (StatusCode::ACCEPTED, Json(json!({ "refresh_job_url": job_url(refresh_id) })))
}

/// Refreshes the course first, then applies the new extension once the
/// refresh has settled.
async fn update(
    State(state): State<AppState>,
    Path(course_id): Path<i64>,
    body: Bytes,
) -> impl IntoResponse {
    // A malformed body still gets a job, which reports "Invalid Request."
    let request: Option<Value> = if body.is_empty() {
        None
    } else {
        serde_json::from_slice(&body).ok()
    };

    let refresh_id = enqueue_refresh(&state, course_id);

    let canvas = state.canvas.clone();
    let repo = Arc::clone(&state.repo);
    let update_id = state.queue.enqueue("update", Some(refresh_id), move |reporter| async move {
        update_background(&canvas, repo.as_ref(), &reporter, course_id, request).await
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "refresh_job_url": job_url(refresh_id),
            "update_job_url": job_url(update_id),
        })),
    )
}

async fn job_status(State(state): State<AppState>, Path(job_key): Path<String>) -> Response {
    let snapshot = Uuid::parse_str(&job_key)
        .ok()
        .and_then(|id| state.queue.snapshot(id));

    let Some(snapshot) = snapshot else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": true, "status_msg": format!("{job_key} is not a valid job key.") })),
        )
            .into_response();
    };

    let code = match snapshot.state {
        JobState::Finished => StatusCode::OK,
        JobState::Crashed => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": true, "status_msg": format!("Job {job_key} failed to complete.") })),
            )
                .into_response();
        }
        JobState::Queued | JobState::Running => StatusCode::ACCEPTED,
    };

    match snapshot.meta {
        Some(meta) => (code, Json(meta)).into_response(),
        None => (code, Json(json!({}))).into_response(),
    }
}

/// `true` when the course has extensions and at least one quiz is uncached
/// or has a changed time limit.
async fn missing_and_stale(
    State(state): State<AppState>,
    Path(course_id): Path<i64>,
) -> Result<Json<bool>, (StatusCode, String)> {
    let Some(course) = state.repo.find_course(course_id).await.map_err(e500)? else {
        return Ok(Json(false));
    };
    if state.repo.count_extensions(course.id).await.map_err(e500)? == 0 {
        return Ok(Json(false));
    }

    let found = missing_and_stale_quizzes(&state.canvas, state.repo.as_ref(), &course, true)
        .await
        .map_err(e500)?;
    Ok(Json(!found.is_empty()))
}

#[derive(Deserialize)]
struct FilterParams {
    #[serde(default)]
    query: String,
}

async fn filter(
    State(state): State<AppState>,
    Path(course_id): Path<i64>,
    Query(params): Query<FilterParams>,
) -> Result<Json<Vec<CanvasUser>>, (StatusCode, String)> {
    let students = state
        .canvas
        .list_students(course_id, &params.query.to_lowercase())
        .await
        .map_err(canvas_error)?;
    Ok(Json(students))
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    let api_key = state.canvas.check_api_key().await;
    let db = match state.repo.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error=%e, "database check failed");
            false
        }
    };

    Json(json!({
        "tool": "Quiz Extensions",
        "checks": { "api_key": api_key, "db": db },
        "api_url": state.canvas.base_url(),
        "job_queue": state.queue.pending(),
        "healthy": api_key && db,
    }))
}

// --- helpers ---
fn canvas_error(e: CanvasError) -> (StatusCode, String) {
    if e.is_not_found() {
        return (StatusCode::NOT_FOUND, "Course not found.".into());
    }
    e500(e)
}

fn e500<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    tracing::error!(error=%e, "internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
