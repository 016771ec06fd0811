use http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
    #[error("{name} must be a number, got {value:?}")]
    NotANumber { name: &'static str, value: String },
}

/// Failures talking to Canvas.
///
/// The `Display` form of a status error is the status description Canvas
/// reported, so it can be embedded directly into user-facing messages.
#[derive(Error, Debug)]
pub enum CanvasError {
    #[error("Not Found")]
    NotFound,
    #[error("{message}")]
    Status { status: StatusCode, message: String },
    #[error("{failed} accommodation(s) were rejected")]
    Rejected { failed: usize },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl CanvasError {
    pub fn from_status(status: StatusCode) -> Self {
        if status == StatusCode::NOT_FOUND {
            return CanvasError::NotFound;
        }
        let message = status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| status.as_str().to_string());
        CanvasError::Status { status, message }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CanvasError::NotFound)
    }
}

/// Terminal outcomes of a background job. `Display` is the exact status
/// message shown to the instructor.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Invalid Request.")]
    InvalidRequest,
    #[error("Course not found.")]
    CourseNotFound,
    #[error("`percent` field required.")]
    PercentRequired,
    #[error("Sorry, there are no quizzes for this course.")]
    NoQuizzes,
    #[error("{0}")]
    Extension(String),
    #[error("Canvas request failed: {0}")]
    Canvas(#[from] CanvasError),
    #[error("Database error: {0}")]
    Store(#[from] sqlx::Error),
}
