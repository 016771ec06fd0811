use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::assessment::{ClassicQuiz, NewQuiz};
use crate::error::CanvasError;

#[derive(Deserialize, Debug, Clone)]
pub struct CanvasCourse {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CanvasUser {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sortable_name: Option<String>,
    #[serde(default)]
    pub sis_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollments: Option<Vec<Enrollment>>,
}

impl CanvasUser {
    /// Canvas falls back to the display name when no sortable name is set.
    pub fn display_name(&self) -> &str {
        self.sortable_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Enrollment {
    #[serde(default)]
    pub course_id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: String,
    pub enrollment_state: String,
}

impl Enrollment {
    pub fn is_current_student(&self) -> bool {
        self.kind == "StudentEnrollment"
            && matches!(self.enrollment_state.as_str(), "active" | "invited")
    }
}

/// One row of an extension/accommodation batch.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct QuizExtension {
    pub user_id: i64,
    pub extra_time: i64,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct AccommodationResult {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub successful: Vec<Value>,
    #[serde(default)]
    pub failed: Vec<Value>,
}

/// How a paginated listing treats an error page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnErrorPage {
    /// Stop following links and keep what was collected so far.
    Stop,
    Fail,
}

/// Thin client over the Canvas REST API.
#[derive(Clone)]
pub struct CanvasClient {
    http: Client,
    base_url: String,
    api_key: String,
    per_page: u32,
}

impl CanvasClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        per_page: u32,
    ) -> Result<Self, CanvasError> {
        let http = Client::builder()
            .user_agent(concat!("quiz-extensions/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            per_page,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Response, CanvasError> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .query(query)
            .send()
            .await?;
        ensure_success(resp)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, CanvasError> {
        let resp = self.get(&self.url(path), query).await?;
        Ok(resp.json().await?)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, CanvasError> {
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        Ok(ensure_success(resp)?.json().await?)
    }

    /// Follows `rel="next"` links until exhausted.
    async fn get_paginated<T: DeserializeOwned>(
        &self,
        path: &str,
        mut query: Vec<(&str, String)>,
        on_error: OnErrorPage,
    ) -> Result<Vec<T>, CanvasError> {
        query.push(("per_page", self.per_page.to_string()));
        let mut items = Vec::new();
        let mut url = self.url(path);
        let mut first = true;

        loop {
            // next links already carry the query string
            let params: &[(&str, String)] = if first { &query[..] } else { &[] };
            first = false;

            let resp = self
                .http
                .get(&url)
                .bearer_auth(&self.api_key)
                .query(params)
                .send()
                .await?;

            let status = resp.status();
            let next = next_link(resp.headers());

            if !status.is_success() {
                if on_error == OnErrorPage::Stop {
                    tracing::warn!(%url, %status, "stopping pagination on error page");
                    break;
                }
                return Err(CanvasError::from_status(status));
            }

            let page: Value = resp.json().await?;
            if page.get("errors").is_some() {
                if on_error == OnErrorPage::Stop {
                    tracing::warn!(%url, "stopping pagination on error payload");
                    break;
                }
                return Err(CanvasError::Status {
                    status,
                    message: error_message(&page),
                });
            }
            let batch: Vec<T> = serde_json::from_value(page).map_err(|e| CanvasError::Status {
                status,
                message: format!("unexpected response: {e}"),
            })?;
            items.extend(batch);

            match next {
                Some(link) => url = link,
                None => break,
            }
        }

        Ok(items)
    }

    pub async fn get_course(&self, course_id: i64) -> Result<CanvasCourse, CanvasError> {
        self.get_json(&format!("/api/v1/courses/{course_id}"), &[]).await
    }

    /// All classic quizzes in a course. An error page ends the listing early
    /// instead of failing it.
    pub async fn list_quizzes(&self, course_id: i64) -> Result<Vec<ClassicQuiz>, CanvasError> {
        self.get_paginated(
            &format!("/api/v1/courses/{course_id}/quizzes"),
            Vec::new(),
            OnErrorPage::Stop,
        )
        .await
    }

    /// All New Quizzes in a course. Installations without New Quizzes answer
    /// with an error, which is returned to the caller.
    pub async fn list_new_quizzes(&self, course_id: i64) -> Result<Vec<NewQuiz>, CanvasError> {
        self.get_paginated(
            &format!("/api/quiz/v1/courses/{course_id}/quizzes"),
            Vec::new(),
            OnErrorPage::Fail,
        )
        .await
    }

    pub async fn get_quiz(&self, course_id: i64, quiz_id: i64) -> Result<ClassicQuiz, CanvasError> {
        self.get_json(&format!("/api/v1/courses/{course_id}/quizzes/{quiz_id}"), &[])
            .await
    }

    pub async fn get_new_quiz(&self, course_id: i64, quiz_id: i64) -> Result<NewQuiz, CanvasError> {
        self.get_json(&format!("/api/quiz/v1/courses/{course_id}/quizzes/{quiz_id}"), &[])
            .await
    }

    pub async fn get_user(
        &self,
        course_id: i64,
        user_id: i64,
        include_enrollments: bool,
    ) -> Result<CanvasUser, CanvasError> {
        let query = if include_enrollments {
            vec![("include[]", "enrollments".to_string())]
        } else {
            Vec::new()
        };
        self.get_json(&format!("/api/v1/courses/{course_id}/users/{user_id}"), &query)
            .await
    }

    pub async fn get_user_enrollments(&self, user_id: i64) -> Result<Vec<Enrollment>, CanvasError> {
        self.get_paginated(
            &format!("/api/v1/users/{user_id}/enrollments"),
            Vec::new(),
            OnErrorPage::Fail,
        )
        .await
    }

    /// Active and invited students in a course, optionally narrowed by a search term.
    pub async fn list_students(
        &self,
        course_id: i64,
        search_term: &str,
    ) -> Result<Vec<CanvasUser>, CanvasError> {
        let mut query = vec![
            ("enrollment_type[]", "student".to_string()),
            ("enrollment_state[]", "active".to_string()),
            ("enrollment_state[]", "invited".to_string()),
        ];
        if !search_term.is_empty() {
            query.push(("search_term", search_term.to_string()));
        }
        self.get_paginated(
            &format!("/api/v1/courses/{course_id}/users"),
            query,
            OnErrorPage::Fail,
        )
        .await
    }

    pub async fn create_quiz_extensions(
        &self,
        course_id: i64,
        quiz_id: i64,
        extensions: &[QuizExtension],
    ) -> Result<Vec<Value>, CanvasError> {
        #[derive(Serialize)]
        struct Body<'a> {
            quiz_extensions: &'a [QuizExtension],
        }
        #[derive(Deserialize)]
        struct Created {
            #[serde(default)]
            quiz_extensions: Vec<Value>,
        }

        let created: Created = self
            .post_json(
                &format!("/api/v1/courses/{course_id}/quizzes/{quiz_id}/extensions"),
                &Body { quiz_extensions: extensions },
            )
            .await?;
        Ok(created.quiz_extensions)
    }

    pub async fn set_accommodations(
        &self,
        course_id: i64,
        quiz_id: i64,
        accommodations: &[QuizExtension],
    ) -> Result<AccommodationResult, CanvasError> {
        let result: AccommodationResult = self
            .post_json(
                &format!("/api/quiz/v1/courses/{course_id}/quizzes/{quiz_id}/accommodations"),
                accommodations,
            )
            .await?;
        if !result.failed.is_empty() {
            return Err(CanvasError::Rejected { failed: result.failed.len() });
        }
        Ok(result)
    }

    pub async fn check_api_key(&self) -> bool {
        match self.get(&self.url("/api/v1/users/self"), &[]).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error=%e, "API key check failed");
                false
            }
        }
    }
}

fn ensure_success(resp: Response) -> Result<Response, CanvasError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(CanvasError::from_status(status))
    }
}

fn error_message(page: &Value) -> String {
    page.get("errors")
        .and_then(|e| e.get(0))
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("Canvas returned an error")
        .to_string()
}

/// Extracts the `rel="next"` target from a `Link` header.
fn next_link(headers: &header::HeaderMap) -> Option<String> {
    let value = headers.get(header::LINK)?.to_str().ok()?;
    value.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let target = target.strip_prefix('<')?.strip_suffix('>')?;
        pieces
            .any(|p| p.trim() == r#"rel="next""#)
            .then(|| target.to_string())
    })
}
