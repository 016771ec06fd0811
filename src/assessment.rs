use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use std::fmt;

/// Which Canvas quiz engine an assessment belongs to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuizStyle {
    Classic,
    New,
}

impl fmt::Display for QuizStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuizStyle::Classic => f.write_str("Classic"),
            QuizStyle::New => f.write_str("New"),
        }
    }
}

/// A quiz as returned by `/api/v1/courses/:id/quizzes`. Time limit is in minutes.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClassicQuiz {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub time_limit: Option<i64>,
}

/// A quiz as returned by `/api/quiz/v1/courses/:id/quizzes`.
#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NewQuiz {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub quiz_settings: Option<QuizSettings>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct QuizSettings {
    #[serde(default)]
    pub has_time_limit: bool,
    #[serde(default)]
    pub session_time_limit_in_seconds: Option<i64>,
}

/// New Quizzes report their limit in seconds behind an explicit flag. Converts
/// to whole minutes (rounding up), or 0 when the quiz has no limit.
pub fn normalized_time_limit_minutes(settings: Option<&QuizSettings>) -> i64 {
    match settings {
        Some(s) if s.has_time_limit => {
            let seconds = s.session_time_limit_in_seconds.unwrap_or(0).max(0);
            (seconds + 59) / 60
        }
        _ => 0,
    }
}

/// One entry of the unified course catalog.
#[derive(Debug, Clone)]
pub enum Assessment {
    Classic(ClassicQuiz),
    New(NewQuiz),
}

impl Assessment {
    pub fn id(&self) -> i64 {
        match self {
            Assessment::Classic(q) => q.id,
            Assessment::New(q) => q.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Assessment::Classic(q) => &q.title,
            Assessment::New(q) => &q.title,
        }
    }

    pub fn style(&self) -> QuizStyle {
        match self {
            Assessment::Classic(_) => QuizStyle::Classic,
            Assessment::New(_) => QuizStyle::New,
        }
    }

    pub fn is_new(&self) -> bool {
        self.style() == QuizStyle::New
    }

    /// Time limit in minutes. `None` only occurs for classic quizzes without a limit.
    pub fn time_limit_minutes(&self) -> Option<i64> {
        match self {
            Assessment::Classic(q) => q.time_limit,
            Assessment::New(q) => Some(normalized_time_limit_minutes(q.quiz_settings.as_ref())),
        }
    }
}
