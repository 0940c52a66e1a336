use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::Question;

/// What a grader sees: the question, the gold answer with its accepted
/// aliases, and the user's reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeRequest {
    pub question: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    pub response: String,
}

impl GradeRequest {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            aliases: Vec::new(),
            response: response.into(),
        }
    }

    pub fn for_question(question: &Question, response: impl Into<String>) -> Self {
        Self {
            question: question.prompt.clone(),
            answer: question.answer.clone(),
            aliases: question.aliases.clone().unwrap_or_default(),
            response: response.into(),
        }
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    /// Gold answer followed by every accepted alias.
    pub fn accepted_answers(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.answer.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeResponse {
    pub correct: bool,
}

/// A grading failure. Never a judgment: callers must not treat it as
/// either correct or incorrect.
#[derive(Debug, Error)]
pub enum GradeError {
    #[error("grader is not configured: {0}")]
    NotConfigured(String),

    #[error("invalid grade request: {0}")]
    InvalidRequest(String),

    #[error("grader transport failed: {0}")]
    Transport(String),

    #[error("grader returned status {0}")]
    Status(u16),

    #[error("grader reply could not be parsed: {0}")]
    InvalidReply(String),
}

impl GradeError {
    /// Whether asking again might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::InvalidReply(_) => true,
            Self::Status(code) => *code == 429 || *code >= 500,
            Self::NotConfigured(_) | Self::InvalidRequest(_) => false,
        }
    }
}

pub trait Grader {
    fn grade(&self, request: &GradeRequest) -> Result<bool, GradeError>;
}

/// Case- and whitespace-insensitive comparison against the gold answer and
/// its aliases.
pub fn is_answer_correct(question: &Question, response: &str) -> bool {
    matches_any(question.accepted_answers(), response)
}

fn matches_any<'a>(accepted: impl IntoIterator<Item = &'a str>, response: &str) -> bool {
    let response = normalize_answer(response);
    accepted
        .into_iter()
        .map(normalize_answer)
        .any(|accepted| !accepted.is_empty() && accepted == response)
}

fn normalize_answer(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Local, offline grader applying the [`is_answer_correct`] rule to a request.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactMatchGrader;

impl Grader for ExactMatchGrader {
    fn grade(&self, request: &GradeRequest) -> Result<bool, GradeError> {
        if request.answer.is_empty() {
            return Err(GradeError::InvalidRequest("missing gold answer".into()));
        }
        Ok(matches_any(request.accepted_answers(), &request.response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::QuestionKind;

    fn make_question(answer: &str, aliases: Option<Vec<&str>>) -> Question {
        Question {
            id: "q".into(),
            kind: QuestionKind::ShortText,
            prompt: "Where did I move?".into(),
            answer: answer.into(),
            aliases: aliases.map(|a| a.into_iter().map(String::from).collect()),
            date: None,
        }
    }

    #[test]
    fn test_is_answer_correct() {
        let q = make_question("Denver", Some(vec!["Denver, CO"]));
        assert!(is_answer_correct(&q, "denver"));
        assert!(is_answer_correct(&q, "  DENVER, co "));
        assert!(!is_answer_correct(&q, "Boulder"));
        assert!(!is_answer_correct(&q, ""));

        let blank = make_question("", None);
        assert!(!is_answer_correct(&blank, ""));
    }

    #[test]
    fn test_exact_match_grader() {
        let q = make_question("True", None);
        let grader = ExactMatchGrader;
        assert!(grader.grade(&GradeRequest::for_question(&q, "true")).unwrap());
        assert!(!grader.grade(&GradeRequest::for_question(&q, "false")).unwrap());
    }

    #[test]
    fn test_exact_match_grader_accepts_aliases() {
        let q = make_question("Denver", Some(vec!["Denver, CO", "Mile High City"]));
        let grader = ExactMatchGrader;
        for response in ["denver", "denver, co", " MILE HIGH CITY "] {
            let request = GradeRequest::for_question(&q, response);
            assert_eq!(
                grader.grade(&request).unwrap(),
                is_answer_correct(&q, response),
                "{response}"
            );
            assert!(grader.grade(&request).unwrap(), "{response}");
        }
        assert!(!grader.grade(&GradeRequest::for_question(&q, "Boulder")).unwrap());

        let manual = GradeRequest::new("Where?", "Paris", "paris, france")
            .with_aliases(vec!["Paris, France".into()]);
        assert!(grader.grade(&manual).unwrap());
    }

    #[test]
    fn test_grade_request_wire_shape() {
        let plain = serde_json::to_value(GradeRequest::new("q", "a", "r")).unwrap();
        assert!(plain.get("aliases").is_none());
        let back: GradeRequest =
            serde_json::from_str(r#"{"question":"q","answer":"a","response":"r"}"#).unwrap();
        assert!(back.aliases.is_empty());
    }

    #[test]
    fn test_exact_match_grader_rejects_missing_gold() {
        let q = make_question("", None);
        let err = ExactMatchGrader
            .grade(&GradeRequest::for_question(&q, "x"))
            .unwrap_err();
        assert!(matches!(err, GradeError::InvalidRequest(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(GradeError::Transport("reset".into()).is_retryable());
        assert!(GradeError::Status(503).is_retryable());
        assert!(GradeError::Status(429).is_retryable());
        assert!(!GradeError::Status(401).is_retryable());
        assert!(!GradeError::NotConfigured("no key".into()).is_retryable());
    }
}
