//! Free-text grading through an OpenAI-compatible chat completions API.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::warn;

use memquiz_core::{GradeError, GradeRequest, GradeResponse, Grader};

use crate::config::GraderConfig;

const SYSTEM_PROMPT: &str = "\
You are grading a human answer against a ground-truth answer. \
Return JSON only: {\"correct\": true|false}. \
Mark correct when the meaning matches, even if phrased differently. \
Mark incorrect when the meaning differs or is missing key facts.";

pub struct LlmGrader {
    agent: ureq::Agent,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl LlmGrader {
    pub fn from_config(config: &GraderConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::new(config, api_key)
    }

    pub fn new(config: &GraderConfig, api_key: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        Self {
            agent,
            url: format!("{}/chat/completions", config.endpoint.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
        }
    }

    fn request_body(&self, request: &GradeRequest) -> Value {
        let mut prompt = format!(
            "Question: {}\nGround truth answer: {}\n",
            request.question, request.answer
        );
        if !request.aliases.is_empty() {
            prompt.push_str(&format!("Also accepted: {}\n", request.aliases.join("; ")));
        }
        prompt.push_str(&format!("User answer: {}", request.response));

        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ],
            "temperature": 0,
            "response_format": { "type": "json_object" }
        })
    }
}

impl Grader for LlmGrader {
    fn grade(&self, request: &GradeRequest) -> Result<bool, GradeError> {
        if request.question.is_empty() || request.answer.is_empty() {
            return Err(GradeError::InvalidRequest(
                "question and answer are required".into(),
            ));
        }
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GradeError::NotConfigured("missing API key".into()))?;

        let response = self
            .agent
            .post(&self.url)
            .set("Authorization", &format!("Bearer {key}"))
            .send_json(self.request_body(request))
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => GradeError::Status(code),
                ureq::Error::Transport(t) => GradeError::Transport(t.to_string()),
            })?;

        let body: Value = response
            .into_json()
            .map_err(|e| GradeError::InvalidReply(e.to_string()))?;
        let verdict = parse_completion(&body);
        if let Err(e) = &verdict {
            warn!("grader reply rejected: {e}");
        }
        verdict
    }
}

/// Pull `{"correct": bool}` out of a chat completion. A missing or
/// non-boolean verdict is an error, not a "no".
pub fn parse_completion(body: &Value) -> Result<bool, GradeError> {
    let content = body
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| GradeError::InvalidReply("no message content".into()))?;
    let parsed: GradeResponse = serde_json::from_str(content.trim())
        .map_err(|e| GradeError::InvalidReply(format!("{e}: {content}")))?;
    Ok(parsed.correct)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(content: &str) -> Value {
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
    }

    #[test]
    fn test_parse_completion_verdicts() {
        assert!(parse_completion(&completion(r#"{"correct": true}"#)).unwrap());
        assert!(!parse_completion(&completion(r#" {"correct": false} "#)).unwrap());
    }

    #[test]
    fn test_parse_completion_failures_are_errors() {
        for body in [
            json!({}),
            json!({"choices": []}),
            completion("not json"),
            completion(r#"{"verdict": "yes"}"#),
            completion(r#"{"correct": "true"}"#),
        ] {
            let err = parse_completion(&body).unwrap_err();
            assert!(matches!(err, GradeError::InvalidReply(_)), "{body}");
        }
    }

    #[test]
    fn test_missing_key_is_not_configured() {
        let grader = LlmGrader::new(&GraderConfig::default(), None);
        let req = GradeRequest::new("q", "a", "r");
        assert!(matches!(
            grader.grade(&req),
            Err(GradeError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_invalid_request_checked_first() {
        let grader = LlmGrader::new(&GraderConfig::default(), Some("k".into()));
        let req = GradeRequest::new("", "a", "r");
        assert!(matches!(
            grader.grade(&req),
            Err(GradeError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_request_body_shape() {
        let grader = LlmGrader::new(&GraderConfig::default(), None);
        assert_eq!(grader.url, "https://api.openai.com/v1/chat/completions");
        let body = grader.request_body(&GradeRequest::new("Where?", "Paris", "paris"));
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["temperature"], 0);
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("Ground truth answer: Paris"));
        assert!(user.contains("User answer: paris"));
        assert!(!user.contains("Also accepted"));

        let body = grader.request_body(
            &GradeRequest::new("Where?", "Paris", "paris")
                .with_aliases(vec!["Paris, France".into(), "City of Light".into()]),
        );
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("Also accepted: Paris, France; City of Light\n"));
    }
}
