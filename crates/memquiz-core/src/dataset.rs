use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::QuizError;

/// Version tag written into every canonical dataset file.
pub const DATASET_VERSION: &str = "1";

// ---------------------------------------------------------------------------
// Variant
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetVariant {
    S,
    M,
}

impl DatasetVariant {
    pub const ALL: [DatasetVariant; 2] = [DatasetVariant::S, DatasetVariant::M];

    /// File name of the canonical dataset for this variant.
    pub fn compact_file(self) -> &'static str {
        match self {
            Self::S => "longmemeval_s.compact.json",
            Self::M => "longmemeval_m.compact.json",
        }
    }

    /// File name of the raw upstream corpus for this variant.
    pub fn raw_file(self) -> &'static str {
        match self {
            Self::S => "longmemeval_s_cleaned.json",
            Self::M => "longmemeval_m_cleaned.json",
        }
    }
}

impl fmt::Display for DatasetVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S => write!(f, "s"),
            Self::M => write!(f, "m"),
        }
    }
}

impl std::str::FromStr for DatasetVariant {
    type Err = QuizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "s" | "short" => Ok(Self::S),
            "m" | "medium" => Ok(Self::M),
            _ => Err(QuizError::UnknownVariant(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Turn / Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Anything that is not exactly `assistant` or `system` is a user turn.
    pub fn from_label(label: &str) -> Self {
        match label {
            "assistant" => Self::Assistant,
            "system" => Self::System,
            _ => Self::User,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default)]
    pub turns: Vec<Turn>,
}

impl Session {
    pub fn empty(id: String) -> Self {
        Self {
            id,
            title: None,
            date: None,
            turns: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Question
// ---------------------------------------------------------------------------

/// Question kind. `MultipleChoice` owns its options so a choice question can
/// never exist without them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice { options: Vec<String> },
    Boolean,
    ShortText,
}

impl QuestionKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::MultipleChoice { .. } => "multiple_choice",
            Self::Boolean => "boolean",
            Self::ShortText => "short_text",
        }
    }

    pub fn options(&self) -> &[String] {
        match self {
            Self::MultipleChoice { options } => options,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(flatten)]
    pub kind: QuestionKind,
    pub prompt: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl Question {
    /// Gold answer followed by every accepted alias.
    pub fn accepted_answers(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.answer.as_str())
            .chain(self.aliases.iter().flatten().map(String::as_str))
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetItem {
    pub id: String,
    pub sessions: Vec<Session>,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactDataset {
    pub version: String,
    pub items: Vec<DatasetItem>,
}

impl CompactDataset {
    pub fn new(items: Vec<DatasetItem>) -> Self {
        Self {
            version: DATASET_VERSION.to_string(),
            items,
        }
    }

    pub fn question_count(&self) -> usize {
        self.items.iter().map(|item| item.questions.len()).sum()
    }
}

/// A question together with the context it must be answered from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampledQuestion {
    #[serde(flatten)]
    pub question: Question,
    pub dataset_id: String,
    pub sessions: Vec<Session>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_roundtrip_str() {
        for v in DatasetVariant::ALL {
            let parsed: DatasetVariant = v.to_string().parse().unwrap();
            assert_eq!(parsed, v);
        }
        assert!("xl".parse::<DatasetVariant>().is_err());
    }

    #[test]
    fn test_role_from_label() {
        assert_eq!(Role::from_label("assistant"), Role::Assistant);
        assert_eq!(Role::from_label("system"), Role::System);
        assert_eq!(Role::from_label("human"), Role::User);
        assert_eq!(Role::from_label(""), Role::User);
    }

    #[test]
    fn test_question_wire_shape() {
        let q = Question {
            id: "q1".into(),
            kind: QuestionKind::MultipleChoice {
                options: vec!["a".into(), "b".into()],
            },
            prompt: "pick".into(),
            answer: "a".into(),
            aliases: None,
            date: None,
        };
        let v = serde_json::to_value(&q).unwrap();
        assert_eq!(v["type"], "multiple_choice");
        assert_eq!(v["options"][1], "b");
        assert!(v.get("aliases").is_none());

        let back: Question = serde_json::from_value(v).unwrap();
        assert_eq!(back, q);
    }

    #[test]
    fn test_short_text_has_no_options_field() {
        let q = Question {
            id: "q2".into(),
            kind: QuestionKind::ShortText,
            prompt: "where?".into(),
            answer: "Paris".into(),
            aliases: Some(vec!["paris, france".into()]),
            date: Some("2023/05/01".into()),
        };
        let v = serde_json::to_value(&q).unwrap();
        assert_eq!(v["type"], "short_text");
        assert!(v.get("options").is_none());
        assert_eq!(
            q.accepted_answers().collect::<Vec<_>>(),
            vec!["Paris", "paris, france"]
        );
    }

    #[test]
    fn test_sampled_question_is_camel_case() {
        let sq = SampledQuestion {
            question: Question {
                id: "q".into(),
                kind: QuestionKind::Boolean,
                prompt: "?".into(),
                answer: "True".into(),
                aliases: None,
                date: None,
            },
            dataset_id: "item-0".into(),
            sessions: vec![Session::empty("0-session-0".into())],
        };
        let v = serde_json::to_value(&sq).unwrap();
        assert_eq!(v["datasetId"], "item-0");
        assert_eq!(v["type"], "boolean");
        assert_eq!(v["sessions"][0]["id"], "0-session-0");
    }
}
