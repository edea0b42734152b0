use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub points: i32,
    pub options: Vec<AnswerOption>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Single,
    Multiple,
    Text,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Single => "single",
            QuestionType::Multiple => "multiple",
            QuestionType::Text => "text",
        }
    }
}

impl FromStr for QuestionType {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "single" => Ok(QuestionType::Single),
            "multiple" => Ok(QuestionType::Multiple),
            "text" => Ok(QuestionType::Text),
            other => Err(Error::Internal(format!("Unknown question type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AnswerOption {
    pub id: Uuid,
    pub text: String,
    pub is_correct: bool,
}

/// A student's submitted response. The variant has to agree with the
/// question type it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnswerPayload {
    Single(Uuid),
    Multiple(BTreeSet<Uuid>),
    Text(String),
}

impl AnswerPayload {
    pub fn fits(&self, question_type: QuestionType) -> bool {
        matches!(
            (self, question_type),
            (AnswerPayload::Single(_), QuestionType::Single)
                | (AnswerPayload::Multiple(_), QuestionType::Multiple)
                | (AnswerPayload::Text(_), QuestionType::Text)
        )
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct QuestionRow {
    pub id: Uuid,
    pub text: String,
    pub question_type: String,
    pub points: i32,
}

impl QuestionRow {
    pub fn into_question(self, options: Vec<AnswerOption>) -> Result<Question> {
        Ok(Question {
            id: self.id,
            text: self.text,
            question_type: self.question_type.parse()?,
            points: self.points,
            options,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct OptionRow {
    pub id: Uuid,
    pub question_id: Uuid,
    pub text: String,
    pub is_correct: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_uses_kind_and_value_tags() {
        let id = Uuid::new_v4();
        let value = serde_json::to_value(AnswerPayload::Single(id)).unwrap();
        assert_eq!(value, json!({"kind": "single", "value": id}));

        let parsed: AnswerPayload =
            serde_json::from_value(json!({"kind": "text", "value": "stack"})).unwrap();
        assert_eq!(parsed, AnswerPayload::Text("stack".into()));
    }

    #[test]
    fn payload_fits_only_its_own_question_type() {
        let text = AnswerPayload::Text("x".into());
        assert!(text.fits(QuestionType::Text));
        assert!(!text.fits(QuestionType::Single));
        assert!(AnswerPayload::Multiple(BTreeSet::new()).fits(QuestionType::Multiple));
    }
}
