use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::question::QuestionType;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOption {
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateQuestion {
    #[validate(length(min = 1, max = 4000))]
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[validate(range(min = 0, max = 1000, message = "Points must be between 0 and 1000"))]
    #[serde(default = "default_points")]
    pub points: i32,
    #[validate(nested)]
    pub options: Vec<CreateOption>,
}

fn default_points() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTestPayload {
    #[validate(length(min = 1, max = 300))]
    pub title: String,
    pub time_limit_minutes: Option<i32>,
    #[validate(range(min = 0, max = 100, message = "Passing score must be between 0 and 100"))]
    pub passing_score: i32,
    #[validate(range(min = 1))]
    pub max_score: Option<i32>,
    #[validate(length(min = 1, message = "A test needs at least one question"), nested)]
    pub questions: Vec<CreateQuestion>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedTest {
    pub id: Uuid,
    pub lesson_id: Uuid,
    pub title: String,
    pub question_count: usize,
    pub total_points: i64,
}

#[derive(Debug, Deserialize)]
pub struct AttemptListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub student_id: Option<Uuid>,
    pub completed: Option<bool>,
}
