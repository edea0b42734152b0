use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CourseProgress {
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub lesson_id: Uuid,
    pub status: String,
    pub score: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    InProgress,
    Completed,
    Failed,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::InProgress => "in_progress",
            ProgressStatus::Completed => "completed",
            ProgressStatus::Failed => "failed",
        }
    }

    /// Status recorded for a finished test lesson.
    pub fn for_score(score: i32, passing_score: i32) -> Self {
        if score >= passing_score {
            ProgressStatus::Completed
        } else {
            ProgressStatus::Failed
        }
    }
}
