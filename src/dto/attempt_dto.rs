use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::question::AnswerPayload;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartAttemptRequest {
    pub group_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordAnswerRequest {
    pub question_id: Uuid,
    pub answer: AnswerPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordAnswerResponse {
    pub saved: bool,
    pub question_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigateRequest {
    pub index: i64,
}
