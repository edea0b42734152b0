use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    /// Per-course polling cursor; increases in commit order within a course.
    pub seq: i64,
    pub course_id: Uuid,
    pub sender_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Attachment row without the payload bytes.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AttachmentMeta {
    pub id: Uuid,
    pub message_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i32,
    pub sha256: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct ChatAttachment {
    pub id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub sha256: String,
    pub data: Vec<u8>,
}
