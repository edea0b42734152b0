use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::message::{AttachmentMeta, ChatMessage};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewAttachment {
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,
    #[validate(length(min = 1, max = 255))]
    pub content_type: String,
    /// Standard base64, no line breaks.
    #[validate(length(min = 1))]
    pub data_base64: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SendMessagePayload {
    #[validate(length(max = 4000))]
    pub text: String,
    #[serde(default)]
    #[validate(length(max = 5), nested)]
    pub attachments: Vec<NewAttachment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagePollQuery {
    /// `seq` of the last message the client has seen.
    pub after_seq: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageWithAttachments {
    #[serde(flatten)]
    pub message: ChatMessage,
    pub attachments: Vec<AttachmentMeta>,
}
