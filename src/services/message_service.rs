use base64::{engine::general_purpose::STANDARD, Engine as _};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::dto::chat_dto::{MessageWithAttachments, NewAttachment, SendMessagePayload};
use crate::error::{Error, Result};
use crate::models::message::{AttachmentMeta, ChatAttachment, ChatMessage};
use crate::utils::crypto::sha256_hex;

const DEFAULT_POLL_LIMIT: i64 = 100;
const MAX_POLL_LIMIT: i64 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAttachment {
    pub file_name: String,
    pub content_type: String,
    pub sha256: String,
    pub data: Vec<u8>,
}

/// Decodes a base64 attachment and rejects it once it exceeds `max_bytes`.
pub fn decode_attachment(attachment: &NewAttachment, max_bytes: usize) -> Result<DecodedAttachment> {
    // base64 expands by 4/3; bail before allocating for obviously oversized input.
    if attachment.data_base64.len() / 4 * 3 > max_bytes + 3 {
        return Err(Error::BadRequest(format!(
            "Attachment '{}' exceeds {} bytes",
            attachment.file_name, max_bytes
        )));
    }
    let data = STANDARD.decode(attachment.data_base64.trim())?;
    if data.is_empty() {
        return Err(Error::BadRequest(format!(
            "Attachment '{}' is empty",
            attachment.file_name
        )));
    }
    if data.len() > max_bytes {
        return Err(Error::BadRequest(format!(
            "Attachment '{}' exceeds {} bytes",
            attachment.file_name, max_bytes
        )));
    }
    Ok(DecodedAttachment {
        file_name: attachment.file_name.clone(),
        content_type: attachment.content_type.clone(),
        sha256: sha256_hex(&data),
        data,
    })
}

#[derive(Clone)]
pub struct MessageService {
    pool: PgPool,
    max_attachment_bytes: usize,
}

impl MessageService {
    pub fn new(pool: PgPool, max_attachment_bytes: usize) -> Self {
        Self {
            pool,
            max_attachment_bytes,
        }
    }

    pub async fn send(
        &self,
        course_id: Uuid,
        sender_id: Uuid,
        payload: SendMessagePayload,
    ) -> Result<MessageWithAttachments> {
        if payload.text.trim().is_empty() && payload.attachments.is_empty() {
            return Err(Error::BadRequest("Message is empty".to_string()));
        }
        let decoded = payload
            .attachments
            .iter()
            .map(|a| decode_attachment(a, self.max_attachment_bytes))
            .collect::<Result<Vec<_>>>()?;

        let mut tx = self.pool.begin().await?;

        // Sends to one course queue on the course row, so `seq` is assigned
        // and committed in the same order and a poll never skips a message.
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM courses WHERE id = $1 FOR NO KEY UPDATE")
            .bind(course_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::NotFound("Course not found".to_string()))?;

        let message = sqlx::query_as::<_, ChatMessage>(
            r#"
            INSERT INTO chat_messages (course_id, sender_id, text)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(course_id)
        .bind(sender_id)
        .bind(payload.text.trim())
        .fetch_one(&mut *tx)
        .await?;

        let mut attachments = Vec::with_capacity(decoded.len());
        for a in decoded {
            let meta = sqlx::query_as::<_, AttachmentMeta>(
                r#"
                INSERT INTO chat_attachments (message_id, file_name, content_type, size_bytes, sha256, data)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, message_id, file_name, content_type, size_bytes, sha256
                "#,
            )
            .bind(message.id)
            .bind(&a.file_name)
            .bind(&a.content_type)
            .bind(a.data.len() as i32)
            .bind(&a.sha256)
            .bind(&a.data)
            .fetch_one(&mut *tx)
            .await?;
            attachments.push(meta);
        }

        tx.commit().await?;

        tracing::debug!(
            message_id = %message.id,
            course_id = %course_id,
            attachments = attachments.len(),
            "chat message stored"
        );

        Ok(MessageWithAttachments {
            message,
            attachments,
        })
    }

    /// Messages with `seq` above `after_seq`, oldest first. Without a cursor
    /// the latest page is returned.
    pub async fn list_after(
        &self,
        course_id: Uuid,
        after_seq: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<MessageWithAttachments>> {
        let limit = limit.unwrap_or(DEFAULT_POLL_LIMIT).clamp(1, MAX_POLL_LIMIT);

        let messages = match after_seq {
            Some(after_seq) => {
                sqlx::query_as::<_, ChatMessage>(
                    r#"
                    SELECT * FROM chat_messages
                    WHERE course_id = $1 AND seq > $2
                    ORDER BY seq ASC
                    LIMIT $3
                    "#,
                )
                .bind(course_id)
                .bind(after_seq)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ChatMessage>(
                    r#"
                    SELECT * FROM (
                        SELECT * FROM chat_messages
                        WHERE course_id = $1
                        ORDER BY seq DESC
                        LIMIT $2
                    ) recent
                    ORDER BY seq ASC
                    "#,
                )
                .bind(course_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = messages.iter().map(|m| m.id).collect();
        let metas = sqlx::query_as::<_, AttachmentMeta>(
            r#"
            SELECT id, message_id, file_name, content_type, size_bytes, sha256
            FROM chat_attachments
            WHERE message_id = ANY($1)
            ORDER BY created_at
            "#,
        )
        .bind(&ids[..])
        .fetch_all(&self.pool)
        .await?;

        let mut by_message: HashMap<Uuid, Vec<AttachmentMeta>> = HashMap::new();
        for meta in metas {
            by_message.entry(meta.message_id).or_default().push(meta);
        }

        Ok(messages
            .into_iter()
            .map(|message| {
                let attachments = by_message.remove(&message.id).unwrap_or_default();
                MessageWithAttachments {
                    message,
                    attachments,
                }
            })
            .collect())
    }

    pub async fn get_attachment(&self, attachment_id: Uuid) -> Result<ChatAttachment> {
        sqlx::query_as::<_, ChatAttachment>(
            "SELECT id, file_name, content_type, sha256, data FROM chat_attachments WHERE id = $1",
        )
        .bind(attachment_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Attachment not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(data_base64: &str) -> NewAttachment {
        NewAttachment {
            file_name: "notes.txt".to_string(),
            content_type: "text/plain".to_string(),
            data_base64: data_base64.to_string(),
        }
    }

    #[test]
    fn decodes_and_hashes() {
        let decoded = decode_attachment(&attachment("YWJj"), 1024).unwrap();
        assert_eq!(decoded.data, b"abc");
        assert_eq!(
            decoded.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(decoded.file_name, "notes.txt");
    }

    #[test]
    fn rejects_oversized() {
        let big = STANDARD.encode(vec![7u8; 64]);
        assert!(matches!(
            decode_attachment(&attachment(&big), 63),
            Err(Error::BadRequest(_))
        ));
        assert!(decode_attachment(&attachment(&big), 64).is_ok());
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(matches!(
            decode_attachment(&attachment("not base64!!"), 1024),
            Err(Error::Base64(_))
        ));
    }

    #[test]
    fn rejects_empty_payload() {
        assert!(matches!(
            decode_attachment(&attachment(""), 1024),
            Err(Error::BadRequest(_))
        ));
    }
}
