use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use super::AttemptRepository;
use crate::error::Result;
use crate::models::attempt::{Attempt, CompletionKind};
use crate::models::progress::ProgressStatus;
use crate::models::question::{AnswerOption, AnswerPayload, OptionRow, Question, QuestionRow};
use crate::models::test::TestMeta;

#[derive(Clone)]
pub struct PgAttemptRepository {
    pool: PgPool,
}

impl PgAttemptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttemptRepository for PgAttemptRepository {
    async fn load_test_meta(&self, lesson_id: Uuid) -> Result<Option<TestMeta>> {
        let meta = sqlx::query_as::<_, TestMeta>(
            r#"
            SELECT t.id AS test_id, t.lesson_id, l.course_id, c.teacher_id, t.title,
                   t.time_limit_minutes, t.passing_score, t.max_score
            FROM tests t
            JOIN lessons l ON l.id = t.lesson_id
            JOIN courses c ON c.id = l.course_id
            WHERE t.lesson_id = $1
            "#,
        )
        .bind(lesson_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(meta)
    }

    async fn load_questions(&self, test_id: Uuid) -> Result<Vec<Question>> {
        let rows = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT id, text, question_type, points
            FROM questions
            WHERE test_id = $1
            ORDER BY position, id
            "#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        let option_rows = sqlx::query_as::<_, OptionRow>(
            r#"
            SELECT o.id, o.question_id, o.text, o.is_correct
            FROM answer_options o
            JOIN questions q ON q.id = o.question_id
            WHERE q.test_id = $1
            ORDER BY o.position, o.id
            "#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        let mut options: HashMap<Uuid, Vec<AnswerOption>> = HashMap::new();
        for row in option_rows {
            options.entry(row.question_id).or_default().push(AnswerOption {
                id: row.id,
                text: row.text,
                is_correct: row.is_correct,
            });
        }

        rows.into_iter()
            .map(|row| {
                let opts = options.remove(&row.id).unwrap_or_default();
                row.into_question(opts)
            })
            .collect()
    }

    async fn start_attempt(
        &self,
        test_id: Uuid,
        student_id: Uuid,
        group_id: Option<Uuid>,
    ) -> Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO attempts (test_id, student_id, group_id, started_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING id
            "#,
        )
        .bind(test_id)
        .bind(student_id)
        .bind(group_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn finalize_attempt(
        &self,
        attempt_id: Uuid,
        score: i32,
        kind: CompletionKind,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE attempts
            SET completed_at = NOW(), score = $2, completion_kind = $3
            WHERE id = $1 AND completed_at IS NULL
            "#,
        )
        .bind(attempt_id)
        .bind(score)
        .bind(kind.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn save_student_answer(
        &self,
        attempt_id: Uuid,
        question_id: Uuid,
        payload: AnswerPayload,
        is_correct: bool,
    ) -> Result<bool> {
        let payload_json = serde_json::to_value(&payload)?;
        let result = sqlx::query(
            r#"
            INSERT INTO student_answers (attempt_id, question_id, payload, is_correct)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (attempt_id, question_id) DO NOTHING
            "#,
        )
        .bind(attempt_id)
        .bind(question_id)
        .bind(payload_json)
        .bind(is_correct)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_course_progress(
        &self,
        student_id: Uuid,
        course_id: Uuid,
        lesson_id: Uuid,
        status: ProgressStatus,
        score: i32,
    ) -> Result<bool> {
        // A completed lesson stays completed; the best score is kept.
        let result = sqlx::query(
            r#"
            INSERT INTO course_progress (student_id, course_id, lesson_id, status, score, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (student_id, lesson_id) DO UPDATE
            SET status = CASE
                    WHEN course_progress.status = 'completed' THEN 'completed'
                    ELSE EXCLUDED.status
                END,
                score = GREATEST(COALESCE(course_progress.score, 0), EXCLUDED.score),
                updated_at = NOW()
            "#,
        )
        .bind(student_id)
        .bind(course_id)
        .bind(lesson_id)
        .bind(status.as_str())
        .bind(score)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_attempt(&self, attempt_id: Uuid) -> Result<Option<Attempt>> {
        let attempt = sqlx::query_as::<_, Attempt>(r#"SELECT * FROM attempts WHERE id = $1"#)
            .bind(attempt_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(attempt)
    }

    async fn course_teacher_for_test(&self, test_id: Uuid) -> Result<Option<Uuid>> {
        let teacher_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT c.teacher_id
            FROM tests t
            JOIN lessons l ON l.id = t.lesson_id
            JOIN courses c ON c.id = l.course_id
            WHERE t.id = $1
            "#,
        )
        .bind(test_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(teacher_id)
    }
}
