use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::dto::test_dto::{AttemptListQuery, CreateQuestion, CreateTestPayload, CreatedTest};
use crate::error::{Error, Result};
use crate::models::course::LessonKind;
use crate::models::question::QuestionType;
use crate::models::test::Test;
use crate::models::user::Role;

#[derive(Debug, Serialize)]
pub struct PaginatedAttempts {
    #[serde(rename = "items")]
    pub attempts: Vec<AttemptSummary>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

/// One row of the teacher dashboard.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AttemptSummary {
    pub id: Uuid,
    pub student_id: Uuid,
    pub student_name: String,
    pub group_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub score: Option<i32>,
    pub completion_kind: Option<String>,
}

#[derive(Debug, FromRow)]
struct LessonOwner {
    kind: String,
    teacher_id: Uuid,
}

#[derive(Clone)]
pub struct TestService {
    pool: PgPool,
}

impl TestService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the test for a `test` lesson together with its ordered
    /// questions and options. Nothing is written if any part is rejected.
    pub async fn create_test(
        &self,
        lesson_id: Uuid,
        payload: CreateTestPayload,
        actor_id: Uuid,
        actor_role: Role,
    ) -> Result<CreatedTest> {
        for (i, q) in payload.questions.iter().enumerate() {
            validate_question(q).map_err(|e| match e {
                Error::BadRequest(msg) => Error::BadRequest(format!("Question {}: {}", i + 1, msg)),
                other => other,
            })?;
        }
        if let Some(minutes) = payload.time_limit_minutes {
            if minutes < 0 {
                return Err(Error::BadRequest("Time limit cannot be negative".to_string()));
            }
        }

        let mut tx = self.pool.begin().await?;

        let owner = sqlx::query_as::<_, LessonOwner>(
            r#"
            SELECT l.kind, c.teacher_id
            FROM lessons l
            JOIN courses c ON c.id = l.course_id
            WHERE l.id = $1
            "#,
        )
        .bind(lesson_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound("Lesson not found".to_string()))?;

        if actor_role != Role::Admin && owner.teacher_id != actor_id {
            return Err(Error::Forbidden("Only the course teacher can add tests".to_string()));
        }
        if owner.kind.parse::<LessonKind>()? != LessonKind::Test {
            return Err(Error::BadRequest("Lesson is not a test lesson".to_string()));
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tests WHERE lesson_id = $1)")
                .bind(lesson_id)
                .fetch_one(&mut *tx)
                .await?;
        if exists {
            return Err(Error::Conflict("Lesson already has a test".to_string()));
        }

        let test_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO tests (lesson_id, title, time_limit_minutes, passing_score, max_score, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(lesson_id)
        .bind(&payload.title)
        .bind(payload.time_limit_minutes)
        .bind(payload.passing_score)
        .bind(payload.max_score.unwrap_or(100))
        .bind(actor_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut total_points: i64 = 0;
        for (q_pos, q) in payload.questions.iter().enumerate() {
            let question_id: Uuid = sqlx::query_scalar(
                r#"
                INSERT INTO questions (test_id, text, question_type, points, position)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                "#,
            )
            .bind(test_id)
            .bind(&q.text)
            .bind(q.question_type.as_str())
            .bind(q.points)
            .bind(q_pos as i32)
            .fetch_one(&mut *tx)
            .await?;

            for (o_pos, o) in q.options.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO answer_options (question_id, text, is_correct, position)
                    VALUES ($1, $2, $3, $4)
                    "#,
                )
                .bind(question_id)
                .bind(&o.text)
                .bind(o.is_correct || q.question_type == QuestionType::Text)
                .bind(o_pos as i32)
                .execute(&mut *tx)
                .await?;
            }
            total_points += q.points as i64;
        }

        tx.commit().await?;

        tracing::info!(
            test_id = %test_id,
            lesson_id = %lesson_id,
            questions = payload.questions.len(),
            "test created"
        );

        Ok(CreatedTest {
            id: test_id,
            lesson_id,
            title: payload.title,
            question_count: payload.questions.len(),
            total_points,
        })
    }

    pub async fn get_test_by_id(&self, test_id: Uuid) -> Result<Test> {
        let test = sqlx::query_as::<_, Test>("SELECT * FROM tests WHERE id = $1")
            .bind(test_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(test)
    }

    /// Attempts on a test, newest first. Only the course teacher and admins
    /// may list them.
    pub async fn list_attempts(
        &self,
        test_id: Uuid,
        query: AttemptListQuery,
        actor_id: Uuid,
        actor_role: Role,
    ) -> Result<PaginatedAttempts> {
        let teacher_id: Uuid = sqlx::query_scalar(
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
        .await?
        .ok_or_else(|| Error::NotFound("Test not found".to_string()))?;

        if actor_role != Role::Admin && teacher_id != actor_id {
            return Err(Error::Forbidden("Not your test".to_string()));
        }

        let (page, per_page) = normalize_page(query.page, query.per_page);
        let offset = (page - 1) * per_page;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM attempts
            WHERE test_id = $1
              AND ($2::uuid IS NULL OR student_id = $2)
              AND ($3::bool IS NULL OR (completed_at IS NOT NULL) = $3)
            "#,
        )
        .bind(test_id)
        .bind(query.student_id)
        .bind(query.completed)
        .fetch_one(&self.pool)
        .await?;

        let attempts = sqlx::query_as::<_, AttemptSummary>(
            r#"
            SELECT a.id, a.student_id, u.name AS student_name, a.group_id,
                   a.started_at, a.completed_at, a.score, a.completion_kind
            FROM attempts a
            JOIN users u ON u.id = a.student_id
            WHERE a.test_id = $1
              AND ($2::uuid IS NULL OR a.student_id = $2)
              AND ($3::bool IS NULL OR (a.completed_at IS NOT NULL) = $3)
            ORDER BY a.started_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(test_id)
        .bind(query.student_id)
        .bind(query.completed)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(PaginatedAttempts {
            attempts,
            total,
            page,
            per_page,
            total_pages: total_pages(total, per_page),
        })
    }
}

/// Option rules per question type. Text questions carry their expected
/// answer as the single option.
pub fn validate_question(q: &CreateQuestion) -> Result<()> {
    if q.points < 0 {
        return Err(Error::BadRequest("Points cannot be negative".to_string()));
    }
    let correct = q.options.iter().filter(|o| o.is_correct).count();
    match q.question_type {
        QuestionType::Single if q.options.len() < 2 => Err(Error::BadRequest(
            "Single choice needs at least two options".to_string(),
        )),
        QuestionType::Single if correct != 1 => Err(Error::BadRequest(
            "Single choice needs exactly one correct option".to_string(),
        )),
        QuestionType::Multiple if correct == 0 => Err(Error::BadRequest(
            "Multiple choice needs at least one correct option".to_string(),
        )),
        QuestionType::Text if q.options.len() != 1 => Err(Error::BadRequest(
            "Text question needs exactly one expected answer".to_string(),
        )),
        QuestionType::Text if q.options[0].text.trim().is_empty() => Err(Error::BadRequest(
            "Expected answer cannot be blank".to_string(),
        )),
        _ => Ok(()),
    }
}

pub fn normalize_page(page: Option<i64>, per_page: Option<i64>) -> (i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(20).clamp(1, 100);
    (page, per_page)
}

pub fn total_pages(total: i64, per_page: i64) -> i64 {
    if per_page > 0 {
        (total + per_page - 1) / per_page
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::test_dto::CreateOption;

    fn opt(text: &str, is_correct: bool) -> CreateOption {
        CreateOption {
            text: text.to_string(),
            is_correct,
        }
    }

    fn q(question_type: QuestionType, points: i32, options: Vec<CreateOption>) -> CreateQuestion {
        CreateQuestion {
            text: "Which?".to_string(),
            question_type,
            points,
            options,
        }
    }

    #[test]
    fn single_needs_exactly_one_correct() {
        assert!(validate_question(&q(
            QuestionType::Single,
            1,
            vec![opt("a", true), opt("b", false)]
        ))
        .is_ok());
        assert!(validate_question(&q(
            QuestionType::Single,
            1,
            vec![opt("a", true), opt("b", true)]
        ))
        .is_err());
        assert!(validate_question(&q(
            QuestionType::Single,
            1,
            vec![opt("a", false), opt("b", false)]
        ))
        .is_err());
        assert!(validate_question(&q(QuestionType::Single, 1, vec![opt("a", true)])).is_err());
    }

    #[test]
    fn multiple_needs_a_correct_option() {
        assert!(validate_question(&q(
            QuestionType::Multiple,
            2,
            vec![opt("a", true), opt("b", true), opt("c", false)]
        ))
        .is_ok());
        assert!(validate_question(&q(QuestionType::Multiple, 2, vec![opt("a", false)])).is_err());
    }

    #[test]
    fn text_needs_one_non_blank_answer() {
        assert!(validate_question(&q(QuestionType::Text, 1, vec![opt("stack", false)])).is_ok());
        assert!(validate_question(&q(QuestionType::Text, 1, vec![])).is_err());
        assert!(validate_question(&q(QuestionType::Text, 1, vec![opt("  ", true)])).is_err());
        assert!(validate_question(&q(
            QuestionType::Text,
            1,
            vec![opt("a", true), opt("b", true)]
        ))
        .is_err());
    }

    #[test]
    fn negative_points_rejected() {
        let err = validate_question(&q(QuestionType::Text, -1, vec![opt("x", true)])).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[test]
    fn paging_defaults_and_bounds() {
        assert_eq!(normalize_page(None, None), (1, 20));
        assert_eq!(normalize_page(Some(0), Some(1000)), (1, 100));
        assert_eq!(normalize_page(Some(3), Some(0)), (3, 1));
        assert_eq!(total_pages(0, 20), 0);
        assert_eq!(total_pages(41, 20), 3);
        assert_eq!(total_pages(40, 20), 2);
    }
}
