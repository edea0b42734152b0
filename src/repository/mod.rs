//! Persistence boundary of the test attempt flow.
//!
//! The attempt session and its runner only ever talk to storage through
//! [`AttemptRepository`], so the whole flow can be driven against an
//! in-memory or mocked store in tests.

pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::attempt::{Attempt, CompletionKind};
use crate::models::progress::ProgressStatus;
use crate::models::question::{AnswerPayload, Question};
use crate::models::test::TestMeta;

pub use postgres::PgAttemptRepository;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Test attached to a lesson, `None` when the lesson has no test.
    async fn load_test_meta(&self, lesson_id: Uuid) -> Result<Option<TestMeta>>;

    /// Questions of a test with their options, in presentation order.
    async fn load_questions(&self, test_id: Uuid) -> Result<Vec<Question>>;

    async fn start_attempt(
        &self,
        test_id: Uuid,
        student_id: Uuid,
        group_id: Option<Uuid>,
    ) -> Result<Uuid>;

    /// Stores the completion timestamp and score. Returns `false` when the
    /// attempt was already finalized.
    async fn finalize_attempt(
        &self,
        attempt_id: Uuid,
        score: i32,
        kind: CompletionKind,
    ) -> Result<bool>;

    async fn save_student_answer(
        &self,
        attempt_id: Uuid,
        question_id: Uuid,
        payload: AnswerPayload,
        is_correct: bool,
    ) -> Result<bool>;

    async fn update_course_progress(
        &self,
        student_id: Uuid,
        course_id: Uuid,
        lesson_id: Uuid,
        status: ProgressStatus,
        score: i32,
    ) -> Result<bool>;

    async fn get_attempt(&self, attempt_id: Uuid) -> Result<Option<Attempt>>;

    /// Teacher of the course a test belongs to.
    async fn course_teacher_for_test(&self, test_id: Uuid) -> Result<Option<Uuid>>;
}
