//! In-memory state of one student's run through a test.
//!
//! The session owns the ordered questions, the answers recorded so far and
//! the current question pointer. It never touches storage: the runner
//! persists what [`AttemptSession::finalize`] returns.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::attempt::{AttemptState, CompletionKind};
use crate::models::question::{AnswerPayload, Question, QuestionType};
use crate::models::test::TestMeta;
use crate::services::grading_service::{GradedAnswer, GradingService};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionView {
    pub id: Uuid,
    pub text: String,
}

/// A question as shown to the student: no correctness flags, and no options
/// at all for free-text questions since the option holds the expected answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionView {
    pub index: usize,
    pub id: Uuid,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub points: i32,
    pub options: Vec<OptionView>,
    pub answer: Option<AnswerPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptOutcome {
    pub attempt_id: Uuid,
    pub student_id: Uuid,
    pub test_id: Uuid,
    pub lesson_id: Uuid,
    pub course_id: Uuid,
    pub score: i32,
    pub earned_points: i64,
    pub total_points: i64,
    pub passing_score: i32,
    pub passed: bool,
    pub kind: CompletionKind,
    pub completed_at: DateTime<Utc>,
    pub answers: Vec<GradedAnswer>,
}

#[derive(Debug)]
pub struct AttemptSession {
    meta: TestMeta,
    student_id: Uuid,
    group_id: Option<Uuid>,
    attempt_id: Option<Uuid>,
    questions: Vec<Question>,
    answers: HashMap<Uuid, AnswerPayload>,
    current: usize,
    state: AttemptState,
    started_at: Option<DateTime<Utc>>,
}

impl AttemptSession {
    pub fn new(
        meta: TestMeta,
        questions: Vec<Question>,
        student_id: Uuid,
        group_id: Option<Uuid>,
    ) -> Self {
        Self {
            meta,
            student_id,
            group_id,
            attempt_id: None,
            questions,
            answers: HashMap::new(),
            current: 0,
            state: AttemptState::NotStarted,
            started_at: None,
        }
    }

    pub fn meta(&self) -> &TestMeta {
        &self.meta
    }

    pub fn student_id(&self) -> Uuid {
        self.student_id
    }

    pub fn group_id(&self) -> Option<Uuid> {
        self.group_id
    }

    pub fn attempt_id(&self) -> Option<Uuid> {
        self.attempt_id
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// NotStarted -> InProgress, once the attempt row exists.
    pub fn begin(&mut self, attempt_id: Uuid, started_at: DateTime<Utc>) -> Result<()> {
        if self.state != AttemptState::NotStarted {
            return Err(Error::Conflict("Attempt has already been started".to_string()));
        }
        self.attempt_id = Some(attempt_id);
        self.started_at = Some(started_at);
        self.state = AttemptState::InProgress;
        Ok(())
    }

    /// Overwrites any earlier answer for the question.
    pub fn record_answer(&mut self, question_id: Uuid, payload: AnswerPayload) -> Result<()> {
        self.ensure_in_progress()?;

        let question = self
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| Error::NotFound(format!("Question {} is not part of this test", question_id)))?;

        if !payload.fits(question.question_type) {
            return Err(Error::BadRequest(format!(
                "Answer does not match question type '{}'",
                question.question_type.as_str()
            )));
        }

        self.answers.insert(question_id, payload);
        Ok(())
    }

    pub fn answer_for(&self, question_id: Uuid) -> Option<&AnswerPayload> {
        self.answers.get(&question_id)
    }

    /// Moves the pointer, clamped to the question range. `None` only when the
    /// test has no questions.
    pub fn navigate_to(&mut self, index: i64) -> Option<QuestionView> {
        if self.questions.is_empty() {
            return None;
        }
        let last = (self.questions.len() - 1) as i64;
        self.current = index.clamp(0, last) as usize;
        self.current_question()
    }

    pub fn current_question(&self) -> Option<QuestionView> {
        self.view(self.current)
    }

    pub fn questions(&self) -> Vec<QuestionView> {
        (0..self.questions.len()).filter_map(|i| self.view(i)).collect()
    }

    fn view(&self, index: usize) -> Option<QuestionView> {
        let q = self.questions.get(index)?;
        let options = match q.question_type {
            QuestionType::Text => Vec::new(),
            _ => q
                .options
                .iter()
                .map(|o| OptionView {
                    id: o.id,
                    text: o.text.clone(),
                })
                .collect(),
        };
        Some(QuestionView {
            index,
            id: q.id,
            text: q.text.clone(),
            question_type: q.question_type,
            points: q.points,
            options,
            answer: self.answers.get(&q.id).cloned(),
        })
    }

    /// InProgress -> Finalized. The score is computed here, before anything
    /// is written; a second call fails instead of re-grading.
    pub fn finalize(&mut self, kind: CompletionKind, completed_at: DateTime<Utc>) -> Result<AttemptOutcome> {
        self.ensure_in_progress()?;
        let attempt_id = self
            .attempt_id
            .ok_or_else(|| Error::Internal("Attempt id missing for an in-progress session".to_string()))?;

        self.state = AttemptState::Finalized;

        let report = GradingService::grade(&self.questions, &self.answers);
        Ok(AttemptOutcome {
            attempt_id,
            student_id: self.student_id,
            test_id: self.meta.test_id,
            lesson_id: self.meta.lesson_id,
            course_id: self.meta.course_id,
            score: report.score,
            earned_points: report.earned_points,
            total_points: report.total_points,
            passing_score: self.meta.passing_score,
            passed: report.score >= self.meta.passing_score,
            kind,
            completed_at,
            answers: report.graded,
        })
    }

    fn ensure_in_progress(&self) -> Result<()> {
        match self.state {
            AttemptState::InProgress => Ok(()),
            AttemptState::NotStarted => Err(Error::Conflict("Attempt has not been started".to_string())),
            AttemptState::Finalized => Err(Error::Conflict("Attempt is already finalized".to_string())),
        }
    }
}
