//! Event loop that owns one [`AttemptSession`].
//!
//! Student commands arrive over an mpsc channel and the countdown ticks in
//! the same `select!` loop, so the timer and manual actions are serialized
//! on a single task and never race over the session.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::attempt::{AttemptState, CompletionKind};
use crate::models::progress::ProgressStatus;
use crate::models::question::AnswerPayload;
use crate::repository::AttemptRepository;
use crate::services::attempt_session::{AttemptOutcome, AttemptSession, QuestionView};

const COMMAND_BUFFER: usize = 32;
const TICK: Duration = Duration::from_secs(1);

/// Broadcast once an attempt's outcome has been persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalizedEvent {
    pub attempt_id: Uuid,
    pub student_id: Uuid,
    pub test_id: Uuid,
    pub lesson_id: Uuid,
    pub course_id: Uuid,
    pub score: i32,
    pub passed: bool,
    pub kind: CompletionKind,
    pub completed_at: DateTime<Utc>,
}

impl From<&AttemptOutcome> for FinalizedEvent {
    fn from(o: &AttemptOutcome) -> Self {
        Self {
            attempt_id: o.attempt_id,
            student_id: o.student_id,
            test_id: o.test_id,
            lesson_id: o.lesson_id,
            course_id: o.course_id,
            score: o.score,
            passed: o.passed,
            kind: o.kind,
            completed_at: o.completed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub attempt_id: Uuid,
    pub state: AttemptState,
    pub title: String,
    pub total_questions: usize,
    pub questions_answered: usize,
    pub current_index: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub time_remaining_seconds: u64,
    pub outcome: Option<AttemptOutcome>,
    pub persist_error: Option<String>,
}

enum Command {
    Record {
        question_id: Uuid,
        payload: AnswerPayload,
        reply: oneshot::Sender<Result<()>>,
    },
    Navigate {
        index: i64,
        reply: oneshot::Sender<Result<Option<QuestionView>>>,
    },
    Finish {
        reply: oneshot::Sender<Result<AttemptOutcome>>,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
}

#[derive(Clone, Debug)]
pub struct AttemptHandle {
    attempt_id: Uuid,
    student_id: Uuid,
    teacher_id: Uuid,
    tx: mpsc::Sender<Command>,
}

impl AttemptHandle {
    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn student_id(&self) -> Uuid {
        self.student_id
    }

    /// Teacher of the course the attempt's test belongs to.
    pub fn teacher_id(&self) -> Uuid {
        self.teacher_id
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub async fn record_answer(&self, question_id: Uuid, payload: AnswerPayload) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Record {
            question_id,
            payload,
            reply,
        })
        .await?;
        rx.await.map_err(|_| runner_gone())?
    }

    pub async fn navigate_to(&self, index: i64) -> Result<Option<QuestionView>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Navigate { index, reply }).await?;
        rx.await.map_err(|_| runner_gone())?
    }

    pub async fn finish(&self) -> Result<AttemptOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Finish { reply }).await?;
        rx.await.map_err(|_| runner_gone())?
    }

    pub async fn status(&self) -> Result<SessionStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status { reply }).await?;
        rx.await.map_err(|_| runner_gone())
    }

    async fn send(&self, cmd: Command) -> Result<()> {
        self.tx.send(cmd).await.map_err(|_| runner_gone())
    }
}

fn runner_gone() -> Error {
    Error::Conflict("Attempt session is no longer active".to_string())
}

/// Spawns the runner for a session that has already begun.
pub fn spawn_runner(
    session: AttemptSession,
    repository: Arc<dyn AttemptRepository>,
    events: broadcast::Sender<FinalizedEvent>,
) -> Result<AttemptHandle> {
    let attempt_id = session
        .attempt_id()
        .ok_or_else(|| Error::Internal("Cannot run a session that has not begun".to_string()))?;
    let student_id = session.student_id();
    let teacher_id = session.meta().teacher_id;
    let time_limit = session.meta().time_limit();

    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let runner = AttemptRunner {
        session,
        repository,
        events,
        rx,
        remaining_secs: time_limit.as_secs(),
        outcome: None,
        persist_error: None,
    };
    tokio::spawn(runner.run());

    Ok(AttemptHandle {
        attempt_id,
        student_id,
        teacher_id,
        tx,
    })
}

struct AttemptRunner {
    session: AttemptSession,
    repository: Arc<dyn AttemptRepository>,
    events: broadcast::Sender<FinalizedEvent>,
    rx: mpsc::Receiver<Command>,
    remaining_secs: u64,
    outcome: Option<AttemptOutcome>,
    persist_error: Option<String>,
}

impl AttemptRunner {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + TICK, TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

        loop {
            let ticking = self.session.state() == AttemptState::InProgress;
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => break,
                },
                _ = ticker.tick(), if ticking => {
                    self.remaining_secs = self.remaining_secs.saturating_sub(1);
                    if self.remaining_secs == 0 {
                        tracing::info!(attempt_id = ?self.session.attempt_id(), "Time limit reached, finalizing attempt");
                        if let Err(e) = self.finalize(CompletionKind::Timeout).await {
                            tracing::error!(attempt_id = ?self.session.attempt_id(), error = %e, "Timed-out attempt could not be finalized");
                        }
                    }
                }
            }
        }

        tracing::debug!(attempt_id = ?self.session.attempt_id(), "Attempt runner stopped");
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Record {
                question_id,
                payload,
                reply,
            } => {
                let _ = reply.send(self.session.record_answer(question_id, payload));
            }
            Command::Navigate { index, reply } => {
                let result = match self.session.state() {
                    AttemptState::InProgress => Ok(self.session.navigate_to(index)),
                    _ => Err(Error::Conflict("Attempt is already finalized".to_string())),
                };
                let _ = reply.send(result);
            }
            Command::Finish { reply } => {
                let result = self.finalize(CompletionKind::Manual).await;
                let _ = reply.send(result);
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            attempt_id: self.session.attempt_id().unwrap_or_default(),
            state: self.session.state(),
            title: self.session.meta().title.clone(),
            total_questions: self.session.question_count(),
            questions_answered: self.session.answered_count(),
            current_index: self.session.current_index(),
            started_at: self.session.started_at(),
            time_remaining_seconds: match self.session.state() {
                AttemptState::InProgress => self.remaining_secs,
                _ => 0,
            },
            outcome: self.outcome.clone(),
            persist_error: self.persist_error.clone(),
        }
    }

    async fn finalize(&mut self, kind: CompletionKind) -> Result<AttemptOutcome> {
        let outcome = self.session.finalize(kind, Utc::now())?;

        tracing::info!(
            attempt_id = %outcome.attempt_id,
            score = outcome.score,
            passed = outcome.passed,
            kind = kind.as_str(),
            "Attempt graded"
        );

        self.outcome = Some(outcome.clone());
        if let Err(e) = persist_outcome(self.repository.as_ref(), &outcome).await {
            tracing::error!(attempt_id = %outcome.attempt_id, error = %e, "Failed to persist attempt outcome");
            self.persist_error = Some(e.to_string());
            return Err(e);
        }

        // Nobody listening is fine.
        let _ = self.events.send(FinalizedEvent::from(&outcome));
        Ok(outcome)
    }
}

/// Writes the score, then one row per answered question, then progress.
/// Stops at the first failure; rows already written stay.
async fn persist_outcome(repo: &dyn AttemptRepository, outcome: &AttemptOutcome) -> Result<()> {
    let updated = repo
        .finalize_attempt(outcome.attempt_id, outcome.score, outcome.kind)
        .await?;
    if !updated {
        return Err(Error::Conflict("Attempt is already finalized".to_string()));
    }

    for (saved, answer) in outcome.answers.iter().enumerate() {
        let ok = repo
            .save_student_answer(
                outcome.attempt_id,
                answer.question_id,
                answer.payload.clone(),
                answer.is_correct,
            )
            .await?;
        if !ok {
            return Err(Error::Internal(format!(
                "Answer for question {} was not saved ({} of {} saved)",
                answer.question_id,
                saved,
                outcome.answers.len()
            )));
        }
    }

    repo.update_course_progress(
        outcome.student_id,
        outcome.course_id,
        outcome.lesson_id,
        ProgressStatus::for_score(outcome.score, outcome.passing_score),
        outcome.score,
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockAttemptRepository;
    use crate::services::attempt_session::tests::{meta, two_questions};
    use std::collections::BTreeSet;

    fn begun(limit_minutes: Option<i32>) -> AttemptSession {
        let mut session = AttemptSession::new(meta(limit_minutes), two_questions(), Uuid::new_v4(), None);
        session.begin(Uuid::new_v4(), Utc::now()).unwrap();
        session
    }

    fn accepting_repo(expected_kind: CompletionKind, expected_score: i32, answers: usize) -> MockAttemptRepository {
        let mut repo = MockAttemptRepository::new();
        repo.expect_finalize_attempt()
            .withf(move |_, score, kind| *score == expected_score && *kind == expected_kind)
            .times(1)
            .returning(|_, _, _| Ok(true));
        repo.expect_save_student_answer()
            .times(answers)
            .returning(|_, _, _, _| Ok(true));
        repo.expect_update_course_progress()
            .times(1)
            .returning(|_, _, _, _, _| Ok(true));
        repo
    }

    #[tokio::test]
    async fn manual_finish_persists_and_broadcasts() {
        let session = begun(Some(10));
        let questions = two_questions_of(&session);
        let (events, mut rx) = broadcast::channel(4);
        let handle = spawn_runner(session, Arc::new(accepting_repo(CompletionKind::Manual, 100, 2)), events).unwrap();

        handle
            .record_answer(questions[0].0, AnswerPayload::Single(questions[0].1[1]))
            .await
            .unwrap();
        let set: BTreeSet<Uuid> = [questions[1].1[0], questions[1].1[2]].into_iter().collect();
        handle
            .record_answer(questions[1].0, AnswerPayload::Multiple(set))
            .await
            .unwrap();

        let outcome = handle.finish().await.unwrap();
        assert_eq!(outcome.score, 100);
        assert_eq!(outcome.kind, CompletionKind::Manual);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.attempt_id, handle.attempt_id());
        assert!(event.passed);
    }

    #[tokio::test]
    async fn second_finish_is_rejected() {
        let session = begun(Some(10));
        let (events, _rx) = broadcast::channel(4);
        let handle = spawn_runner(session, Arc::new(accepting_repo(CompletionKind::Manual, 0, 0)), events).unwrap();

        handle.finish().await.unwrap();
        assert!(matches!(handle.finish().await, Err(Error::Conflict(_))));
        let status = handle.status().await.unwrap();
        assert_eq!(status.state, AttemptState::Finalized);
        assert_eq!(status.time_remaining_seconds, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_expiry_finalizes_with_recorded_answers() {
        let session = begun(Some(1));
        let questions = two_questions_of(&session);
        let (events, mut rx) = broadcast::channel(4);
        let handle = spawn_runner(session, Arc::new(accepting_repo(CompletionKind::Timeout, 50, 1)), events).unwrap();

        handle
            .record_answer(questions[0].0, AnswerPayload::Single(questions[0].1[1]))
            .await
            .unwrap();

        let before = handle.status().await.unwrap();
        assert_eq!(before.state, AttemptState::InProgress);
        assert_eq!(before.time_remaining_seconds, 60);

        // Paused clock auto-advances to the deadline while we wait.
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, CompletionKind::Timeout);
        assert_eq!(event.score, 50);

        let after = handle.status().await.unwrap();
        assert_eq!(after.state, AttemptState::Finalized);
        assert_eq!(after.outcome.unwrap().kind, CompletionKind::Timeout);
        assert!(handle.finish().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_decrements_once_per_second() {
        let session = begun(Some(2));
        let (events, _rx) = broadcast::channel(4);
        let handle = spawn_runner(session, Arc::new(MockAttemptRepository::new()), events).unwrap();

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        let status = handle.status().await.unwrap();
        assert_eq!(status.time_remaining_seconds, 117);
    }

    #[tokio::test]
    async fn failed_write_is_reported_and_not_broadcast() {
        let session = begun(Some(10));
        let mut repo = MockAttemptRepository::new();
        repo.expect_finalize_attempt()
            .times(1)
            .returning(|_, _, _| Err(Error::Internal("connection reset".into())));
        let (events, mut rx) = broadcast::channel(4);
        let handle = spawn_runner(session, Arc::new(repo), events).unwrap();

        assert!(handle.finish().await.is_err());
        let status = handle.status().await.unwrap();
        assert_eq!(status.state, AttemptState::Finalized);
        assert!(status.persist_error.unwrap().contains("connection reset"));
        assert!(status.outcome.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn partial_answer_save_stops_the_loop() {
        let session = begun(Some(10));
        let questions = two_questions_of(&session);
        let mut repo = MockAttemptRepository::new();
        repo.expect_finalize_attempt().times(1).returning(|_, _, _| Ok(true));
        repo.expect_save_student_answer()
            .times(1)
            .returning(|_, _, _, _| Err(Error::Internal("disk full".into())));
        repo.expect_update_course_progress().times(0);
        let (events, _rx) = broadcast::channel(4);
        let handle = spawn_runner(session, Arc::new(repo), events).unwrap();

        handle
            .record_answer(questions[0].0, AnswerPayload::Single(questions[0].1[0]))
            .await
            .unwrap();
        handle
            .record_answer(questions[1].0, AnswerPayload::Multiple(BTreeSet::new()))
            .await
            .unwrap();
        assert!(handle.finish().await.is_err());
    }

    #[tokio::test]
    async fn runner_serves_any_live_handle() {
        let session = begun(Some(10));
        let (events, _rx) = broadcast::channel(4);
        let handle = spawn_runner(session, Arc::new(MockAttemptRepository::new()), events).unwrap();
        let other = handle.clone();
        drop(handle);

        let status = other.status().await.unwrap();
        assert_eq!(status.state, AttemptState::InProgress);
        assert!(!other.is_closed());
    }

    fn two_questions_of(session: &AttemptSession) -> Vec<(Uuid, Vec<Uuid>)> {
        session
            .questions()
            .into_iter()
            .map(|q| (q.id, q.options.iter().map(|o| o.id).collect()))
            .collect()
    }
}
