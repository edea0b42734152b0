use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::attempt::{AttemptState, CompletionKind};
use crate::models::question::AnswerPayload;
use crate::models::user::Role;
use crate::repository::AttemptRepository;
use crate::services::attempt_runner::{spawn_runner, AttemptHandle, FinalizedEvent, SessionStatus};
use crate::services::attempt_session::{AttemptOutcome, AttemptSession, QuestionView};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct StartedAttempt {
    pub attempt_id: Uuid,
    pub test_id: Uuid,
    pub title: String,
    pub time_limit_seconds: u64,
    pub passing_score: i32,
    pub started_at: DateTime<Utc>,
    pub questions: Vec<QuestionView>,
}

/// Status of an attempt, whether or not it still has a live runner.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptStatus {
    pub attempt_id: Uuid,
    pub state: AttemptState,
    pub active: bool,
    pub total_questions: Option<usize>,
    pub questions_answered: Option<usize>,
    pub current_index: Option<usize>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub time_remaining_seconds: Option<u64>,
    pub score: Option<i32>,
    pub passed: Option<bool>,
    pub completion_kind: Option<CompletionKind>,
    pub persist_error: Option<String>,
}

impl From<SessionStatus> for AttemptStatus {
    fn from(s: SessionStatus) -> Self {
        Self {
            attempt_id: s.attempt_id,
            state: s.state,
            active: s.state == AttemptState::InProgress,
            total_questions: Some(s.total_questions),
            questions_answered: Some(s.questions_answered),
            current_index: Some(s.current_index),
            started_at: s.started_at,
            completed_at: s.outcome.as_ref().map(|o| o.completed_at),
            time_remaining_seconds: Some(s.time_remaining_seconds),
            score: s.outcome.as_ref().map(|o| o.score),
            passed: s.outcome.as_ref().map(|o| o.passed),
            completion_kind: s.outcome.as_ref().map(|o| o.kind),
            persist_error: s.persist_error,
        }
    }
}

/// Entry point of the test attempt flow. Keeps one runner per live attempt.
#[derive(Clone)]
pub struct AttemptService {
    repository: Arc<dyn AttemptRepository>,
    sessions: Arc<RwLock<HashMap<Uuid, AttemptHandle>>>,
    events: broadcast::Sender<FinalizedEvent>,
}

impl AttemptService {
    pub fn new(repository: Arc<dyn AttemptRepository>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            repository,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Finalized-attempt events, for background consumers such as rewards.
    pub fn subscribe(&self) -> broadcast::Receiver<FinalizedEvent> {
        self.events.subscribe()
    }

    pub async fn start_attempt(
        &self,
        lesson_id: Uuid,
        student_id: Uuid,
        group_id: Option<Uuid>,
    ) -> Result<StartedAttempt> {
        let meta = self
            .repository
            .load_test_meta(lesson_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("No test found for lesson {}", lesson_id)))?;
        let questions = self.repository.load_questions(meta.test_id).await?;

        let mut session = AttemptSession::new(meta.clone(), questions, student_id, group_id);
        let attempt_id = self
            .repository
            .start_attempt(meta.test_id, student_id, group_id)
            .await?;
        let started_at = Utc::now();
        session.begin(attempt_id, started_at)?;

        let questions = session.questions();
        let handle = spawn_runner(session, self.repository.clone(), self.events.clone())?;
        self.sessions.write().await.insert(attempt_id, handle);

        tracing::info!(
            attempt_id = %attempt_id,
            student_id = %student_id,
            test_id = %meta.test_id,
            "Attempt started"
        );

        Ok(StartedAttempt {
            attempt_id,
            test_id: meta.test_id,
            title: meta.title.clone(),
            time_limit_seconds: meta.time_limit().as_secs(),
            passing_score: meta.passing_score,
            started_at,
            questions,
        })
    }

    pub async fn record_answer(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
        question_id: Uuid,
        payload: AnswerPayload,
    ) -> Result<()> {
        let handle = self.live_handle(attempt_id, student_id).await?;
        handle.record_answer(question_id, payload).await
    }

    pub async fn navigate_to(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
        index: i64,
    ) -> Result<QuestionView> {
        let handle = self.live_handle(attempt_id, student_id).await?;
        handle
            .navigate_to(index)
            .await?
            .ok_or_else(|| Error::NotFound("Test has no questions".to_string()))
    }

    pub async fn finish(&self, attempt_id: Uuid, student_id: Uuid) -> Result<AttemptOutcome> {
        let handle = self.live_handle(attempt_id, student_id).await?;
        let result = handle.finish().await;
        if result.is_ok() {
            self.sessions.write().await.remove(&attempt_id);
        }
        result
    }

    /// Live runner state when there is one, otherwise what storage knows.
    ///
    /// Students see their own attempts, teachers the attempts on their
    /// courses' tests, admins everything.
    pub async fn status(
        &self,
        attempt_id: Uuid,
        requester: Uuid,
        role: Role,
    ) -> Result<AttemptStatus> {
        let handle = self.sessions.read().await.get(&attempt_id).cloned();
        if let Some(handle) = handle {
            authorize_view(handle.student_id(), Some(handle.teacher_id()), requester, role)?;
            if let Ok(status) = handle.status().await {
                // A runner holding a persistence failure is the only record of
                // the outcome, so it stays registered.
                if status.state == AttemptState::Finalized && status.persist_error.is_none() {
                    self.sessions.write().await.remove(&attempt_id);
                }
                return Ok(status.into());
            }
            self.sessions.write().await.remove(&attempt_id);
        }

        let attempt = self
            .repository
            .get_attempt(attempt_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Attempt {} not found", attempt_id)))?;
        let teacher_id = match role {
            Role::Teacher if attempt.student_id != requester => {
                self.repository.course_teacher_for_test(attempt.test_id).await?
            }
            _ => None,
        };
        authorize_view(attempt.student_id, teacher_id, requester, role)?;

        let finalized = attempt.completed_at.is_some();
        Ok(AttemptStatus {
            attempt_id: attempt.id,
            state: if finalized {
                AttemptState::Finalized
            } else {
                AttemptState::InProgress
            },
            active: false,
            total_questions: None,
            questions_answered: None,
            current_index: None,
            started_at: Some(attempt.started_at),
            completed_at: attempt.completed_at,
            time_remaining_seconds: None,
            score: attempt.score,
            passed: None,
            completion_kind: attempt
                .completion_kind
                .as_deref()
                .map(str::parse::<CompletionKind>)
                .transpose()?,
            persist_error: None,
        })
    }

    /// Drops runners whose attempt has been finalized and stored (e.g. by
    /// the timer). Runners whose outcome failed to persist are kept.
    /// Returns how many were removed.
    pub async fn sweep_finalized(&self) -> usize {
        let handles: Vec<AttemptHandle> = self.sessions.read().await.values().cloned().collect();

        let mut finished = Vec::new();
        let mut unsaved = 0usize;
        for handle in handles {
            let done = match handle.status().await {
                Ok(status) if status.persist_error.is_some() => {
                    unsaved += 1;
                    false
                }
                Ok(status) => status.state == AttemptState::Finalized,
                Err(_) => true,
            };
            if done {
                finished.push(handle.attempt_id());
            }
        }

        if unsaved > 0 {
            tracing::warn!(unsaved, "Finalized attempts still waiting on storage");
        }
        if !finished.is_empty() {
            let mut sessions = self.sessions.write().await;
            for id in &finished {
                sessions.remove(id);
            }
            tracing::debug!(removed = finished.len(), "Swept finalized attempt runners");
        }
        finished.len()
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn live_handle(&self, attempt_id: Uuid, student_id: Uuid) -> Result<AttemptHandle> {
        let handle = self.sessions.read().await.get(&attempt_id).cloned();
        match handle {
            Some(handle) if handle.student_id() != student_id => {
                Err(Error::Forbidden("Attempt belongs to another student".to_string()))
            }
            Some(handle) => Ok(handle),
            None => match self.repository.get_attempt(attempt_id).await? {
                Some(attempt) if attempt.student_id != student_id => {
                    Err(Error::Forbidden("Attempt belongs to another student".to_string()))
                }
                Some(attempt) if attempt.completed_at.is_some() => {
                    Err(Error::Conflict("Attempt is already finalized".to_string()))
                }
                Some(_) => Err(Error::Conflict(
                    "Attempt session is no longer active; start a new attempt".to_string(),
                )),
                None => Err(Error::NotFound(format!("Attempt {} not found", attempt_id))),
            },
        }
    }
}

fn authorize_view(
    student_id: Uuid,
    teacher_id: Option<Uuid>,
    requester: Uuid,
    role: Role,
) -> Result<()> {
    let allowed = match role {
        Role::Admin => true,
        Role::Teacher => student_id == requester || teacher_id == Some(requester),
        Role::Student => student_id == requester,
    };
    if allowed {
        Ok(())
    } else {
        Err(Error::Forbidden("Attempt belongs to another student".to_string()))
    }
}
