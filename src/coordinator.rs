// src/coordinator.rs

//! Session lifecycle: start, answers, violations, and the single finalize path.

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    config::ExamConfig,
    error::{ExamError, ExamResult},
    integrity::{
        driver::{MonitorRegistry, MonitorSink},
        environment::Directive,
        monitor::TerminationReason,
    },
    models::{
        answer::AnswerRecord,
        eligibility::EligibilityRecord,
        result::ExamResultRecord,
        session::{ExamSession, NewSession, SessionOutcome, SessionStatus, StartExamRequest},
        violation::Violation,
    },
    scoring::{ScoringEngine, uniform_weights},
    store::ExamStore,
};

const WRITE_RETRIES: u32 = 3;
const WRITE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// What ended the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    /// The candidate pressed submit.
    Manual,
    /// The exam clock ran out.
    TimeUp,
    /// The integrity monitor, or an administrator, terminated the session.
    Terminated(TerminationReason),
}

impl SubmitTrigger {
    pub fn is_auto(&self) -> bool {
        !matches!(self, SubmitTrigger::Manual)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StartedSession {
    pub session: ExamSession,
    pub resumed: bool,
    pub directives: Vec<Directive>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOutcome {
    pub session: ExamSession,
    pub result: ExamResultRecord,
    pub passed: bool,
    /// Release directives for the caller's platform. Empty for auto-submits,
    /// whose release goes out through the signal report or the directive queue.
    pub directives: Vec<Directive>,
}

/// Removes the session from the in-flight set when dropped.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<i64>>,
    session_id: i64,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<i64>>, session_id: i64) -> Option<Self> {
        let inserted = in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(session_id);
        inserted.then_some(Self {
            in_flight,
            session_id,
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.session_id);
    }
}

/// Monitor decisions the store may not reflect yet. Cleared once the session is finalized.
#[derive(Debug, Clone, Copy, Default)]
struct Unsettled {
    hearts: Option<i32>,
    terminated: Option<TerminationReason>,
}

pub struct SessionCoordinator {
    store: Arc<dyn ExamStore>,
    config: ExamConfig,
    monitors: MonitorRegistry,
    in_flight: Mutex<HashSet<i64>>,
    unsettled: Mutex<HashMap<i64, Unsettled>>,
}

impl SessionCoordinator {
    pub fn new(store: Arc<dyn ExamStore>, config: ExamConfig) -> Self {
        Self {
            store,
            config,
            monitors: MonitorRegistry::new(),
            in_flight: Mutex::new(HashSet::new()),
            unsettled: Mutex::new(HashMap::new()),
        }
    }

    pub fn monitors(&self) -> &MonitorRegistry {
        &self.monitors
    }

    pub fn config(&self) -> &ExamConfig {
        &self.config
    }

    /// Starts a new session, or resumes the user's active one, and begins monitoring it.
    ///
    /// The eligibility gate only guards new sessions. An active session that
    /// was already terminated, or has no hearts left, is never resumed: it is
    /// finalized with its termination and the start is refused.
    pub async fn start_session(
        self: &Arc<Self>,
        user_id: i64,
        request: StartExamRequest,
    ) -> ExamResult<StartedSession> {
        if request.capabilities.is_empty() {
            return Err(ExamError::Unenforceable);
        }

        let active = self
            .store
            .find_active_session(user_id)
            .await?
            .map(|session| self.reconcile(session));

        let (session, resumed) = match active {
            Some(active) => {
                if let Some(reason) = active.pending_termination() {
                    tracing::warn!(
                        session_id = active.id,
                        reason = reason.as_str(),
                        "Active session was already terminated, finalizing instead of resuming"
                    );
                    self.submit_exam(active.id, SubmitTrigger::Terminated(reason))
                        .await?;
                    return Err(ExamError::NotEligible(user_id));
                }
                (active, true)
            }
            None => {
                self.ensure_eligible(user_id).await?;
                let new = NewSession {
                    user_id,
                    language: request.language,
                    question_count: request.question_count,
                    exam_instance_id: request.exam_instance_id,
                    hearts: self.config.monitor.start_hearts as i32,
                    started_at: Utc::now(),
                };
                (self.store.create_session(&new).await?, false)
            }
        };

        let elapsed = elapsed_seconds(session.started_at, Utc::now()) as u64;
        let time_left = self.config.duration.saturating_sub(Duration::from_secs(elapsed));
        let sink: Arc<dyn MonitorSink> = self.clone();
        let outbox = self.monitors.spawn(
            &session,
            request.capabilities,
            self.config.monitor,
            time_left,
            sink,
        )?;

        tracing::info!(
            session_id = session.id,
            user_id,
            resumed,
            hearts = session.hearts_remaining,
            "Exam session started"
        );
        Ok(StartedSession {
            session,
            resumed,
            directives: outbox.drain(),
        })
    }

    /// Loads a session, hiding sessions that belong to someone else.
    pub async fn session_for_user(&self, user_id: i64, session_id: i64) -> ExamResult<ExamSession> {
        match self.store.get_session(session_id).await? {
            Some(session) if session.user_id == user_id => Ok(self.reconcile(session)),
            _ => Err(ExamError::SessionNotFound(session_id)),
        }
    }

    /// Stores the sandbox outcome for one question of an active session.
    pub async fn record_answer(&self, session: &ExamSession, answer: AnswerRecord) -> ExamResult<AnswerRecord> {
        if session.status.is_final() || session.terminated_reason.is_some() {
            return Err(ExamError::AlreadyFinalized(session.id));
        }
        self.store.create_answer_record(&answer).await?;
        Ok(answer)
    }

    /// Appends a violation to the ledger and lowers the session's hearts.
    pub async fn record_violation(&self, violation: &Violation) -> ExamResult<()> {
        self.store.append_violation(violation).await?;
        self.store
            .update_hearts(
                violation.session_id,
                violation.hearts_after,
                self.violations_for(violation.hearts_after),
            )
            .await
    }

    pub async fn result(&self, session_id: i64) -> ExamResult<Option<ExamResultRecord>> {
        self.store.get_score_result(session_id).await
    }

    pub async fn violations(&self, session_id: i64) -> ExamResult<Vec<Violation>> {
        self.store.list_violations(session_id).await
    }

    pub async fn eligibility(&self, user_id: i64) -> ExamResult<Option<EligibilityRecord>> {
        self.store.get_eligibility(user_id).await
    }

    /// Lifts the eligibility gate for `user_id`.
    pub async fn restore_eligibility(&self, user_id: i64) -> ExamResult<EligibilityRecord> {
        let previous = self.store.get_eligibility(user_id).await?;
        let record = EligibilityRecord::restored(previous.as_ref(), user_id, Utc::now());
        self.store.upsert_eligibility(&record).await?;
        tracing::info!(user_id, "Exam eligibility restored");
        Ok(record)
    }

    /// Disqualifies a session on an administrator's word and closes the user's gate.
    ///
    /// An active session goes through the normal finalize path, so it is
    /// scored and its monitor released. A finalized one, passed or not, is
    /// forced to disqualified with `passed = false`.
    pub async fn revoke_session(&self, session_id: i64) -> ExamResult<ExamSession> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(ExamError::SessionNotFound(session_id))?;

        if !session.status.is_final() {
            let reason = TerminationReason::Disqualified;
            self.note_termination(session_id, reason);
            self.store.mark_terminated(session_id, reason).await?;
            match self.submit_exam(session_id, SubmitTrigger::Terminated(reason)).await {
                Ok(outcome) => {
                    tracing::warn!(session_id, "Active exam session revoked");
                    return Ok(outcome.session);
                }
                // Finalized concurrently; revoke the final row below.
                Err(ExamError::AlreadyFinalized(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let now = Utc::now();
        self.store
            .upsert_eligibility(&EligibilityRecord::blocked(session.user_id, session_id, now))
            .await?;
        self.store.revoke_session(session_id, now).await?;
        self.settle(session_id);
        self.monitors.stop(session_id);
        tracing::warn!(session_id, previous = %session.status, "Exam session revoked");

        self.store
            .get_session(session_id)
            .await?
            .ok_or(ExamError::SessionNotFound(session_id))
    }

    /// Scores and finalizes a session. Runs at most once per session.
    ///
    /// Concurrent calls for the same session are rejected with
    /// `SubmissionInFlight`; calls after a successful finalize with
    /// `AlreadyFinalized`. On a write failure the session stays active and
    /// the call can be retried: the result and eligibility writes are
    /// idempotent and the status write comes last. A session bound to a
    /// termination is finalized as that termination whatever the trigger.
    pub async fn submit_exam(&self, session_id: i64, trigger: SubmitTrigger) -> ExamResult<SubmissionOutcome> {
        let _guard = InFlightGuard::acquire(&self.in_flight, session_id)
            .ok_or(ExamError::SubmissionInFlight(session_id))?;

        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(ExamError::SessionNotFound(session_id))?;
        if session.status.is_final() {
            return Err(ExamError::AlreadyFinalized(session_id));
        }
        let session = self.reconcile(session);

        let termination = match trigger {
            SubmitTrigger::Terminated(reason) => Some(session.terminated_reason.unwrap_or(reason)),
            _ => session.pending_termination(),
        };

        let now = Utc::now();
        let time_spent = elapsed_seconds(session.started_at, now);
        if trigger == SubmitTrigger::Manual && termination.is_none() {
            let unlock = self.config.submit_unlock.as_secs() as i64;
            if time_spent < unlock {
                return Err(ExamError::SubmitLocked {
                    remaining_seconds: (unlock - time_spent) as u64,
                });
            }
        }

        let answers = self.store.list_answer_records(session_id).await?;
        let question_count = session.question_count.max(0) as usize;
        // Host-authored exams carry an explicit, uniform weight vector.
        let weights = session.exam_instance_id.map(|_| uniform_weights(question_count));
        let score = ScoringEngine::new(question_count).compute_weighted_score(&answers, weights.as_deref())?;

        let status = termination.map_or(SessionStatus::Completed, SessionStatus::from);
        let passed = status == SessionStatus::Completed && score.total_score >= self.config.min_pass_score;
        let auto_submitted = trigger.is_auto() || termination.is_some();

        let result = ExamResultRecord {
            session_id,
            user_id: session.user_id,
            total_score: score.total_score,
            max_score: score.max_score,
            questions_correct: answers.iter().filter(|a| a.is_correct).count() as i32,
            questions_total: session.question_count,
            total_compilation_errors: answers.iter().map(|a| a.compilation_errors).sum(),
            total_runtime_errors: answers.iter().map(|a| a.runtime_errors).sum(),
            avg_time_per_question_seconds: time_spent / i64::from(session.question_count.max(1)),
            contributions: score.contributions,
            created_at: now,
        };
        let outcome = SessionOutcome {
            status,
            completed_at: now,
            time_spent_seconds: time_spent,
            hearts_remaining: session.hearts_remaining,
            total_violations: self.violations_for(session.hearts_remaining),
            terminated_reason: termination,
            auto_submitted,
            passed,
        };

        if let Err(e) = self.persist(&session, &result, &outcome).await {
            tracing::error!(session_id, "Failed to finalize exam, session left active: {}", e);
            return Err(e);
        }
        self.settle(session_id);
        self.monitors.stop(session_id);
        let directives = match trigger {
            SubmitTrigger::Manual => self.monitors.directives(session_id).unwrap_or_default(),
            _ => Vec::new(),
        };

        tracing::info!(
            session_id,
            status = %status,
            score = result.total_score,
            passed,
            auto = auto_submitted,
            "Exam finalized"
        );

        let finalized = ExamSession {
            status,
            completed_at: Some(now),
            time_spent_seconds: Some(time_spent),
            total_violations: outcome.total_violations.max(session.total_violations),
            terminated_reason: termination,
            auto_submitted,
            passed,
            ..session
        };
        Ok(SubmissionOutcome {
            session: finalized,
            result,
            passed,
            directives,
        })
    }

    async fn persist(
        &self,
        session: &ExamSession,
        result: &ExamResultRecord,
        outcome: &SessionOutcome,
    ) -> ExamResult<()> {
        self.store.upsert_score_result(result).await?;
        if !outcome.passed {
            let gate = EligibilityRecord::blocked(session.user_id, session.id, outcome.completed_at);
            self.store.upsert_eligibility(&gate).await?;
        }
        self.store.update_session_status(session.id, outcome).await
    }

    async fn ensure_eligible(&self, user_id: i64) -> ExamResult<()> {
        match self.store.get_eligibility(user_id).await? {
            Some(record) if !record.is_eligible => Err(ExamError::NotEligible(user_id)),
            _ => Ok(()),
        }
    }

    /// Finalize path for timer- and monitor-driven triggers, which have no caller to report to.
    async fn finalize_with_retry(&self, session_id: i64, trigger: SubmitTrigger) {
        match with_retry(session_id, "Finalize", || self.submit_exam(session_id, trigger)).await {
            Ok(_) => {}
            Err(ExamError::TransientIo(e)) => tracing::error!(
                session_id,
                "Giving up on finalize, the next start for this user finalizes it: {}",
                e
            ),
            Err(e) => tracing::info!(session_id, "Finalize skipped: {}", e),
        }
    }

    fn violations_for(&self, hearts_remaining: i32) -> i32 {
        (self.config.monitor.start_hearts as i32 - hearts_remaining).max(0)
    }

    fn unsettled(&self) -> MutexGuard<'_, HashMap<i64, Unsettled>> {
        self.unsettled.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn note_hearts(&self, session_id: i64, hearts: i32) {
        let mut unsettled = self.unsettled();
        let entry = unsettled.entry(session_id).or_default();
        entry.hearts = Some(entry.hearts.map_or(hearts, |known| known.min(hearts)));
    }

    fn note_termination(&self, session_id: i64, reason: TerminationReason) {
        self.unsettled()
            .entry(session_id)
            .or_default()
            .terminated
            .get_or_insert(reason);
    }

    fn settle(&self, session_id: i64) {
        self.unsettled().remove(&session_id);
    }

    /// Overlays what the monitor decided on the stored row: hearts only go
    /// down and the first termination sticks.
    fn reconcile(&self, mut session: ExamSession) -> ExamSession {
        if let Some(known) = self.unsettled().get(&session.id).copied() {
            if let Some(hearts) = known.hearts {
                session.hearts_remaining = session.hearts_remaining.min(hearts);
            }
            session.terminated_reason = session.terminated_reason.or(known.terminated);
        }
        session
    }
}

#[async_trait]
impl MonitorSink for SessionCoordinator {
    async fn on_violation(&self, violation: &Violation) {
        self.note_hearts(violation.session_id, violation.hearts_after);
        let recorded = with_retry(violation.session_id, "Recording violation", || {
            self.record_violation(violation)
        })
        .await;
        if let Err(e) = recorded {
            tracing::error!(
                session_id = violation.session_id,
                hearts = violation.hearts_after,
                "Failed to record violation, hearts kept in memory: {}",
                e
            );
        }
    }

    async fn on_terminated(&self, session_id: i64, reason: TerminationReason) {
        self.note_termination(session_id, reason);
        let marked = with_retry(session_id, "Recording termination", || {
            self.store.mark_terminated(session_id, reason)
        })
        .await;
        if let Err(e) = marked {
            tracing::error!(session_id, "Failed to record termination, kept in memory: {}", e);
        }
        self.finalize_with_retry(session_id, SubmitTrigger::Terminated(reason))
            .await;
    }

    async fn on_time_up(&self, session_id: i64) {
        self.finalize_with_retry(session_id, SubmitTrigger::TimeUp)
            .await;
    }
}

/// Retries `op` on `TransientIo`, up to `WRITE_RETRIES` attempts in total.
async fn with_retry<T, F, Fut>(session_id: i64, what: &str, mut op: F) -> ExamResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ExamResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(ExamError::TransientIo(e)) if attempt < WRITE_RETRIES => {
                tracing::warn!(
                    session_id,
                    "{} attempt {} of {} failed: {}",
                    what,
                    attempt,
                    WRITE_RETRIES,
                    e
                );
                tokio::time::sleep(WRITE_RETRY_DELAY).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

fn elapsed_seconds(started_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - started_at).num_seconds().max(0)
}
