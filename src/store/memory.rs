// src/store/memory.rs

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::{ExamError, ExamResult},
    integrity::monitor::TerminationReason,
    models::{
        answer::AnswerRecord,
        eligibility::EligibilityRecord,
        result::ExamResultRecord,
        session::{ExamSession, NewSession, SessionOutcome, SessionStatus},
        violation::Violation,
    },
    store::ExamStore,
};

#[derive(Default)]
struct Tables {
    next_session_id: i64,
    sessions: BTreeMap<i64, ExamSession>,
    answers: BTreeMap<(i64, i32), AnswerRecord>,
    violations: Vec<Violation>,
    results: HashMap<i64, ExamResultRecord>,
    result_writes: HashMap<i64, usize>,
    eligibility: HashMap<i64, EligibilityRecord>,
    transitions: Vec<(i64, SessionStatus)>,
}

/// In-process store for development mode and tests.
///
/// Writes can be made to fail on demand to exercise the retry paths.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
    fail_status_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every write returns `TransientIo`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// While set, only the final status update fails.
    pub fn set_fail_status_writes(&self, fail: bool) {
        self.fail_status_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of status transitions applied to the session.
    pub fn status_transitions(&self, session_id: i64) -> usize {
        self.tables()
            .transitions
            .iter()
            .filter(|(id, _)| *id == session_id)
            .count()
    }

    /// Number of result writes for the session, including overwrites.
    pub fn result_writes(&self, session_id: i64) -> usize {
        self.tables()
            .result_writes
            .get(&session_id)
            .copied()
            .unwrap_or(0)
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn writable(&self) -> ExamResult<MutexGuard<'_, Tables>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ExamError::TransientIo("simulated write failure".to_string()));
        }
        Ok(self.tables())
    }
}

#[async_trait]
impl ExamStore for MemoryStore {
    async fn create_session(&self, new: &NewSession) -> ExamResult<ExamSession> {
        let mut tables = self.writable()?;
        if tables
            .sessions
            .values()
            .any(|s| s.user_id == new.user_id && s.status == SessionStatus::Active)
        {
            return Err(ExamError::TransientIo(format!(
                "user {} already has an active session",
                new.user_id
            )));
        }
        tables.next_session_id += 1;
        let session = ExamSession {
            id: tables.next_session_id,
            user_id: new.user_id,
            language: new.language.clone(),
            question_count: new.question_count,
            exam_instance_id: new.exam_instance_id,
            status: SessionStatus::Active,
            started_at: new.started_at,
            completed_at: None,
            time_spent_seconds: None,
            hearts_remaining: new.hearts,
            total_violations: 0,
            terminated_reason: None,
            auto_submitted: false,
            passed: false,
        };
        tables.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: i64) -> ExamResult<Option<ExamSession>> {
        Ok(self.tables().sessions.get(&session_id).cloned())
    }

    async fn find_active_session(&self, user_id: i64) -> ExamResult<Option<ExamSession>> {
        Ok(self
            .tables()
            .sessions
            .values()
            .find(|s| s.user_id == user_id && s.status == SessionStatus::Active)
            .cloned())
    }

    async fn create_answer_record(&self, answer: &AnswerRecord) -> ExamResult<()> {
        let mut tables = self.writable()?;
        tables
            .answers
            .insert((answer.session_id, answer.question_index), answer.clone());
        Ok(())
    }

    async fn list_answer_records(&self, session_id: i64) -> ExamResult<Vec<AnswerRecord>> {
        Ok(self
            .tables()
            .answers
            .range((session_id, i32::MIN)..=(session_id, i32::MAX))
            .map(|(_, answer)| answer.clone())
            .collect())
    }

    async fn append_violation(&self, violation: &Violation) -> ExamResult<()> {
        self.writable()?.violations.push(violation.clone());
        Ok(())
    }

    async fn list_violations(&self, session_id: i64) -> ExamResult<Vec<Violation>> {
        Ok(self
            .tables()
            .violations
            .iter()
            .filter(|v| v.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn update_hearts(
        &self,
        session_id: i64,
        hearts_remaining: i32,
        total_violations: i32,
    ) -> ExamResult<()> {
        let mut tables = self.writable()?;
        if let Some(session) = tables.sessions.get_mut(&session_id) {
            if session.status == SessionStatus::Active {
                session.hearts_remaining = session.hearts_remaining.min(hearts_remaining);
                session.total_violations = session.total_violations.max(total_violations);
            }
        }
        Ok(())
    }

    async fn mark_terminated(&self, session_id: i64, reason: TerminationReason) -> ExamResult<()> {
        let mut tables = self.writable()?;
        if let Some(session) = tables.sessions.get_mut(&session_id) {
            if session.status == SessionStatus::Active {
                session.terminated_reason.get_or_insert(reason);
            }
        }
        Ok(())
    }

    async fn upsert_score_result(&self, result: &ExamResultRecord) -> ExamResult<()> {
        let mut tables = self.writable()?;
        tables.results.insert(result.session_id, result.clone());
        *tables.result_writes.entry(result.session_id).or_default() += 1;
        Ok(())
    }

    async fn get_score_result(&self, session_id: i64) -> ExamResult<Option<ExamResultRecord>> {
        Ok(self.tables().results.get(&session_id).cloned())
    }

    async fn update_session_status(&self, session_id: i64, outcome: &SessionOutcome) -> ExamResult<()> {
        if self.fail_status_writes.load(Ordering::SeqCst) {
            return Err(ExamError::TransientIo("simulated status write failure".to_string()));
        }
        let mut tables = self.writable()?;
        let session = tables
            .sessions
            .get_mut(&session_id)
            .ok_or(ExamError::SessionNotFound(session_id))?;
        if session.status != SessionStatus::Active {
            return Err(ExamError::AlreadyFinalized(session_id));
        }
        session.status = outcome.status;
        session.completed_at = Some(outcome.completed_at);
        session.time_spent_seconds = Some(outcome.time_spent_seconds);
        session.hearts_remaining = session.hearts_remaining.min(outcome.hearts_remaining);
        session.total_violations = session.total_violations.max(outcome.total_violations);
        session.terminated_reason = session.terminated_reason.or(outcome.terminated_reason);
        session.auto_submitted = outcome.auto_submitted;
        session.passed = outcome.passed;
        tables.transitions.push((session_id, outcome.status));
        Ok(())
    }

    async fn revoke_session(&self, session_id: i64, revoked_at: DateTime<Utc>) -> ExamResult<()> {
        let mut tables = self.writable()?;
        let session = tables
            .sessions
            .get_mut(&session_id)
            .ok_or(ExamError::SessionNotFound(session_id))?;
        session.status = SessionStatus::Disqualified;
        session.passed = false;
        session.completed_at.get_or_insert(revoked_at);
        session.terminated_reason.get_or_insert(TerminationReason::Disqualified);
        tables.transitions.push((session_id, SessionStatus::Disqualified));
        Ok(())
    }

    async fn upsert_eligibility(&self, record: &EligibilityRecord) -> ExamResult<()> {
        self.writable()?
            .eligibility
            .insert(record.user_id, record.clone());
        Ok(())
    }

    async fn get_eligibility(&self, user_id: i64) -> ExamResult<Option<EligibilityRecord>> {
        Ok(self.tables().eligibility.get(&user_id).cloned())
    }
}
