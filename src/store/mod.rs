// src/store/mod.rs

//! Persistent store consumed by the session coordinator.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use chrono::{DateTime, Utc};

use crate::{
    error::ExamResult,
    integrity::monitor::TerminationReason,
    models::{
        answer::AnswerRecord,
        eligibility::EligibilityRecord,
        result::ExamResultRecord,
        session::{ExamSession, NewSession, SessionOutcome},
        violation::Violation,
    },
};

pub use memory::MemoryStore;
pub use postgres::PgExamStore;

#[async_trait]
pub trait ExamStore: Send + Sync {
    async fn create_session(&self, new: &NewSession) -> ExamResult<ExamSession>;

    async fn get_session(&self, session_id: i64) -> ExamResult<Option<ExamSession>>;

    async fn find_active_session(&self, user_id: i64) -> ExamResult<Option<ExamSession>>;

    /// Inserts or replaces the answer for `(session_id, question_index)`.
    async fn create_answer_record(&self, answer: &AnswerRecord) -> ExamResult<()>;

    async fn list_answer_records(&self, session_id: i64) -> ExamResult<Vec<AnswerRecord>>;

    async fn append_violation(&self, violation: &Violation) -> ExamResult<()>;

    async fn list_violations(&self, session_id: i64) -> ExamResult<Vec<Violation>>;

    /// Lowers the heart count of an active session. Never raises it.
    async fn update_hearts(
        &self,
        session_id: i64,
        hearts_remaining: i32,
        total_violations: i32,
    ) -> ExamResult<()>;

    /// Binds an active session to its termination ahead of the final status
    /// write. The first reason wins.
    async fn mark_terminated(&self, session_id: i64, reason: TerminationReason) -> ExamResult<()>;

    /// Idempotent per session: a retry overwrites, never duplicates.
    async fn upsert_score_result(&self, result: &ExamResultRecord) -> ExamResult<()>;

    async fn get_score_result(&self, session_id: i64) -> ExamResult<Option<ExamResultRecord>>;

    /// Moves an active session to its final status.
    /// Fails with `AlreadyFinalized` if the session is no longer active.
    async fn update_session_status(&self, session_id: i64, outcome: &SessionOutcome) -> ExamResult<()>;

    /// Forces any session, finalized or not, to disqualified with `passed = false`.
    async fn revoke_session(&self, session_id: i64, revoked_at: DateTime<Utc>) -> ExamResult<()>;

    async fn upsert_eligibility(&self, record: &EligibilityRecord) -> ExamResult<()>;

    async fn get_eligibility(&self, user_id: i64) -> ExamResult<Option<EligibilityRecord>>;
}
