// src/models/session.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    config::MAX_EXAM_QUESTIONS,
    integrity::{environment::Capabilities, monitor::TerminationReason},
};

/// Lifecycle of an exam session. Only `Active` is mutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Disqualified,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Disqualified => "disqualified",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "completed" => Ok(SessionStatus::Completed),
            "disqualified" => Ok(SessionStatus::Disqualified),
            "abandoned" => Ok(SessionStatus::Abandoned),
            other => Err(format!("unknown session status '{}'", other)),
        }
    }
}

/// Represents the 'exam_sessions' table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamSession {
    pub id: i64,
    pub user_id: i64,
    pub language: String,

    /// Number of questions the paper was generated with.
    pub question_count: i32,

    /// Set for host-authored exams, which are scored with explicit uniform weights.
    pub exam_instance_id: Option<i64>,

    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub time_spent_seconds: Option<i64>,
    pub hearts_remaining: i32,
    pub total_violations: i32,

    /// Written as soon as the monitor terminates the session, ahead of the
    /// final status. An active session carrying a reason is never resumed.
    pub terminated_reason: Option<TerminationReason>,

    pub auto_submitted: bool,
    pub passed: bool,
}

impl ExamSession {
    /// The termination this session is bound to, if any. An active session
    /// with no hearts left counts as disqualified.
    pub fn pending_termination(&self) -> Option<TerminationReason> {
        self.terminated_reason
            .or((self.hearts_remaining <= 0).then_some(TerminationReason::Disqualified))
    }
}

impl From<TerminationReason> for SessionStatus {
    fn from(reason: TerminationReason) -> Self {
        match reason {
            TerminationReason::Disqualified => SessionStatus::Disqualified,
            TerminationReason::Abandoned => SessionStatus::Abandoned,
        }
    }
}

/// Fields needed to insert a new session row.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: i64,
    pub language: String,
    pub question_count: i32,
    pub exam_instance_id: Option<i64>,
    pub hearts: i32,
    pub started_at: DateTime<Utc>,
}

/// The final write applied to a session when it leaves `Active`.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub status: SessionStatus,
    pub completed_at: DateTime<Utc>,
    pub time_spent_seconds: i64,
    /// Applied with `LEAST`/`GREATEST`, so a stale value never restores a heart.
    pub hearts_remaining: i32,
    pub total_violations: i32,
    pub terminated_reason: Option<TerminationReason>,
    pub auto_submitted: bool,
    pub passed: bool,
}

/// DTO for starting (or resuming) an exam.
#[derive(Debug, Deserialize, Validate)]
pub struct StartExamRequest {
    #[validate(length(min = 1, max = 20))]
    pub language: String,

    #[validate(range(min = 1, max = MAX_EXAM_QUESTIONS))]
    pub question_count: i32,

    pub exam_instance_id: Option<i64>,

    /// Integrity primitives the candidate's browser supports.
    pub capabilities: Capabilities,
}
