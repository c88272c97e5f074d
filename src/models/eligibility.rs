// src/models/eligibility.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'exam_eligibility' table.
/// A row with `is_eligible = false` blocks every future attempt until cleared.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct EligibilityRecord {
    pub user_id: i64,
    pub is_eligible: bool,
    pub last_exam_passed: bool,
    pub last_exam_session_id: Option<i64>,
    pub blocked_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl EligibilityRecord {
    /// The gate written after a failed or terminated session.
    pub fn blocked(user_id: i64, session_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            is_eligible: false,
            last_exam_passed: false,
            last_exam_session_id: Some(session_id),
            blocked_at: Some(now),
            updated_at: now,
        }
    }

    /// The record an administrator writes to lift the gate.
    pub fn restored(previous: Option<&EligibilityRecord>, user_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            is_eligible: true,
            last_exam_passed: previous.map(|p| p.last_exam_passed).unwrap_or(false),
            last_exam_session_id: previous.and_then(|p| p.last_exam_session_id),
            blocked_at: None,
            updated_at: now,
        }
    }
}
