// src/models/result.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Weighted share of a single question in the final score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionContribution {
    pub question_index: i32,
    pub weight: f64,
    pub tests_passed: i32,
    pub tests_total: i32,
    /// `weight * passed / total * 100`, before rounding.
    pub points: f64,
}

/// Output of the scoring engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Rounded percentage in `0..=100`.
    pub total_score: i32,
    /// Always 100, regardless of question count.
    pub max_score: i32,
    /// One entry per question, ordered by question index.
    pub contributions: Vec<QuestionContribution>,
}

/// Represents the 'exam_results' table. At most one row per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamResultRecord {
    pub session_id: i64,
    pub user_id: i64,
    pub total_score: i32,
    pub max_score: i32,
    pub questions_correct: i32,
    pub questions_total: i32,
    pub total_compilation_errors: i32,
    pub total_runtime_errors: i32,
    pub avg_time_per_question_seconds: i64,
    pub contributions: Vec<QuestionContribution>,
    pub created_at: DateTime<Utc>,
}
