// src/models/answer.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::config::MAX_EXAM_QUESTIONS;

/// Represents the 'exam_answers' table.
/// One row per (session, question); read-only input to the scoring engine.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub session_id: i64,
    pub question_index: i32,
    pub tests_passed: i32,
    pub tests_total: i32,
    pub compilation_errors: i32,
    pub runtime_errors: i32,
    pub is_correct: bool,
}

/// Outcome of a single test case, as reported by the execution sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub passed: bool,
    #[serde(default)]
    pub actual_output: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub runtime_ms: u64,
}

/// Response body of the execution sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxResponse {
    pub results: Vec<TestCaseResult>,
    #[serde(default, rename = "consoleOutput", alias = "console_output")]
    pub console_output: String,
}

impl AnswerRecord {
    /// Summarises a sandbox run into the counters the scoring engine reads.
    pub fn from_execution(
        session_id: i64,
        question_index: i32,
        execution: &SandboxResponse,
        compilation_errors: i32,
    ) -> Self {
        let tests_total = execution.results.len() as i32;
        let tests_passed = execution.results.iter().filter(|r| r.passed).count() as i32;
        let runtime_errors = execution
            .results
            .iter()
            .filter(|r| r.error.as_deref().is_some_and(|e| !e.is_empty()))
            .count() as i32;

        Self {
            session_id,
            question_index,
            tests_passed,
            tests_total,
            compilation_errors,
            runtime_errors,
            is_correct: tests_total > 0 && tests_passed == tests_total,
        }
    }
}

/// DTO for recording the sandbox result of one question.
#[derive(Debug, Deserialize, Validate)]
pub struct RecordAnswerRequest {
    #[validate(range(min = 0, max = MAX_EXAM_QUESTIONS))]
    pub question_index: i32,

    #[serde(default)]
    #[validate(range(min = 0))]
    pub compilation_errors: i32,

    pub execution: SandboxResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(passed: bool, error: Option<&str>) -> TestCaseResult {
        TestCaseResult {
            passed,
            actual_output: String::new(),
            error: error.map(str::to_string),
            runtime_ms: 3,
        }
    }

    #[test]
    fn test_from_execution_counts_results() {
        let execution = SandboxResponse {
            results: vec![
                case(true, None),
                case(false, Some("IndexError")),
                case(false, Some("")),
                case(true, None),
            ],
            console_output: String::new(),
        };

        let record = AnswerRecord::from_execution(7, 1, &execution, 0);
        assert_eq!(record.tests_total, 4);
        assert_eq!(record.tests_passed, 2);
        assert_eq!(record.runtime_errors, 1);
        assert!(!record.is_correct);
    }

    #[test]
    fn test_from_execution_empty_is_not_correct() {
        let execution = SandboxResponse {
            results: vec![],
            console_output: String::new(),
        };

        let record = AnswerRecord::from_execution(7, 0, &execution, 1);
        assert_eq!(record.tests_total, 0);
        assert_eq!(record.compilation_errors, 1);
        assert!(!record.is_correct);
    }
}
