// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, types::Json};

use crate::{
    error::{ExamError, ExamResult},
    integrity::monitor::TerminationReason,
    models::{
        answer::AnswerRecord,
        eligibility::EligibilityRecord,
        result::{ExamResultRecord, QuestionContribution},
        session::{ExamSession, NewSession, SessionOutcome, SessionStatus},
        violation::{Violation, ViolationType},
    },
    store::ExamStore,
};

const SESSION_COLUMNS: &str = r#"
    id, user_id, language, question_count, exam_instance_id, status,
    started_at, completed_at, time_spent_seconds, hearts_remaining,
    total_violations, terminated_reason, auto_submitted, passed
"#;

/// Raw 'exam_sessions' row; `status` is stored as text.
#[derive(FromRow)]
struct SessionRow {
    id: i64,
    user_id: i64,
    language: String,
    question_count: i32,
    exam_instance_id: Option<i64>,
    status: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    time_spent_seconds: Option<i64>,
    hearts_remaining: i32,
    total_violations: i32,
    terminated_reason: Option<String>,
    auto_submitted: bool,
    passed: bool,
}

impl TryFrom<SessionRow> for ExamSession {
    type Error = ExamError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let terminated_reason = row
            .terminated_reason
            .as_deref()
            .map(|raw| {
                TerminationReason::parse(raw).ok_or_else(|| {
                    ExamError::Configuration(format!("unknown termination reason '{}'", raw))
                })
            })
            .transpose()?;
        Ok(ExamSession {
            id: row.id,
            user_id: row.user_id,
            language: row.language,
            question_count: row.question_count,
            exam_instance_id: row.exam_instance_id,
            status: row.status.parse::<SessionStatus>().map_err(ExamError::Configuration)?,
            started_at: row.started_at,
            completed_at: row.completed_at,
            time_spent_seconds: row.time_spent_seconds,
            hearts_remaining: row.hearts_remaining,
            total_violations: row.total_violations,
            terminated_reason,
            auto_submitted: row.auto_submitted,
            passed: row.passed,
        })
    }
}

#[derive(FromRow)]
struct ViolationRow {
    session_id: i64,
    violation_type: String,
    occurred_at: DateTime<Utc>,
    hearts_before: i32,
    hearts_after: i32,
}

impl TryFrom<ViolationRow> for Violation {
    type Error = ExamError;

    fn try_from(row: ViolationRow) -> Result<Self, Self::Error> {
        let violation_type = ViolationType::parse(&row.violation_type).ok_or_else(|| {
            ExamError::Configuration(format!("unknown violation type '{}'", row.violation_type))
        })?;
        Ok(Violation {
            session_id: row.session_id,
            violation_type,
            occurred_at: row.occurred_at,
            hearts_before: row.hearts_before,
            hearts_after: row.hearts_after,
        })
    }
}

#[derive(FromRow)]
struct ResultRow {
    session_id: i64,
    user_id: i64,
    total_score: i32,
    max_score: i32,
    questions_correct: i32,
    questions_total: i32,
    total_compilation_errors: i32,
    total_runtime_errors: i32,
    avg_time_per_question_seconds: i64,
    contributions: Json<Vec<QuestionContribution>>,
    created_at: DateTime<Utc>,
}

impl From<ResultRow> for ExamResultRecord {
    fn from(row: ResultRow) -> Self {
        ExamResultRecord {
            session_id: row.session_id,
            user_id: row.user_id,
            total_score: row.total_score,
            max_score: row.max_score,
            questions_correct: row.questions_correct,
            questions_total: row.questions_total,
            total_compilation_errors: row.total_compilation_errors,
            total_runtime_errors: row.total_runtime_errors,
            avg_time_per_question_seconds: row.avg_time_per_question_seconds,
            contributions: row.contributions.0,
            created_at: row.created_at,
        }
    }
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgExamStore {
    pool: PgPool,
}

impl PgExamStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_session(&self, filter: &str, value: i64) -> ExamResult<Option<ExamSession>> {
        let sql = format!("SELECT {} FROM exam_sessions WHERE {}", SESSION_COLUMNS, filter);
        sqlx::query_as::<_, SessionRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to fetch exam session: {:?}", e);
                ExamError::from(e)
            })?
            .map(ExamSession::try_from)
            .transpose()
    }
}

#[async_trait]
impl ExamStore for PgExamStore {
    async fn create_session(&self, new: &NewSession) -> ExamResult<ExamSession> {
        let sql = format!(
            r#"
            INSERT INTO exam_sessions
                (user_id, language, question_count, exam_instance_id, hearts_remaining, started_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            SESSION_COLUMNS
        );
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(new.user_id)
            .bind(&new.language)
            .bind(new.question_count)
            .bind(new.exam_instance_id)
            .bind(new.hearts)
            .bind(new.started_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create exam session: {:?}", e);
                ExamError::from(e)
            })?;
        row.try_into()
    }

    async fn get_session(&self, session_id: i64) -> ExamResult<Option<ExamSession>> {
        self.fetch_session("id = $1", session_id).await
    }

    async fn find_active_session(&self, user_id: i64) -> ExamResult<Option<ExamSession>> {
        self.fetch_session("user_id = $1 AND status = 'active'", user_id)
            .await
    }

    async fn create_answer_record(&self, answer: &AnswerRecord) -> ExamResult<()> {
        sqlx::query(
            r#"
            INSERT INTO exam_answers
                (session_id, question_index, tests_passed, tests_total,
                 compilation_errors, runtime_errors, is_correct)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (session_id, question_index) DO UPDATE SET
                tests_passed = EXCLUDED.tests_passed,
                tests_total = EXCLUDED.tests_total,
                compilation_errors = EXCLUDED.compilation_errors,
                runtime_errors = EXCLUDED.runtime_errors,
                is_correct = EXCLUDED.is_correct,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(answer.session_id)
        .bind(answer.question_index)
        .bind(answer.tests_passed)
        .bind(answer.tests_total)
        .bind(answer.compilation_errors)
        .bind(answer.runtime_errors)
        .bind(answer.is_correct)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_answer_records(&self, session_id: i64) -> ExamResult<Vec<AnswerRecord>> {
        let answers = sqlx::query_as::<_, AnswerRecord>(
            r#"
            SELECT session_id, question_index, tests_passed, tests_total,
                   compilation_errors, runtime_errors, is_correct
            FROM exam_answers
            WHERE session_id = $1
            ORDER BY question_index
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(answers)
    }

    async fn append_violation(&self, violation: &Violation) -> ExamResult<()> {
        sqlx::query(
            r#"
            INSERT INTO exam_violations
                (session_id, violation_type, occurred_at, hearts_before, hearts_after)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(violation.session_id)
        .bind(violation.violation_type.as_str())
        .bind(violation.occurred_at)
        .bind(violation.hearts_before)
        .bind(violation.hearts_after)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_violations(&self, session_id: i64) -> ExamResult<Vec<Violation>> {
        sqlx::query_as::<_, ViolationRow>(
            r#"
            SELECT session_id, violation_type, occurred_at, hearts_before, hearts_after
            FROM exam_violations
            WHERE session_id = $1
            ORDER BY id
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Violation::try_from)
        .collect()
    }

    async fn update_hearts(
        &self,
        session_id: i64,
        hearts_remaining: i32,
        total_violations: i32,
    ) -> ExamResult<()> {
        sqlx::query(
            r#"
            UPDATE exam_sessions SET
                hearts_remaining = LEAST(hearts_remaining, $2),
                total_violations = GREATEST(total_violations, $3)
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(session_id)
        .bind(hearts_remaining)
        .bind(total_violations)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_terminated(&self, session_id: i64, reason: TerminationReason) -> ExamResult<()> {
        sqlx::query(
            r#"
            UPDATE exam_sessions SET
                terminated_reason = COALESCE(terminated_reason, $2)
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(session_id)
        .bind(reason.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to mark exam session terminated: {:?}", e);
            ExamError::from(e)
        })?;
        Ok(())
    }

    async fn upsert_score_result(&self, result: &ExamResultRecord) -> ExamResult<()> {
        sqlx::query(
            r#"
            INSERT INTO exam_results
                (session_id, user_id, total_score, max_score, questions_correct,
                 questions_total, total_compilation_errors, total_runtime_errors,
                 avg_time_per_question_seconds, contributions, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (session_id) DO UPDATE SET
                total_score = EXCLUDED.total_score,
                max_score = EXCLUDED.max_score,
                questions_correct = EXCLUDED.questions_correct,
                questions_total = EXCLUDED.questions_total,
                total_compilation_errors = EXCLUDED.total_compilation_errors,
                total_runtime_errors = EXCLUDED.total_runtime_errors,
                avg_time_per_question_seconds = EXCLUDED.avg_time_per_question_seconds,
                contributions = EXCLUDED.contributions,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(result.session_id)
        .bind(result.user_id)
        .bind(result.total_score)
        .bind(result.max_score)
        .bind(result.questions_correct)
        .bind(result.questions_total)
        .bind(result.total_compilation_errors)
        .bind(result.total_runtime_errors)
        .bind(result.avg_time_per_question_seconds)
        .bind(Json(&result.contributions))
        .bind(result.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to upsert exam result: {:?}", e);
            ExamError::from(e)
        })?;
        Ok(())
    }

    async fn get_score_result(&self, session_id: i64) -> ExamResult<Option<ExamResultRecord>> {
        let row = sqlx::query_as::<_, ResultRow>(
            r#"
            SELECT session_id, user_id, total_score, max_score, questions_correct,
                   questions_total, total_compilation_errors, total_runtime_errors,
                   avg_time_per_question_seconds, contributions, created_at
            FROM exam_results
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ExamResultRecord::from))
    }

    async fn update_session_status(&self, session_id: i64, outcome: &SessionOutcome) -> ExamResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE exam_sessions SET
                status = $2,
                completed_at = $3,
                time_spent_seconds = $4,
                hearts_remaining = LEAST(hearts_remaining, $5),
                total_violations = GREATEST(total_violations, $6),
                terminated_reason = COALESCE(terminated_reason, $7),
                auto_submitted = $8,
                passed = $9
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(session_id)
        .bind(outcome.status.as_str())
        .bind(outcome.completed_at)
        .bind(outcome.time_spent_seconds)
        .bind(outcome.hearts_remaining)
        .bind(outcome.total_violations)
        .bind(outcome.terminated_reason.map(|reason| reason.as_str()))
        .bind(outcome.auto_submitted)
        .bind(outcome.passed)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update exam session status: {:?}", e);
            ExamError::from(e)
        })?
        .rows_affected();

        if updated == 0 {
            return Err(ExamError::AlreadyFinalized(session_id));
        }
        Ok(())
    }

    async fn revoke_session(&self, session_id: i64, revoked_at: DateTime<Utc>) -> ExamResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE exam_sessions SET
                status = 'disqualified',
                passed = FALSE,
                completed_at = COALESCE(completed_at, $2),
                terminated_reason = COALESCE(terminated_reason, 'disqualified')
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .bind(revoked_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(ExamError::SessionNotFound(session_id));
        }
        Ok(())
    }

    async fn upsert_eligibility(&self, record: &EligibilityRecord) -> ExamResult<()> {
        sqlx::query(
            r#"
            INSERT INTO exam_eligibility
                (user_id, is_eligible, last_exam_passed, last_exam_session_id, blocked_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE SET
                is_eligible = EXCLUDED.is_eligible,
                last_exam_passed = EXCLUDED.last_exam_passed,
                last_exam_session_id = EXCLUDED.last_exam_session_id,
                blocked_at = EXCLUDED.blocked_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(record.user_id)
        .bind(record.is_eligible)
        .bind(record.last_exam_passed)
        .bind(record.last_exam_session_id)
        .bind(record.blocked_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to upsert exam eligibility: {:?}", e);
            ExamError::from(e)
        })?;
        Ok(())
    }

    async fn get_eligibility(&self, user_id: i64) -> ExamResult<Option<EligibilityRecord>> {
        let record = sqlx::query_as::<_, EligibilityRecord>(
            r#"
            SELECT user_id, is_eligible, last_exam_passed, last_exam_session_id, blocked_at, updated_at
            FROM exam_eligibility
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }
}
