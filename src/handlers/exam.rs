// src/handlers/exam.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use validator::Validate;

use crate::{
    coordinator::{SessionCoordinator, SubmitTrigger},
    error::{AppError, ExamError},
    integrity::environment::EnvironmentSignal,
    models::{
        answer::{AnswerRecord, RecordAnswerRequest},
        result::ExamResultRecord,
        session::{ExamSession, StartExamRequest},
        violation::Violation,
    },
    utils::jwt::Claims,
};

/// A session as shown to its candidate.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session: ExamSession,
    pub monitoring: bool,
    pub violations: Vec<Violation>,
    pub result: Option<ExamResultRecord>,
}

/// Starts a new exam, or resumes the caller's active one.
///
/// Responds 201 for a new session and 200 for a resumed one. The first
/// directives (normally `enter_fullscreen`) come back with the session.
pub async fn start_exam(
    State(coordinator): State<Arc<SessionCoordinator>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<StartExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(|e| AppError::BadRequest(e.to_string()))?;
    let user_id = claims.user_id()?;

    let started = coordinator.start_session(user_id, payload).await?;
    let status = if started.resumed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(started)))
}

pub async fn get_session(
    State(coordinator): State<Arc<SessionCoordinator>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = coordinator.session_for_user(claims.user_id()?, session_id).await?;
    let violations = coordinator.violations(session_id).await?;
    let result = coordinator.result(session_id).await?;

    Ok(Json(SessionView {
        monitoring: coordinator.monitors().is_running(session_id),
        session,
        violations,
        result,
    }))
}

/// Records the sandbox outcome for one question.
pub async fn record_answer(
    State(coordinator): State<Arc<SessionCoordinator>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
    Json(payload): Json<RecordAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(|e| AppError::BadRequest(e.to_string()))?;
    let session = coordinator.session_for_user(claims.user_id()?, session_id).await?;

    if payload.question_index >= session.question_count {
        return Err(AppError::BadRequest(format!(
            "Question index {} out of range for a {}-question exam",
            payload.question_index, session.question_count
        )));
    }

    let answer = AnswerRecord::from_execution(
        session.id,
        payload.question_index,
        &payload.execution,
        payload.compilation_errors,
    );
    let answer = coordinator.record_answer(&session, answer).await?;
    Ok(Json(answer))
}

/// Feeds one browser signal to the session's integrity monitor.
pub async fn post_signal(
    State(coordinator): State<Arc<SessionCoordinator>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
    Json(signal): Json<EnvironmentSignal>,
) -> Result<impl IntoResponse, AppError> {
    let session = coordinator.session_for_user(claims.user_id()?, session_id).await?;
    if session.status.is_final() {
        return Err(ExamError::AlreadyFinalized(session_id).into());
    }

    match coordinator.monitors().signal(session_id, signal).await {
        Some(report) => Ok(Json(report)),
        None => Err(AppError::Conflict(
            "Session is not being monitored, start the exam again to resume it".to_string(),
        )),
    }
}

/// Pending platform directives for the session, oldest first.
pub async fn get_directives(
    State(coordinator): State<Arc<SessionCoordinator>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    coordinator.session_for_user(claims.user_id()?, session_id).await?;
    let directives = coordinator
        .monitors()
        .directives(session_id)
        .unwrap_or_default();
    Ok(Json(directives))
}

/// Manual submit. Refused until the submit unlock time has passed.
pub async fn submit_exam(
    State(coordinator): State<Arc<SessionCoordinator>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    coordinator.session_for_user(claims.user_id()?, session_id).await?;
    let outcome = coordinator.submit_exam(session_id, SubmitTrigger::Manual).await?;
    Ok(Json(outcome))
}
