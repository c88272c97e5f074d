// src/handlers/eligibility.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Serialize;

use crate::{
    coordinator::SessionCoordinator, error::AppError, models::eligibility::EligibilityRecord,
    utils::jwt::Claims,
};

#[derive(Debug, Serialize)]
pub struct EligibilityResponse {
    pub user_id: i64,
    pub is_eligible: bool,
    pub record: Option<EligibilityRecord>,
}

/// Whether the caller may start an exam. Users without a record are eligible.
pub async fn get_my_eligibility(
    State(coordinator): State<Arc<SessionCoordinator>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let record = coordinator.eligibility(user_id).await?;

    Ok(Json(EligibilityResponse {
        user_id,
        is_eligible: record.as_ref().is_none_or(|r| r.is_eligible),
        record,
    }))
}

/// Admin: lifts the gate left by a failed or terminated exam.
pub async fn restore_eligibility(
    State(coordinator): State<Arc<SessionCoordinator>>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(admin = %claims.sub, user_id, "Restoring exam eligibility");
    let record = coordinator.restore_eligibility(user_id).await?;
    Ok(Json(record))
}

/// Admin: disqualifies a session, finalized or not, and closes the user's gate.
pub async fn revoke_session(
    State(coordinator): State<Arc<SessionCoordinator>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    tracing::warn!(admin = %claims.sub, session_id, "Revoking exam session");
    let session = coordinator.revoke_session(session_id).await?;
    Ok(Json(session))
}
