use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::api::errors::ApiError;
use crate::api::guards::{self, Principal};
use crate::api::sessions::load_session_with_exam;
use crate::core::state::AppState;
use crate::repositories;
use crate::schemas::result::{ExamResultsResponse, ResultResponse};
use crate::services::results;

#[derive(Debug, Deserialize)]
pub(super) struct ListResultsQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    100
}

/// Students see their own result once published; graders see the computed
/// result at any time.
pub(super) async fn get_session_result(
    Path(session_id): Path<String>,
    principal: Principal,
    State(state): State<AppState>,
) -> Result<Json<ResultResponse>, ApiError> {
    let (session, exam) = load_session_with_exam(&state, &session_id).await?;

    let is_grader = guards::require_exam_grader(&exam, &principal).is_ok();
    if !is_grader && session.student_id != principal.user_id {
        return Err(ApiError::Forbidden("Access denied"));
    }

    let result = repositories::results::find_by_session(state.db(), &session_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch result"))?
        .ok_or_else(|| ApiError::NotFound("No result for this session".to_string()))?;

    if !is_grader && result.published_at.is_none() {
        return Err(ApiError::NotFound("Result has not been published yet".to_string()));
    }

    Ok(Json(result.into()))
}

pub(super) async fn publish_session_result(
    Path(session_id): Path<String>,
    principal: Principal,
    State(state): State<AppState>,
) -> Result<Json<ResultResponse>, ApiError> {
    let (_, exam) = load_session_with_exam(&state, &session_id).await?;
    guards::require_exam_grader(&exam, &principal)?;

    let result = results::publish_result(state.db(), &principal.user_id, &session_id).await?;

    Ok(Json(result.into()))
}

pub(super) async fn list_exam_results(
    Path(exam_id): Path<String>,
    Query(query): Query<ListResultsQuery>,
    principal: Principal,
    State(state): State<AppState>,
) -> Result<Json<ExamResultsResponse>, ApiError> {
    let exam = repositories::exams::find_by_id(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;

    guards::require_exam_grader(&exam, &principal)?;

    let rows = repositories::results::list_by_exam(
        state.db(),
        &exam_id,
        false,
        query.skip,
        query.limit,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to list results"))?;

    Ok(Json(ExamResultsResponse {
        exam_id,
        results: rows.into_iter().map(ResultResponse::from).collect(),
    }))
}

pub(super) async fn recompute_exam_ranks(
    Path(exam_id): Path<String>,
    principal: Principal,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let exam = repositories::exams::find_by_id(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;

    guards::require_exam_grader(&exam, &principal)?;

    let ranked = results::recompute_ranks(state.db(), &exam_id).await?;

    Ok(Json(serde_json::json!({"exam_id": exam_id, "ranked": ranked})))
}
