use axum::{
    extract::{Path, State},
    routing::{post, put},
    Json, Router,
};
use serde_json::json;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{self, Principal};
use crate::api::sessions::{auto_grade_for_grader, load_session_with_exam};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Exam, ExamQuestion, ExamSession};
use crate::repositories;
use crate::schemas::grading::{AutoGradeResponse, GradeResponse, OverrideGradeRequest};
use crate::schemas::result::ResultResponse;
use crate::schemas::session::SessionResponse;
use crate::services::{ai_grading, audit, session_flow};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:answer_id/ai-grade", post(ai_grade_answer))
        .route("/:answer_id/grade", put(override_grade))
        .route("/:answer_id/grade/confirm", post(confirm_grade))
}

struct AnswerContext {
    question: ExamQuestion,
    session: ExamSession,
    exam: Exam,
}

async fn load_answer_context(
    state: &AppState,
    answer_id: &str,
) -> Result<AnswerContext, ApiError> {
    let answer = repositories::answers::find_by_id(state.db(), answer_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch answer"))?
        .ok_or_else(|| ApiError::NotFound("Answer not found".to_string()))?;

    let question = repositories::questions::find_by_id(state.db(), &answer.question_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch question"))?
        .ok_or_else(|| ApiError::Internal("Question missing for answer".to_string()))?;

    let (session, exam) = load_session_with_exam(state, &answer.session_id).await?;

    Ok(AnswerContext { question, session, exam })
}

pub(super) async fn auto_grade_session(
    Path(session_id): Path<String>,
    principal: Principal,
    State(state): State<AppState>,
) -> Result<Json<AutoGradeResponse>, ApiError> {
    let response = auto_grade_for_grader(&state, &principal, &session_id).await?;
    Ok(Json(response))
}

async fn ai_grade_answer(
    Path(answer_id): Path<String>,
    principal: Principal,
    State(state): State<AppState>,
) -> Result<Json<GradeResponse>, ApiError> {
    let context = load_answer_context(&state, &answer_id).await?;
    guards::require_exam_grader(&context.exam, &principal)?;

    let grade = ai_grading::ai_grade(state.db(), state.scoring(), &answer_id).await?;

    Ok(Json(grade.into()))
}

/// Manual teacher override: replaces the proposed marks/feedback and takes
/// ownership of the grade. Never available once the session is graded —
/// that would drift a computed result; reopen first.
async fn override_grade(
    Path(answer_id): Path<String>,
    principal: Principal,
    State(state): State<AppState>,
    Json(payload): Json<OverrideGradeRequest>,
) -> Result<Json<GradeResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let context = load_answer_context(&state, &answer_id).await?;
    guards::require_exam_grader(&context.exam, &principal)?;

    if !context.session.status.is_gradable() {
        return Err(ApiError::Conflict(format!(
            "Grades can only be edited while the session is submitted or grading, it is {:?}; reopen it first",
            context.session.status
        )));
    }

    if payload.marks_awarded < rust_decimal::Decimal::ZERO
        || payload.marks_awarded > context.question.marks
    {
        return Err(ApiError::BadRequest(format!(
            "marks_awarded must be between 0 and {}",
            context.question.marks
        )));
    }

    let grade = repositories::grades::upsert_manual(
        state.db(),
        &uuid::Uuid::new_v4().to_string(),
        &answer_id,
        payload.marks_awarded,
        payload.feedback.as_deref(),
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to store manual grade"))?;

    audit::record(
        &principal.user_id,
        "grade_overridden",
        "answer_grade",
        &grade.id,
        json!({"answer_id": answer_id, "marks_awarded": grade.marks_awarded}),
    );

    Ok(Json(grade.into()))
}

/// Confirm an AI-proposed grade without changing it: clears the review flag,
/// keeps the grader attribution.
async fn confirm_grade(
    Path(answer_id): Path<String>,
    principal: Principal,
    State(state): State<AppState>,
) -> Result<Json<GradeResponse>, ApiError> {
    let context = load_answer_context(&state, &answer_id).await?;
    guards::require_exam_grader(&context.exam, &principal)?;

    let grade = repositories::grades::confirm_review(
        state.db(),
        &answer_id,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to confirm grade"))?
    .ok_or_else(|| ApiError::NotFound("No grade exists for this answer".to_string()))?;

    audit::record(
        &principal.user_id,
        "grade_confirmed",
        "answer_grade",
        &grade.id,
        json!({"answer_id": answer_id}),
    );

    Ok(Json(grade.into()))
}

pub(super) async fn finalize_session(
    Path(session_id): Path<String>,
    principal: Principal,
    State(state): State<AppState>,
) -> Result<Json<ResultResponse>, ApiError> {
    let (_, exam) = load_session_with_exam(&state, &session_id).await?;
    guards::require_exam_grader(&exam, &principal)?;

    let result =
        session_flow::finalize_session(state.db(), &principal.user_id, &session_id).await?;

    Ok(Json(result.into()))
}

pub(super) async fn reopen_session(
    Path(session_id): Path<String>,
    principal: Principal,
    State(state): State<AppState>,
) -> Result<Json<SessionResponse>, ApiError> {
    let (_, exam) = load_session_with_exam(&state, &session_id).await?;
    guards::require_exam_grader(&exam, &principal)?;

    let session =
        session_flow::reopen_session(state.db(), &principal.user_id, &session_id).await?;

    Ok(Json(session.into()))
}

#[cfg(test)]
mod tests;
