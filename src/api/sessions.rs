use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{self, Principal};
use crate::api::{grading, results};
use crate::core::state::AppState;
use crate::db::models::{Exam, ExamSession};
use crate::repositories;
use crate::schemas::grading::AutoGradeResponse;
use crate::schemas::session::{
    AnswerResponse, SaveAnswerRequest, SessionResponse, SubmitSessionRequest, ViolationRequest,
};
use crate::services::session_flow::{self, AnswerInput};
use crate::services::{anti_cheat, auto_grading};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:session_id", get(get_session))
        .route("/:session_id/answers", put(save_answer))
        .route("/:session_id/violations", post(record_violation))
        .route("/:session_id/submit", post(submit_session))
        .route("/:session_id/auto-grade", post(grading::auto_grade_session))
        .route("/:session_id/finalize", post(grading::finalize_session))
        .route("/:session_id/reopen", post(grading::reopen_session))
        .route("/:session_id/result", get(results::get_session_result))
        .route("/:session_id/result/publish", post(results::publish_session_result))
}

pub(super) async fn load_session_with_exam(
    state: &AppState,
    session_id: &str,
) -> Result<(ExamSession, Exam), ApiError> {
    let session = repositories::sessions::find_by_id(state.db(), session_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch session"))?
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;

    let exam = repositories::exams::find_by_id(state.db(), &session.exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or_else(|| ApiError::Internal("Exam missing for session".to_string()))?;

    Ok((session, exam))
}

pub(super) async fn start_exam_session(
    Path(exam_id): Path<String>,
    principal: Principal,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    guards::require_student(&principal)?;

    let session = session_flow::start_session(state.db(), &principal.user_id, &exam_id).await?;

    Ok((StatusCode::CREATED, Json(session.into())))
}

async fn get_session(
    Path(session_id): Path<String>,
    principal: Principal,
    State(state): State<AppState>,
) -> Result<Json<SessionResponse>, ApiError> {
    let (session, exam) = load_session_with_exam(&state, &session_id).await?;

    if !guards::can_view_session(&session, &exam, &principal) {
        return Err(ApiError::Forbidden("Access denied"));
    }

    Ok(Json(session.into()))
}

async fn save_answer(
    Path(session_id): Path<String>,
    principal: Principal,
    State(state): State<AppState>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let answer = session_flow::save_answer(
        state.db(),
        &principal.user_id,
        &session_id,
        AnswerInput {
            question_id: payload.question_id,
            answer_text: payload.answer_text,
            selected_option_id: payload.selected_option_id,
        },
    )
    .await?;

    Ok(Json(answer.into()))
}

async fn record_violation(
    Path(session_id): Path<String>,
    principal: Principal,
    State(state): State<AppState>,
    Json(payload): Json<ViolationRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = anti_cheat::record_violation(
        state.db(),
        &principal.user_id,
        &session_id,
        payload.violation_type,
    )
    .await?;

    Ok(Json(session.into()))
}

async fn submit_session(
    Path(session_id): Path<String>,
    principal: Principal,
    State(state): State<AppState>,
    payload: Option<Json<SubmitSessionRequest>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();

    let mut answers = Vec::with_capacity(payload.answers.len());
    for answer in payload.answers {
        answer.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
        answers.push(AnswerInput {
            question_id: answer.question_id,
            answer_text: answer.answer_text,
            selected_option_id: answer.selected_option_id,
        });
    }

    let outcome =
        session_flow::submit_session(state.db(), &principal.user_id, &session_id, answers).await?;

    let auto = AutoGradeResponse {
        session_id: session_id.clone(),
        mcq_marks: outcome.auto.mcq_marks,
        fully_graded: outcome.auto.fully_graded,
    };

    Ok(Json(serde_json::json!({
        "session": SessionResponse::from(outcome.session),
        "auto_grade": auto,
    })))
}

/// Grader-triggered re-run; a no-op for answers that already carry a grade.
pub(super) async fn auto_grade_for_grader(
    state: &AppState,
    principal: &Principal,
    session_id: &str,
) -> Result<AutoGradeResponse, ApiError> {
    let (_, exam) = load_session_with_exam(state, session_id).await?;
    guards::require_exam_grader(&exam, principal)?;

    let outcome = auto_grading::auto_grade(state.db(), session_id).await?;

    Ok(AutoGradeResponse {
        session_id: session_id.to_string(),
        mcq_marks: outcome.mcq_marks,
        fully_graded: outcome.fully_graded,
    })
}

#[cfg(test)]
mod tests;
