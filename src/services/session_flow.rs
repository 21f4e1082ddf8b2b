use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::{ExamResult, ExamSession, StudentAnswer};
use crate::db::types::SessionStatus;
use crate::repositories;
use crate::services::audit;
use crate::services::auto_grading::{self, AutoGradeOutcome};
use crate::services::error::{EngineError, EngineResult};

/// One answer as sent by the student, before persistence.
#[derive(Debug, Clone)]
pub(crate) struct AnswerInput {
    pub(crate) question_id: String,
    pub(crate) answer_text: Option<String>,
    pub(crate) selected_option_id: Option<String>,
}

#[derive(Debug)]
pub(crate) struct SubmitOutcome {
    pub(crate) session: ExamSession,
    pub(crate) auto: AutoGradeOutcome,
}

/// Start a new attempt. The insert is check-and-insert against the partial
/// unique index on open sessions, so two concurrent starts can never both
/// create an in-progress session.
pub(crate) async fn start_session(
    pool: &PgPool,
    student_id: &str,
    exam_id: &str,
) -> EngineResult<ExamSession> {
    let exam = repositories::exams::find_by_id(pool, exam_id)
        .await?
        .ok_or_else(|| EngineError::not_found(format!("Exam {exam_id} not found")))?;

    if !exam.status.accepts_attempts() {
        return Err(EngineError::invalid_state(format!(
            "Exam is not accepting attempts while {:?}",
            exam.status
        )));
    }

    let now = primitive_now_utc();
    if now < exam.starts_at {
        return Err(EngineError::invalid_state("Exam has not opened yet".to_string()));
    }
    if now > exam.ends_at {
        return Err(EngineError::invalid_state("Exam has already closed".to_string()));
    }

    if exam.max_attempts > 0 {
        let attempts = repositories::sessions::count_attempts(pool, exam_id, student_id).await?;
        if attempts >= i64::from(exam.max_attempts) {
            return Err(EngineError::invalid_state("Attempt limit reached for this exam".to_string()));
        }
    }

    let created = repositories::sessions::create_attempt(
        pool,
        &Uuid::new_v4().to_string(),
        exam_id,
        student_id,
        now,
    )
    .await?;

    let Some(session) = created else {
        let existing = repositories::sessions::find_open(pool, exam_id, student_id).await?;
        let detail = existing.map(|open| format!(" (session {})", open.id)).unwrap_or_default();
        return Err(EngineError::invalid_state(format!(
            "An open attempt for this exam already exists{detail}"
        )));
    };

    metrics::counter!("sessions_started_total").increment(1);
    audit::record(
        student_id,
        "session_started",
        "exam_session",
        &session.id,
        json!({"exam_id": exam_id, "attempt_number": session.attempt_number}),
    );

    Ok(session)
}

/// Upsert one answer while the attempt is in progress.
pub(crate) async fn save_answer(
    pool: &PgPool,
    student_id: &str,
    session_id: &str,
    input: AnswerInput,
) -> EngineResult<StudentAnswer> {
    let session = owned_session(pool, student_id, session_id).await?;

    if session.status != SessionStatus::InProgress {
        return Err(EngineError::invalid_state(
            "Answers can only be changed while the session is in progress".to_string(),
        ));
    }

    persist_answer(pool, &session, input).await
}

async fn persist_answer(
    pool: &PgPool,
    session: &ExamSession,
    input: AnswerInput,
) -> EngineResult<StudentAnswer> {
    let question = repositories::questions::find_by_id(pool, &input.question_id)
        .await?
        .filter(|question| question.exam_id == session.exam_id && !question.is_deleted)
        .ok_or_else(|| {
            EngineError::not_found(format!("Question {} not found in this exam", input.question_id))
        })?;

    if question.kind.is_objective() {
        if input.answer_text.is_some() {
            return Err(EngineError::validation(
                "Multiple-choice questions take a selected option, not answer text".to_string(),
            ));
        }
        if let Some(option_id) = &input.selected_option_id {
            let belongs =
                repositories::questions::option_belongs_to_question(pool, option_id, &question.id)
                    .await?;
            if !belongs {
                return Err(EngineError::validation(
                    "Selected option does not belong to this question".to_string(),
                ));
            }
        }
    } else if input.selected_option_id.is_some() {
        return Err(EngineError::validation(
            "Free-text questions take answer text, not a selected option".to_string(),
        ));
    }

    let answer = repositories::answers::upsert(
        pool,
        &Uuid::new_v4().to_string(),
        &session.id,
        &question.id,
        input.answer_text.as_deref(),
        input.selected_option_id.as_deref(),
        primitive_now_utc(),
    )
    .await?;

    Ok(answer)
}

/// Submit the attempt: persist any final answers, flip to submitted, and run
/// the auto-grader. The status flip is conditional on still being
/// in-progress, so a concurrent submit loses cleanly.
pub(crate) async fn submit_session(
    pool: &PgPool,
    student_id: &str,
    session_id: &str,
    answers: Vec<AnswerInput>,
) -> EngineResult<SubmitOutcome> {
    let session = owned_session(pool, student_id, session_id).await?;

    if !session.status.can_transition_to(SessionStatus::Submitted) {
        return Err(EngineError::invalid_state(format!(
            "Only an in-progress session can be submitted, this one is {:?}",
            session.status
        )));
    }

    for input in answers {
        persist_answer(pool, &session, input).await?;
    }

    let now = primitive_now_utc();
    let submitted = repositories::sessions::mark_submitted(pool, session_id, now, now).await?;
    if !submitted {
        return Err(EngineError::invalid_state(
            "Session was submitted or expired concurrently".to_string(),
        ));
    }

    metrics::counter!("sessions_submitted_total").increment(1);
    audit::record(
        student_id,
        "session_submitted",
        "exam_session",
        session_id,
        json!({"exam_id": session.exam_id}),
    );

    let auto = auto_grading::auto_grade(pool, session_id).await?;
    let session = repositories::sessions::fetch_one_by_id(pool, session_id).await?;

    Ok(SubmitOutcome { session, auto })
}

/// Complete grading if every answer to a non-deleted question carries a
/// grade: flips the session to graded and recomputes its result, all inside
/// one transaction. Returns `None` when coverage is incomplete or another
/// caller won the transition.
pub(crate) async fn finalize_if_covered(
    pool: &PgPool,
    session_id: &str,
) -> EngineResult<Option<ExamResult>> {
    let mut tx = pool.begin().await?;

    let ungraded = repositories::answers::count_ungraded(&mut *tx, session_id).await?;
    if ungraded > 0 {
        tx.rollback().await?;
        return Ok(None);
    }

    let transitioned =
        repositories::sessions::mark_graded(&mut *tx, session_id, primitive_now_utc()).await?;
    if !transitioned {
        tx.rollback().await?;
        return Ok(None);
    }

    let session = repositories::sessions::fetch_one_by_id(&mut *tx, session_id).await?;
    let exam = repositories::exams::fetch_one_by_id(&mut *tx, &session.exam_id).await?;
    let bands = repositories::grading_scale::list_bands(&mut *tx).await?;

    let result = crate::services::results::compute_result(&mut tx, &session, &exam, &bands).await?;

    tx.commit().await?;

    metrics::counter!("sessions_graded_total").increment(1);

    Ok(Some(result))
}

/// Explicit finalize trigger for graders, used after manual grading and
/// after a reopen.
pub(crate) async fn finalize_session(
    pool: &PgPool,
    actor_id: &str,
    session_id: &str,
) -> EngineResult<ExamResult> {
    let session = repositories::sessions::find_by_id(pool, session_id)
        .await?
        .ok_or_else(|| EngineError::not_found(format!("Session {session_id} not found")))?;

    if !session.status.is_gradable() {
        return Err(EngineError::invalid_state(format!(
            "Only a submitted or grading session can be finalized, this one is {:?}",
            session.status
        )));
    }

    let ungraded = repositories::answers::count_ungraded(pool, session_id).await?;
    if ungraded > 0 {
        return Err(EngineError::invalid_state(format!(
            "{ungraded} answer(s) are still ungraded"
        )));
    }

    let result = finalize_if_covered(pool, session_id).await?.ok_or_else(|| {
        EngineError::invalid_state("Session was finalized or changed concurrently".to_string())
    })?;

    audit::record(
        actor_id,
        "session_finalized",
        "exam_session",
        session_id,
        json!({"obtained_marks": result.obtained_marks, "percentage": result.percentage}),
    );

    Ok(result)
}

/// Roll a graded session back to grading for correction. The result is
/// deleted in the same transaction; answer grades are kept so the teacher
/// edits from prior values rather than a blank slate.
pub(crate) async fn reopen_session(
    pool: &PgPool,
    actor_id: &str,
    session_id: &str,
) -> EngineResult<ExamSession> {
    let session = repositories::sessions::find_by_id(pool, session_id)
        .await?
        .ok_or_else(|| EngineError::not_found(format!("Session {session_id} not found")))?;

    if session.status != SessionStatus::Graded {
        return Err(EngineError::invalid_state(format!(
            "Only a graded session can be reopened, this one is {:?}",
            session.status
        )));
    }

    let mut tx = pool.begin().await?;

    let reopened =
        repositories::sessions::reopen_to_grading(&mut *tx, session_id, primitive_now_utc())
            .await?;
    if !reopened {
        tx.rollback().await?;
        return Err(EngineError::invalid_state(
            "Session left the graded state concurrently".to_string(),
        ));
    }

    repositories::results::delete_by_session(&mut *tx, session_id).await?;

    tx.commit().await?;

    metrics::counter!("sessions_reopened_total").increment(1);
    audit::record(actor_id, "session_reopened", "exam_session", session_id, json!({}));

    let session = repositories::sessions::fetch_one_by_id(pool, session_id).await?;
    Ok(session)
}

async fn owned_session(
    pool: &PgPool,
    student_id: &str,
    session_id: &str,
) -> EngineResult<ExamSession> {
    let session = repositories::sessions::find_by_id(pool, session_id)
        .await?
        .ok_or_else(|| EngineError::not_found(format!("Session {session_id} not found")))?;

    if session.student_id != student_id {
        return Err(EngineError::Forbidden("Session belongs to another student"));
    }

    Ok(session)
}
