use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::{ExamQuestion, StudentAnswer};
use crate::db::types::{GradedBy, SessionStatus};
use crate::repositories;
use crate::repositories::grades::CreateGrade;
use crate::services::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy)]
pub(crate) struct AutoGradeOutcome {
    /// Total marks currently awarded to the session's MCQ answers, including
    /// grades from earlier invocations — re-invoking reports the same sum.
    pub(crate) mcq_marks: Decimal,
    /// Whether this call alone completed grading coverage and moved the
    /// session to graded.
    pub(crate) fully_graded: bool,
}

/// Deterministically score the session's ungraded MCQ answers: full question
/// marks when the selected option is the correct one, zero otherwise.
/// Idempotent — an answer that already has any grade is never touched.
pub(crate) async fn auto_grade(pool: &PgPool, session_id: &str) -> EngineResult<AutoGradeOutcome> {
    let session = repositories::sessions::find_by_id(pool, session_id)
        .await?
        .ok_or_else(|| EngineError::not_found(format!("Session {session_id} not found")))?;

    if matches!(session.status, SessionStatus::NotStarted | SessionStatus::InProgress) {
        return Err(EngineError::invalid_state(
            "Session must be submitted before it can be graded".to_string(),
        ));
    }

    let questions =
        repositories::questions::list_gradable_by_exam(pool, &session.exam_id).await?;
    let answers = repositories::answers::list_by_session(pool, session_id).await?;
    let graded: HashSet<String> = repositories::grades::list_by_session(pool, session_id)
        .await?
        .into_iter()
        .map(|grade| grade.answer_id)
        .collect();

    let correct_options: HashMap<String, String> =
        repositories::questions::list_options_by_exam(pool, &session.exam_id)
            .await?
            .into_iter()
            .filter(|option| option.is_correct)
            .map(|option| (option.question_id, option.id))
            .collect();

    let questions_by_id: HashMap<&str, &ExamQuestion> =
        questions.iter().map(|question| (question.id.as_str(), question)).collect();

    let now = primitive_now_utc();
    let mut newly_graded = 0u64;

    for answer in &answers {
        if graded.contains(&answer.id) {
            continue;
        }

        let Some(&question) = questions_by_id.get(answer.question_id.as_str()) else {
            // Soft-deleted question: excluded from coverage, nothing to score.
            continue;
        };

        if !question.kind.is_objective() {
            continue;
        }

        let marks = mcq_marks_for(question, answer, &correct_options);

        let inserted = repositories::grades::insert_if_absent(
            pool,
            CreateGrade {
                id: &Uuid::new_v4().to_string(),
                answer_id: &answer.id,
                marks_awarded: marks,
                feedback: None,
                graded_by: GradedBy::Auto,
                ai_confidence: None,
                is_reviewed: true,
                now,
            },
        )
        .await?;

        if inserted {
            newly_graded += 1;
        }
    }

    if newly_graded > 0 {
        metrics::counter!("autograde_answers_total").increment(newly_graded);
    }

    let fully_graded =
        crate::services::session_flow::finalize_if_covered(pool, session_id).await?.is_some();

    if !fully_graded {
        // Subjective answers remain; a submitted session parks in grading.
        repositories::sessions::mark_grading(pool, session_id, primitive_now_utc()).await?;
    }

    let mcq_marks = repositories::grades::sum_mcq_awarded_by_session(pool, session_id).await?;

    tracing::info!(session_id, %mcq_marks, fully_graded, "Auto-grading pass finished");

    Ok(AutoGradeOutcome { mcq_marks, fully_graded })
}

fn mcq_marks_for(
    question: &ExamQuestion,
    answer: &StudentAnswer,
    correct_options: &HashMap<String, String>,
) -> Decimal {
    match (&answer.selected_option_id, correct_options.get(&question.id)) {
        (Some(selected), Some(correct)) if selected == correct => question.marks,
        _ => Decimal::ZERO,
    }
}
