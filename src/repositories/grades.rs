use rust_decimal::Decimal;
use time::PrimitiveDateTime;

use crate::db::models::AnswerGrade;
use crate::db::types::{GradedBy, QuestionKind};

pub(crate) const COLUMNS: &str = "\
    id, answer_id, marks_awarded, feedback, graded_by, ai_confidence, is_reviewed, \
    created_at, updated_at";

pub(crate) struct CreateGrade<'a> {
    pub(crate) id: &'a str,
    pub(crate) answer_id: &'a str,
    pub(crate) marks_awarded: Decimal,
    pub(crate) feedback: Option<&'a str>,
    pub(crate) graded_by: GradedBy,
    pub(crate) ai_confidence: Option<Decimal>,
    pub(crate) is_reviewed: bool,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn find_by_answer(
    executor: impl sqlx::PgExecutor<'_>,
    answer_id: &str,
) -> Result<Option<AnswerGrade>, sqlx::Error> {
    sqlx::query_as::<_, AnswerGrade>(&format!(
        "SELECT {COLUMNS} FROM answer_grades WHERE answer_id = $1"
    ))
    .bind(answer_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_by_session(
    executor: impl sqlx::PgExecutor<'_>,
    session_id: &str,
) -> Result<Vec<AnswerGrade>, sqlx::Error> {
    sqlx::query_as::<_, AnswerGrade>(
        "SELECT g.id, g.answer_id, g.marks_awarded, g.feedback, g.graded_by, g.ai_confidence, \
                g.is_reviewed, g.created_at, g.updated_at
         FROM answer_grades g
         JOIN student_answers sa ON sa.id = g.answer_id
         WHERE sa.session_id = $1",
    )
    .bind(session_id)
    .fetch_all(executor)
    .await
}

/// Grading calls never touch an answer that already has a grade; the unique
/// index on answer_id makes this a no-op when one exists.
pub(crate) async fn insert_if_absent(
    executor: impl sqlx::PgExecutor<'_>,
    grade: CreateGrade<'_>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO answer_grades (
            id, answer_id, marks_awarded, feedback, graded_by, ai_confidence, is_reviewed,
            created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
        ON CONFLICT (answer_id) DO NOTHING",
    )
    .bind(grade.id)
    .bind(grade.answer_id)
    .bind(grade.marks_awarded)
    .bind(grade.feedback)
    .bind(grade.graded_by)
    .bind(grade.ai_confidence)
    .bind(grade.is_reviewed)
    .bind(grade.now)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Manual override: replaces an existing grade in place or creates one when
/// no grader ran yet. Always ends reviewed, with the AI confidence cleared.
pub(crate) async fn upsert_manual(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    answer_id: &str,
    marks_awarded: Decimal,
    feedback: Option<&str>,
    now: PrimitiveDateTime,
) -> Result<AnswerGrade, sqlx::Error> {
    sqlx::query_as::<_, AnswerGrade>(&format!(
        "INSERT INTO answer_grades (
            id, answer_id, marks_awarded, feedback, graded_by, ai_confidence, is_reviewed,
            created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, NULL, TRUE, $6, $6)
        ON CONFLICT (answer_id)
        DO UPDATE SET marks_awarded = $3, feedback = $4, graded_by = $5,
            ai_confidence = NULL, is_reviewed = TRUE, updated_at = $6
        RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(answer_id)
    .bind(marks_awarded)
    .bind(feedback)
    .bind(GradedBy::Manual)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn confirm_review(
    executor: impl sqlx::PgExecutor<'_>,
    answer_id: &str,
    now: PrimitiveDateTime,
) -> Result<Option<AnswerGrade>, sqlx::Error> {
    sqlx::query_as::<_, AnswerGrade>(&format!(
        "UPDATE answer_grades SET is_reviewed = TRUE, updated_at = $2 \
         WHERE answer_id = $1 \
         RETURNING {COLUMNS}"
    ))
    .bind(answer_id)
    .bind(now)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn sum_awarded_by_session(
    executor: impl sqlx::PgExecutor<'_>,
    session_id: &str,
) -> Result<Decimal, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COALESCE(SUM(g.marks_awarded), 0)
         FROM answer_grades g
         JOIN student_answers sa ON sa.id = g.answer_id
         WHERE sa.session_id = $1",
    )
    .bind(session_id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn sum_mcq_awarded_by_session(
    executor: impl sqlx::PgExecutor<'_>,
    session_id: &str,
) -> Result<Decimal, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COALESCE(SUM(g.marks_awarded), 0)
         FROM answer_grades g
         JOIN student_answers sa ON sa.id = g.answer_id
         JOIN exam_questions q ON q.id = sa.question_id
         WHERE sa.session_id = $1 AND q.kind = $2",
    )
    .bind(session_id)
    .bind(QuestionKind::Mcq)
    .fetch_one(executor)
    .await
}
