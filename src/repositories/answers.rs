use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::StudentAnswer;
use crate::db::types::{QuestionKind, SessionStatus};

pub(crate) const COLUMNS: &str = "\
    id, session_id, question_id, answer_text, selected_option_id, \
    ai_requested_at, ai_attempts, ai_error, created_at, updated_at";

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<StudentAnswer>, sqlx::Error> {
    sqlx::query_as::<_, StudentAnswer>(&format!(
        "SELECT {COLUMNS} FROM student_answers WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_by_session(
    executor: impl sqlx::PgExecutor<'_>,
    session_id: &str,
) -> Result<Vec<StudentAnswer>, sqlx::Error> {
    sqlx::query_as::<_, StudentAnswer>(&format!(
        "SELECT {COLUMNS} FROM student_answers WHERE session_id = $1"
    ))
    .bind(session_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn upsert(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    session_id: &str,
    question_id: &str,
    answer_text: Option<&str>,
    selected_option_id: Option<&str>,
    now: PrimitiveDateTime,
) -> Result<StudentAnswer, sqlx::Error> {
    sqlx::query_as::<_, StudentAnswer>(&format!(
        "INSERT INTO student_answers (
            id, session_id, question_id, answer_text, selected_option_id, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $6)
        ON CONFLICT (session_id, question_id)
        DO UPDATE SET answer_text = $4, selected_option_id = $5, updated_at = $6
        RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(session_id)
    .bind(question_id)
    .bind(answer_text)
    .bind(selected_option_id)
    .bind(now)
    .fetch_one(executor)
    .await
}

/// Answers of a session still missing a grade, counting only questions that
/// have not been soft-deleted.
pub(crate) async fn count_ungraded(
    executor: impl sqlx::PgExecutor<'_>,
    session_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*)
         FROM student_answers sa
         JOIN exam_questions q ON q.id = sa.question_id
         LEFT JOIN answer_grades g ON g.answer_id = sa.id
         WHERE sa.session_id = $1
           AND q.is_deleted = FALSE
           AND g.id IS NULL",
    )
    .bind(session_id)
    .fetch_one(executor)
    .await
}

/// Claim one ungraded subjective answer for AI grading. The claim is the
/// `ai_requested_at` stamp; `FOR UPDATE SKIP LOCKED` keeps concurrent
/// workers off the same row.
pub(crate) async fn claim_next_for_ai(
    pool: &PgPool,
    now: PrimitiveDateTime,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "WITH candidate AS (
            SELECT sa.id
            FROM student_answers sa
            JOIN exam_sessions es ON es.id = sa.session_id
            JOIN exam_questions q ON q.id = sa.question_id
            LEFT JOIN answer_grades g ON g.answer_id = sa.id
            WHERE es.status IN ($1, $2)
              AND q.kind IN ($3, $4)
              AND q.is_deleted = FALSE
              AND g.id IS NULL
              AND sa.ai_requested_at IS NULL
            ORDER BY sa.created_at
            FOR UPDATE OF sa SKIP LOCKED
            LIMIT 1
        )
        UPDATE student_answers
        SET ai_requested_at = $5,
            ai_attempts = ai_attempts + 1,
            ai_error = NULL
        FROM candidate
        WHERE student_answers.id = candidate.id
        RETURNING student_answers.id",
    )
    .bind(SessionStatus::Submitted)
    .bind(SessionStatus::Grading)
    .bind(QuestionKind::ShortAnswer)
    .bind(QuestionKind::LongAnswer)
    .bind(now)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn record_ai_error(
    pool: &PgPool,
    id: &str,
    error: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE student_answers SET ai_error = $1, updated_at = $2 WHERE id = $3")
        .bind(error)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Release errored claims so the worker can try again, up to the attempt cap.
pub(crate) async fn release_errored_ai_claims(
    pool: &PgPool,
    max_attempts: i32,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE student_answers sa
         SET ai_requested_at = NULL, updated_at = $1
         FROM exam_sessions es
         WHERE es.id = sa.session_id
           AND sa.ai_error IS NOT NULL
           AND sa.ai_requested_at IS NOT NULL
           AND sa.ai_attempts < $2
           AND es.status IN ($3, $4)
           AND NOT EXISTS (SELECT 1 FROM answer_grades g WHERE g.answer_id = sa.id)",
    )
    .bind(now)
    .bind(max_attempts)
    .bind(SessionStatus::Submitted)
    .bind(SessionStatus::Grading)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Release claims that were stamped but never produced a grade or an error,
/// e.g. after a worker crash mid-call.
pub(crate) async fn release_stale_ai_claims(
    pool: &PgPool,
    stale_before: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE student_answers sa
         SET ai_requested_at = NULL, updated_at = $1
         WHERE sa.ai_requested_at < $2
           AND sa.ai_error IS NULL
           AND NOT EXISTS (SELECT 1 FROM answer_grades g WHERE g.answer_id = sa.id)",
    )
    .bind(now)
    .bind(stale_before)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
