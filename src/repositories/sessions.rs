use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::ExamSession;
use crate::db::types::{SessionStatus, ViolationType};

pub(crate) const COLUMNS: &str = "\
    id, exam_id, student_id, attempt_number, status, started_at, submitted_at, \
    tab_switch_count, fullscreen_exits, copy_paste_attempts, is_flagged, created_at, updated_at";

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<ExamSession>, sqlx::Error> {
    sqlx::query_as::<_, ExamSession>(&format!("SELECT {COLUMNS} FROM exam_sessions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn fetch_one_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<ExamSession, sqlx::Error> {
    sqlx::query_as::<_, ExamSession>(&format!("SELECT {COLUMNS} FROM exam_sessions WHERE id = $1"))
        .bind(id)
        .fetch_one(executor)
        .await
}

pub(crate) async fn find_open(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    student_id: &str,
) -> Result<Option<ExamSession>, sqlx::Error> {
    sqlx::query_as::<_, ExamSession>(&format!(
        "SELECT {COLUMNS} FROM exam_sessions \
         WHERE exam_id = $1 AND student_id = $2 AND status IN ($3, $4)"
    ))
    .bind(exam_id)
    .bind(student_id)
    .bind(SessionStatus::NotStarted)
    .bind(SessionStatus::InProgress)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn count_attempts(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    student_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM exam_sessions WHERE exam_id = $1 AND student_id = $2")
        .bind(exam_id)
        .bind(student_id)
        .fetch_one(executor)
        .await
}

/// Check-and-insert of a new attempt. The attempt number is derived inside
/// the statement and the partial unique index on open sessions makes a
/// concurrent second start lose the insert; `None` means an open session
/// already exists.
pub(crate) async fn create_attempt(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    exam_id: &str,
    student_id: &str,
    now: PrimitiveDateTime,
) -> Result<Option<ExamSession>, sqlx::Error> {
    sqlx::query_as::<_, ExamSession>(&format!(
        "INSERT INTO exam_sessions (
            id, exam_id, student_id, attempt_number, status, started_at, created_at, updated_at
        )
        SELECT $1, $2, $3, COALESCE(MAX(attempt_number), 0) + 1, $4, $5, $5, $5
        FROM exam_sessions
        WHERE exam_id = $2 AND student_id = $3
        ON CONFLICT DO NOTHING
        RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(exam_id)
    .bind(student_id)
    .bind(SessionStatus::InProgress)
    .bind(now)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn mark_submitted(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    submitted_at: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exam_sessions SET status = $1, submitted_at = $2, updated_at = $3 \
         WHERE id = $4 AND status = $5",
    )
    .bind(SessionStatus::Submitted)
    .bind(submitted_at)
    .bind(now)
    .bind(id)
    .bind(SessionStatus::InProgress)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn mark_grading(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exam_sessions SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4",
    )
    .bind(SessionStatus::Grading)
    .bind(now)
    .bind(id)
    .bind(SessionStatus::Submitted)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn mark_graded(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exam_sessions SET status = $1, updated_at = $2 \
         WHERE id = $3 AND status IN ($4, $5)",
    )
    .bind(SessionStatus::Graded)
    .bind(now)
    .bind(id)
    .bind(SessionStatus::Submitted)
    .bind(SessionStatus::Grading)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn reopen_to_grading(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exam_sessions SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4",
    )
    .bind(SessionStatus::Grading)
    .bind(now)
    .bind(id)
    .bind(SessionStatus::Graded)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Increment exactly one violation counter and derive the flag in the same
/// statement. The status/owner predicates make the write conditional, so a
/// session that left IN_PROGRESS concurrently is never mutated.
pub(crate) async fn record_violation(
    pool: &PgPool,
    id: &str,
    student_id: &str,
    violation: ViolationType,
    tab_switch_threshold: i32,
    now: PrimitiveDateTime,
) -> Result<Option<ExamSession>, sqlx::Error> {
    let column = match violation {
        ViolationType::TabSwitch => "tab_switch_count",
        ViolationType::FullscreenExit => "fullscreen_exits",
        ViolationType::CopyPaste => "copy_paste_attempts",
    };

    sqlx::query_as::<_, ExamSession>(&format!(
        "UPDATE exam_sessions \
         SET {column} = {column} + 1, \
             is_flagged = is_flagged OR ($3 AND tab_switch_count + 1 >= $4), \
             updated_at = $5 \
         WHERE id = $1 AND student_id = $2 AND status = $6 \
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(student_id)
    .bind(matches!(violation, ViolationType::TabSwitch))
    .bind(tab_switch_threshold)
    .bind(now)
    .bind(SessionStatus::InProgress)
    .fetch_optional(pool)
    .await
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OverdueSession {
    pub(crate) id: String,
    pub(crate) deadline: PrimitiveDateTime,
}

/// In-progress sessions past their hard deadline: the earlier of the exam
/// end time and started_at + duration.
pub(crate) async fn list_overdue(
    pool: &PgPool,
    now: PrimitiveDateTime,
) -> Result<Vec<OverdueSession>, sqlx::Error> {
    sqlx::query_as::<_, OverdueSession>(
        "SELECT s.id,
                LEAST(e.ends_at, s.started_at + make_interval(mins => e.duration_minutes)) AS deadline
         FROM exam_sessions s
         JOIN exams e ON e.id = s.exam_id
         WHERE s.status = $1
           AND LEAST(e.ends_at, s.started_at + make_interval(mins => e.duration_minutes)) <= $2",
    )
    .bind(SessionStatus::InProgress)
    .bind(now)
    .fetch_all(pool)
    .await
}
