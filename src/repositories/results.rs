use rust_decimal::Decimal;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::ExamResult;

pub(crate) const COLUMNS: &str = "\
    id, session_id, exam_id, student_id, total_marks, obtained_marks, percentage, \
    is_passed, grade, rank, published_at, computed_at, created_at";

pub(crate) struct CreateResult<'a> {
    pub(crate) id: &'a str,
    pub(crate) session_id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) total_marks: Decimal,
    pub(crate) obtained_marks: Decimal,
    pub(crate) percentage: Decimal,
    pub(crate) is_passed: bool,
    pub(crate) grade: Option<&'a str>,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn find_by_session(
    executor: impl sqlx::PgExecutor<'_>,
    session_id: &str,
) -> Result<Option<ExamResult>, sqlx::Error> {
    sqlx::query_as::<_, ExamResult>(&format!(
        "SELECT {COLUMNS} FROM exam_results WHERE session_id = $1"
    ))
    .bind(session_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn delete_by_session(
    executor: impl sqlx::PgExecutor<'_>,
    session_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM exam_results WHERE session_id = $1")
        .bind(session_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Plain insert: the unique index on session_id turns a concurrent duplicate
/// into a database error, which the caller treats as a broken invariant.
pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    result: CreateResult<'_>,
) -> Result<ExamResult, sqlx::Error> {
    sqlx::query_as::<_, ExamResult>(&format!(
        "INSERT INTO exam_results (
            id, session_id, exam_id, student_id, total_marks, obtained_marks, percentage,
            is_passed, grade, rank, published_at, computed_at, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NULL, NULL, $10, $10)
        RETURNING {COLUMNS}"
    ))
    .bind(result.id)
    .bind(result.session_id)
    .bind(result.exam_id)
    .bind(result.student_id)
    .bind(result.total_marks)
    .bind(result.obtained_marks)
    .bind(result.percentage)
    .bind(result.is_passed)
    .bind(result.grade)
    .bind(result.now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn publish(
    executor: impl sqlx::PgExecutor<'_>,
    session_id: &str,
    now: PrimitiveDateTime,
) -> Result<Option<ExamResult>, sqlx::Error> {
    sqlx::query_as::<_, ExamResult>(&format!(
        "UPDATE exam_results SET published_at = COALESCE(published_at, $2) \
         WHERE session_id = $1 \
         RETURNING {COLUMNS}"
    ))
    .bind(session_id)
    .bind(now)
    .fetch_optional(executor)
    .await
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RankSourceRow {
    pub(crate) id: String,
    pub(crate) percentage: Decimal,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
}

/// Results of one exam in ranking order: percentage descending, ties broken
/// by earlier submission.
pub(crate) async fn list_for_ranking(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<RankSourceRow>, sqlx::Error> {
    sqlx::query_as::<_, RankSourceRow>(
        "SELECT r.id, r.percentage, s.submitted_at
         FROM exam_results r
         JOIN exam_sessions s ON s.id = r.session_id
         WHERE r.exam_id = $1
         ORDER BY r.percentage DESC, s.submitted_at ASC NULLS LAST, r.id ASC",
    )
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn set_rank(
    executor: impl sqlx::PgExecutor<'_>,
    result_id: &str,
    rank: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE exam_results SET rank = $1 WHERE id = $2")
        .bind(rank)
        .bind(result_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn list_by_exam(
    pool: &PgPool,
    exam_id: &str,
    published_only: bool,
    skip: i64,
    limit: i64,
) -> Result<Vec<ExamResult>, sqlx::Error> {
    let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(format!(
        "SELECT {COLUMNS} FROM exam_results WHERE exam_id = "
    ));
    builder.push_bind(exam_id);

    if published_only {
        builder.push(" AND published_at IS NOT NULL");
    }

    builder.push(" ORDER BY rank ASC NULLS LAST, percentage DESC OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<ExamResult>().fetch_all(pool).await
}
