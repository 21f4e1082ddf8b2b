use crate::db::models::Exam;

pub(crate) const COLUMNS: &str = "\
    id, title, description, status, total_marks, passing_marks, max_attempts, \
    duration_minutes, starts_at, ends_at, created_by, published_at, created_at, updated_at";

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn fetch_one_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_one(executor)
        .await
}
