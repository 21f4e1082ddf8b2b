use crate::db::models::GradingBand;

/// The school's configured grading scale, best band first.
pub(crate) async fn list_bands(
    executor: impl sqlx::PgExecutor<'_>,
) -> Result<Vec<GradingBand>, sqlx::Error> {
    sqlx::query_as::<_, GradingBand>(
        "SELECT id, label, min_percent, max_percent, ordering \
         FROM grading_bands \
         ORDER BY ordering",
    )
    .fetch_all(executor)
    .await
}
