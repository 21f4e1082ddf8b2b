use sqlx::PgPool;

use crate::db::models::{ExamQuestion, QuestionOption};

pub(crate) const COLUMNS: &str = "\
    id, exam_id, kind, prompt, marks, model_answer, rubric, order_index, is_deleted, \
    created_at, updated_at";

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<ExamQuestion>, sqlx::Error> {
    sqlx::query_as::<_, ExamQuestion>(&format!("SELECT {COLUMNS} FROM exam_questions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Questions that still count towards grading coverage.
pub(crate) async fn list_gradable_by_exam(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<ExamQuestion>, sqlx::Error> {
    sqlx::query_as::<_, ExamQuestion>(&format!(
        "SELECT {COLUMNS} FROM exam_questions \
         WHERE exam_id = $1 AND is_deleted = FALSE \
         ORDER BY order_index"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_options_by_exam(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<QuestionOption>, sqlx::Error> {
    sqlx::query_as::<_, QuestionOption>(
        "SELECT o.id, o.question_id, o.option_text, o.is_correct, o.order_index, o.created_at \
         FROM question_options o \
         JOIN exam_questions q ON q.id = o.question_id \
         WHERE q.exam_id = $1 \
         ORDER BY o.question_id, o.order_index",
    )
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn option_belongs_to_question(
    pool: &PgPool,
    option_id: &str,
    question_id: &str,
) -> Result<bool, sqlx::Error> {
    let found: Option<i32> =
        sqlx::query_scalar("SELECT 1 FROM question_options WHERE id = $1 AND question_id = $2")
            .bind(option_id)
            .bind(question_id)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}
