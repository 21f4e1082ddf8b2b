use anyhow::anyhow;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::{Exam, ExamResult, ExamSession, GradingBand};
use crate::repositories;
use crate::repositories::results::{CreateResult, RankSourceRow};
use crate::services::audit;
use crate::services::error::{EngineError, EngineResult};

/// Percentage at fixed precision. Anything outside [0, 100] means the grade
/// rows are inconsistent with the exam snapshot and the transaction must not
/// commit.
pub(crate) fn percentage_of(obtained: Decimal, total: Decimal) -> EngineResult<Decimal> {
    if total <= Decimal::ZERO {
        return Err(EngineError::Internal(anyhow!("exam total marks must be positive, got {total}")));
    }

    let percentage = (obtained / total * Decimal::from(100)).round_dp(2);
    if percentage < Decimal::ZERO || percentage > Decimal::from(100) {
        return Err(EngineError::Internal(anyhow!(
            "computed percentage {percentage} outside [0, 100] (obtained {obtained} of {total})"
        )));
    }

    Ok(percentage)
}

/// First band containing the percentage, best band first.
pub(crate) fn letter_grade(bands: &[GradingBand], percentage: Decimal) -> Option<String> {
    bands
        .iter()
        .find(|band| percentage >= band.min_percent && percentage <= band.max_percent)
        .map(|band| band.label.clone())
}

/// Standard competition ranking over rows already sorted by percentage
/// descending (ties pre-ordered by earlier submission): equal percentages
/// share a rank, the next distinct percentage skips accordingly.
pub(crate) fn assign_ranks(rows: &[RankSourceRow]) -> Vec<(String, i32)> {
    let mut ranks = Vec::with_capacity(rows.len());
    let mut previous: Option<Decimal> = None;
    let mut rank = 1i32;

    for (index, row) in rows.iter().enumerate() {
        if previous != Some(row.percentage) {
            rank = index as i32 + 1;
            previous = Some(row.percentage);
        }
        ranks.push((row.id.clone(), rank));
    }

    ranks
}

/// Recompute the session's result from its answer grades. Always a
/// delete-and-recreate inside the caller's transaction, never a partial
/// patch, so no half-updated aggregate can ever be observed.
pub(crate) async fn compute_result(
    tx: &mut Transaction<'_, Postgres>,
    session: &ExamSession,
    exam: &Exam,
    bands: &[GradingBand],
) -> EngineResult<ExamResult> {
    let obtained = repositories::grades::sum_awarded_by_session(&mut **tx, &session.id).await?;
    let total = exam.total_marks;
    let percentage = percentage_of(obtained, total)?;
    let is_passed = obtained >= exam.passing_marks;
    let grade = letter_grade(bands, percentage);

    repositories::results::delete_by_session(&mut **tx, &session.id).await?;

    let result = repositories::results::create(
        &mut **tx,
        CreateResult {
            id: &Uuid::new_v4().to_string(),
            session_id: &session.id,
            exam_id: &session.exam_id,
            student_id: &session.student_id,
            total_marks: total,
            obtained_marks: obtained,
            percentage,
            is_passed,
            grade: grade.as_deref(),
            now: primitive_now_utc(),
        },
    )
    .await?;

    metrics::counter!("results_computed_total").increment(1);

    Ok(result)
}

/// Batch rank pass over one exam's results; safe to re-run, a rerun over an
/// unchanged set assigns identical ranks.
pub(crate) async fn recompute_ranks(pool: &PgPool, exam_id: &str) -> EngineResult<usize> {
    let rows = repositories::results::list_for_ranking(pool, exam_id).await?;
    let ranks = assign_ranks(&rows);

    for (result_id, rank) in &ranks {
        repositories::results::set_rank(pool, result_id, *rank).await?;
    }

    tracing::debug!(exam_id, ranked = ranks.len(), "Recomputed exam ranks");

    Ok(ranks.len())
}

/// Make a computed result visible to the student. Idempotent: publishing an
/// already-published result keeps the original timestamp. Ranks are
/// recomputed lazily here.
pub(crate) async fn publish_result(
    pool: &PgPool,
    actor_id: &str,
    session_id: &str,
) -> EngineResult<ExamResult> {
    let published = repositories::results::publish(pool, session_id, primitive_now_utc())
        .await?
        .ok_or_else(|| {
            EngineError::not_found(format!("No computed result for session {session_id}"))
        })?;

    recompute_ranks(pool, &published.exam_id).await?;

    let result = repositories::results::find_by_session(pool, session_id)
        .await?
        .ok_or_else(|| EngineError::Internal(anyhow!("result vanished while publishing")))?;

    audit::record(
        actor_id,
        "result_published",
        "exam_result",
        &result.id,
        json!({"session_id": session_id, "percentage": result.percentage}),
    );

    Ok(result)
}
