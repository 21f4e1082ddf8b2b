use anyhow::{Context, Result};
use time::Duration;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::services::error::EngineError;
use crate::services::{ai_grading, auto_grading, session_flow};

/// A claim older than this with neither a grade nor an error is considered
/// abandoned (worker crash mid-call) and released for another worker.
const STALE_CLAIM_MINUTES: i64 = 15;

/// Claim one ungraded subjective answer and run the AI grader over it. When
/// the grade completes the session's coverage, the session is finalized in
/// the same pass. Returns whether an answer was claimed.
pub(crate) async fn process_next_answer(state: &AppState) -> Result<bool> {
    let claimed = repositories::answers::claim_next_for_ai(state.db(), primitive_now_utc())
        .await
        .context("Failed to claim answer for AI grading")?;

    let Some(answer_id) = claimed else {
        return Ok(false);
    };

    match ai_grading::ai_grade(state.db(), state.scoring(), &answer_id).await {
        Ok(grade) => {
            metrics::counter!("grading_jobs_total", "status" => "success").increment(1);

            let answer = repositories::answers::find_by_id(state.db(), &answer_id)
                .await
                .context("Failed to re-fetch graded answer")?;

            if let Some(answer) = answer {
                if session_flow::finalize_if_covered(state.db(), &answer.session_id)
                    .await
                    .map_err(|err| anyhow::anyhow!(err.to_string()))?
                    .is_some()
                {
                    tracing::info!(
                        session_id = %answer.session_id,
                        "Session fully graded by worker"
                    );
                }
            }

            tracing::info!(answer_id, marks = %grade.marks_awarded, "AI grading job finished");
        }
        Err(EngineError::ScoringUnavailable(message)) => {
            metrics::counter!("grading_jobs_total", "status" => "unavailable").increment(1);
            tracing::warn!(answer_id, error = %message, "Scoring unavailable, will retry");
            repositories::answers::record_ai_error(
                state.db(),
                &answer_id,
                &message,
                primitive_now_utc(),
            )
            .await
            .context("Failed to record AI error")?;
        }
        Err(err) => {
            metrics::counter!("grading_jobs_total", "status" => "failed").increment(1);
            tracing::error!(answer_id, error = %err, "AI grading job failed");
            repositories::answers::record_ai_error(
                state.db(),
                &answer_id,
                &err.to_string(),
                primitive_now_utc(),
            )
            .await
            .context("Failed to record AI error")?;
        }
    }

    Ok(true)
}

/// Submit in-progress sessions whose deadline passed: the earlier of the
/// exam end and started_at + duration. Uses the same legal
/// in-progress -> submitted transition as a manual submit, then runs the
/// auto-grader.
pub(crate) async fn submit_overdue_sessions(state: &AppState) -> Result<()> {
    let now = primitive_now_utc();
    let overdue = repositories::sessions::list_overdue(state.db(), now)
        .await
        .context("Failed to list overdue sessions")?;

    let mut submitted = 0;

    for session in overdue {
        let flipped =
            repositories::sessions::mark_submitted(state.db(), &session.id, session.deadline, now)
                .await
                .context("Failed to auto-submit overdue session")?;

        if !flipped {
            continue;
        }
        submitted += 1;

        if let Err(err) = auto_grading::auto_grade(state.db(), &session.id).await {
            tracing::error!(
                session_id = %session.id,
                error = %err,
                "Auto-grading after deadline submit failed"
            );
        }
    }

    if submitted > 0 {
        tracing::info!(submitted_sessions = submitted, "Auto-submitted overdue sessions");
        metrics::counter!("overdue_sessions_submitted_total").increment(submitted);
    }

    Ok(())
}

/// Requeue AI grading work: errored claims below the attempt cap and stale
/// claims abandoned by a dead worker.
pub(crate) async fn requeue_ai_grading(state: &AppState) -> Result<()> {
    let now = primitive_now_utc();
    let max_attempts = state.settings().grading().ai_max_attempts;

    let retried = repositories::answers::release_errored_ai_claims(state.db(), max_attempts, now)
        .await
        .context("Failed to release errored AI claims")?;

    let stale_before = now - Duration::minutes(STALE_CLAIM_MINUTES);
    let released = repositories::answers::release_stale_ai_claims(state.db(), stale_before, now)
        .await
        .context("Failed to release stale AI claims")?;

    if retried > 0 || released > 0 {
        tracing::info!(retried, released, "Requeued AI grading claims");
        metrics::counter!("ai_claims_requeued_total").increment(retried + released);
    }

    Ok(())
}
