use serde_json::json;
use sqlx::PgPool;

use crate::core::time::primitive_now_utc;
use crate::db::models::ExamSession;
use crate::db::types::{SessionStatus, ViolationType};
use crate::repositories;
use crate::services::audit;
use crate::services::error::{EngineError, EngineResult};

/// Reaching this many tab switches flags the session. The flag is one-way:
/// nothing in the tracker ever clears it.
pub(crate) const TAB_SWITCH_FLAG_THRESHOLD: i32 = 5;

/// Record one proctoring violation for an in-progress session owned by
/// `student_id`. Advisory only: the counters and the flag never feed into
/// score computation, they are surfaced read-only to graders.
pub(crate) async fn record_violation(
    pool: &PgPool,
    student_id: &str,
    session_id: &str,
    violation: ViolationType,
) -> EngineResult<ExamSession> {
    let session = repositories::sessions::find_by_id(pool, session_id)
        .await?
        .ok_or_else(|| EngineError::not_found(format!("Session {session_id} not found")))?;

    if session.student_id != student_id {
        return Err(EngineError::Forbidden("Only the owning student may report violations"));
    }

    if session.status != SessionStatus::InProgress {
        return Err(EngineError::invalid_state(format!(
            "Violations can only be recorded while the session is in progress, not {:?}",
            session.status
        )));
    }

    let updated = repositories::sessions::record_violation(
        pool,
        session_id,
        student_id,
        violation,
        TAB_SWITCH_FLAG_THRESHOLD,
        primitive_now_utc(),
    )
    .await?
    .ok_or_else(|| {
        // Lost the race against submit/expiry between the read and the write.
        EngineError::invalid_state("Session is no longer in progress".to_string())
    })?;

    metrics::counter!("anticheat_violations_total", "type" => violation.as_str()).increment(1);

    if updated.is_flagged && !session.is_flagged {
        metrics::counter!("anticheat_sessions_flagged_total").increment(1);
        tracing::warn!(
            session_id,
            student_id,
            tab_switch_count = updated.tab_switch_count,
            "Session flagged for suspicious activity"
        );
    }

    audit::record(
        student_id,
        "violation_recorded",
        "exam_session",
        session_id,
        json!({
            "violation": violation.as_str(),
            "is_flagged": updated.is_flagged,
        }),
    );

    Ok(updated)
}
