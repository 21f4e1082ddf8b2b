use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::db::models::{Exam, ExamSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum UserRole {
    Student,
    Teacher,
    Admin,
}

/// Acting principal, as supplied by the identity collaborator in front of
/// this service. The gateway has already authenticated the user; these
/// headers are trusted.
#[derive(Debug, Clone)]
pub(crate) struct Principal {
    pub(crate) user_id: String,
    pub(crate) role: UserRole,
}

impl Principal {
    pub(crate) fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(ApiError::Unauthorized("Missing authenticated principal"))?;

        let role = parts
            .headers
            .get("x-user-role")
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized("Missing principal role"))?;

        let role = match role.trim().to_ascii_lowercase().as_str() {
            "student" => UserRole::Student,
            "teacher" => UserRole::Teacher,
            "admin" => UserRole::Admin,
            _ => return Err(ApiError::Unauthorized("Unknown principal role")),
        };

        Ok(Principal { user_id: user_id.to_string(), role })
    }
}

/// Grading operations are reserved for the exam's creating teacher or an
/// admin.
pub(crate) fn require_exam_grader(exam: &Exam, principal: &Principal) -> Result<(), ApiError> {
    let allowed = principal.is_admin()
        || (principal.role == UserRole::Teacher && exam.created_by == principal.user_id);

    if allowed {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Only the exam's teacher or an admin may grade"))
    }
}

pub(crate) fn require_student(principal: &Principal) -> Result<(), ApiError> {
    if principal.role == UserRole::Student {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Only students take exams"))
    }
}

pub(crate) fn can_view_session(
    session: &ExamSession,
    exam: &Exam,
    principal: &Principal,
) -> bool {
    session.student_id == principal.user_id || require_exam_grader(exam, principal).is_ok()
}
