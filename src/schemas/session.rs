use serde::{Deserialize, Serialize};
use validator::Validate;

pub(crate) use crate::core::time::format_primitive;
use crate::db::models::{ExamSession, StudentAnswer};
use crate::db::types::{SessionStatus, ViolationType};

#[derive(Debug, Serialize)]
pub(crate) struct SessionResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: SessionStatus,
    pub(crate) started_at: String,
    pub(crate) submitted_at: Option<String>,
    pub(crate) tab_switch_count: i32,
    pub(crate) fullscreen_exits: i32,
    pub(crate) copy_paste_attempts: i32,
    pub(crate) is_flagged: bool,
}

impl From<ExamSession> for SessionResponse {
    fn from(session: ExamSession) -> Self {
        Self {
            id: session.id,
            exam_id: session.exam_id,
            student_id: session.student_id,
            attempt_number: session.attempt_number,
            status: session.status,
            started_at: format_primitive(session.started_at),
            submitted_at: session.submitted_at.map(format_primitive),
            tab_switch_count: session.tab_switch_count,
            fullscreen_exits: session.fullscreen_exits,
            copy_paste_attempts: session.copy_paste_attempts,
            is_flagged: session.is_flagged,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerResponse {
    pub(crate) id: String,
    pub(crate) session_id: String,
    pub(crate) question_id: String,
    pub(crate) answer_text: Option<String>,
    pub(crate) selected_option_id: Option<String>,
    pub(crate) updated_at: String,
}

impl From<StudentAnswer> for AnswerResponse {
    fn from(answer: StudentAnswer) -> Self {
        Self {
            id: answer.id,
            session_id: answer.session_id,
            question_id: answer.question_id,
            answer_text: answer.answer_text,
            selected_option_id: answer.selected_option_id,
            updated_at: format_primitive(answer.updated_at),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SaveAnswerRequest {
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    #[serde(default)]
    pub(crate) answer_text: Option<String>,
    #[serde(default)]
    pub(crate) selected_option_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct SubmitSessionRequest {
    #[serde(default)]
    pub(crate) answers: Vec<SaveAnswerRequest>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ViolationRequest {
    pub(crate) violation_type: ViolationType,
}
