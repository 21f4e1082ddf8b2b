use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::AnswerGrade;
use crate::db::types::GradedBy;

#[derive(Debug, Serialize)]
pub(crate) struct GradeResponse {
    pub(crate) id: String,
    pub(crate) answer_id: String,
    pub(crate) marks_awarded: Decimal,
    pub(crate) feedback: Option<String>,
    pub(crate) graded_by: GradedBy,
    pub(crate) ai_confidence: Option<Decimal>,
    pub(crate) is_reviewed: bool,
    pub(crate) updated_at: String,
}

impl From<AnswerGrade> for GradeResponse {
    fn from(grade: AnswerGrade) -> Self {
        Self {
            id: grade.id,
            answer_id: grade.answer_id,
            marks_awarded: grade.marks_awarded,
            feedback: grade.feedback,
            graded_by: grade.graded_by,
            ai_confidence: grade.ai_confidence,
            is_reviewed: grade.is_reviewed,
            updated_at: format_primitive(grade.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AutoGradeResponse {
    pub(crate) session_id: String,
    pub(crate) mcq_marks: Decimal,
    pub(crate) fully_graded: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct OverrideGradeRequest {
    pub(crate) marks_awarded: Decimal,
    #[serde(default)]
    #[validate(length(max = 4000, message = "feedback is too long"))]
    pub(crate) feedback: Option<String>,
}
