use rust_decimal::Decimal;
use serde::Serialize;

use crate::core::time::format_primitive;
use crate::db::models::ExamResult;

#[derive(Debug, Serialize)]
pub(crate) struct ResultResponse {
    pub(crate) id: String,
    pub(crate) session_id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) total_marks: Decimal,
    pub(crate) obtained_marks: Decimal,
    pub(crate) percentage: Decimal,
    pub(crate) is_passed: bool,
    pub(crate) grade: Option<String>,
    pub(crate) rank: Option<i32>,
    pub(crate) published_at: Option<String>,
    pub(crate) computed_at: String,
}

impl From<ExamResult> for ResultResponse {
    fn from(result: ExamResult) -> Self {
        Self {
            id: result.id,
            session_id: result.session_id,
            exam_id: result.exam_id,
            student_id: result.student_id,
            total_marks: result.total_marks,
            obtained_marks: result.obtained_marks,
            percentage: result.percentage,
            is_passed: result.is_passed,
            grade: result.grade,
            rank: result.rank,
            published_at: result.published_at.map(format_primitive),
            computed_at: format_primitive(result.computed_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResultsResponse {
    pub(crate) exam_id: String,
    pub(crate) results: Vec<ResultResponse>,
}
