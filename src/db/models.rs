use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{ExamStatus, GradedBy, QuestionKind, SessionStatus};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) status: ExamStatus,
    pub(crate) total_marks: Decimal,
    pub(crate) passing_marks: Decimal,
    pub(crate) max_attempts: i32,
    pub(crate) duration_minutes: i32,
    pub(crate) starts_at: PrimitiveDateTime,
    pub(crate) ends_at: PrimitiveDateTime,
    pub(crate) created_by: String,
    pub(crate) published_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamQuestion {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) kind: QuestionKind,
    pub(crate) prompt: String,
    pub(crate) marks: Decimal,
    pub(crate) model_answer: Option<String>,
    pub(crate) rubric: Option<Json<serde_json::Value>>,
    pub(crate) order_index: i32,
    pub(crate) is_deleted: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// Grading payload of a question as a tagged variant, so the graders'
/// contracts are statically checked instead of poking at nullable fields.
#[derive(Debug)]
pub(crate) enum GradingPayload<'a> {
    Objective,
    RubricScored { model_answer: Option<&'a str>, rubric: Option<&'a serde_json::Value> },
}

impl ExamQuestion {
    pub(crate) fn grading_payload(&self) -> GradingPayload<'_> {
        if self.kind.is_objective() {
            GradingPayload::Objective
        } else {
            GradingPayload::RubricScored {
                model_answer: self.model_answer.as_deref(),
                rubric: self.rubric.as_ref().map(|value| &value.0),
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct QuestionOption {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) option_text: String,
    pub(crate) is_correct: bool,
    pub(crate) order_index: i32,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamSession {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: SessionStatus,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) tab_switch_count: i32,
    pub(crate) fullscreen_exits: i32,
    pub(crate) copy_paste_attempts: i32,
    pub(crate) is_flagged: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct StudentAnswer {
    pub(crate) id: String,
    pub(crate) session_id: String,
    pub(crate) question_id: String,
    pub(crate) answer_text: Option<String>,
    pub(crate) selected_option_id: Option<String>,
    pub(crate) ai_requested_at: Option<PrimitiveDateTime>,
    pub(crate) ai_attempts: i32,
    pub(crate) ai_error: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct AnswerGrade {
    pub(crate) id: String,
    pub(crate) answer_id: String,
    pub(crate) marks_awarded: Decimal,
    pub(crate) feedback: Option<String>,
    pub(crate) graded_by: GradedBy,
    pub(crate) ai_confidence: Option<Decimal>,
    pub(crate) is_reviewed: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamResult {
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
    pub(crate) published_at: Option<PrimitiveDateTime>,
    pub(crate) computed_at: PrimitiveDateTime,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct GradingBand {
    pub(crate) id: String,
    pub(crate) label: String,
    pub(crate) min_percent: Decimal,
    pub(crate) max_percent: Decimal,
    pub(crate) ordering: i32,
}
