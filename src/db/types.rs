use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "examstatus", rename_all = "lowercase")]
pub(crate) enum ExamStatus {
    Draft,
    Published,
    Active,
    Completed,
    Archived,
}

impl ExamStatus {
    /// Students may only open attempts against a published or running exam.
    pub(crate) fn accepts_attempts(self) -> bool {
        matches!(self, ExamStatus::Published | ExamStatus::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "questionkind", rename_all = "snake_case")]
pub(crate) enum QuestionKind {
    Mcq,
    ShortAnswer,
    LongAnswer,
}

impl QuestionKind {
    pub(crate) fn is_objective(self) -> bool {
        matches!(self, QuestionKind::Mcq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "sessionstatus", rename_all = "snake_case")]
pub(crate) enum SessionStatus {
    NotStarted,
    InProgress,
    Submitted,
    Grading,
    Graded,
}

impl SessionStatus {
    /// Legal transitions of an exam attempt. Graded -> Grading is only ever
    /// taken through the explicit reopen operation.
    pub(crate) fn can_transition_to(self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::NotStarted, SessionStatus::InProgress)
                | (SessionStatus::InProgress, SessionStatus::Submitted)
                | (SessionStatus::Submitted, SessionStatus::Grading)
                | (SessionStatus::Submitted, SessionStatus::Graded)
                | (SessionStatus::Grading, SessionStatus::Graded)
                | (SessionStatus::Graded, SessionStatus::Grading)
        )
    }

    pub(crate) fn is_gradable(self) -> bool {
        matches!(self, SessionStatus::Submitted | SessionStatus::Grading)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "gradedby", rename_all = "lowercase")]
pub(crate) enum GradedBy {
    Auto,
    Ai,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ViolationType {
    TabSwitch,
    FullscreenExit,
    CopyPaste,
}

impl ViolationType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ViolationType::TabSwitch => "tab_switch",
            ViolationType::FullscreenExit => "fullscreen_exit",
            ViolationType::CopyPaste => "copy_paste",
        }
    }
}
