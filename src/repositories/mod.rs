pub(crate) mod answers;
pub(crate) mod exams;
pub(crate) mod grades;
pub(crate) mod grading_scale;
pub(crate) mod questions;
pub(crate) mod results;
pub(crate) mod sessions;
