use axum::{
    routing::{get, post},
    Router,
};

use crate::api::{results, sessions};
use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:exam_id/sessions", post(sessions::start_exam_session))
        .route("/:exam_id/results", get(results::list_exam_results))
        .route("/:exam_id/ranks/recompute", post(results::recompute_exam_ranks))
}
