use std::sync::Arc;

use sqlx::PgPool;

use crate::core::config::Settings;
use crate::services::ai_grading::ScoringClient;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    scoring: ScoringClient,
}

impl AppState {
    pub(crate) fn new(settings: Settings, db: PgPool, scoring: ScoringClient) -> Self {
        Self { inner: Arc::new(InnerState { settings, db, scoring }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn scoring(&self) -> &ScoringClient {
        &self.inner.scoring
    }
}
