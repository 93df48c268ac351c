// src/state.rs

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::{config::Config, grading::PgStore};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

/// Lets handlers extract the quiz store directly.
impl FromRef<AppState> for PgStore {
    fn from_ref(state: &AppState) -> Self {
        PgStore::new(state.pool.clone())
    }
}
