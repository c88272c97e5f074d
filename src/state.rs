// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{config::Config, coordinator::SessionCoordinator};

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<SessionCoordinator>,
    pub config: Config,
}

impl FromRef<AppState> for Arc<SessionCoordinator> {
    fn from_ref(state: &AppState) -> Self {
        state.coordinator.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
