// src/state.rs
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::services::session::ChatModel;

pub type SharedState = Arc<AppState>;

/// Read-only state shared by every request task.
pub struct AppState {
    pub model: Arc<dyn ChatModel>,
    /// Cancelled on shutdown; each open stream holds a child of it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            shutdown: CancellationToken::new(),
        }
    }
}
