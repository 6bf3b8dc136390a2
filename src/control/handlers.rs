//! Control surface handlers.

use axum::extract::{Form, State};
use axum::http::StatusCode;
use serde::Deserialize;

use crate::control::ControlState;
use crate::observability::metrics;

pub async fn ping() -> &'static str {
    "OK"
}

pub async fn reload(State(state): State<ControlState>) -> (StatusCode, String) {
    tracing::info!("Received HTTP reload request");
    match state.reloader.reload().await {
        Ok(()) => {
            metrics::record_reload("control", true);
            (StatusCode::OK, "Reloaded Configuration\n".to_string())
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to reload configuration");
            metrics::record_reload("control", false);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to reload configuration: {e}\n"),
            )
        }
    }
}

pub async fn get_log_level(State(state): State<ControlState>) -> String {
    format!("{}\n", state.log_level.get())
}

#[derive(Debug, Deserialize)]
pub struct LogLevelForm {
    #[serde(default)]
    pub level: String,
}

pub async fn set_log_level(
    State(state): State<ControlState>,
    Form(form): Form<LogLevelForm>,
) -> (StatusCode, String) {
    match state.log_level.set(&form.level) {
        Ok(()) => (StatusCode::OK, "OK\n".to_string()),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to set loglevel: {e}\n"),
        ),
    }
}
