//! HTTP control surface.
//!
//! # Endpoints
//! - `GET /ping`: liveness, always `OK`
//! - `POST /v1/reload`: full overlay reload
//! - `GET /v1/loglevel`: current log level
//! - `POST /v1/loglevel`: set the log level from the form field `level`

pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::observability::LogLevelHandle;
use crate::overlay::Reloadable;

/// State shared by the control handlers.
#[derive(Clone)]
pub struct ControlState {
    pub reloader: Arc<dyn Reloadable>,
    pub log_level: LogLevelHandle,
}

pub fn router(state: ControlState) -> Router {
    Router::new()
        .route("/ping", get(handlers::ping))
        .route("/v1/reload", post(handlers::reload))
        .route(
            "/v1/loglevel",
            get(handlers::get_log_level).post(handlers::set_log_level),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub struct ControlServer {
    router: Router,
}

impl ControlServer {
    pub fn new(state: ControlState) -> Self {
        Self {
            router: router(state),
        }
    }

    /// Serve until the shutdown signal fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Control server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("Control server stopped");
        Ok(())
    }
}
