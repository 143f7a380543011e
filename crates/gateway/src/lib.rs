//! HTTP gateway for miniagent.
//!
//! One streaming endpoint (`POST /api/chat`, SSE) drives the agent loop;
//! the rest is a thin read API over the session store, the tool registry,
//! and the skill set. Built on Axum.
//!
//! Client disconnects are propagated to the loop: the per-request
//! cancellation token's drop-guard is owned by the response stream, so
//! dropping the HTTP response cancels the query.

pub mod routes;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tracing::info;

use miniagent_agent::AgentLoop;
use miniagent_skills::SkillSet;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub agent: AgentLoop,
    pub skills: Arc<SkillSet>,
}

/// Build the full router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health_handler))
        .nest("/api", routes::api_router())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until ctrl-c. Bind failures surface to the caller so the
/// binary can exit non-zero.
pub async fn serve(state: AppState, host: &str, port: u16) -> std::io::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Gateway listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
}
