pub mod errors;
mod handlers;
pub mod ratelimit;
mod router;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use axum::Json;
use axum::extract::State;
use tracing::info;

use crate::config::Config;
use crate::core::executor::Executor;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::scheduler::TaskScheduler;
use crate::core::session_manager::SessionManager;
use crate::core::store::{StatsStore, TaskStore};
use crate::core::webhook::WebhookDispatcher;
use self::ratelimit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub scheduler: TaskScheduler,
    pub tasks: TaskStore,
    pub sessions: SessionManager,
    pub stats: StatsStore,
    pub webhooks: Arc<WebhookDispatcher>,
    pub executor: Arc<dyn Executor>,
    pub config: Arc<Config>,
    pub started_at: Instant,
    pub rate_limiter: Arc<RateLimiter>,
}

/// The HTTP surface: a thin axum layer over the broker core.
pub struct ApiServer {
    state: AppState,
    host: String,
    port: u16,
}

impl ApiServer {
    pub fn new(state: AppState, host: String, port: u16) -> Self {
        Self { state, host, port }
    }
}

pub fn build_router(state: AppState) -> axum::Router {
    router::build_api_router(state)
}

async fn health_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "status": "ok",
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("API Server initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let app = router::build_api_router(self.state.clone());

        // Bind here so a taken port is a fatal start error, not a silent
        // background failure.
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("API Server running at http://{addr}");

        tokio::spawn(async move {
            let service =
                app.into_make_service_with_connect_info::<std::net::SocketAddr>();
            if let Err(e) = axum::serve(listener, service).await {
                tracing::error!("API Server crashed: {}", e);
            }
        });
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server shutting down...");
        Ok(())
    }
}
