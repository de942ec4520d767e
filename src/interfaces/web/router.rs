use axum::http::Method;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use super::AppState;
use super::handlers::{execute, sessions, stats, tasks, webhooks};
use super::ratelimit;

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers(tower_http::cors::Any)
}

pub fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/claude", post(execute::execute_endpoint))
        .route("/api/claude/batch", post(execute::batch_endpoint))
        .route("/api/tasks/async", post(tasks::create_async_task_endpoint))
        .route("/api/tasks", get(tasks::list_tasks_endpoint))
        .route("/api/tasks/queue/status", get(tasks::queue_status_endpoint))
        .route(
            "/api/tasks/{id}",
            get(tasks::get_task_endpoint).delete(tasks::cancel_task_endpoint),
        )
        .route(
            "/api/tasks/{id}/priority",
            axum::routing::patch(tasks::update_priority_endpoint),
        )
        .route(
            "/api/sessions",
            get(sessions::list_sessions_endpoint).post(sessions::create_session_endpoint),
        )
        .route("/api/sessions/search", get(sessions::search_sessions_endpoint))
        .route("/api/sessions/stats", get(sessions::session_stats_endpoint))
        .route(
            "/api/sessions/{id}",
            get(sessions::get_session_endpoint).delete(sessions::delete_session_endpoint),
        )
        .route(
            "/api/sessions/{id}/status",
            axum::routing::patch(sessions::update_session_status_endpoint),
        )
        .route(
            "/api/sessions/{id}/continue",
            post(sessions::continue_session_endpoint),
        )
        .route("/api/stats", get(stats::get_stats_endpoint))
        .route("/api/stats/daily", get(stats::get_daily_stats_endpoint))
        .route("/api/webhooks/send", post(webhooks::send_event_endpoint))
        .route("/health", get(super::health_endpoint))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            ratelimit::enforce_rate_limit,
        ))
        .layer(build_cors())
        .with_state(state)
}
