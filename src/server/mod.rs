// file: src/server/mod.rs
// description: http and websocket surface over the task service
// reference: https://docs.rs/axum

pub mod handlers;
pub mod websocket;

use crate::app::AppContext;
use axum::Router;
use axum::routing::{delete, get, post};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn router(app: AppContext) -> Router {
    Router::new()
        .route("/api/tasks", get(handlers::list_tasks))
        .route("/api/tasks/create", post(handlers::create_task))
        .route("/api/tasks/trigger", post(handlers::trigger_task))
        .route("/api/tasks/delete/{task_id}", delete(handlers::delete_task))
        .route("/api/evaluate", post(handlers::evaluate))
        .route("/api/system/broker-status", get(handlers::broker_status))
        .route("/api/system/health", get(handlers::health))
        .route("/ws/progress/{task_id}", get(websocket::progress_socket))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

pub async fn serve(app: AppContext) -> anyhow::Result<()> {
    let server = &app.config.server;
    let addr: SocketAddr = format!("{}:{}", server.host, server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, router(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
