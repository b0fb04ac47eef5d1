/// HTTP server setup and routing
use crate::{
    context::AppContext,
    error::AppResult,
    metrics,
    rate_limit::rate_limit_middleware,
};
use axum::{
    http::{header, Method, StatusCode},
    middleware,
    response::Json,
    routing::get,
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Build the main application router
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        // Health check endpoint (no middleware)
        .route("/health", get(health_check))
        // Prometheus exposition
        .route("/metrics", get(metrics_endpoint))
        // API routes
        .merge(crate::api::routes())
        .with_state(ctx.clone())
        .layer(middleware::from_fn_with_state(ctx, rate_limit_middleware))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .fallback(not_found)
}

/// Health check handler
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Prometheus metrics handler
async fn metrics_endpoint() -> String {
    metrics::render()
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Serve the application
pub async fn serve(ctx: AppContext) -> AppResult<()> {
    let addr = SocketAddr::new(
        ctx.config
            .service
            .hostname
            .parse()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0])),
        ctx.config.service.port,
    );

    let router = build_router(ctx);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Listening on {}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
