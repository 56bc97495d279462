pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod observability;
pub mod proxy;
pub mod routes;

use crate::auth::middleware::{enforce_access, validate_session};
use crate::auth::AuthService;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::handlers::{health_handler, magic_link_handler, HandlerState};
use crate::metrics::{metrics_handler, MetricsService};
use crate::observability::request_id_middleware;
use crate::proxy::{build_client, proxy_handler, ProxyState};
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router as AxumRouter,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Assemble the gateway application.
///
/// Local routes (`/health`, the magic-link request and optionally `/metrics`)
/// are answered directly. Everything else passes `validate_session` and
/// `enforce_access` before being forwarded to the backend.
pub fn build_app(config: &GatewayConfig, metrics: Option<MetricsService>) -> Result<AxumRouter> {
    let client = build_client()?;
    let auth = Arc::new(AuthService::new(client.clone(), config)?);
    let proxy_state = ProxyState::new(client.clone(), config)?;
    let handler_state = HandlerState::new(client, config);

    let local = AxumRouter::new()
        .route("/health", get(health_handler))
        .route("/api/magic-link/", post(magic_link_handler))
        .with_state(handler_state);

    // Layers run outermost-first: validate_session, then enforce_access
    let gated = AxumRouter::new()
        .fallback(proxy_handler)
        .with_state(proxy_state)
        .layer(from_fn_with_state(auth.clone(), enforce_access))
        .layer(from_fn_with_state(auth, validate_session));

    let mut app = local.merge(gated);

    if let Some(service) = metrics {
        app = app.merge(
            AxumRouter::new()
                .route("/metrics", get(metrics_handler))
                .with_state(service),
        );
    }

    Ok(app
        .layer(from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http()))
}

/// Initialize the gateway server
pub async fn init_gateway(config: GatewayConfig) -> Result<()> {
    config.validate()?;

    info!("Starting consult gateway");
    info!(
        backend = %config.backend.url,
        fail_open = config.session.fail_open,
        public_routes = config.access.public_routes.len(),
        "Session validation configured"
    );

    let metrics = if config.metrics.enabled {
        Some(MetricsService::new()?)
    } else {
        None
    };

    let app = build_app(&config, metrics)?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(GatewayError::Io)?;

    info!("Gateway listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| GatewayError::Internal(format!("Server error: {}", e)))?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
