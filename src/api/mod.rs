//! Inbound HTTP API for the monitoring hub
//!
//! Thin passthrough over the poller and orchestrator:
//!
//! - `GET  /api/health` - health check
//! - `GET  /api/servers` - all endpoints with cached status
//! - `GET  /api/servers/:id` - one endpoint
//! - `POST /api/servers/:id/refresh` - immediate single-endpoint refresh
//! - `POST /api/servers/reload` - re-read the config file and reload
//! - `POST /api/servers/:id/channels/:channel/{stop,start,restart}`

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post},
};
use tracing::info;

use crate::config::ApiSettings;

/// Build the application router.
///
/// Split out of [`spawn_api_server`] so tests can drive the router without
/// binding a socket.
pub fn build_router(settings: &ApiSettings, state: AppState) -> Router {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let mut app = Router::new()
        .route("/api/health", get(routes::health::health_check))
        .route("/api/servers", get(routes::endpoints::list_endpoints))
        .route(
            "/api/servers/reload",
            post(routes::endpoints::reload_endpoints),
        )
        .route("/api/servers/:id", get(routes::endpoints::get_endpoint))
        .route(
            "/api/servers/:id/refresh",
            post(routes::endpoints::refresh_endpoint),
        )
        .route(
            "/api/servers/:id/channels/:channel/stop",
            post(routes::endpoints::stop_channel),
        )
        .route(
            "/api/servers/:id/channels/:channel/start",
            post(routes::endpoints::start_channel),
        )
        .route(
            "/api/servers/:id/channels/:channel/restart",
            post(routes::endpoints::restart_channel),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    // Static frontend, when configured and present
    if let Some(static_dir) = &settings.static_dir {
        if static_dir.exists() {
            info!("serving static frontend from {}", static_dir.display());
            app = app.nest_service("/", tower_http::services::ServeDir::new(static_dir));
        } else {
            info!(
                "static frontend directory not found at {}",
                static_dir.display()
            );
        }
    }

    if settings.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    if let Some(api_key) = settings.api_key.clone() {
        app = app.layer(axum::middleware::from_fn_with_state(
            api_key,
            middleware::auth::auth_middleware,
        ));
    }

    app
}

/// Spawn the API server in a background task, returning its local address.
pub async fn spawn_api_server(settings: ApiSettings, state: AppState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", settings.bind_addr);

    let app = build_router(&settings, state);

    let listener = tokio::net::TcpListener::bind(settings.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
