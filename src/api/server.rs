//! API server setup and lifecycle.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::config::ApiConfig;
use crate::engine::SettlementEngine;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

pub struct ApiServer {
    config: ApiConfig,
    engine: Arc<SettlementEngine>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, engine: Arc<SettlementEngine>) -> Self {
        Self { config, engine }
    }

    /// Run the HTTP server until a shutdown signal arrives.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.create_app();
        let addr = self.socket_addr()?;

        info!("starting stakehouse API server on http://{}", addr);
        self.log_endpoints();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("API server stopped gracefully");
        Ok(())
    }

    fn create_app(&self) -> axum::Router {
        let state = Arc::new(AppState {
            engine: self.engine.clone(),
            service: "stakehouse".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        });

        create_router(state)
            // Request ID first so every later layer can trace it.
            .layer(axum::middleware::from_fn(request_id_middleware))
            .layer(create_cors_layer(self.config.cors_origins.clone()))
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.request_timeout_secs,
            )))
            .layer(TraceLayer::new_for_http())
    }

    fn socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((
            self.config.listen_address.parse::<std::net::IpAddr>()?,
            self.config.port,
        )))
    }

    fn log_endpoints(&self) {
        info!("  GET  /health");
        info!("  GET  /status");
        info!("  POST /api/rounds");
        info!("  GET  /api/rounds/:round_id");
        info!("  POST /api/rounds/:round_id/resolve");
        info!("  GET  /api/verify/round/:round_id");
        info!("  GET  /api/wheel");
        info!("  GET  /api/accounts/:user_id/balance");
        info!("  GET  /api/accounts/:user_id/transactions");
        info!("  POST /api/admin/accounts");
        info!("  POST /api/admin/credit");
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C signal");
        },
        _ = terminate => {
            info!("received terminate signal");
        },
    }
}
