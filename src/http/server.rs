//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (tracing, timeout, body limit, request ID)
//! - Serve plain TCP or TLS until shutdown is signalled

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderName, Request};
use axum::routing::{get, post};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::config::schema::{ListenerConfig, TimeoutConfig, TlsConfig};
use crate::dispatch::DispatchCoordinator;
use crate::lifecycle::Shutdown;
use crate::pipeline::Pipeline;
use crate::storage::ReceiptStore;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub coordinator: Arc<DispatchCoordinator>,
    pub receipts: Option<Arc<ReceiptStore>>,
    pub default_vehicle_id: Arc<str>,
}

/// HTTP front end of the anchoring service.
pub struct HttpServer {
    router: Router,
    shutdown_grace: Duration,
}

impl HttpServer {
    pub fn new(listener: &ListenerConfig, timeouts: &TimeoutConfig, state: AppState) -> Self {
        Self {
            router: build_router(listener, timeouts, state),
            shutdown_grace: Duration::from_secs(timeouts.shutdown_grace_secs),
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve plain HTTP on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS on `addr` until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: &TlsConfig,
        shutdown: &Shutdown,
    ) -> Result<(), std::io::Error> {
        let rustls = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path).await?;
        tracing::info!(address = %addr, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let signal = shutdown.wait();
        let grace = self.shutdown_grace;
        let watcher = handle.clone();
        tokio::spawn(async move {
            signal.await;
            watcher.graceful_shutdown(Some(grace));
        });

        axum_server::bind_rustls(addr, rustls)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(listener: &ListenerConfig, timeouts: &TimeoutConfig, state: AppState) -> Router {
    let request_id = HeaderName::from_static(X_REQUEST_ID);

    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            let request_id = request
                .headers()
                .get(X_REQUEST_ID)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http",
                method = %request.method(),
                path = %request.uri().path(),
                request_id = %request_id,
            )
        }))
        .layer(PropagateRequestIdLayer::new(request_id))
        .layer(RequestBodyLimitLayer::new(listener.max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(timeouts.request_secs)));

    Router::new()
        .route("/sendTx", post(handlers::send_tx))
        .route("/api/v1/process", post(handlers::process))
        .route("/api/v1/decode", post(handlers::decode))
        .route("/api/blocks", get(handlers::blocks))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(middleware)
}
