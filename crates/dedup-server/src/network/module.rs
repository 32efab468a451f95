//! Network module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` creates resources,
//! `start()` binds the TCP listener, and `serve()` starts accepting
//! connections. This separation allows the rest of the application to
//! configure shared state (services, stores) between `start()` and
//! `serve()`.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::service::{ClusteringService, IngestCoordinator, MergeService};

use super::config::NetworkConfig;
use super::handlers::{
    dismiss_cluster_handler, health_handler, ingest_ticket_handler, liveness_handler,
    merge_handler, readiness_handler, remove_member_handler, revert_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::{ShutdownController, DEFAULT_DRAIN_TIMEOUT};

/// Manages the full HTTP server lifecycle.
///
/// Follows the deferred startup pattern:
/// 1. `new()` -- allocates shared state (services, shutdown controller)
/// 2. `start()` -- binds TCP listener to the configured address
/// 3. `serve()` -- begins accepting connections until shutdown is signalled
///
/// The shutdown controller is shared via `Arc` so other modules can
/// reference it after construction.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    ingest: Arc<IngestCoordinator>,
    clustering: Arc<ClusteringService>,
    merge: Arc<MergeService>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    ///
    /// The shutdown controller is allocated immediately so it can be shared
    /// with other modules before the server starts.
    #[must_use]
    pub fn new(
        config: NetworkConfig,
        ingest: Arc<IngestCoordinator>,
        clustering: Arc<ClusteringService>,
        merge: Arc<MergeService>,
    ) -> Self {
        Self {
            config,
            listener: None,
            ingest,
            clustering,
            merge,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Returns a shared reference to the shutdown controller.
    ///
    /// Other modules use this to check health state or trigger shutdown.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    fn app_state(&self) -> AppState {
        AppState {
            ingest: Arc::clone(&self.ingest),
            clustering: Arc::clone(&self.clustering),
            merge: Arc::clone(&self.merge),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::new(self.config.clone()),
            start_time: Instant::now(),
        }
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /health` -- detailed health JSON
    /// - `GET /health/live` -- Kubernetes liveness probe
    /// - `GET /health/ready` -- Kubernetes readiness probe
    /// - `POST /tickets` -- ingest a ticket
    /// - `POST /clusters/:cluster_id/dismiss` -- dismiss a cluster
    /// - `DELETE /clusters/:cluster_id/members/:ticket_id` -- remove a member
    /// - `POST /clusters/:cluster_id/merge` -- merge a cluster
    /// - `POST /merges/:merge_id/revert` -- revert a completed merge
    pub fn build_router(&self) -> Router {
        let layers = build_http_layers(&self.config);

        routes()
            .layer(layers)
            .with_state(self.app_state())
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Starts serving connections until the shutdown signal fires.
    ///
    /// Consumes `self` because the listener is moved into the server.
    /// Panics if `start()` was not called first.
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a fatal I/O error.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let shutdown_ctrl = Arc::clone(&self.shutdown);
        let state = self.app_state();
        let layers = build_http_layers(&self.config);
        let listener = self
            .listener
            .expect("start() must be called before serve()");

        let router = routes().layer(layers).with_state(state);

        // Transition to Ready so readiness probes pass.
        shutdown_ctrl.set_ready();

        info!("Serving HTTP connections");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        shutdown_ctrl.trigger_shutdown();
        let drained = shutdown_ctrl.wait_for_drain(DEFAULT_DRAIN_TIMEOUT).await;
        if !drained {
            tracing::warn!("drain timeout expired with in-flight requests remaining");
        }

        Ok(())
    }
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .route("/tickets", post(ingest_ticket_handler))
        .route("/clusters/{cluster_id}/dismiss", post(dismiss_cluster_handler))
        .route(
            "/clusters/{cluster_id}/members/{ticket_id}",
            delete(remove_member_handler),
        )
        .route("/clusters/{cluster_id}/merge", post(merge_handler))
        .route("/merges/{merge_id}/revert", post(revert_handler))
}
