//! HTTP handler definitions for the dedup server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod clusters;
pub mod health;
pub mod merges;
pub mod tickets;

pub use clusters::{dismiss_cluster_handler, remove_member_handler};
pub use health::{health_handler, liveness_handler, readiness_handler};
pub use merges::{merge_handler, revert_handler};
pub use tickets::ingest_ticket_handler;

use std::sync::Arc;
use std::time::Instant;

use crate::service::{ClusteringService, IngestCoordinator, MergeService};

use super::{NetworkConfig, ShutdownController};

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub ingest: Arc<IngestCoordinator>,
    pub clustering: Arc<ClusteringService>,
    pub merge: Arc<MergeService>,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Network configuration (bind address, TLS, CORS, timeout).
    pub config: Arc<NetworkConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
