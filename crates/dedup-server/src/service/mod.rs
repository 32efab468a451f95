//! Service layer: process configuration, the embedding-and-clustering
//! ingest path, cluster lifecycle operations, and merge/revert.

pub mod clustering;
pub mod config;
pub mod ingest;
pub mod merge;

pub use clustering::ClusteringService;
pub use config::ServerConfig;
pub use ingest::{IngestCoordinator, NewTicket};
pub use merge::MergeService;
