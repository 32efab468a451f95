//! Dedup server — an axum-fronted HTTP facade over the ticket-deduplication
//! decision pipeline, backed by a partitioned document store.

pub mod embedder;
pub mod error;
pub mod network;
pub mod service;
pub mod store;

pub use embedder::{DeterministicEmbedder, Embedder, EmbedderError, LazyEmbedder};
pub use error::{Conflict, DedupError};
pub use network::{AppState, NetworkConfig, NetworkModule};
pub use service::{ClusteringService, IngestCoordinator, MergeService, NewTicket, ServerConfig};
pub use store::{ClusterStore, DocStore, MemoryDocStore, MergeStore, TicketStore};
