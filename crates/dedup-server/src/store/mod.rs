//! Partitioned document storage: the generic [`docstore::DocStore`]
//! contract, an in-memory implementation, and typed wrappers per entity.

pub mod cluster_store;
pub mod docstore;
pub mod memory;
pub mod merge_store;
pub mod ticket_store;

pub use cluster_store::{ClusterCandidate, ClusterStore};
pub use docstore::{DocStore, StoreError, StoredDocument, VectorMatch, VectorSearchFilters};
pub use memory::MemoryDocStore;
pub use merge_store::MergeStore;
pub use ticket_store::TicketStore;
