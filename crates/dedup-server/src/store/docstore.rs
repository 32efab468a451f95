//! The generic document-store contract every persistence backend in this
//! service implements: partitioned point reads, conditional writes, and
//! vector-distance top-K search.
//!
//! Queries never interpolate field identifiers at runtime (predicates are
//! plain closures, not composed SQL strings); the only dynamic parts are
//! filter *values*.

use async_trait::async_trait;
use dedup_core::PartitionKey;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Failures a [`DocStore`] implementation can surface. Mapped onto
/// [`crate::error::DedupError`] by the service layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document {id} not found in partition {pk}")]
    NotFound { id: Uuid, pk: PartitionKey },

    #[error("unique-key conflict in container {container} partition {pk}: {key_value}")]
    Conflict {
        container: &'static str,
        pk: PartitionKey,
        key_value: String,
    },

    #[error("etag precondition failed for document {id}")]
    PreconditionFailed { id: Uuid },

    #[error("store backend error: {0}")]
    Backend(String),
}

/// An opaque document as seen by the store layer: an id, the partition it
/// lives in, a server-assigned ETag, and an arbitrary JSON body. Typed
/// wrappers in this module's siblings (`ticket_store`, `cluster_store`,
/// `merge_store`) serialize/deserialize the body.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: Uuid,
    pub pk: PartitionKey,
    pub etag: String,
    pub body: Value,
}

/// Filters accepted by [`DocStore::vector_top_k`]. Only the shapes this
/// service actually needs: equalities, a timestamp lower bound, and a
/// scalar upper bound -- matching the candidate-search predicate in the
/// clustering algorithm, not a general query language.
#[derive(Debug, Clone, Default)]
pub struct VectorSearchFilters {
    /// Equality filter on the document's `customer_id` field, if scoping
    /// the search to one customer.
    pub customer_id: Option<String>,
    /// `updated_at >= floor`.
    pub updated_at_floor: Option<OffsetDateTime>,
    /// `ticket_count < ceiling` (exclusive), used to apply the capacity cap.
    pub ticket_count_ceiling: Option<usize>,
    /// `open_count > 0` when true.
    pub require_open_count_positive: bool,
}

/// One ranked result from [`DocStore::vector_top_k`].
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub document: StoredDocument,
    /// Cosine similarity in `[-1, 1]`, higher is more similar.
    pub similarity: f64,
}

/// Partitioned document store: point reads, conditional writes, predicate
/// scans, and vector top-K search. Every container (`tickets`, `clusters`,
/// `merges`) shares this same contract.
#[async_trait]
pub trait DocStore: Send + Sync {
    async fn point_read(
        &self,
        container: &'static str,
        id: Uuid,
        pk: &PartitionKey,
    ) -> Result<Option<StoredDocument>, StoreError>;

    /// Inserts a new document. Fails with [`StoreError::Conflict`] if the
    /// container enforces a unique-key policy (e.g. `tickets.ticket_number`
    /// within a partition) and it is violated.
    async fn create(
        &self,
        container: &'static str,
        doc: StoredDocument,
    ) -> Result<StoredDocument, StoreError>;

    /// Inserts or overwrites a document unconditionally, bypassing ETag
    /// checks. Used only for document kinds with no concurrent writers.
    async fn upsert(
        &self,
        container: &'static str,
        doc: StoredDocument,
    ) -> Result<StoredDocument, StoreError>;

    /// Replaces a document's body if `if_match` equals the document's
    /// current ETag. Returns [`StoreError::PreconditionFailed`] on mismatch
    /// and [`StoreError::NotFound`] if the document doesn't exist.
    async fn replace(
        &self,
        container: &'static str,
        id: Uuid,
        pk: &PartitionKey,
        body: Value,
        if_match: &str,
    ) -> Result<StoredDocument, StoreError>;

    /// Scans every document in a partition matching `predicate`. Used for
    /// the small number of non-vector lookups this service needs (none on
    /// the hot path today; kept for contract completeness).
    async fn query(
        &self,
        container: &'static str,
        pk: &PartitionKey,
        predicate: &(dyn for<'a> Fn(&'a Value) -> bool + Send + Sync),
    ) -> Result<Vec<StoredDocument>, StoreError>;

    /// Top-K nearest documents to `vector` by cosine similarity, among
    /// documents in `pk` matching `filters`. Ranked similarity descending.
    async fn vector_top_k(
        &self,
        container: &'static str,
        pk: &PartitionKey,
        k: usize,
        filters: &VectorSearchFilters,
        vector: &[f32],
    ) -> Result<Vec<VectorMatch>, StoreError>;
}
