//! Service-facing error kinds, bubbled as structured failures per the
//! exposed core API. Store and embedder adapters return their own narrow
//! error enums, converted here via `#[from]`.

use thiserror::Error;
use uuid::Uuid;

use crate::embedder::EmbedderError;
use crate::store::docstore::StoreError;

/// A single revert-blocking conflict, carried by [`DedupError::MergeConflict`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// Another completed merge with the same primary happened after this one.
    SubsequentMerge { merge_id: Uuid },
    /// A secondary ticket was modified after this merge and after the snapshot.
    TicketModified { ticket_id: Uuid },
}

/// The error kinds enumerated for the exposed core API.
#[derive(Debug, Error)]
pub enum DedupError {
    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("revert deadline exceeded")]
    DeadlineExceeded,

    #[error("merge conflict: {conflicts:?}")]
    MergeConflict { conflicts: Vec<Conflict> },

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("store error: {0}")]
    StoreError(String),
}

impl From<StoreError> for DedupError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => DedupError::NotFound,
            StoreError::PreconditionFailed { .. } => {
                DedupError::Conflict("etag precondition failed".into())
            }
            StoreError::Conflict { key_value, .. } => {
                DedupError::Conflict(format!("unique-key violation: {key_value}"))
            }
            StoreError::Backend(msg) => DedupError::StoreError(msg),
        }
    }
}

impl From<EmbedderError> for DedupError {
    fn from(err: EmbedderError) -> Self {
        DedupError::Unavailable(err.to_string())
    }
}
