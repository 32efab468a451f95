//! Domain model: [`Ticket`], [`Cluster`], [`MergeOperation`], and their
//! supporting enums. These are plain data types with no store or network
//! dependencies; persistence and partitioning live in `dedup-server`.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifecycle status of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Pending,
    Resolved,
    Closed,
    Merged,
}

/// Ticket priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

/// Cluster lifecycle status. See spec invariant map: `Candidate` has exactly
/// one member, `Pending` has two or more, up to `max_cluster_members`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    Candidate,
    Pending,
    Merged,
    Dismissed,
    Expired,
}

/// Label for downstream tooling describing how a merge should be presented.
/// The engine treats all three identically at the cluster-state level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeBehavior {
    KeepLatest,
    CombineNotes,
    RetainAll,
}

/// Status of a [`MergeOperation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOperationStatus {
    Completed,
    Reverted,
}

/// Output tier of the three-tier decision policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Auto,
    Review,
    NewCluster,
}

/// Why a decision landed where it did. `AboveAutoThreshold` and `ReviewBand`
/// round out the vocabulary the original clustering service uses for every
/// branch of the three-tier policy (see `SPEC_FULL.md`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    NoCandidates,
    AboveAutoThreshold,
    ReviewBand,
    BelowReviewThreshold,
}

/// Per-candidate signal breakdown attached to a [`DedupDecision`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionSignals {
    pub subcategory_match: bool,
    pub category_match: bool,
    pub time_proximity: f64,
}

/// The decision record persisted on a ticket at ingest time.
///
/// `confidence_score` is **not** a calibrated probability: the weighted sum
/// in the confidence formula can exceed `1.0` when several signals agree
/// (see spec scenario S2). Callers must not clamp or normalize it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupDecision {
    pub decision: Decision,
    pub decision_reason: DecisionReason,
    pub confidence_score: f64,
    pub matched_cluster_id: Option<Uuid>,
    pub semantic_score: f64,
    pub signals: DecisionSignals,
}

impl DedupDecision {
    /// The decision recorded when no cluster existed to evaluate against.
    #[must_use]
    pub fn no_candidates() -> Self {
        Self {
            decision: Decision::NewCluster,
            decision_reason: DecisionReason::NoCandidates,
            confidence_score: 0.0,
            matched_cluster_id: None,
            semantic_score: 0.0,
            signals: DecisionSignals {
                subcategory_match: false,
                category_match: false,
                time_proximity: 0.0,
            },
        }
    }
}

/// A support ticket. `dedup_text` and `content_vector` are derived at
/// ingest time and never recomputed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    /// Immutable public identity, unique within a partition.
    pub ticket_number: String,

    pub summary: String,
    pub description: Option<String>,
    pub category: String,
    pub subcategory: Option<String>,
    pub channel: String,
    pub severity: Option<String>,
    pub merchant: Option<String>,

    // Customer fields: PII, never embedded.
    pub customer_id: String,
    pub name: String,
    pub mobile_number: String,
    pub email: String,
    pub account_type: String,

    pub transaction_id: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub occurred_at: Option<OffsetDateTime>,

    pub status: TicketStatus,
    pub priority: Priority,

    /// Concatenation of non-PII content fields actually sent to the embedder.
    pub dedup_text: String,
    pub content_vector: Vec<f32>,
    pub cluster_id: Uuid,
    pub dedup: DedupDecision,
    pub merged_into_id: Option<Uuid>,

    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub closed_at: Option<OffsetDateTime>,

    /// Server-assigned optimistic-concurrency token, as on [`Cluster`].
    pub etag: String,
}

impl Ticket {
    /// Whether this ticket's status is in the configured open set.
    #[must_use]
    pub fn is_open(&self, open_statuses: &[TicketStatus]) -> bool {
        open_statuses.contains(&self.status)
    }
}

/// A single member of a [`Cluster`], as recorded at the moment it joined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMember {
    pub ticket_id: Uuid,
    pub ticket_number: String,
    pub summary: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub created_at: OffsetDateTime,
    pub confidence_score: f64,
    pub added_at: OffsetDateTime,
    /// Whether the ticket was in the configured open set at join time.
    /// Removal decrements `open_count` only when this is `true`.
    pub was_open: bool,
}

/// A cluster of duplicate (or candidate-duplicate) tickets.
///
/// Invariants enforced by [`crate::engine::DedupEngine`] and the owning
/// services, not by this type itself:
/// - `status == Candidate` iff `members.len() == 1`.
/// - `status == Pending` iff `2 <= members.len() <= max_cluster_members`.
/// - `open_count <= members.len()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: Uuid,
    pub status: ClusterStatus,
    pub members: Vec<ClusterMember>,
    pub open_count: u32,
    pub centroid_vector: Vec<f32>,
    /// Inherited from the first member at creation.
    pub customer_id: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub representative_ticket_id: Uuid,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    /// Server-assigned optimistic-concurrency token. Never fabricated by
    /// application code; always copied from the last successful store read.
    pub etag: String,

    /// Set together with `status = dismissed`.
    pub dismissed_by: Option<String>,
    pub dismissal_reason: Option<String>,
}

impl Cluster {
    #[must_use]
    pub fn ticket_count(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_at_capacity(&self, max_members: usize) -> bool {
        self.ticket_count() >= max_members
    }

    #[must_use]
    pub fn member_index(&self, ticket_id: Uuid) -> Option<usize> {
        self.members.iter().position(|m| m.ticket_id == ticket_id)
    }
}

/// Pre-merge snapshot of a secondary ticket, captured so a revert can
/// restore exactly the state it had before the merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondarySnapshot {
    pub ticket_id: Uuid,
    pub cluster_id: Uuid,
    pub merged_into_id: Option<Uuid>,
    pub updated_at: OffsetDateTime,
}

/// Record of a merge (and, if reverted, of its reversal).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOperation {
    pub id: Uuid,
    pub cluster_id: Uuid,
    pub primary_ticket_id: Uuid,
    pub secondary_ticket_ids: Vec<Uuid>,
    pub merge_behavior: MergeBehavior,
    pub performed_by: String,
    pub performed_at: OffsetDateTime,
    pub revert_deadline: OffsetDateTime,
    pub status: MergeOperationStatus,
    pub original_states: Vec<SecondarySnapshot>,
    pub reverted_by: Option<String>,
    pub reverted_at: Option<OffsetDateTime>,
    pub revert_reason: Option<String>,
    /// Server-assigned optimistic-concurrency token, as on [`Cluster`].
    pub etag: String,
}

/// A month-granularity partition key in the `YYYY-MM` (UTC) external format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionKey(String);

impl PartitionKey {
    #[must_use]
    pub fn new(year: i32, month: u8) -> Self {
        Self(format!("{year:04}-{month:02}"))
    }

    /// The partition a timestamp falls into: its calendar month in UTC.
    #[must_use]
    pub fn for_timestamp(dt: OffsetDateTime) -> Self {
        let dt = dt.to_offset(time::UtcOffset::UTC);
        Self::new(dt.year(), u8::from(dt.month()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PartitionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
