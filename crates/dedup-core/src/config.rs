//! Tunables for the dedup decision pipeline and cluster lifecycle, all
//! named explicitly in the external configuration contract (spec §6).

use crate::types::TicketStatus;

/// Configuration for [`crate::engine::DedupEngine`] and the services that
/// drive it. Every field here is a process-configuration knob; none is
/// learned or tuned from outcomes (that is an explicit non-goal).
#[derive(Debug, Clone, PartialEq)]
pub struct DedupConfig {
    /// `conf >= auto_threshold` joins automatically.
    pub auto_threshold: f64,
    /// `review_threshold <= conf < auto_threshold` joins but flags for review.
    pub review_threshold: f64,
    /// Hard cap on cluster size. No cluster may ever exceed this.
    pub max_cluster_members: usize,
    /// Top-K candidates requested per partition vector search.
    pub vector_top_k: usize,
    /// Width of the dedup time window, in days, used both for the
    /// candidate-search `updated_at` floor and the `prox()` normalizer.
    pub dedup_window_days: i64,
    /// Number of calendar-month partitions to search, newest first.
    pub cluster_search_months: u32,
    /// Whether candidate search is scoped to the ingesting ticket's customer.
    pub filter_by_customer: bool,
    pub weight_semantic: f64,
    pub weight_subcategory: f64,
    pub weight_category: f64,
    pub weight_time: f64,
    /// Ticket statuses counted toward a cluster's `open_count`.
    pub open_statuses: Vec<TicketStatus>,
    /// Width of the revert window after a merge completes.
    pub revert_window_hours: i64,
    /// Fixed dimensionality every embedding must have.
    pub embedding_dimensions: usize,
    /// Number of ETag-conflict retries before surfacing a conflict to the caller.
    pub max_etag_retries: u32,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            auto_threshold: 0.92,
            review_threshold: 0.85,
            max_cluster_members: 100,
            vector_top_k: 10,
            dedup_window_days: 14,
            cluster_search_months: 2,
            filter_by_customer: false,
            weight_semantic: 0.85,
            weight_subcategory: 0.10,
            weight_category: 0.03,
            weight_time: 0.02,
            open_statuses: vec![TicketStatus::Open, TicketStatus::Pending],
            revert_window_hours: 24,
            embedding_dimensions: 1536,
            max_etag_retries: 3,
        }
    }
}

impl DedupConfig {
    /// The dedup window expressed in seconds, used by the `prox()` normalizer.
    #[must_use]
    pub fn dedup_window_seconds(&self) -> f64 {
        (self.dedup_window_days * 24 * 60 * 60) as f64
    }
}
