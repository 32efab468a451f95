//! Pure scoring and decision logic: confidence formula, three-tier
//! classification, incremental centroid maintenance, and partition-key
//! enumeration. Nothing in this module performs I/O or owns state beyond
//! its own [`DedupConfig`].

use ordered_float::OrderedFloat;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::DedupConfig;
use crate::types::{Cluster, Decision, DecisionReason, DecisionSignals, PartitionKey, Ticket};

/// The outcome of scoring one ticket against one candidate cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub cluster_id: Uuid,
    pub semantic_score: f64,
    pub confidence_score: f64,
    pub decision: Decision,
    pub decision_reason: DecisionReason,
    pub signals: DecisionSignals,
    /// Carried along purely to resolve ranking ties; not part of the score.
    pub cluster_updated_at: OffsetDateTime,
}

/// Stateless scoring and decision engine over a fixed [`DedupConfig`].
#[derive(Debug, Clone)]
pub struct DedupEngine {
    config: DedupConfig,
}

impl DedupEngine {
    #[must_use]
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// `prox(a, b, W) = max(0, 1 - |a-b| / W_seconds)`.
    #[must_use]
    pub fn time_proximity(&self, a: OffsetDateTime, b: OffsetDateTime) -> f64 {
        let delta_secs = (a - b).whole_seconds().unsigned_abs() as f64;
        let window = self.config.dedup_window_seconds();
        (1.0 - delta_secs / window).max(0.0)
    }

    /// The three-tier decision for a given confidence score.
    #[must_use]
    pub fn tier(&self, confidence: f64) -> Decision {
        if confidence >= self.config.auto_threshold {
            Decision::Auto
        } else if confidence >= self.config.review_threshold {
            Decision::Review
        } else {
            Decision::NewCluster
        }
    }

    /// Scores `ticket` against `cluster`, given the semantic similarity
    /// `s` already computed by the store's vector search.
    ///
    /// `confidence_score` can exceed `1.0`; see [`crate::types::DedupDecision`].
    #[must_use]
    pub fn score_candidate(&self, ticket: &Ticket, cluster: &Cluster, semantic_score: f64) -> CandidateScore {
        let subcategory_match = match (&ticket.subcategory, &cluster.subcategory) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
        let category_match = ticket.category == cluster.category;
        let time_proximity = self.time_proximity(ticket.created_at, cluster.updated_at);

        let confidence = self.config.weight_semantic * semantic_score
            + self.config.weight_subcategory * f64::from(subcategory_match)
            + self.config.weight_category * f64::from(category_match)
            + self.config.weight_time * time_proximity;

        let decision = self.tier(confidence);
        let decision_reason = match decision {
            Decision::Auto => DecisionReason::AboveAutoThreshold,
            Decision::Review => DecisionReason::ReviewBand,
            Decision::NewCluster => DecisionReason::BelowReviewThreshold,
        };

        CandidateScore {
            cluster_id: cluster.id,
            semantic_score,
            confidence_score: confidence,
            decision,
            decision_reason,
            signals: DecisionSignals {
                subcategory_match,
                category_match,
                time_proximity,
            },
            cluster_updated_at: cluster.updated_at,
        }
    }

    /// Scores every candidate and sorts by confidence descending, breaking
    /// ties by semantic similarity descending, then cluster `updated_at`
    /// descending. This ordering is load-bearing: it determines which
    /// cluster gets picked first when several are eligible (spec §4.1).
    #[must_use]
    pub fn rank_candidates(
        &self,
        ticket: &Ticket,
        candidates: &[(&Cluster, f64)],
    ) -> Vec<CandidateScore> {
        let mut scored: Vec<CandidateScore> = candidates
            .iter()
            .map(|(cluster, similarity)| self.score_candidate(ticket, cluster, *similarity))
            .collect();

        scored.sort_by(|a, b| {
            OrderedFloat(b.confidence_score)
                .cmp(&OrderedFloat(a.confidence_score))
                .then_with(|| OrderedFloat(b.semantic_score).cmp(&OrderedFloat(a.semantic_score)))
                .then_with(|| b.cluster_updated_at.cmp(&a.cluster_updated_at))
        });

        scored
    }

    /// Incremental centroid update: `mu' = (n*mu + v) / (n+1)`, or `v` if
    /// there is no prior centroid (n == 0).
    #[must_use]
    pub fn incremental_centroid(prior: Option<&[f32]>, member_count: usize, new_vec: &[f32]) -> Vec<f32> {
        match prior {
            None => new_vec.to_vec(),
            Some(mu) => {
                debug_assert_eq!(mu.len(), new_vec.len(), "centroid/embedding dimension mismatch");
                let n = member_count as f32;
                mu.iter()
                    .zip(new_vec.iter())
                    .map(|(m, v)| (n * m + v) / (n + 1.0))
                    .collect()
            }
        }
    }

    /// Cosine similarity in `[0, 1]` (assuming non-negative-correlated
    /// embeddings, as produced by the configured embedder). Returns `0.0`
    /// for zero-length vectors rather than dividing by zero.
    #[must_use]
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
        let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
        let norm_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
        let norm_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }

    /// The `N`-element sequence of calendar-month partition keys starting
    /// at `t_ref`'s month and walking backwards, newest first.
    #[must_use]
    pub fn enumerate_partitions(t_ref: OffsetDateTime, months: u32) -> Vec<PartitionKey> {
        let t_ref = t_ref.to_offset(time::UtcOffset::UTC);
        let base = i64::from(t_ref.year()) * 12 + i64::from(u8::from(t_ref.month())) - 1;

        (0..months)
            .map(|delta| {
                let total = base - i64::from(delta);
                let year = total.div_euclid(12);
                let month = (total.rem_euclid(12) + 1) as u8;
                PartitionKey::new(year as i32, month)
            })
            .collect()
    }
}
