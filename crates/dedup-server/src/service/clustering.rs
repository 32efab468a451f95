//! Orchestrates one ingest: embed-to-candidate-search-to-score-to-join, and
//! the member lifecycle operations (remove, dismiss) that share its
//! candidate-search plumbing.

use std::collections::HashMap;
use std::sync::Arc;

use dedup_core::{
    Cluster, ClusterMember, ClusterStatus, Decision, DecisionReason, DedupConfig, DedupDecision,
    DedupEngine, PartitionKey, Ticket,
};
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DedupError;
use crate::store::docstore::{StoreError, VectorSearchFilters};
use crate::store::ClusterStore;

pub struct ClusteringService {
    clusters: Arc<ClusterStore>,
    engine: DedupEngine,
    config: DedupConfig,
}

impl ClusteringService {
    #[must_use]
    pub fn new(clusters: Arc<ClusterStore>, config: DedupConfig) -> Self {
        let engine = DedupEngine::new(config.clone());
        Self { clusters, engine, config }
    }

    /// Finds the best eligible cluster for `ticket` and joins it, or
    /// creates a new candidate cluster when none are eligible.
    pub async fn find_or_create_cluster(
        &self,
        ticket: &Ticket,
    ) -> Result<(Cluster, DedupDecision), DedupError> {
        let partitions = DedupEngine::enumerate_partitions(ticket.created_at, self.config.cluster_search_months);
        let window_floor = ticket.created_at - time::Duration::days(self.config.dedup_window_days);

        let filters = VectorSearchFilters {
            customer_id: self.config.filter_by_customer.then(|| ticket.customer_id.clone()),
            updated_at_floor: Some(window_floor),
            ticket_count_ceiling: Some(self.config.max_cluster_members),
            require_open_count_positive: true,
        };

        let mut candidates = Vec::new();
        let mut pk_by_cluster: HashMap<Uuid, PartitionKey> = HashMap::new();
        for pk in &partitions {
            let found = self
                .clusters
                .search_candidates(pk, self.config.vector_top_k, &filters, &ticket.content_vector)
                .await?;
            for c in found {
                pk_by_cluster.insert(c.cluster.id, pk.clone());
                candidates.push(c);
            }
        }
        candidates.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(self.config.vector_top_k);

        if candidates.is_empty() {
            info!(ticket_id = %ticket.id, "no candidate clusters found, seeding new cluster");
            return self.create_new_cluster(ticket, DecisionReason::NoCandidates, None).await;
        }

        let refs: Vec<(&Cluster, f64)> = candidates.iter().map(|c| (&c.cluster, c.similarity)).collect();
        let scored = self.engine.rank_candidates(ticket, &refs);
        for s in &scored {
            debug!(cluster_id = %s.cluster_id, confidence = s.confidence_score, decision = ?s.decision, "scored candidate");
        }

        for score in &scored {
            if score.decision == Decision::NewCluster {
                // Scored list is confidence-descending; everything after
                // this point is also ineligible.
                break;
            }
            let pk = pk_by_cluster
                .get(&score.cluster_id)
                .expect("every scored candidate came from pk_by_cluster")
                .clone();

            if let Some(result) = self.try_join_cluster(ticket, score, &pk).await? {
                info!(
                    ticket_id = %ticket.id,
                    cluster_id = %result.0.id,
                    confidence = score.confidence_score,
                    decision = ?score.decision,
                    "ticket joined cluster"
                );
                return Ok(result);
            }
        }

        let best = scored.first();
        self.create_new_cluster(ticket, DecisionReason::BelowReviewThreshold, best).await
    }

    /// Attempts to add `ticket` to the cluster named in `score`, retrying
    /// on ETag conflicts up to `max_etag_retries`. Returns `Ok(None)` if the
    /// cluster vanished or is at capacity so the caller can fall through to
    /// the next candidate.
    async fn try_join_cluster(
        &self,
        ticket: &Ticket,
        score: &dedup_core::engine::CandidateScore,
        pk: &PartitionKey,
    ) -> Result<Option<(Cluster, DedupDecision)>, DedupError> {
        let mut attempts = 0;
        loop {
            let Some(mut cluster) = self.clusters.read(score.cluster_id, pk).await? else {
                return Ok(None);
            };
            if cluster.is_at_capacity(self.config.max_cluster_members) {
                return Ok(None);
            }

            let etag = cluster.etag.clone();
            let now = OffsetDateTime::now_utc();
            let prior_member_count = cluster.members.len();
            let is_open = ticket.is_open(&self.config.open_statuses);

            cluster.centroid_vector = DedupEngine::incremental_centroid(
                Some(&cluster.centroid_vector),
                prior_member_count,
                &ticket.content_vector,
            );
            cluster.members.push(ClusterMember {
                ticket_id: ticket.id,
                ticket_number: ticket.ticket_number.clone(),
                summary: ticket.summary.clone(),
                category: ticket.category.clone(),
                subcategory: ticket.subcategory.clone(),
                created_at: ticket.created_at,
                confidence_score: score.confidence_score,
                added_at: now,
                was_open: is_open,
            });
            if is_open {
                cluster.open_count += 1;
            }
            if prior_member_count == 1 && cluster.status == ClusterStatus::Candidate {
                cluster.status = ClusterStatus::Pending;
            }
            cluster.updated_at = now;

            match self.clusters.replace(&cluster, pk, &etag).await {
                Ok(replaced) => {
                    let decision = DedupDecision {
                        decision: score.decision,
                        decision_reason: score.decision_reason,
                        confidence_score: score.confidence_score,
                        matched_cluster_id: Some(replaced.id),
                        semantic_score: score.semantic_score,
                        signals: score.signals,
                    };
                    return Ok(Some((replaced, decision)));
                }
                Err(StoreError::PreconditionFailed { .. }) => {
                    attempts += 1;
                    if attempts >= self.config.max_etag_retries {
                        warn!(cluster_id = %score.cluster_id, attempts, "etag retries exhausted joining cluster");
                        return Err(DedupError::Conflict(format!(
                            "etag retries exhausted joining cluster {}",
                            score.cluster_id
                        )));
                    }
                    continue;
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    async fn create_new_cluster(
        &self,
        ticket: &Ticket,
        reason: DecisionReason,
        best: Option<&dedup_core::engine::CandidateScore>,
    ) -> Result<(Cluster, DedupDecision), DedupError> {
        let now = OffsetDateTime::now_utc();
        let is_open = ticket.is_open(&self.config.open_statuses);

        let cluster = Cluster {
            id: Uuid::new_v4(),
            status: ClusterStatus::Candidate,
            members: vec![ClusterMember {
                ticket_id: ticket.id,
                ticket_number: ticket.ticket_number.clone(),
                summary: ticket.summary.clone(),
                category: ticket.category.clone(),
                subcategory: ticket.subcategory.clone(),
                created_at: ticket.created_at,
                confidence_score: 0.0,
                added_at: now,
                was_open: is_open,
            }],
            open_count: u32::from(is_open),
            centroid_vector: ticket.content_vector.clone(),
            customer_id: ticket.customer_id.clone(),
            category: ticket.category.clone(),
            subcategory: ticket.subcategory.clone(),
            representative_ticket_id: ticket.id,
            created_at: ticket.created_at,
            updated_at: now,
            etag: String::new(),
            dismissed_by: None,
            dismissal_reason: None,
        };

        let created = self.clusters.create(&cluster).await?;

        let decision = match best {
            Some(score) => DedupDecision {
                decision: Decision::NewCluster,
                decision_reason: reason,
                confidence_score: score.confidence_score,
                matched_cluster_id: Some(score.cluster_id),
                semantic_score: score.semantic_score,
                signals: score.signals,
            },
            None => DedupDecision::no_candidates(),
        };

        Ok((created, decision))
    }

    /// Removes `ticket_id` from `cluster_id`. Allowed only while the
    /// cluster is `candidate` or `pending`. Demotes to `candidate` if one
    /// member remains; fails if removal would leave it empty. Does not
    /// recompute the centroid (spec-accepted advisory-search drift).
    pub async fn remove_member(
        &self,
        cluster_id: Uuid,
        ticket_id: Uuid,
        pk: &PartitionKey,
    ) -> Result<Cluster, DedupError> {
        let mut attempts = 0;
        loop {
            let mut cluster = self
                .clusters
                .read(cluster_id, pk)
                .await?
                .ok_or(DedupError::NotFound)?;

            if !matches!(cluster.status, ClusterStatus::Candidate | ClusterStatus::Pending) {
                return Err(DedupError::InvalidState(format!(
                    "cluster {cluster_id} is not candidate or pending"
                )));
            }
            let Some(idx) = cluster.member_index(ticket_id) else {
                return Err(DedupError::InvalidState(format!(
                    "ticket {ticket_id} is not a member of cluster {cluster_id}"
                )));
            };

            let etag = cluster.etag.clone();
            let removed = cluster.members.remove(idx);
            if cluster.members.is_empty() {
                return Err(DedupError::InvalidState(format!(
                    "removing ticket {ticket_id} would leave cluster {cluster_id} with no members"
                )));
            }
            if removed.was_open {
                cluster.open_count = cluster.open_count.saturating_sub(1);
            }
            if cluster.members.len() == 1 {
                cluster.status = ClusterStatus::Candidate;
            }
            cluster.updated_at = OffsetDateTime::now_utc();

            match self.clusters.replace(&cluster, pk, &etag).await {
                Ok(replaced) => return Ok(replaced),
                Err(StoreError::PreconditionFailed { .. }) => {
                    attempts += 1;
                    if attempts >= self.config.max_etag_retries {
                        return Err(DedupError::Conflict(format!(
                            "etag retries exhausted removing member from cluster {cluster_id}"
                        )));
                    }
                    continue;
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    /// Transitions `cluster_id` to `dismissed`. Fails if it is already
    /// dismissed.
    pub async fn dismiss(
        &self,
        cluster_id: Uuid,
        pk: &PartitionKey,
        dismissed_by: &str,
        reason: Option<String>,
    ) -> Result<Cluster, DedupError> {
        let mut attempts = 0;
        loop {
            let mut cluster = self
                .clusters
                .read(cluster_id, pk)
                .await?
                .ok_or(DedupError::NotFound)?;

            if cluster.status == ClusterStatus::Dismissed {
                return Err(DedupError::InvalidState(format!("cluster {cluster_id} already dismissed")));
            }

            let etag = cluster.etag.clone();
            cluster.status = ClusterStatus::Dismissed;
            cluster.dismissed_by = Some(dismissed_by.to_string());
            cluster.dismissal_reason = reason.clone();
            cluster.updated_at = OffsetDateTime::now_utc();

            match self.clusters.replace(&cluster, pk, &etag).await {
                Ok(replaced) => return Ok(replaced),
                Err(StoreError::PreconditionFailed { .. }) => {
                    attempts += 1;
                    if attempts >= self.config.max_etag_retries {
                        return Err(DedupError::Conflict(format!(
                            "etag retries exhausted dismissing cluster {cluster_id}"
                        )));
                    }
                    continue;
                }
                Err(other) => return Err(other.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::{DeterministicEmbedder, Embedder};
    use crate::store::MemoryDocStore;
    use dedup_core::{Priority, TicketStatus};
    use time::macros::datetime;

    async fn sample_ticket(embedder: &DeterministicEmbedder, ticket_number: &str, customer_id: &str) -> Ticket {
        let vector = embedder.embed("payment failed order 42").await.unwrap();
        Ticket {
            id: Uuid::new_v4(),
            ticket_number: ticket_number.into(),
            summary: "payment failed order 42".into(),
            description: None,
            category: "Billing".into(),
            subcategory: Some("payment_failure".into()),
            channel: "web".into(),
            severity: None,
            merchant: None,
            customer_id: customer_id.into(),
            name: "Alice".into(),
            mobile_number: "555".into(),
            email: "a@example.com".into(),
            account_type: "standard".into(),
            transaction_id: None,
            amount: None,
            currency: None,
            occurred_at: None,
            status: TicketStatus::Open,
            priority: Priority::Medium,
            dedup_text: "payment failed order 42 Billing payment_failure web".into(),
            content_vector: vector,
            cluster_id: Uuid::nil(),
            dedup: DedupDecision::no_candidates(),
            merged_into_id: None,
            created_at: datetime!(2026-01-01 0:00 UTC),
            updated_at: datetime!(2026-01-01 0:00 UTC),
            closed_at: None,
            etag: String::new(),
        }
    }

    fn service() -> ClusteringService {
        let store = Arc::new(crate::store::ClusterStore::new(Arc::new(MemoryDocStore::new())));
        ClusteringService::new(store, DedupConfig::default())
    }

    #[tokio::test]
    async fn first_ticket_seeds_a_candidate_cluster() {
        let svc = service();
        let embedder = DeterministicEmbedder::new(8);
        let ticket = sample_ticket(&embedder, "T-1", "C1").await;

        let (cluster, decision) = svc.find_or_create_cluster(&ticket).await.unwrap();
        assert_eq!(cluster.status, ClusterStatus::Candidate);
        assert_eq!(cluster.ticket_count(), 1);
        assert_eq!(cluster.open_count, 1);
        assert_eq!(decision.decision, Decision::NewCluster);
        assert_eq!(decision.decision_reason, DecisionReason::NoCandidates);
        assert_eq!(decision.confidence_score, 0.0);
    }

    #[tokio::test]
    async fn second_identical_ticket_auto_joins_and_promotes_to_pending() {
        let svc = service();
        let embedder = DeterministicEmbedder::new(8);
        let n1 = sample_ticket(&embedder, "T-1", "C1").await;
        svc.find_or_create_cluster(&n1).await.unwrap();

        let mut n2 = sample_ticket(&embedder, "T-2", "C2").await;
        n2.created_at = n1.created_at + time::Duration::minutes(5);

        let (cluster, decision) = svc.find_or_create_cluster(&n2).await.unwrap();
        assert_eq!(cluster.status, ClusterStatus::Pending);
        assert_eq!(cluster.ticket_count(), 2);
        assert_eq!(cluster.open_count, 2);
        assert_eq!(decision.decision, Decision::Auto);
    }

    #[tokio::test]
    async fn dismiss_twice_fails_with_invalid_state() {
        let svc = service();
        let embedder = DeterministicEmbedder::new(8);
        let ticket = sample_ticket(&embedder, "T-1", "C1").await;
        let (cluster, _) = svc.find_or_create_cluster(&ticket).await.unwrap();
        let pk = PartitionKey::for_timestamp(cluster.created_at);

        svc.dismiss(cluster.id, &pk, "agent-1", None).await.unwrap();
        let err = svc.dismiss(cluster.id, &pk, "agent-1", None).await.unwrap_err();
        assert!(matches!(err, DedupError::InvalidState(_)));
    }

    #[tokio::test]
    async fn remove_last_member_is_rejected() {
        let svc = service();
        let embedder = DeterministicEmbedder::new(8);
        let ticket = sample_ticket(&embedder, "T-1", "C1").await;
        let (cluster, _) = svc.find_or_create_cluster(&ticket).await.unwrap();
        let pk = PartitionKey::for_timestamp(cluster.created_at);

        let err = svc.remove_member(cluster.id, ticket.id, &pk).await.unwrap_err();
        assert!(matches!(err, DedupError::InvalidState(_)));
    }

    #[tokio::test]
    async fn remove_member_demotes_pending_back_to_candidate() {
        let svc = service();
        let embedder = DeterministicEmbedder::new(8);
        let n1 = sample_ticket(&embedder, "T-1", "C1").await;
        let (cluster0, _) = svc.find_or_create_cluster(&n1).await.unwrap();

        let mut n2 = sample_ticket(&embedder, "T-2", "C2").await;
        n2.created_at = n1.created_at + time::Duration::minutes(5);
        let (cluster1, _) = svc.find_or_create_cluster(&n2).await.unwrap();
        assert_eq!(cluster1.status, ClusterStatus::Pending);

        let pk = PartitionKey::for_timestamp(cluster0.created_at);
        let after_removal = svc.remove_member(cluster1.id, n2.id, &pk).await.unwrap();
        assert_eq!(after_removal.status, ClusterStatus::Candidate);
        assert_eq!(after_removal.ticket_count(), 1);
    }
}
