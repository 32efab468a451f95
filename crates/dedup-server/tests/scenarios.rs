//! End-to-end scenarios over the full ingest/cluster/merge/revert path,
//! wired against an in-memory store and the deterministic embedder.

use std::sync::Arc;

use dedup_core::{ClusterStatus, Decision, DecisionReason, DedupConfig, MergeOperationStatus, PartitionKey, Priority, Ticket, TicketStatus};
use dedup_server::embedder::{DeterministicEmbedder, Embedder};
use dedup_server::error::DedupError;
use dedup_server::store::{ClusterStore, MemoryDocStore, MergeStore, TicketStore};
use dedup_server::{ClusteringService, IngestCoordinator, MergeService, NewTicket};
use time::macros::datetime;

struct Harness {
    tickets: Arc<TicketStore>,
    clusters: Arc<ClusterStore>,
    merges: Arc<MergeStore>,
    ingest: IngestCoordinator,
    clustering: Arc<ClusteringService>,
    merge: MergeService,
}

fn harness_with(config: DedupConfig) -> Harness {
    let docs = Arc::new(MemoryDocStore::new());
    let tickets = Arc::new(TicketStore::new(docs.clone()));
    let clusters = Arc::new(ClusterStore::new(docs.clone()));
    let merges = Arc::new(MergeStore::new(docs));
    let clustering = Arc::new(ClusteringService::new(clusters.clone(), config.clone()));
    let embedder: Arc<dyn Embedder> = Arc::new(DeterministicEmbedder::new(config.embedding_dimensions));
    let ingest = IngestCoordinator::new(tickets.clone(), clustering.clone(), embedder);
    let merge = MergeService::new(
        clusters.clone(),
        tickets.clone(),
        merges.clone(),
        config.open_statuses.clone(),
        config.revert_window_hours,
        config.max_etag_retries,
    );

    Harness { tickets, clusters, merges, ingest, clustering, merge }
}

fn harness() -> Harness {
    harness_with(DedupConfig { embedding_dimensions: 8, ..DedupConfig::default() })
}

fn new_ticket(number: &str, customer_id: &str, summary: &str, created_at: time::OffsetDateTime) -> NewTicket {
    NewTicket {
        ticket_number: number.into(),
        summary: summary.into(),
        description: None,
        category: "Billing".into(),
        subcategory: None,
        channel: "web".into(),
        severity: None,
        merchant: None,
        customer_id: customer_id.into(),
        name: "Alice".into(),
        mobile_number: "555-0100".into(),
        email: "alice@example.com".into(),
        account_type: "standard".into(),
        transaction_id: None,
        amount: None,
        currency: None,
        occurred_at: None,
        status: TicketStatus::Open,
        priority: Priority::Medium,
        created_at,
    }
}

// S1: first ticket into an empty store seeds a candidate cluster.
#[tokio::test]
async fn s1_first_ticket_seeds_candidate_cluster() {
    let h = harness();
    let created_at = datetime!(2026-01-10 12:00 UTC);
    let n1 = new_ticket("N1", "C1", "payment failed for order 42", created_at);

    let ticket = h.ingest.ingest(n1).await.unwrap();
    let pk = PartitionKey::for_timestamp(created_at);
    let cluster = h.clusters.read(ticket.cluster_id, &pk).await.unwrap().unwrap();

    assert_eq!(cluster.status, ClusterStatus::Candidate);
    assert_eq!(cluster.ticket_count(), 1);
    assert_eq!(cluster.open_count, 1);
    assert_eq!(ticket.dedup.decision, Decision::NewCluster);
    assert_eq!(ticket.dedup.decision_reason, DecisionReason::NoCandidates);
    assert_eq!(ticket.dedup.confidence_score, 0.0);
}

// S2: a near-identical second ticket from a different customer auto-joins
// and promotes the cluster to pending.
#[tokio::test]
async fn s2_identical_second_ticket_auto_joins_and_promotes() {
    let h = harness();
    let t0 = datetime!(2026-01-10 12:00 UTC);
    let n1 = new_ticket("N1", "C1", "payment failed for order 42", t0);
    let n2 = new_ticket("N2", "C2", "payment failed for order 42", t0 + time::Duration::minutes(5));

    let first = h.ingest.ingest(n1).await.unwrap();
    let second = h.ingest.ingest(n2).await.unwrap();

    assert_eq!(first.cluster_id, second.cluster_id);
    assert_eq!(second.dedup.decision, Decision::Auto);

    let pk = PartitionKey::for_timestamp(t0);
    let cluster = h.clusters.read(second.cluster_id, &pk).await.unwrap().unwrap();
    assert_eq!(cluster.status, ClusterStatus::Pending);
    assert_eq!(cluster.ticket_count(), 2);
    assert_eq!(cluster.open_count, 2);
}

// S3 + S4: merge collapses the cluster and decrements open_count; an
// immediate force=false revert restores everything.
#[tokio::test]
async fn s3_s4_merge_then_immediate_revert_round_trips() {
    let h = harness();
    let t0 = datetime!(2026-01-10 12:00 UTC);
    let n1 = new_ticket("N1", "C1", "payment failed for order 42", t0);
    let n2 = new_ticket("N2", "C2", "payment failed for order 42", t0 + time::Duration::minutes(5));

    let primary = h.ingest.ingest(n1).await.unwrap();
    let secondary = h.ingest.ingest(n2).await.unwrap();
    let pk = PartitionKey::for_timestamp(t0);
    let cluster_id = primary.cluster_id;

    let merge_op = h
        .merge
        .merge_cluster(cluster_id, primary.id, &pk, "agent-1")
        .await
        .unwrap();

    assert_eq!(merge_op.status, MergeOperationStatus::Completed);
    assert_eq!(merge_op.secondary_ticket_ids, vec![secondary.id]);

    let merged_cluster = h.clusters.read(cluster_id, &pk).await.unwrap().unwrap();
    assert_eq!(merged_cluster.status, ClusterStatus::Merged);
    assert_eq!(merged_cluster.open_count, 1);

    let merged_secondary = h.tickets.read(secondary.id, &pk).await.unwrap().unwrap();
    assert_eq!(merged_secondary.merged_into_id, Some(primary.id));

    // S4: revert immediately, no conflicts.
    let reverted = h
        .merge
        .revert_merge(merge_op.id, &pk, "agent-1", None, false)
        .await
        .unwrap();

    assert_eq!(reverted.status, MergeOperationStatus::Reverted);

    let restored_secondary = h.tickets.read(secondary.id, &pk).await.unwrap().unwrap();
    assert_eq!(restored_secondary.merged_into_id, None);
    assert_eq!(restored_secondary.cluster_id, cluster_id);

    let restored_cluster = h.clusters.read(cluster_id, &pk).await.unwrap().unwrap();
    assert_eq!(restored_cluster.status, ClusterStatus::Pending);
    assert_eq!(restored_cluster.open_count, 2);
}

// S5: a cluster at max capacity rejects further joins; the overflow
// ticket still gets persisted, just not into the full cluster.
#[tokio::test]
async fn s5_cluster_at_capacity_is_not_exceeded() {
    let config = DedupConfig {
        embedding_dimensions: 8,
        max_cluster_members: 2,
        ..DedupConfig::default()
    };
    let h = harness_with(config);
    let t0 = datetime!(2026-01-10 12:00 UTC);

    let a = h.ingest.ingest(new_ticket("A", "C1", "payment failed for order 42", t0)).await.unwrap();
    let b = h
        .ingest
        .ingest(new_ticket("B", "C2", "payment failed for order 42", t0 + time::Duration::minutes(1)))
        .await
        .unwrap();
    assert_eq!(a.cluster_id, b.cluster_id);

    let c = h
        .ingest
        .ingest(new_ticket("C", "C3", "payment failed for order 42", t0 + time::Duration::minutes(2)))
        .await
        .unwrap();

    let pk = PartitionKey::for_timestamp(t0);
    let full_cluster = h.clusters.read(a.cluster_id, &pk).await.unwrap().unwrap();
    assert!(full_cluster.ticket_count() <= 2);

    // The third ticket was persisted even though it could not join the
    // full cluster.
    assert!(h.tickets.read(c.id, &pk).await.unwrap().is_some());
    if c.cluster_id != a.cluster_id {
        let other = h.clusters.read(c.cluster_id, &pk).await.unwrap().unwrap();
        assert!(other.ticket_count() <= 2);
    }
}

// S6: a subsequent merge referencing the same primary blocks a
// non-forced revert of the earlier merge.
#[tokio::test]
async fn s6_subsequent_merge_blocks_revert_without_force() {
    let h = harness();
    let t0 = datetime!(2026-01-10 12:00 UTC);
    let pk = PartitionKey::for_timestamp(t0);

    let primary = h.ingest.ingest(new_ticket("P", "C1", "payment failed for order 42", t0)).await.unwrap();
    let secondary = h
        .ingest
        .ingest(new_ticket("S", "C2", "payment failed for order 42", t0 + time::Duration::minutes(1)))
        .await
        .unwrap();
    let cluster_id = primary.cluster_id;

    let m1 = h.merge.merge_cluster(cluster_id, primary.id, &pk, "agent-1").await.unwrap();

    // Ten minutes later, a brand new cluster is seeded containing the
    // primary again (simulated by ingesting a fresh ticket that the
    // scenario treats as already sharing the primary's cluster via a
    // direct second ingest joining the primary's now-merged cluster id
    // is not possible post-merge, so we model "P ends up in a new
    // cluster" by creating one directly through another ingest of a
    // near-duplicate and merging with P as primary).
    let new_secondary = h
        .ingest
        .ingest(new_ticket("S2", "C3", "payment failed for order 42", t0 + time::Duration::minutes(10)))
        .await
        .unwrap();

    // Move P into the new candidate cluster manually to model the
    // scenario's "operator creates a new cluster containing P" step,
    // then merge with P as primary again.
    let mut new_cluster = h.clusters.read(new_secondary.cluster_id, &pk).await.unwrap().unwrap();
    let etag = new_cluster.etag.clone();
    new_cluster.members.push(dedup_core::ClusterMember {
        ticket_id: primary.id,
        ticket_number: primary.ticket_number.clone(),
        summary: primary.summary.clone(),
        category: primary.category.clone(),
        subcategory: primary.subcategory.clone(),
        created_at: primary.created_at,
        confidence_score: 1.0,
        added_at: t0 + time::Duration::minutes(10),
        was_open: true,
    });
    new_cluster.open_count += 1;
    new_cluster.status = ClusterStatus::Pending;
    let new_cluster = h.clusters.replace(&new_cluster, &pk, &etag).await.unwrap();

    let mut primary_copy = h.tickets.read(primary.id, &pk).await.unwrap().unwrap();
    primary_copy.cluster_id = new_cluster.id;
    let primary_etag = primary_copy.etag.clone();
    h.tickets.replace(&primary_copy, &primary_etag).await.unwrap();

    let m2 = h
        .merge
        .merge_cluster(new_cluster.id, primary.id, &pk, "agent-2")
        .await
        .unwrap();
    assert_ne!(m1.id, m2.id);

    let err = h
        .merge
        .revert_merge(m1.id, &pk, "agent-1", None, false)
        .await
        .unwrap_err();

    match err {
        DedupError::MergeConflict { conflicts } => {
            assert!(conflicts.iter().any(|c| matches!(
                c,
                dedup_server::error::Conflict::SubsequentMerge { merge_id } if *merge_id == m2.id
            )));
        }
        other => panic!("expected MergeConflict, got {other:?}"),
    }

    // P8/P10: revert-with-force=false never mutated state.
    let secondary_after = h.tickets.read(secondary.id, &pk).await.unwrap().unwrap();
    assert_eq!(secondary_after.merged_into_id, Some(primary.id));
}

// P9: revert after the deadline fails with DeadlineExceeded and mutates
// nothing.
#[tokio::test]
async fn p9_revert_after_deadline_fails_without_mutating() {
    let config = DedupConfig { embedding_dimensions: 8, revert_window_hours: 0, ..DedupConfig::default() };
    let h = harness_with(config);
    let t0 = datetime!(2026-01-10 12:00 UTC);
    let pk = PartitionKey::for_timestamp(t0);

    let primary = h.ingest.ingest(new_ticket("P", "C1", "payment failed for order 42", t0)).await.unwrap();
    let secondary = h
        .ingest
        .ingest(new_ticket("S", "C2", "payment failed for order 42", t0 + time::Duration::minutes(1)))
        .await
        .unwrap();
    let cluster_id = primary.cluster_id;

    let merge_op = h.merge.merge_cluster(cluster_id, primary.id, &pk, "agent-1").await.unwrap();

    // revert_deadline = performed_at + 0h, so "now" is already past it.
    let err = h
        .merge
        .revert_merge(merge_op.id, &pk, "agent-1", None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, DedupError::DeadlineExceeded));

    let still_merged = h.clusters.read(cluster_id, &pk).await.unwrap().unwrap();
    assert_eq!(still_merged.status, ClusterStatus::Merged);
    let still_merged_secondary = h.tickets.read(secondary.id, &pk).await.unwrap().unwrap();
    assert_eq!(still_merged_secondary.merged_into_id, Some(primary.id));
}

// P4: ticket_number uniqueness is enforced within a partition.
#[tokio::test]
async fn p4_duplicate_ticket_number_in_partition_rejected() {
    let h = harness();
    let t0 = datetime!(2026-01-10 12:00 UTC);
    h.ingest.ingest(new_ticket("DUP-1", "C1", "first", t0)).await.unwrap();

    let err = h
        .ingest
        .ingest(new_ticket("DUP-1", "C2", "a completely different complaint", t0))
        .await
        .unwrap_err();
    assert!(matches!(err, DedupError::Conflict(_)));
}

// P5: dedup_text never contains PII fields.
#[tokio::test]
async fn p5_dedup_text_excludes_pii() {
    let h = harness();
    let t0 = datetime!(2026-01-10 12:00 UTC);
    let mut n1 = new_ticket("N1", "C-secret-42", "payment failed for order 42", t0);
    n1.name = "Jane Doe".into();
    n1.mobile_number = "555-9999".into();
    n1.email = "jane@example.com".into();
    n1.account_type = "premium".into();

    let ticket: Ticket = h.ingest.ingest(n1).await.unwrap();
    assert!(!ticket.dedup_text.contains("C-secret-42"));
    assert!(!ticket.dedup_text.contains("Jane Doe"));
    assert!(!ticket.dedup_text.contains("555-9999"));
    assert!(!ticket.dedup_text.contains("jane@example.com"));
    assert!(!ticket.dedup_text.contains("premium"));
}

// P1/P2/P3: capacity, count, and candidate-singleton invariants hold
// across a run of several ingests into the same neighborhood.
#[tokio::test]
async fn p1_p2_p3_cluster_invariants_hold_after_several_ingests() {
    let config = DedupConfig { embedding_dimensions: 8, max_cluster_members: 3, ..DedupConfig::default() };
    let h = harness_with(config);
    let t0 = datetime!(2026-01-10 12:00 UTC);

    let mut cluster_ids = std::collections::HashSet::new();
    for (i, label) in ["A", "B", "C", "D"].iter().enumerate() {
        let ticket = h
            .ingest
            .ingest(new_ticket(label, "C1", "payment failed for order 42", t0 + time::Duration::minutes(i as i64)))
            .await
            .unwrap();
        cluster_ids.insert(ticket.cluster_id);
    }

    let pk = PartitionKey::for_timestamp(t0);
    for id in cluster_ids {
        let cluster = h.clusters.read(id, &pk).await.unwrap().unwrap();
        assert!(cluster.ticket_count() <= 3, "P1: capacity exceeded");
        assert_eq!(cluster.ticket_count(), cluster.members.len(), "P2: count matches members");
        assert_eq!(
            cluster.status == ClusterStatus::Candidate,
            cluster.ticket_count() == 1,
            "P3: candidate iff singleton"
        );
    }
}

// Exercises the ClusteringService dismiss/remove_member lifecycle used
// by the HTTP facade, grounding it against a real ingest rather than a
// hand-built cluster.
#[tokio::test]
async fn dismiss_and_remove_member_operate_on_a_real_cluster() {
    let h = harness();
    let t0 = datetime!(2026-01-10 12:00 UTC);
    let n1 = new_ticket("N1", "C1", "payment failed for order 42", t0);
    let n2 = new_ticket("N2", "C2", "payment failed for order 42", t0 + time::Duration::minutes(5));

    let first = h.ingest.ingest(n1).await.unwrap();
    let second = h.ingest.ingest(n2).await.unwrap();
    let pk = PartitionKey::for_timestamp(t0);

    let after_remove = h
        .clustering
        .remove_member(first.cluster_id, second.id, &pk)
        .await
        .unwrap();
    assert_eq!(after_remove.status, ClusterStatus::Candidate);
    assert_eq!(after_remove.ticket_count(), 1);

    let dismissed = h
        .clustering
        .dismiss(after_remove.id, &pk, "agent-1", Some("false positive".into()))
        .await
        .unwrap();
    assert_eq!(dismissed.status, ClusterStatus::Dismissed);
    assert_eq!(dismissed.dismissed_by.as_deref(), Some("agent-1"));
}
