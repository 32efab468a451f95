//! `DismissCluster` and `RemoveMember` handlers: thin JSON adapters over
//! [`ClusteringService`](crate::service::ClusteringService).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use dedup_core::PartitionKey;

use super::tickets::error_response;
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct DismissClusterRequest {
    pub pk: PartitionKey,
    pub dismissed_by: String,
    pub reason: Option<String>,
}

pub async fn dismiss_cluster_handler(
    State(state): State<AppState>,
    Path(cluster_id): Path<Uuid>,
    Json(body): Json<DismissClusterRequest>,
) -> (StatusCode, Json<Value>) {
    match state
        .clustering
        .dismiss(cluster_id, &body.pk, &body.dismissed_by, body.reason)
        .await
    {
        Ok(cluster) => (StatusCode::OK, Json(json!(cluster))),
        Err(err) => error_response(&err),
    }
}

#[derive(Debug, Deserialize)]
pub struct RemoveMemberRequest {
    pub pk: PartitionKey,
}

pub async fn remove_member_handler(
    State(state): State<AppState>,
    Path((cluster_id, ticket_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<RemoveMemberRequest>,
) -> (StatusCode, Json<Value>) {
    match state
        .clustering
        .remove_member(cluster_id, ticket_id, &body.pk)
        .await
    {
        Ok(cluster) => (StatusCode::OK, Json(json!(cluster))),
        Err(err) => error_response(&err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::{DeterministicEmbedder, Embedder};
    use crate::service::{ClusteringService, IngestCoordinator, MergeService};
    use crate::store::{ClusterStore, MemoryDocStore, MergeStore, TicketStore};
    use dedup_core::DedupConfig;
    use std::sync::Arc;
    use std::time::Instant;

    #[tokio::test]
    async fn dismiss_handler_returns_not_found_for_unknown_cluster() {
        let docs = Arc::new(MemoryDocStore::new());
        let tickets = Arc::new(TicketStore::new(docs.clone()));
        let clusters = Arc::new(ClusterStore::new(docs.clone()));
        let merges = Arc::new(MergeStore::new(docs));
        let config = DedupConfig::default();
        let clustering = Arc::new(ClusteringService::new(clusters.clone(), config.clone()));
        let embedder: Arc<dyn Embedder> = Arc::new(DeterministicEmbedder::new(8));
        let state = AppState {
            ingest: Arc::new(IngestCoordinator::new(tickets.clone(), clustering.clone(), embedder)),
            clustering,
            merge: Arc::new(MergeService::new(
                clusters,
                tickets,
                merges,
                config.open_statuses.clone(),
                config.revert_window_hours,
                config.max_etag_retries,
            )),
            shutdown: Arc::new(crate::network::ShutdownController::new()),
            config: Arc::new(crate::network::NetworkConfig::default()),
            start_time: Instant::now(),
        };

        let (status, _) = dismiss_cluster_handler(
            State(state),
            Path(Uuid::new_v4()),
            Json(DismissClusterRequest {
                pk: PartitionKey::new(2026, 1),
                dismissed_by: "agent-1".into(),
                reason: None,
            }),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    fn test_state() -> AppState {
        let docs = Arc::new(MemoryDocStore::new());
        let tickets = Arc::new(TicketStore::new(docs.clone()));
        let clusters = Arc::new(ClusterStore::new(docs.clone()));
        let merges = Arc::new(MergeStore::new(docs));
        let config = DedupConfig::default();
        let clustering = Arc::new(ClusteringService::new(clusters.clone(), config.clone()));
        let embedder: Arc<dyn Embedder> = Arc::new(DeterministicEmbedder::new(8));

        AppState {
            ingest: Arc::new(IngestCoordinator::new(tickets.clone(), clustering.clone(), embedder)),
            clustering,
            merge: Arc::new(MergeService::new(
                clusters,
                tickets,
                merges,
                config.open_statuses.clone(),
                config.revert_window_hours,
                config.max_etag_retries,
            )),
            shutdown: Arc::new(crate::network::ShutdownController::new()),
            config: Arc::new(crate::network::NetworkConfig::default()),
            start_time: Instant::now(),
        }
    }

    async fn ingest(state: &AppState, number: &str) -> dedup_core::Ticket {
        use crate::service::NewTicket;
        use dedup_core::{Priority, TicketStatus};
        use time::macros::datetime;

        let new_ticket = NewTicket {
            ticket_number: number.into(),
            summary: "payment failed".into(),
            description: None,
            category: "Billing".into(),
            subcategory: None,
            channel: "web".into(),
            severity: None,
            merchant: None,
            customer_id: "C1".into(),
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
            created_at: datetime!(2026-01-01 0:00 UTC),
        };
        state.ingest.ingest(new_ticket).await.unwrap()
    }

    #[tokio::test]
    async fn dismiss_handler_dismisses_a_real_cluster() {
        let state = test_state();
        let ticket = ingest(&state, "T-1").await;
        let pk = PartitionKey::for_timestamp(ticket.created_at);
        let cluster_id = ticket.cluster_id;

        let (status, body) = dismiss_cluster_handler(
            State(state),
            Path(cluster_id),
            Json(DismissClusterRequest {
                pk,
                dismissed_by: "agent-1".into(),
                reason: Some("not a duplicate".into()),
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.0["status"], "dismissed");
    }
}
