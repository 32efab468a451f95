//! Entry point for inbound ticket creation: uniqueness check, embedding,
//! cluster assignment, and a single ticket write -- in that order, since
//! the ticket is never persisted without a decision already attached.

use std::sync::Arc;

use dedup_core::{build_dedup_text_for_ticket, PartitionKey, Ticket, TicketStatus};
use tracing::info;
use uuid::Uuid;

use crate::embedder::Embedder;
use crate::error::DedupError;
use crate::service::clustering::ClusteringService;
use crate::store::TicketStore;

/// Caller-supplied fields for a new ticket. Everything derived at ingest
/// time (`id`, `dedup_text`, `content_vector`, `cluster_id`, `dedup`) is
/// filled in by [`IngestCoordinator::ingest`], not by the caller.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub ticket_number: String,
    pub summary: String,
    pub description: Option<String>,
    pub category: String,
    pub subcategory: Option<String>,
    pub channel: String,
    pub severity: Option<String>,
    pub merchant: Option<String>,
    pub customer_id: String,
    pub name: String,
    pub mobile_number: String,
    pub email: String,
    pub account_type: String,
    pub transaction_id: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub occurred_at: Option<time::OffsetDateTime>,
    pub status: TicketStatus,
    pub priority: dedup_core::Priority,
    pub created_at: time::OffsetDateTime,
}

pub struct IngestCoordinator {
    tickets: Arc<TicketStore>,
    clustering: Arc<ClusteringService>,
    embedder: Arc<dyn Embedder>,
}

impl IngestCoordinator {
    #[must_use]
    pub fn new(tickets: Arc<TicketStore>, clustering: Arc<ClusteringService>, embedder: Arc<dyn Embedder>) -> Self {
        Self { tickets, clustering, embedder }
    }

    /// Ingests one inbound ticket. Rejects on `ticket_number` collision
    /// within the destination partition before any embedding or clustering
    /// work happens.
    pub async fn ingest(&self, new_ticket: NewTicket) -> Result<Ticket, DedupError> {
        let pk = PartitionKey::for_timestamp(new_ticket.created_at);

        if self.tickets.exists_by_number(&new_ticket.ticket_number, &pk).await? {
            return Err(DedupError::Conflict(format!(
                "ticket_number {} already exists in partition {pk}",
                new_ticket.ticket_number
            )));
        }

        let mut ticket = Ticket {
            id: Uuid::new_v4(),
            ticket_number: new_ticket.ticket_number,
            summary: new_ticket.summary,
            description: new_ticket.description,
            category: new_ticket.category,
            subcategory: new_ticket.subcategory,
            channel: new_ticket.channel,
            severity: new_ticket.severity,
            merchant: new_ticket.merchant,
            customer_id: new_ticket.customer_id,
            name: new_ticket.name,
            mobile_number: new_ticket.mobile_number,
            email: new_ticket.email,
            account_type: new_ticket.account_type,
            transaction_id: new_ticket.transaction_id,
            amount: new_ticket.amount,
            currency: new_ticket.currency,
            occurred_at: new_ticket.occurred_at,
            status: new_ticket.status,
            priority: new_ticket.priority,
            dedup_text: String::new(),
            content_vector: Vec::new(),
            cluster_id: Uuid::nil(),
            dedup: dedup_core::DedupDecision::no_candidates(),
            merged_into_id: None,
            created_at: new_ticket.created_at,
            updated_at: new_ticket.created_at,
            closed_at: None,
            etag: String::new(),
        };

        ticket.dedup_text = build_dedup_text_for_ticket(&ticket);
        ticket.content_vector = self.embedder.embed(&ticket.dedup_text).await?;

        let (cluster, decision) = self.clustering.find_or_create_cluster(&ticket).await?;
        ticket.cluster_id = cluster.id;
        ticket.dedup = decision;

        let created = self.tickets.create(&ticket).await?;
        info!(
            ticket_id = %created.id,
            cluster_id = %created.cluster_id,
            decision = ?created.dedup.decision,
            pk = %pk,
            "ingested ticket"
        );
        Ok(created)
    }
}
