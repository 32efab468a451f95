//! Typed view over [`DocStore`] for tickets: unique by `ticket_number`
//! within a partition.

use std::sync::Arc;

use dedup_core::{PartitionKey, Ticket};
use serde_json::Value;
use uuid::Uuid;

use super::docstore::{DocStore, StoreError, StoredDocument};

const CONTAINER: &str = "tickets";

pub struct TicketStore {
    store: Arc<dyn DocStore>,
}

impl TicketStore {
    #[must_use]
    pub fn new(store: Arc<dyn DocStore>) -> Self {
        Self { store }
    }

    pub async fn read(&self, id: Uuid, pk: &PartitionKey) -> Result<Option<Ticket>, StoreError> {
        let doc = self.store.point_read(CONTAINER, id, pk).await?;
        Ok(doc.map(|d| deserialize(&d)))
    }

    /// Fails with [`StoreError::Conflict`] if `ticket_number` already
    /// exists in `ticket.created_at`'s partition.
    pub async fn create(&self, ticket: &Ticket) -> Result<Ticket, StoreError> {
        let pk = PartitionKey::for_timestamp(ticket.created_at);
        let doc = StoredDocument {
            id: ticket.id,
            pk,
            etag: String::new(),
            body: to_body(ticket),
        };
        let created = self.store.create(CONTAINER, doc).await?;
        Ok(deserialize(&created))
    }

    pub async fn replace(&self, ticket: &Ticket, if_match: &str) -> Result<Ticket, StoreError> {
        let pk = PartitionKey::for_timestamp(ticket.created_at);
        let replaced = self
            .store
            .replace(CONTAINER, ticket.id, &pk, to_body(ticket), if_match)
            .await?;
        Ok(deserialize(&replaced))
    }

    /// Whether a ticket with `ticket_number` already exists in `pk`. An
    /// early-exit check only -- [`Self::create`] is still the authoritative
    /// uniqueness enforcement under concurrent ingests.
    pub async fn exists_by_number(&self, ticket_number: &str, pk: &PartitionKey) -> Result<bool, StoreError> {
        let number = ticket_number.to_string();
        let matches = self
            .store
            .query(CONTAINER, pk, &|body| body.get("ticket_number").and_then(Value::as_str) == Some(number.as_str()))
            .await?;
        Ok(!matches.is_empty())
    }
}

fn to_body(ticket: &Ticket) -> Value {
    serde_json::to_value(ticket).expect("Ticket always serializes")
}

fn deserialize(doc: &StoredDocument) -> Ticket {
    let mut ticket: Ticket = serde_json::from_value(doc.body.clone()).expect("stored ticket body is well-formed");
    ticket.id = doc.id;
    ticket.etag = doc.etag.clone();
    ticket
}
