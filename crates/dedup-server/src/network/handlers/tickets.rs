//! `IngestTicket` handler: thin JSON adapter over [`IngestCoordinator`].

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use dedup_core::{Priority, TicketStatus};

use crate::error::DedupError;
use crate::service::NewTicket;

use super::AppState;

/// Request body for ticket ingest. Field names mirror [`NewTicket`]
/// directly; this handler performs no validation beyond JSON
/// deserialization, per the external contract.
#[derive(Debug, Deserialize)]
pub struct IngestTicketRequest {
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
    pub priority: Priority,
    pub created_at: time::OffsetDateTime,
}

impl From<IngestTicketRequest> for NewTicket {
    fn from(req: IngestTicketRequest) -> Self {
        NewTicket {
            ticket_number: req.ticket_number,
            summary: req.summary,
            description: req.description,
            category: req.category,
            subcategory: req.subcategory,
            channel: req.channel,
            severity: req.severity,
            merchant: req.merchant,
            customer_id: req.customer_id,
            name: req.name,
            mobile_number: req.mobile_number,
            email: req.email,
            account_type: req.account_type,
            transaction_id: req.transaction_id,
            amount: req.amount,
            currency: req.currency,
            occurred_at: req.occurred_at,
            status: req.status,
            priority: req.priority,
            created_at: req.created_at,
        }
    }
}

pub async fn ingest_ticket_handler(
    State(state): State<AppState>,
    Json(body): Json<IngestTicketRequest>,
) -> (StatusCode, Json<Value>) {
    match state.ingest.ingest(body.into()).await {
        Ok(ticket) => (StatusCode::CREATED, Json(json!(ticket))),
        Err(err) => error_response(&err),
    }
}

/// Maps [`DedupError`] onto an HTTP status and a structured error body.
/// Shared by every operation handler in this module tree.
pub(super) fn error_response(err: &DedupError) -> (StatusCode, Json<Value>) {
    let status = match err {
        DedupError::NotFound => StatusCode::NOT_FOUND,
        DedupError::Conflict(_) => StatusCode::CONFLICT,
        DedupError::InvalidState(_) => StatusCode::CONFLICT,
        DedupError::DeadlineExceeded => StatusCode::GONE,
        DedupError::MergeConflict { .. } => StatusCode::CONFLICT,
        DedupError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        DedupError::StoreError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() })))
}
