//! `Merge` and `Revert` handlers: thin JSON adapters over
//! [`MergeService`](crate::service::MergeService).

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
pub struct MergeRequest {
    pub primary_ticket_id: Uuid,
    pub pk: PartitionKey,
    pub performed_by: String,
}

pub async fn merge_handler(
    State(state): State<AppState>,
    Path(cluster_id): Path<Uuid>,
    Json(body): Json<MergeRequest>,
) -> (StatusCode, Json<Value>) {
    match state
        .merge
        .merge_cluster(cluster_id, body.primary_ticket_id, &body.pk, &body.performed_by)
        .await
    {
        Ok(merge) => (StatusCode::OK, Json(json!(merge))),
        Err(err) => error_response(&err),
    }
}

#[derive(Debug, Deserialize)]
pub struct RevertRequest {
    pub pk: PartitionKey,
    pub reverted_by: String,
    pub reason: Option<String>,
    #[serde(default)]
    pub force: bool,
}

pub async fn revert_handler(
    State(state): State<AppState>,
    Path(merge_id): Path<Uuid>,
    Json(body): Json<RevertRequest>,
) -> (StatusCode, Json<Value>) {
    match state
        .merge
        .revert_merge(merge_id, &body.pk, &body.reverted_by, body.reason, body.force)
        .await
    {
        Ok(merge) => (StatusCode::OK, Json(json!(merge))),
        Err(err) => error_response(&err),
    }
}
