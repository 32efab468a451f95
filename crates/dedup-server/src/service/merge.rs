//! Merge and revert: collapsing a cluster's tickets onto one primary, and
//! undoing that within the revert window subject to conflict detection.

use std::sync::Arc;

use dedup_core::{
    ClusterStatus, MergeBehavior, MergeOperation, MergeOperationStatus, PartitionKey,
    SecondarySnapshot, TicketStatus,
};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Conflict, DedupError};
use crate::store::docstore::StoreError;
use crate::store::{ClusterStore, MergeStore, TicketStore};

pub struct MergeService {
    clusters: Arc<ClusterStore>,
    tickets: Arc<TicketStore>,
    merges: Arc<MergeStore>,
    open_statuses: Vec<TicketStatus>,
    revert_window_hours: i64,
    max_etag_retries: u32,
}

impl MergeService {
    #[must_use]
    pub fn new(
        clusters: Arc<ClusterStore>,
        tickets: Arc<TicketStore>,
        merges: Arc<MergeStore>,
        open_statuses: Vec<TicketStatus>,
        revert_window_hours: i64,
        max_etag_retries: u32,
    ) -> Self {
        Self { clusters, tickets, merges, open_statuses, revert_window_hours, max_etag_retries }
    }

    /// Collapses every other member of `cluster_id` onto `primary_ticket_id`.
    /// The cluster must be `pending` (never `candidate`, since a single
    /// member has no secondary to merge).
    pub async fn merge_cluster(
        &self,
        cluster_id: Uuid,
        primary_ticket_id: Uuid,
        pk: &PartitionKey,
        performed_by: &str,
    ) -> Result<MergeOperation, DedupError> {
        let mut attempts = 0;
        loop {
            let mut cluster = self
                .clusters
                .read(cluster_id, pk)
                .await?
                .ok_or(DedupError::NotFound)?;

            if cluster.status != ClusterStatus::Pending {
                return Err(DedupError::InvalidState(format!(
                    "cluster {cluster_id} is not pending"
                )));
            }
            if cluster.member_index(primary_ticket_id).is_none() {
                return Err(DedupError::InvalidState(format!(
                    "ticket {primary_ticket_id} is not a member of cluster {cluster_id}"
                )));
            }
            let secondary_ids: Vec<Uuid> = cluster
                .members
                .iter()
                .map(|m| m.ticket_id)
                .filter(|id| *id != primary_ticket_id)
                .collect();
            if secondary_ids.is_empty() {
                return Err(DedupError::InvalidState(format!(
                    "cluster {cluster_id} has no secondary to merge"
                )));
            }

            let mut snapshots = Vec::with_capacity(secondary_ids.len());
            for id in &secondary_ids {
                let secondary = self.tickets.read(*id, pk).await?.ok_or(DedupError::NotFound)?;
                snapshots.push(SecondarySnapshot {
                    ticket_id: secondary.id,
                    cluster_id: secondary.cluster_id,
                    merged_into_id: secondary.merged_into_id,
                    updated_at: secondary.updated_at,
                });
            }

            let now = OffsetDateTime::now_utc();
            let merge = MergeOperation {
                id: Uuid::new_v4(),
                cluster_id,
                primary_ticket_id,
                secondary_ticket_ids: secondary_ids.clone(),
                merge_behavior: MergeBehavior::KeepLatest,
                performed_by: performed_by.to_string(),
                performed_at: now,
                revert_deadline: now + time::Duration::hours(self.revert_window_hours),
                status: MergeOperationStatus::Completed,
                original_states: snapshots,
                reverted_by: None,
                reverted_at: None,
                revert_reason: None,
                etag: String::new(),
            };
            let created_merge = self.merges.create(&merge, pk).await?;

            let etag = cluster.etag.clone();
            let mut was_open_secondaries = 0u32;
            for id in &secondary_ids {
                if let Some(member) = cluster.members.iter().find(|m| m.ticket_id == *id) {
                    if member.was_open {
                        was_open_secondaries += 1;
                    }
                }
            }
            cluster.status = ClusterStatus::Merged;
            cluster.open_count = cluster.open_count.saturating_sub(was_open_secondaries);
            cluster.updated_at = now;

            match self.clusters.replace(&cluster, pk, &etag).await {
                Ok(_) => {}
                Err(StoreError::PreconditionFailed { .. }) => {
                    attempts += 1;
                    if attempts >= self.max_etag_retries {
                        return Err(DedupError::Conflict(format!(
                            "etag retries exhausted merging cluster {cluster_id}"
                        )));
                    }
                    continue;
                }
                Err(other) => return Err(other.into()),
            }

            for id in &secondary_ids {
                self.mark_merged(*id, pk, primary_ticket_id).await?;
            }

            info!(cluster_id = %cluster_id, merge_id = %created_merge.id, primary_ticket_id = %primary_ticket_id, "merged cluster");
            return Ok(created_merge);
        }
    }

    async fn mark_merged(&self, ticket_id: Uuid, pk: &PartitionKey, primary_ticket_id: Uuid) -> Result<(), DedupError> {
        let mut attempts = 0;
        loop {
            let mut ticket = self.tickets.read(ticket_id, pk).await?.ok_or(DedupError::NotFound)?;
            let etag = ticket.etag.clone();
            ticket.merged_into_id = Some(primary_ticket_id);
            ticket.updated_at = OffsetDateTime::now_utc();
            match self.tickets.replace(&ticket, &etag).await {
                Ok(_) => return Ok(()),
                Err(StoreError::PreconditionFailed { .. }) => {
                    attempts += 1;
                    if attempts >= self.max_etag_retries {
                        return Err(DedupError::Conflict(format!(
                            "etag retries exhausted marking ticket {ticket_id} merged"
                        )));
                    }
                    continue;
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    async fn restore_secondary(
        &self,
        snapshot: &SecondarySnapshot,
        pk: &PartitionKey,
    ) -> Result<(), DedupError> {
        let mut attempts = 0;
        loop {
            let mut ticket = self
                .tickets
                .read(snapshot.ticket_id, pk)
                .await?
                .ok_or(DedupError::NotFound)?;
            let etag = ticket.etag.clone();
            ticket.merged_into_id = None;
            ticket.cluster_id = snapshot.cluster_id;
            ticket.updated_at = OffsetDateTime::now_utc();
            match self.tickets.replace(&ticket, &etag).await {
                Ok(_) => return Ok(()),
                Err(StoreError::PreconditionFailed { .. }) => {
                    attempts += 1;
                    if attempts >= self.max_etag_retries {
                        return Err(DedupError::Conflict(format!(
                            "etag retries exhausted restoring ticket {}",
                            snapshot.ticket_id
                        )));
                    }
                    continue;
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    /// Reverts `merge_id`, restoring every secondary's prior cluster
    /// membership. Refuses if the revert window has elapsed or a conflict
    /// is detected, unless `force` is set.
    pub async fn revert_merge(
        &self,
        merge_id: Uuid,
        pk: &PartitionKey,
        reverted_by: &str,
        reason: Option<String>,
        force: bool,
    ) -> Result<MergeOperation, DedupError> {
        let mut merge = self.merges.read(merge_id, pk).await?.ok_or(DedupError::NotFound)?;

        if merge.status == MergeOperationStatus::Reverted {
            return Err(DedupError::InvalidState(format!("merge {merge_id} already reverted")));
        }
        let now = OffsetDateTime::now_utc();
        if now > merge.revert_deadline {
            return Err(DedupError::DeadlineExceeded);
        }

        let conflicts = self.detect_conflicts(&merge, pk).await?;
        if !conflicts.is_empty() && !force {
            warn!(merge_id = %merge_id, conflicts = conflicts.len(), "revert blocked by conflicts");
            return Err(DedupError::MergeConflict { conflicts });
        }

        for snapshot in &merge.original_states {
            self.restore_secondary(snapshot, pk).await?;
        }

        let mut restored_open = 0u32;
        for snapshot in &merge.original_states {
            if let Some(ticket) = self.tickets.read(snapshot.ticket_id, pk).await? {
                if ticket.is_open(&self.open_statuses) {
                    restored_open += 1;
                }
            }
        }

        let mut attempts = 0;
        loop {
            let mut cluster = self
                .clusters
                .read(merge.cluster_id, pk)
                .await?
                .ok_or(DedupError::NotFound)?;
            let etag = cluster.etag.clone();
            cluster.status = ClusterStatus::Pending;
            cluster.open_count += restored_open;
            cluster.updated_at = now;

            match self.clusters.replace(&cluster, pk, &etag).await {
                Ok(_) => break,
                Err(StoreError::PreconditionFailed { .. }) => {
                    attempts += 1;
                    if attempts >= self.max_etag_retries {
                        return Err(DedupError::Conflict(format!(
                            "etag retries exhausted reverting cluster {}",
                            merge.cluster_id
                        )));
                    }
                    continue;
                }
                Err(other) => return Err(other.into()),
            }
        }

        let etag = merge.etag.clone();
        merge.status = MergeOperationStatus::Reverted;
        merge.reverted_by = Some(reverted_by.to_string());
        merge.reverted_at = Some(now);
        merge.revert_reason = reason;

        let reverted = self.merges.replace(&merge, pk, &etag).await?;
        info!(merge_id = %merge_id, "reverted merge");
        Ok(reverted)
    }

    async fn detect_conflicts(&self, merge: &MergeOperation, pk: &PartitionKey) -> Result<Vec<Conflict>, DedupError> {
        let mut conflicts = Vec::new();

        let subsequent = self.merges.find_completed_by_primary(pk, merge.primary_ticket_id).await?;
        for other in subsequent {
            if other.id != merge.id && other.performed_at > merge.performed_at {
                conflicts.push(Conflict::SubsequentMerge { merge_id: other.id });
            }
        }

        for snapshot in &merge.original_states {
            if let Some(current) = self.tickets.read(snapshot.ticket_id, pk).await? {
                if current.updated_at > snapshot.updated_at && current.updated_at > merge.performed_at {
                    conflicts.push(Conflict::TicketModified { ticket_id: snapshot.ticket_id });
                }
            }
        }

        Ok(conflicts)
    }
}
