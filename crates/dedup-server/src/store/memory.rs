//! In-memory [`DocStore`] implementation. Partitioned by `(container, pk)`,
//! each partition map guarded by its own lock so ETag compare-and-swap on
//! one partition never blocks reads of another.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dedup_core::{DedupEngine, PartitionKey};
use parking_lot::Mutex;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use super::docstore::{DocStore, StoreError, StoredDocument, VectorMatch, VectorSearchFilters};

type PartitionTable = Mutex<HashMap<Uuid, StoredDocument>>;

/// Unique-key index for containers that enforce one (container, pk, key
/// value) -> id constraint. Only `tickets.ticket_number` needs this today;
/// kept generic over container name so adding another unique field later
/// doesn't require a new index type.
type UniqueIndex = DashMap<(&'static str, String, String), Uuid>;

/// A process-local, non-persistent [`DocStore`]. Suitable for tests and for
/// single-process deployments; a real deployment would swap this for a
/// networked backend behind the same trait.
#[derive(Default)]
pub struct MemoryDocStore {
    partitions: DashMap<(&'static str, String), Arc<PartitionTable>>,
    unique_index: UniqueIndex,
    etag_counter: std::sync::atomic::AtomicU64,
}

impl MemoryDocStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, container: &'static str, pk: &PartitionKey) -> Arc<PartitionTable> {
        Arc::clone(
            self.partitions
                .entry((container, pk.as_str().to_owned()))
                .or_insert_with(|| Arc::new(Mutex::new(HashMap::new())))
                .value(),
        )
    }

    fn next_etag(&self) -> String {
        let n = self
            .etag_counter
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        format!("etag-{n}")
    }

    fn unique_key_of(container: &'static str, body: &Value) -> Option<String> {
        match container {
            "tickets" => body
                .get("ticket_number")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
            _ => None,
        }
    }

    fn matches_vector_filters(body: &Value, filters: &VectorSearchFilters) -> bool {
        if let Some(customer_id) = &filters.customer_id {
            if body.get("customer_id").and_then(Value::as_str) != Some(customer_id.as_str()) {
                return false;
            }
        }
        if let Some(floor) = filters.updated_at_floor {
            let updated_at = body
                .get("updated_at")
                .and_then(Value::as_str)
                .and_then(|s| OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339).ok());
            match updated_at {
                Some(dt) if dt >= floor => {}
                _ => return false,
            }
        }
        if let Some(ceiling) = filters.ticket_count_ceiling {
            let count = body.get("members").and_then(Value::as_array).map_or(0, Vec::len);
            if count >= ceiling {
                return false;
            }
        }
        if filters.require_open_count_positive {
            let open_count = body.get("open_count").and_then(Value::as_u64).unwrap_or(0);
            if open_count == 0 {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl DocStore for MemoryDocStore {
    async fn point_read(
        &self,
        container: &'static str,
        id: Uuid,
        pk: &PartitionKey,
    ) -> Result<Option<StoredDocument>, StoreError> {
        let table = self.partition(container, pk);
        let guard = table.lock();
        let result = guard.get(&id).cloned();
        Ok(result)
    }

    async fn create(
        &self,
        container: &'static str,
        mut doc: StoredDocument,
    ) -> Result<StoredDocument, StoreError> {
        if let Some(key_value) = Self::unique_key_of(container, &doc.body) {
            let index_key = (container, doc.pk.as_str().to_owned(), key_value.clone());
            if self.unique_index.contains_key(&index_key) {
                return Err(StoreError::Conflict {
                    container,
                    pk: doc.pk.clone(),
                    key_value,
                });
            }
            doc.etag = self.next_etag();
            let table = self.partition(container, &doc.pk);
            table.lock().insert(doc.id, doc.clone());
            self.unique_index.insert(index_key, doc.id);
            return Ok(doc);
        }

        doc.etag = self.next_etag();
        let table = self.partition(container, &doc.pk);
        table.lock().insert(doc.id, doc.clone());
        Ok(doc)
    }

    async fn upsert(
        &self,
        container: &'static str,
        mut doc: StoredDocument,
    ) -> Result<StoredDocument, StoreError> {
        doc.etag = self.next_etag();
        let table = self.partition(container, &doc.pk);
        table.lock().insert(doc.id, doc.clone());
        Ok(doc)
    }

    async fn replace(
        &self,
        container: &'static str,
        id: Uuid,
        pk: &PartitionKey,
        body: Value,
        if_match: &str,
    ) -> Result<StoredDocument, StoreError> {
        let table = self.partition(container, pk);
        let mut guard = table.lock();
        let Some(existing) = guard.get(&id) else {
            return Err(StoreError::NotFound { id, pk: pk.clone() });
        };
        if existing.etag != if_match {
            return Err(StoreError::PreconditionFailed { id });
        }

        let updated = StoredDocument {
            id,
            pk: pk.clone(),
            etag: self.next_etag(),
            body,
        };
        guard.insert(id, updated.clone());
        Ok(updated)
    }

    async fn query(
        &self,
        container: &'static str,
        pk: &PartitionKey,
        predicate: &(dyn for<'a> Fn(&'a Value) -> bool + Send + Sync),
    ) -> Result<Vec<StoredDocument>, StoreError> {
        let table = self.partition(container, pk);
        let guard = table.lock();
        let mut result: Vec<StoredDocument> = Vec::new();
        for doc in guard.values() {
            if predicate(&doc.body) {
                result.push(doc.clone());
            }
        }
        Ok(result)
    }

    async fn vector_top_k(
        &self,
        container: &'static str,
        pk: &PartitionKey,
        k: usize,
        filters: &VectorSearchFilters,
        vector: &[f32],
    ) -> Result<Vec<VectorMatch>, StoreError> {
        let table = self.partition(container, pk);
        let guard = table.lock();

        let mut scored: Vec<VectorMatch> = guard
            .values()
            .filter(|doc| Self::matches_vector_filters(&doc.body, filters))
            .filter_map(|doc| {
                let candidate_vec: Vec<f32> = doc
                    .body
                    .get("vector")
                    .and_then(Value::as_array)
                    .map(|arr| arr.iter().filter_map(Value::as_f64).map(|f| f as f32).collect())?;
                let similarity = DedupEngine::cosine_similarity(vector, &candidate_vec);
                Some(VectorMatch {
                    document: doc.clone(),
                    similarity,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pk() -> PartitionKey {
        PartitionKey::new(2026, 1)
    }

    fn doc(id: Uuid, body: Value) -> StoredDocument {
        StoredDocument {
            id,
            pk: pk(),
            etag: String::new(),
            body,
        }
    }

    #[tokio::test]
    async fn create_then_point_read_round_trips() {
        let store = MemoryDocStore::new();
        let id = Uuid::new_v4();
        let created = store.create("clusters", doc(id, json!({"status": "candidate"}))).await.unwrap();
        assert!(!created.etag.is_empty());

        let read = store.point_read("clusters", id, &pk()).await.unwrap().unwrap();
        assert_eq!(read.id, id);
    }

    #[tokio::test]
    async fn create_enforces_ticket_number_uniqueness() {
        let store = MemoryDocStore::new();
        let body = json!({"ticket_number": "T-1"});
        store.create("tickets", doc(Uuid::new_v4(), body.clone())).await.unwrap();

        let conflict = store.create("tickets", doc(Uuid::new_v4(), body)).await;
        assert!(matches!(conflict, Err(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn replace_with_stale_etag_fails_precondition() {
        let store = MemoryDocStore::new();
        let id = Uuid::new_v4();
        store.create("clusters", doc(id, json!({"v": 1}))).await.unwrap();

        let result = store
            .replace("clusters", id, &pk(), json!({"v": 2}), "stale-etag")
            .await;
        assert!(matches!(result, Err(StoreError::PreconditionFailed { .. })));
    }

    #[tokio::test]
    async fn replace_with_current_etag_succeeds_and_rotates_etag() {
        let store = MemoryDocStore::new();
        let id = Uuid::new_v4();
        let created = store.create("clusters", doc(id, json!({"v": 1}))).await.unwrap();

        let replaced = store
            .replace("clusters", id, &pk(), json!({"v": 2}), &created.etag)
            .await
            .unwrap();
        assert_ne!(replaced.etag, created.etag);
        assert_eq!(replaced.body["v"], 2);
    }

    #[tokio::test]
    async fn vector_top_k_ranks_by_similarity_descending() {
        let store = MemoryDocStore::new();
        store
            .create("clusters", doc(Uuid::new_v4(), json!({"vector": [1.0, 0.0], "open_count": 1})))
            .await
            .unwrap();
        store
            .create("clusters", doc(Uuid::new_v4(), json!({"vector": [0.0, 1.0], "open_count": 1})))
            .await
            .unwrap();

        let results = store
            .vector_top_k("clusters", &pk(), 10, &VectorSearchFilters::default(), &[1.0, 0.0])
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].similarity > results[1].similarity);
    }

    #[tokio::test]
    async fn vector_top_k_excludes_clusters_at_capacity() {
        let store = MemoryDocStore::new();
        let at_capacity = json!({"vector": [1.0, 0.0], "open_count": 1, "members": [0, 1]});
        store.create("clusters", doc(Uuid::new_v4(), at_capacity)).await.unwrap();

        let filters = VectorSearchFilters {
            ticket_count_ceiling: Some(2),
            ..Default::default()
        };
        let results = store
            .vector_top_k("clusters", &pk(), 10, &filters, &[1.0, 0.0])
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
