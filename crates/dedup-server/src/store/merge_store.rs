//! Typed view over [`DocStore`] for merge records and their snapshots.

use std::sync::Arc;

use dedup_core::{MergeOperation, PartitionKey};
use serde_json::Value;
use uuid::Uuid;

use super::docstore::{DocStore, StoreError, StoredDocument};

const CONTAINER: &str = "merges";

pub struct MergeStore {
    store: Arc<dyn DocStore>,
}

impl MergeStore {
    #[must_use]
    pub fn new(store: Arc<dyn DocStore>) -> Self {
        Self { store }
    }

    pub async fn read(&self, id: Uuid, pk: &PartitionKey) -> Result<Option<MergeOperation>, StoreError> {
        let doc = self.store.point_read(CONTAINER, id, pk).await?;
        Ok(doc.map(|d| deserialize(&d)))
    }

    pub async fn create(&self, merge: &MergeOperation, pk: &PartitionKey) -> Result<MergeOperation, StoreError> {
        let doc = StoredDocument {
            id: merge.id,
            pk: pk.clone(),
            etag: String::new(),
            body: to_body(merge),
        };
        let created = self.store.create(CONTAINER, doc).await?;
        Ok(deserialize(&created))
    }

    pub async fn replace(
        &self,
        merge: &MergeOperation,
        pk: &PartitionKey,
        if_match: &str,
    ) -> Result<MergeOperation, StoreError> {
        let replaced = self
            .store
            .replace(CONTAINER, merge.id, pk, to_body(merge), if_match)
            .await?;
        Ok(deserialize(&replaced))
    }

    /// All completed merges in `pk` with the given primary ticket, used by
    /// revert's subsequent-merge conflict check.
    pub async fn find_completed_by_primary(
        &self,
        pk: &PartitionKey,
        primary_ticket_id: Uuid,
    ) -> Result<Vec<MergeOperation>, StoreError> {
        let primary_str = primary_ticket_id.to_string();
        let docs = self
            .store
            .query(CONTAINER, pk, &|body| {
                body.get("primary_ticket_id").and_then(Value::as_str) == Some(primary_str.as_str())
                    && body.get("status").and_then(Value::as_str) == Some("completed")
            })
            .await?;
        Ok(docs.iter().map(deserialize).collect())
    }
}

fn to_body(merge: &MergeOperation) -> Value {
    serde_json::to_value(merge).expect("MergeOperation always serializes")
}

fn deserialize(doc: &StoredDocument) -> MergeOperation {
    let mut merge: MergeOperation =
        serde_json::from_value(doc.body.clone()).expect("stored merge body is well-formed");
    merge.id = doc.id;
    merge.etag = doc.etag.clone();
    merge
}
