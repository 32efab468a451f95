//! Typed view over [`DocStore`] for clusters: vector search over cluster
//! centroids, conditional replace.

use std::sync::Arc;

use dedup_core::{Cluster, PartitionKey};
use serde_json::Value;
use uuid::Uuid;

use super::docstore::{DocStore, StoreError, StoredDocument, VectorMatch, VectorSearchFilters};

const CONTAINER: &str = "clusters";

pub struct ClusterStore {
    store: Arc<dyn DocStore>,
}

/// A scored candidate cluster returned by [`ClusterStore::search_candidates`].
pub struct ClusterCandidate {
    pub cluster: Cluster,
    pub similarity: f64,
}

impl ClusterStore {
    #[must_use]
    pub fn new(store: Arc<dyn DocStore>) -> Self {
        Self { store }
    }

    pub async fn read(&self, id: Uuid, pk: &PartitionKey) -> Result<Option<Cluster>, StoreError> {
        let doc = self.store.point_read(CONTAINER, id, pk).await?;
        Ok(doc.map(|d| deserialize(&d)))
    }

    pub async fn create(&self, cluster: &Cluster) -> Result<Cluster, StoreError> {
        let doc = StoredDocument {
            id: cluster.id,
            pk: PartitionKey::for_timestamp(cluster.created_at),
            etag: String::new(),
            body: to_body(cluster),
        };
        let created = self.store.create(CONTAINER, doc).await?;
        Ok(deserialize(&created))
    }

    /// Conditional replace using the ETag from the last successful read.
    /// `pk` is the partition the cluster document lives in (its creation
    /// partition; never recomputed from `cluster.updated_at`, since the
    /// partition a document lives in never moves).
    pub async fn replace(
        &self,
        cluster: &Cluster,
        pk: &PartitionKey,
        if_match: &str,
    ) -> Result<Cluster, StoreError> {
        let replaced = self
            .store
            .replace(CONTAINER, cluster.id, pk, to_body(cluster), if_match)
            .await?;
        Ok(deserialize(&replaced))
    }

    /// Top-K candidate clusters in `pk` by cosine similarity to `vector`,
    /// subject to `filters` (capacity cap, open-count, customer scoping,
    /// recency floor).
    pub async fn search_candidates(
        &self,
        pk: &PartitionKey,
        k: usize,
        filters: &VectorSearchFilters,
        vector: &[f32],
    ) -> Result<Vec<ClusterCandidate>, StoreError> {
        let matches: Vec<VectorMatch> = self.store.vector_top_k(CONTAINER, pk, k, filters, vector).await?;
        Ok(matches
            .into_iter()
            .map(|m| ClusterCandidate {
                cluster: deserialize(&m.document),
                similarity: m.similarity,
            })
            .collect())
    }
}

fn to_body(cluster: &Cluster) -> Value {
    let mut body = serde_json::to_value(cluster).expect("Cluster always serializes");
    body["vector"] = serde_json::to_value(&cluster.centroid_vector).expect("vector serializes");
    body
}

fn deserialize(doc: &StoredDocument) -> Cluster {
    let mut cluster: Cluster =
        serde_json::from_value(doc.body.clone()).expect("stored cluster body is well-formed");
    cluster.id = doc.id;
    cluster.etag = doc.etag.clone();
    cluster
}
