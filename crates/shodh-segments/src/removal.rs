//! Segment removal coordinator (C5): cross-backend deletion with
//! graph-reference reconciliation.

use crate::backends::graph::{source_chunks_node_query, source_chunks_relationship_query};
use crate::backends::vector::{DeleteSelector, ListOptions, VectorFilter};
use crate::backends::{GraphAdapter, GraphQueryResult, GraphReturnType, KvAdapter, VectorAdapter};
use crate::error::{CoreError, CoreResult};
use crate::keys::{segment_key, ALL_SEGMENT_KEY_KINDS};
use crate::types::{extract_collection_id_from_doc_id, get_collection_ids, Metadata, MetadataValue};
use std::sync::Arc;

pub struct SegmentRemovalCoordinator {
    vector: Arc<dyn VectorAdapter>,
    graph: Option<Arc<dyn GraphAdapter>>,
    kv: Option<Arc<dyn KvAdapter>>,
}

impl SegmentRemovalCoordinator {
    pub fn new(vector: Arc<dyn VectorAdapter>, graph: Option<Arc<dyn GraphAdapter>>, kv: Option<Arc<dyn KvAdapter>>) -> Self {
        Self { vector, graph, kv }
    }

    /// `RemoveSegments(ctx, docID, segment_ids)` — spec §4.4.
    pub async fn remove_segments(&self, doc_id: &str, segment_ids: &[String]) -> CoreResult<usize> {
        if segment_ids.is_empty() {
            return Ok(0);
        }
        if doc_id.is_empty() {
            return Err(CoreError::invalid_argument("doc_id must not be empty"));
        }

        let ids = get_collection_ids(&extract_collection_id_from_doc_id(doc_id));

        if self.vector.collection_exists(&ids.vector).await.unwrap_or(false) {
            if let Err(e) = self
                .vector
                .delete_documents(&ids.vector, DeleteSelector::Ids(segment_ids.to_vec()))
                .await
            {
                tracing::warn!(doc_id, error = %e, "vector chunk deletion failed during segment removal");
            }
        }

        if let Some(graph) = &self.graph {
            if graph.is_connected().await {
                for segment_id in segment_ids {
                    if let Err(e) = reconcile_segment_references(graph.as_ref(), &ids.graph, segment_id).await {
                        tracing::warn!(doc_id, segment_id, error = %e, "graph reference reconciliation failed");
                    }
                }
            }
        }

        if let Some(kv) = &self.kv {
            for segment_id in segment_ids {
                delete_segment_kv_state(kv.as_ref(), doc_id, segment_id).await;
            }
        }

        Ok(segment_ids.len())
    }

    /// `RemoveSegmentsByDocID(ctx, docID)` — spec §4.4. Uses a vector-side
    /// `{doc_id, document_type = chunk}` filter for the vector deletion and
    /// returns the pre-deletion chunk count.
    pub async fn remove_segments_by_doc_id(&self, doc_id: &str) -> CoreResult<usize> {
        if doc_id.is_empty() {
            return Err(CoreError::invalid_argument("doc_id must not be empty"));
        }

        let ids = get_collection_ids(&extract_collection_id_from_doc_id(doc_id));
        let mut segment_ids: Vec<String> = Vec::new();

        if self.vector.collection_exists(&ids.vector).await.unwrap_or(false) {
            let filter = VectorFilter {
                doc_id: Some(doc_id.to_string()),
                document_type: Some("chunk".to_string()),
                ..Default::default()
            };

            match self
                .vector
                .list_documents(&ids.vector, &filter, &ListOptions::default())
                .await
            {
                Ok(docs) => segment_ids = docs.into_iter().map(|d| d.id).collect(),
                Err(e) => tracing::warn!(doc_id, error = %e, "failed to enumerate chunks for doc-level removal"),
            }

            if let Err(e) = self
                .vector
                .delete_documents(&ids.vector, DeleteSelector::Filter(filter))
                .await
            {
                tracing::warn!(doc_id, error = %e, "vector chunk deletion failed during doc-level removal");
            }
        }

        if let Some(graph) = &self.graph {
            if graph.is_connected().await {
                for segment_id in &segment_ids {
                    if let Err(e) = reconcile_segment_references(graph.as_ref(), &ids.graph, segment_id).await {
                        tracing::warn!(doc_id, segment_id, error = %e, "graph reference reconciliation failed");
                    }
                }
            }
        }

        if let Some(kv) = &self.kv {
            for segment_id in &segment_ids {
                delete_segment_kv_state(kv.as_ref(), doc_id, segment_id).await;
            }
        }

        Ok(segment_ids.len())
    }
}

/// §4.4.1 — for a single segment id, walk every node and relationship
/// whose `source_chunks` contains it, dropping the id from each and
/// deleting the object if that empties it. Sequential per segment to keep
/// graph-side memory bounded; idempotent (re-filtering a missing id is a
/// no-op), so a crash mid-loop across segments is safe to retry.
async fn reconcile_segment_references(graph: &dyn GraphAdapter, graph_name: &str, segment_id: &str) -> anyhow::Result<()> {
    let mut params = Metadata::new();
    params.insert("sid".to_string(), MetadataValue::Str(segment_id.to_string()));

    if let GraphQueryResult::Nodes(nodes) = graph
        .query(graph_name, source_chunks_node_query(), &params, GraphReturnType::Nodes)
        .await?
    {
        for node in nodes {
            let mut remaining = node.source_chunks.clone();
            remaining.retain(|s| s != segment_id);
            if remaining.is_empty() {
                graph.delete_nodes(graph_name, &[node.id.clone()], true).await?;
            } else {
                let mut updated = node;
                updated.source_chunks = remaining;
                graph.add_nodes(graph_name, vec![updated], true).await?;
            }
        }
    }

    if let GraphQueryResult::Relationships(rels) = graph
        .query(
            graph_name,
            source_chunks_relationship_query(),
            &params,
            GraphReturnType::Relationships,
        )
        .await?
    {
        for rel in rels {
            let mut remaining = rel.source_chunks.clone();
            remaining.retain(|s| s != segment_id);
            if remaining.is_empty() {
                graph.delete_relationships(graph_name, &[rel.id.clone()]).await?;
            } else {
                let mut updated = rel;
                updated.source_chunks = remaining;
                graph.add_relationships(graph_name, vec![updated], true).await?;
            }
        }
    }

    Ok(())
}

/// Delete per-segment scalar metadata (`weight`, `score`, vote lists, hit
/// lists, counters) for one segment. Best-effort: individual key failures
/// are logged, not propagated, matching the coordinator's "do not fail the
/// call on per-backend partial failure" policy.
async fn delete_segment_kv_state(kv: &dyn KvAdapter, doc_id: &str, segment_id: &str) {
    for kind in ALL_SEGMENT_KEY_KINDS {
        let key = segment_key(doc_id, kind, segment_id);
        if let Err(e) = kv.del(&key).await {
            tracing::warn!(doc_id, segment_id, key, error = %e, "failed to delete per-segment KV state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::{MemoryGraphAdapter, MemoryKvAdapter, MemoryVectorAdapter};
    use crate::backends::vector::VectorDocument;
    use crate::types::GraphObject;

    fn coordinator() -> (SegmentRemovalCoordinator, Arc<MemoryVectorAdapter>, Arc<MemoryGraphAdapter>, Arc<MemoryKvAdapter>) {
        let vector = Arc::new(MemoryVectorAdapter::new());
        let graph = Arc::new(MemoryGraphAdapter::new());
        let kv = Arc::new(MemoryKvAdapter::new());
        let coordinator = SegmentRemovalCoordinator::new(
            Arc::clone(&vector) as Arc<dyn VectorAdapter>,
            Some(Arc::clone(&graph) as Arc<dyn GraphAdapter>),
            Some(Arc::clone(&kv) as Arc<dyn KvAdapter>),
        );
        (coordinator, vector, graph, kv)
    }

    #[tokio::test]
    async fn graph_reconciliation_decrements_then_deletes_node() {
        let (coordinator, vector, graph, _kv) = coordinator();
        let mut doc = VectorDocument::default();
        doc.id = "s1".into();
        vector.add_documents("default", vec![doc], true, 10).await.unwrap();
        let mut doc2 = VectorDocument::default();
        doc2.id = "s2".into();
        vector.add_documents("default", vec![doc2], true, 10).await.unwrap();

        let node = GraphObject {
            id: "n1".into(),
            labels: vec!["Entity".into()],
            properties: Metadata::new(),
            source_chunks: vec!["s1".into(), "s2".into()],
        };
        graph.add_nodes("default_graph", vec![node], true).await.unwrap();

        let removed = coordinator.remove_segments("d1", &["s1".to_string()]).await.unwrap();
        assert_eq!(removed, 1);

        let mut params = Metadata::new();
        params.insert("sid".into(), MetadataValue::Str("s2".into()));
        let result = graph
            .query("default_graph", "", &params, GraphReturnType::Nodes)
            .await
            .unwrap();
        let GraphQueryResult::Nodes(nodes) = result else { panic!("expected nodes") };
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].source_chunks, vec!["s2".to_string()]);

        coordinator.remove_segments("d1", &["s2".to_string()]).await.unwrap();
        let stats = graph.get_stats("default_graph").await.unwrap();
        assert_eq!(stats.node_count, 0, "node should be deleted once its source_chunks is empty");
    }

    #[tokio::test]
    async fn removal_is_idempotent_for_already_removed_segment() {
        let (coordinator, vector, _graph, _kv) = coordinator();
        let mut doc = VectorDocument::default();
        doc.id = "s1".into();
        vector.add_documents("default", vec![doc], true, 10).await.unwrap();

        let first = coordinator.remove_segments("d1", &["s1".to_string()]).await.unwrap();
        let second = coordinator.remove_segments("d1", &["s1".to_string()]).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 1, "the notional removed count does not depend on prior state");
    }
}
