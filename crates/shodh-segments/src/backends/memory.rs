//! Zero-dependency in-memory reference adapters. Not wire-compatible with
//! any real vector/graph/KV product (per the spec's non-goals) — they
//! exist so the coordination layer is independently testable and so a
//! small deployment can run without an external backend.

use super::graph::{GraphAdapter, GraphQueryResult, GraphRelationship, GraphReturnType, GraphStats};
use super::kv::KvAdapter;
use super::vector::{
    DeleteSelector, GetDocumentsOptions, ListOptions, MetadataUpdate, SearchSimilarOptions,
    VectorAdapter, VectorDocument, VectorFilter,
};
use crate::types::{GraphObject, Metadata, MetadataValue};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;

/// HashMap-backed vector adapter with a linear cosine-similarity scan.
/// Adequate as a reference implementation; explicitly not a production
/// ANN index.
#[derive(Default)]
pub struct MemoryVectorAdapter {
    collections: RwLock<HashMap<String, HashMap<String, VectorDocument>>>,
}

impl MemoryVectorAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            dot / (norm_a * norm_b)
        }
    }
}

#[async_trait]
impl VectorAdapter for MemoryVectorAdapter {
    async fn collection_exists(&self, collection: &str) -> anyhow::Result<bool> {
        Ok(self.collections.read().contains_key(collection))
    }

    async fn get_metadata(&self, collection: &str, segment_id: &str) -> anyhow::Result<Option<Metadata>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(segment_id))
            .map(|doc| doc.metadata.clone()))
    }

    async fn get_documents(
        &self,
        collection: &str,
        ids: &[String],
        opts: &GetDocumentsOptions,
    ) -> anyhow::Result<Vec<VectorDocument>> {
        let collections = self.collections.read();
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| docs.get(id))
            .map(|d| strip_options(d.clone(), opts.include_metadata, opts.include_content))
            .collect())
    }

    async fn list_documents(
        &self,
        collection: &str,
        filter: &VectorFilter,
        opts: &ListOptions,
    ) -> anyhow::Result<Vec<VectorDocument>> {
        let collections = self.collections.read();
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<VectorDocument> = docs
            .values()
            .filter(|d| filter.matches(d))
            .map(|d| strip_options(d.clone(), opts.include_metadata, opts.include_content))
            .collect();
        if let Some(limit) = opts.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn search_similar(&self, opts: &SearchSimilarOptions) -> anyhow::Result<Vec<VectorDocument>> {
        let collections = self.collections.read();
        let Some(docs) = collections.get(&opts.collection) else {
            return Ok(Vec::new());
        };
        let mut scored: Vec<VectorDocument> = docs
            .values()
            .filter(|d| opts.filter.matches(d))
            .map(|d| {
                let score = d
                    .embedding
                    .as_deref()
                    .map(|e| Self::cosine_similarity(e, &opts.query_vector))
                    .unwrap_or(0.0);
                let mut doc = strip_options(d.clone(), opts.include_metadata, opts.include_content);
                doc.score = Some(score);
                doc
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(opts.k);
        Ok(scored)
    }

    async fn add_documents(
        &self,
        collection: &str,
        docs: Vec<VectorDocument>,
        upsert: bool,
        _batch_size: usize,
    ) -> anyhow::Result<usize> {
        let mut collections = self.collections.write();
        let entry = collections.entry(collection.to_string()).or_default();
        let mut added = 0;
        for doc in docs {
            if !upsert && entry.contains_key(&doc.id) {
                continue;
            }
            entry.insert(doc.id.clone(), doc);
            added += 1;
        }
        Ok(added)
    }

    async fn update_metadata(
        &self,
        collection: &str,
        updates: Vec<MetadataUpdate>,
        _mask: &[String],
    ) -> anyhow::Result<()> {
        let mut collections = self.collections.write();
        let Some(docs) = collections.get_mut(collection) else {
            anyhow::bail!("collection '{collection}' does not exist");
        };
        for update in updates {
            let Some(doc) = docs.get_mut(&update.segment_id) else {
                continue;
            };
            for (key, value) in update.metadata {
                match value {
                    MetadataValue::Null => {
                        doc.metadata.remove(&key);
                    }
                    other => {
                        doc.metadata.insert(key, other);
                    }
                }
            }
        }
        Ok(())
    }

    async fn delete_documents(&self, collection: &str, selector: DeleteSelector) -> anyhow::Result<usize> {
        let mut collections = self.collections.write();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        match selector {
            DeleteSelector::Ids(ids) => {
                let mut removed = 0;
                for id in ids {
                    if docs.remove(&id).is_some() {
                        removed += 1;
                    }
                }
                Ok(removed)
            }
            DeleteSelector::Filter(filter) => {
                let to_remove: Vec<String> = docs
                    .values()
                    .filter(|d| filter.matches(d))
                    .map(|d| d.id.clone())
                    .collect();
                let removed = to_remove.len();
                for id in to_remove {
                    docs.remove(&id);
                }
                Ok(removed)
            }
        }
    }
}

fn strip_options(mut doc: VectorDocument, include_metadata: bool, include_content: bool) -> VectorDocument {
    if !include_metadata {
        doc.metadata = Metadata::new();
    }
    if !include_content {
        doc.text = None;
    }
    doc
}

/// `petgraph`-backed graph adapter. Its `query` method only supports the
/// two `source_chunks` membership lookups the removal coordinator and
/// search pipeline issue; it is not a general Cypher engine.
#[derive(Default)]
pub struct MemoryGraphAdapter {
    graphs: RwLock<HashMap<String, GraphData>>,
}

#[derive(Default)]
struct GraphData {
    graph: DiGraph<GraphObject, GraphRelationship>,
    node_index: HashMap<String, NodeIndex>,
}

impl MemoryGraphAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphAdapter for MemoryGraphAdapter {
    async fn is_connected(&self) -> bool {
        true
    }

    async fn graph_exists(&self, graph: &str) -> anyhow::Result<bool> {
        Ok(self.graphs.read().contains_key(graph))
    }

    async fn list_graphs(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.graphs.read().keys().cloned().collect())
    }

    async fn get_stats(&self, graph: &str) -> anyhow::Result<GraphStats> {
        let graphs = self.graphs.read();
        Ok(graphs
            .get(graph)
            .map(|g| GraphStats {
                node_count: g.graph.node_count(),
                relationship_count: g.graph.edge_count(),
            })
            .unwrap_or_default())
    }

    async fn query(
        &self,
        graph: &str,
        _cypher: &str,
        params: &Metadata,
        return_type: GraphReturnType,
    ) -> anyhow::Result<GraphQueryResult> {
        let graphs = self.graphs.read();
        let Some(data) = graphs.get(graph) else {
            return Ok(match return_type {
                GraphReturnType::Nodes => GraphQueryResult::Nodes(Vec::new()),
                GraphReturnType::Relationships => GraphQueryResult::Relationships(Vec::new()),
                GraphReturnType::Records => GraphQueryResult::Records(Vec::new()),
            });
        };
        let sid = params.get("sid").and_then(|v| v.as_str()).unwrap_or_default();
        match return_type {
            GraphReturnType::Nodes => {
                let nodes = data
                    .graph
                    .node_weights()
                    .filter(|n| n.source_chunks.iter().any(|s| s == sid))
                    .cloned()
                    .collect();
                Ok(GraphQueryResult::Nodes(nodes))
            }
            GraphReturnType::Relationships => {
                let rels = data
                    .graph
                    .edge_weights()
                    .filter(|r| r.source_chunks.iter().any(|s| s == sid))
                    .cloned()
                    .collect();
                Ok(GraphQueryResult::Relationships(rels))
            }
            GraphReturnType::Records => Ok(GraphQueryResult::Records(Vec::new())),
        }
    }

    async fn add_nodes(&self, graph: &str, nodes: Vec<GraphObject>, upsert: bool) -> anyhow::Result<usize> {
        let mut graphs = self.graphs.write();
        let data = graphs.entry(graph.to_string()).or_default();
        let mut added = 0;
        for node in nodes {
            if let Some(&idx) = data.node_index.get(&node.id) {
                if upsert {
                    data.graph[idx] = node;
                    added += 1;
                }
                continue;
            }
            let id = node.id.clone();
            let idx = data.graph.add_node(node);
            data.node_index.insert(id, idx);
            added += 1;
        }
        Ok(added)
    }

    async fn add_relationships(
        &self,
        graph: &str,
        relationships: Vec<GraphRelationship>,
        upsert: bool,
    ) -> anyhow::Result<usize> {
        let mut graphs = self.graphs.write();
        let data = graphs.entry(graph.to_string()).or_default();
        let mut added = 0;
        for rel in relationships {
            let (Some(&from_idx), Some(&to_idx)) = (
                data.node_index.get(&rel.from),
                data.node_index.get(&rel.to),
            ) else {
                continue;
            };
            if !upsert && data.graph.edge_weights().any(|r| r.id == rel.id) {
                continue;
            }
            data.graph.add_edge(from_idx, to_idx, rel);
            added += 1;
        }
        Ok(added)
    }

    async fn delete_nodes(&self, graph: &str, ids: &[String], cascade_rels: bool) -> anyhow::Result<usize> {
        let mut graphs = self.graphs.write();
        let Some(data) = graphs.get_mut(graph) else {
            return Ok(0);
        };
        let mut removed = 0;
        for id in ids {
            let Some(idx) = data.node_index.remove(id) else {
                continue;
            };
            if cascade_rels {
                data.graph.remove_node(idx);
            } else {
                // Detach edges first so remove_node doesn't cascade them.
                let incident: Vec<_> = data
                    .graph
                    .edges_directed(idx, Direction::Outgoing)
                    .chain(data.graph.edges_directed(idx, Direction::Incoming))
                    .map(|e| e.id())
                    .collect();
                for e in incident {
                    data.graph.remove_edge(e);
                }
                data.graph.remove_node(idx);
            }
            removed += 1;
        }
        Ok(removed)
    }

    async fn delete_relationships(&self, graph: &str, ids: &[String]) -> anyhow::Result<usize> {
        let mut graphs = self.graphs.write();
        let Some(data) = graphs.get_mut(graph) else {
            return Ok(0);
        };
        let to_remove: Vec<_> = data
            .graph
            .edge_indices()
            .filter(|&e| ids.iter().any(|id| id == &data.graph[e].id))
            .collect();
        let removed = to_remove.len();
        for e in to_remove {
            data.graph.remove_edge(e);
        }
        Ok(removed)
    }
}

/// `DashMap`-backed KV adapter for lock-free concurrent counter access.
#[derive(Default)]
pub struct MemoryKvAdapter {
    scalars: DashMap<String, String>,
    lists: DashMap<String, Vec<String>>,
}

impl MemoryKvAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvAdapter for MemoryKvAdapter {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.scalars.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: &str, _ttl_secs: u64) -> anyhow::Result<()> {
        self.scalars.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, key: &str) -> anyhow::Result<()> {
        self.scalars.remove(key);
        self.lists.remove(key);
        Ok(())
    }

    async fn has(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.scalars.contains_key(key) || self.lists.contains_key(key))
    }

    async fn push(&self, key: &str, values: &[String]) -> anyhow::Result<()> {
        self.lists
            .entry(key.to_string())
            .or_default()
            .extend_from_slice(values);
        Ok(())
    }

    async fn pull(&self, key: &str, value: &str) -> anyhow::Result<()> {
        if let Some(mut list) = self.lists.get_mut(key) {
            if let Some(pos) = list.iter().position(|v| v == value) {
                list.remove(pos);
            }
        }
        Ok(())
    }

    async fn array_all(&self, key: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.lists.get(key).map(|v| v.clone()).unwrap_or_default())
    }

    async fn array_len(&self, key: &str) -> anyhow::Result<i64> {
        Ok(self.lists.get(key).map(|v| v.len() as i64).unwrap_or(0))
    }
}
