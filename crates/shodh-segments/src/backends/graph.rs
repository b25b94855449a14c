//! Graph adapter: Cypher-like query plus node/relationship CRUD. The
//! `source_chunks` property on every node and relationship is the
//! authoritative back-reference to the segments that produced it.

use crate::types::{GraphObject, Metadata};
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphReturnType {
    Nodes,
    Relationships,
    Records,
}

#[derive(Debug, Clone, Default)]
pub struct GraphStats {
    pub node_count: usize,
    pub relationship_count: usize,
}

/// A directed relationship between two graph nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRelationship {
    pub id: String,
    pub rel_type: String,
    pub from: String,
    pub to: String,
    pub properties: Metadata,
    pub source_chunks: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum GraphQueryResult {
    Nodes(Vec<GraphObject>),
    Relationships(Vec<GraphRelationship>),
    Records(Vec<Metadata>),
}

/// Abstracts over a property-graph database. The reference implementation
/// ([`crate::backends::memory::MemoryGraphAdapter`]) supports only the
/// `source_chunks` membership queries the removal coordinator and search
/// pipeline actually issue; a real adapter supports full Cypher.
#[async_trait]
pub trait GraphAdapter: Send + Sync {
    async fn is_connected(&self) -> bool;

    async fn graph_exists(&self, graph: &str) -> anyhow::Result<bool>;

    async fn list_graphs(&self) -> anyhow::Result<Vec<String>>;

    async fn get_stats(&self, graph: &str) -> anyhow::Result<GraphStats>;

    /// `cypher` and `params` are passed through for adapters backed by a
    /// real Cypher-speaking database; the in-memory reference adapter
    /// dispatches purely on `return_type` plus the `sid` parameter, since
    /// the core only ever issues the two `source_chunks` membership
    /// queries described in the spec.
    async fn query(
        &self,
        graph: &str,
        cypher: &str,
        params: &Metadata,
        return_type: GraphReturnType,
    ) -> anyhow::Result<GraphQueryResult>;

    async fn add_nodes(&self, graph: &str, nodes: Vec<GraphObject>, upsert: bool) -> anyhow::Result<usize>;

    async fn add_relationships(
        &self,
        graph: &str,
        relationships: Vec<GraphRelationship>,
        upsert: bool,
    ) -> anyhow::Result<usize>;

    async fn delete_nodes(&self, graph: &str, ids: &[String], cascade_rels: bool) -> anyhow::Result<usize>;

    async fn delete_relationships(&self, graph: &str, ids: &[String]) -> anyhow::Result<usize>;
}

/// `MATCH (n) WHERE $sid IN n.source_chunks RETURN n` — built for adapters
/// that want a literal query string to log or pass to a real database.
pub fn source_chunks_node_query() -> &'static str {
    "MATCH (n) WHERE $sid IN n.source_chunks RETURN n"
}

/// `MATCH ()-[r]->() WHERE $sid IN r.source_chunks RETURN r`
pub fn source_chunks_relationship_query() -> &'static str {
    "MATCH ()-[r]->() WHERE $sid IN r.source_chunks RETURN r"
}
