//! External collaborators consumed by the search pipeline: the embedding
//! service, the reranker, and the entity/relationship extractor. None of
//! these are implemented by this crate beyond test doubles — they are
//! explicitly out of scope per the spec's "external collaborators" list.

use crate::types::{GraphObject, Segment};
use async_trait::async_trait;

/// A function from query text to a dense vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// Reorders search results. A rerank failure is non-fatal to the pipeline
/// (original order is kept); callers invoke this directly and handle the
/// error themselves.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, segments: Vec<Segment>) -> anyhow::Result<Vec<Segment>>;
}

/// One text's worth of extracted entities and relationships.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub nodes: Vec<GraphObject>,
    pub relationships: Vec<GraphObject>,
    pub model: String,
}

/// Entity/relationship extractor invoked at ingest time (outside the
/// search/feedback/removal core, included for interface completeness).
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract_documents(&self, texts: &[String]) -> anyhow::Result<Vec<ExtractionResult>>;
}
