//! Vector adapter: similarity search plus per-document metadata CRUD.

use crate::types::Metadata;
use async_trait::async_trait;
use std::collections::HashMap;

/// A document as stored in / returned by the vector backend. `id` is the
/// segment id; `metadata` carries both caller-supplied keys and the
/// reserved aggregate-scalar keys (`weight`, `score`, `positive`,
/// `negative`, `hit`, `score_dimensions`, ...) described in the
/// persisted-formats section of the spec.
#[derive(Debug, Clone, Default)]
pub struct VectorDocument {
    pub id: String,
    pub doc_id: String,
    pub text: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub metadata: Metadata,
    /// Similarity score, populated by `search_similar` results only.
    pub score: Option<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct GetDocumentsOptions {
    pub include_metadata: bool,
    pub include_content: bool,
}

/// A predicate over stored documents. All present fields are ANDed.
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub doc_id: Option<String>,
    pub document_type: Option<String>,
    pub custom: HashMap<String, String>,
}

impl VectorFilter {
    pub fn matches(&self, doc: &VectorDocument) -> bool {
        if let Some(doc_id) = &self.doc_id {
            if &doc.doc_id != doc_id {
                return false;
            }
        }
        if let Some(document_type) = &self.document_type {
            let actual = doc.metadata.get("document_type").and_then(|v| v.as_str());
            if actual != Some(document_type.as_str()) {
                return false;
            }
        }
        for (k, v) in &self.custom {
            let actual = doc.metadata.get(k).and_then(|mv| mv.as_str());
            if actual != Some(v.as_str()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub include_metadata: bool,
    pub include_content: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct SearchSimilarOptions {
    pub collection: String,
    pub query_vector: Vec<f32>,
    pub k: usize,
    pub filter: VectorFilter,
    pub include_metadata: bool,
    pub include_content: bool,
}

/// One segment's worth of metadata-key assignments, grouped and merged by
/// [`crate::metadata_batch::update_segment_metadata_batch`]. A `Null` value
/// signals deletion of that key.
#[derive(Debug, Clone)]
pub struct MetadataUpdate {
    pub segment_id: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone)]
pub enum DeleteSelector {
    Ids(Vec<String>),
    Filter(VectorFilter),
}

/// Abstracts over a vector database: similarity search plus per-document
/// metadata and lifecycle CRUD. Implementations must treat `update_metadata`
/// as an all-or-nothing batch — the feedback engine and metadata batch
/// updater rely on not observing partial writes within one call.
#[async_trait]
pub trait VectorAdapter: Send + Sync {
    async fn collection_exists(&self, collection: &str) -> anyhow::Result<bool>;

    async fn get_metadata(&self, collection: &str, segment_id: &str) -> anyhow::Result<Option<Metadata>>;

    async fn get_documents(
        &self,
        collection: &str,
        ids: &[String],
        opts: &GetDocumentsOptions,
    ) -> anyhow::Result<Vec<VectorDocument>>;

    async fn list_documents(
        &self,
        collection: &str,
        filter: &VectorFilter,
        opts: &ListOptions,
    ) -> anyhow::Result<Vec<VectorDocument>>;

    async fn search_similar(&self, opts: &SearchSimilarOptions) -> anyhow::Result<Vec<VectorDocument>>;

    async fn add_documents(
        &self,
        collection: &str,
        docs: Vec<VectorDocument>,
        upsert: bool,
        batch_size: usize,
    ) -> anyhow::Result<usize>;

    /// Apply `updates` to `collection` in one batched, all-or-nothing call.
    /// `mask` lists the metadata keys the caller intends to touch across
    /// the whole batch (used by adapters that need an explicit field mask
    /// to avoid clobbering keys untouched by any individual update).
    async fn update_metadata(
        &self,
        collection: &str,
        updates: Vec<MetadataUpdate>,
        mask: &[String],
    ) -> anyhow::Result<()>;

    async fn delete_documents(&self, collection: &str, selector: DeleteSelector) -> anyhow::Result<usize>;
}
