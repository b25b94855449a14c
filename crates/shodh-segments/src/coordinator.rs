//! Coordinator facade (C10): the single entry point wiring the feedback
//! engine, search pipeline and removal coordinator over a shared set of
//! backend adapters, the same "one engine struct, many thin delegating
//! methods" shape as the teacher's `RAGEngine`.

use crate::backends::{Embedder, GraphAdapter, KvAdapter, Reranker, VectorAdapter};
use crate::config::CoordinatorConfig;
use crate::error::{CoreError, CoreResult};
use crate::feedback::{
    FeedbackEngine, HitInput, HitRemoval, ScoreInput, ScrollOptions, ScrollResult, UpdateHitsOptions, UpdateScoresOptions,
    UpdateVotesOptions, UpdateWeightsOptions, VoteInput, VoteRemoval, WeightInput,
};
use crate::removal::SegmentRemovalCoordinator;
use crate::search::{ProgressCallback, SearchOptions, SearchPipeline};
use crate::types::{get_collection_ids, extract_collection_id_from_doc_id, Segment, SegmentHit, SegmentVote};
use std::collections::HashMap;
use std::sync::Arc;

/// Owns the validated configuration and every backend/collaborator handle;
/// constructs the `FeedbackEngine`, `SearchPipeline` and
/// `SegmentRemovalCoordinator` once and delegates every public operation to
/// one of the three.
pub struct Coordinator {
    vector: Arc<dyn VectorAdapter>,
    graph: Option<Arc<dyn GraphAdapter>>,
    kv: Option<Arc<dyn KvAdapter>>,
    config: CoordinatorConfig,
    feedback: FeedbackEngine,
    search: SearchPipeline,
    removal: SegmentRemovalCoordinator,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        vector: Arc<dyn VectorAdapter>,
        graph: Option<Arc<dyn GraphAdapter>>,
        kv: Option<Arc<dyn KvAdapter>>,
        embedder: Arc<dyn Embedder>,
        reranker: Option<Arc<dyn Reranker>>,
    ) -> CoreResult<Self> {
        config.validate().map_err(CoreError::invalid_argument)?;

        let feedback = FeedbackEngine::new(Arc::clone(&vector), kv.clone(), config.clone());
        let search = SearchPipeline::new(Arc::clone(&vector), graph.clone(), embedder, reranker, config.clone());
        let removal = SegmentRemovalCoordinator::new(Arc::clone(&vector), graph.clone(), kv.clone());

        Ok(Self {
            vector,
            graph,
            kv,
            config,
            feedback,
            search,
            removal,
        })
    }

    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::default()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    // -- Feedback: votes --------------------------------------------------

    pub async fn update_votes(&self, doc_id: &str, inputs: Vec<VoteInput>, options: Option<UpdateVotesOptions>) -> CoreResult<usize> {
        self.feedback.update_votes(doc_id, inputs, options).await
    }

    pub async fn remove_votes(&self, doc_id: &str, removals: Vec<VoteRemoval>) -> CoreResult<usize> {
        self.feedback.remove_votes(doc_id, removals).await
    }

    pub async fn remove_votes_by_segment_id(&self, doc_id: &str, segment_id: &str) -> CoreResult<usize> {
        self.feedback.remove_votes_by_segment_id(doc_id, segment_id).await
    }

    pub async fn scroll_votes(&self, doc_id: &str, segment_id: &str, opts: ScrollOptions) -> CoreResult<ScrollResult<SegmentVote>> {
        self.feedback.scroll_votes(doc_id, segment_id, opts).await
    }

    // -- Feedback: hits -----------------------------------------------------

    pub async fn update_hits(&self, doc_id: &str, inputs: Vec<HitInput>, options: Option<UpdateHitsOptions>) -> CoreResult<usize> {
        self.feedback.update_hits(doc_id, inputs, options).await
    }

    pub async fn remove_hits(&self, doc_id: &str, removals: Vec<HitRemoval>) -> CoreResult<usize> {
        self.feedback.remove_hits(doc_id, removals).await
    }

    pub async fn remove_hits_by_segment_id(&self, doc_id: &str, segment_id: &str) -> CoreResult<usize> {
        self.feedback.remove_hits_by_segment_id(doc_id, segment_id).await
    }

    pub async fn scroll_hits(&self, doc_id: &str, segment_id: &str, opts: ScrollOptions) -> CoreResult<ScrollResult<SegmentHit>> {
        self.feedback.scroll_hits(doc_id, segment_id, opts).await
    }

    pub async fn get_hit(&self, doc_id: &str, segment_id: &str, hit_id: &str) -> CoreResult<SegmentHit> {
        self.feedback.get_hit(doc_id, segment_id, hit_id).await
    }

    // -- Feedback: scores and weights ---------------------------------------

    pub async fn update_scores(&self, doc_id: &str, inputs: Vec<ScoreInput>, options: Option<UpdateScoresOptions>) -> CoreResult<usize> {
        self.feedback.update_scores(doc_id, inputs, options).await
    }

    pub async fn update_weights(&self, doc_id: &str, inputs: Vec<WeightInput>, options: Option<UpdateWeightsOptions>) -> CoreResult<usize> {
        self.feedback.update_weights(doc_id, inputs, options).await
    }

    // -- Search ---------------------------------------------------------------

    pub async fn search(&self, opts: &SearchOptions, progress: Option<ProgressCallback>) -> CoreResult<Vec<Segment>> {
        self.search.search(opts, progress).await
    }

    pub async fn multi_search(
        &self,
        query_options: Vec<SearchOptions>,
        progress: Option<ProgressCallback>,
    ) -> (HashMap<String, Vec<Segment>>, Option<CoreError>) {
        self.search.multi_search(query_options, progress).await
    }

    // -- Segment lifecycle ----------------------------------------------------

    /// `GetSegment(ctx, docID, segmentID)` — point lookup via the vector
    /// adapter's `get_documents`, re-using the search pipeline's
    /// materialization so the returned `Segment` is shaped identically to
    /// one returned from `search`.
    pub async fn get_segment(&self, doc_id: &str, segment_id: &str) -> CoreResult<Segment> {
        let segments = self.get_segments(doc_id, &[segment_id.to_string()]).await?;
        segments
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::not_found("segment", segment_id))
    }

    pub async fn get_segments(&self, doc_id: &str, segment_ids: &[String]) -> CoreResult<Vec<Segment>> {
        if segment_ids.is_empty() {
            return Ok(Vec::new());
        }
        let collection_id = extract_collection_id_from_doc_id(doc_id);
        let ids = get_collection_ids(&collection_id);
        let opts = crate::backends::vector::GetDocumentsOptions {
            include_metadata: true,
            include_content: true,
        };
        let docs = self
            .vector
            .get_documents(&ids.vector, segment_ids, &opts)
            .await
            .map_err(CoreError::BackendFailure)?;
        Ok(docs
            .into_iter()
            .map(|doc| crate::search::materialize_segment(doc, &collection_id, doc_id))
            .collect())
    }

    /// `GetSegmentParents(ctx, docID, segmentID)` — tree walk via
    /// `parents[0]` until a segment has no parent, per §6.
    pub async fn get_segment_parents(&self, doc_id: &str, segment_id: &str) -> CoreResult<Vec<Segment>> {
        let mut chain = Vec::new();
        let mut current_id = segment_id.to_string();
        let mut guard = 0usize;
        loop {
            guard += 1;
            if guard > 64 {
                tracing::warn!(doc_id, segment_id, "parent chain exceeded depth guard, truncating");
                break;
            }
            let segment = self.get_segment(doc_id, &current_id).await?;
            let next_parent = segment.parents.first().cloned().or_else(|| {
                segment
                    .metadata
                    .get("chunk_details")
                    .and_then(|v| v.as_map())
                    .and_then(|m| m.get("parent_id"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            });
            chain.push(segment);
            match next_parent {
                Some(parent_id) if parent_id != current_id => current_id = parent_id,
                _ => break,
            }
        }
        Ok(chain)
    }

    pub async fn remove_segments(&self, doc_id: &str, segment_ids: &[String]) -> CoreResult<usize> {
        self.removal.remove_segments(doc_id, segment_ids).await
    }

    pub async fn remove_segments_by_doc_id(&self, doc_id: &str) -> CoreResult<usize> {
        self.removal.remove_segments_by_doc_id(doc_id).await
    }
}

/// Fluent construction mirroring the teacher's config-then-build ergonomics;
/// defaults to the in-memory reference adapters when a backend is omitted,
/// requiring only an embedder to be set before `build()`.
#[derive(Default)]
pub struct CoordinatorBuilder {
    config: Option<CoordinatorConfig>,
    vector: Option<Arc<dyn VectorAdapter>>,
    graph: Option<Arc<dyn GraphAdapter>>,
    kv: Option<Arc<dyn KvAdapter>>,
    embedder: Option<Arc<dyn Embedder>>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl CoordinatorBuilder {
    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn vector(mut self, vector: Arc<dyn VectorAdapter>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn graph(mut self, graph: Arc<dyn GraphAdapter>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn kv(mut self, kv: Arc<dyn KvAdapter>) -> Self {
        self.kv = Some(kv);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn build(self) -> CoreResult<Coordinator> {
        let embedder = self.embedder.ok_or_else(|| CoreError::invalid_argument("embedder is required"))?;
        let vector = self
            .vector
            .unwrap_or_else(|| Arc::new(crate::backends::memory::MemoryVectorAdapter::new()));
        Coordinator::new(
            self.config.unwrap_or_default(),
            vector,
            self.graph,
            self.kv,
            embedder,
            self.reranker,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryVectorAdapter;
    use crate::backends::vector::VectorDocument;
    use crate::types::MetadataValue;
    use async_trait::async_trait;

    struct StaticEmbedder;

    #[async_trait]
    impl Embedder for StaticEmbedder {
        async fn embed_query(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
    }

    async fn coordinator() -> Coordinator {
        let vector = Arc::new(MemoryVectorAdapter::new());
        let mut doc = VectorDocument::default();
        doc.id = "s1".into();
        doc.doc_id = "d1".into();
        vector.add_documents("default", vec![doc], true, 10).await.unwrap();
        Coordinator::new(
            CoordinatorConfig::default(),
            vector,
            None,
            None,
            Arc::new(StaticEmbedder),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn update_weights_then_get_segment_reflects_it() {
        let coordinator = coordinator().await;
        coordinator
            .update_weights("d1", vec![WeightInput::new("s1", 4.0)], None)
            .await
            .unwrap();
        let segment = coordinator.get_segment("d1", "s1").await.unwrap();
        assert_eq!(segment.weight, 4.0);
    }

    #[tokio::test]
    async fn get_segment_parents_walks_chain() {
        let coordinator = coordinator().await;
        let vector = Arc::new(MemoryVectorAdapter::new());
        let mut child = VectorDocument::default();
        child.id = "child".into();
        child.doc_id = "d1".into();
        child
            .metadata
            .insert("parents".into(), MetadataValue::List(vec![MetadataValue::Str("parent".into())]));
        let mut parent = VectorDocument::default();
        parent.id = "parent".into();
        parent.doc_id = "d1".into();
        vector.add_documents("default", vec![child, parent], true, 10).await.unwrap();

        let chained = Coordinator::new(CoordinatorConfig::default(), vector, None, None, Arc::new(StaticEmbedder), None).unwrap();
        let chain = chained.get_segment_parents("d1", "child").await.unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].id, "child");
        assert_eq!(chain[1].id, "parent");
        let _ = &coordinator;
    }

    #[tokio::test]
    async fn get_segment_not_found_for_unknown_id() {
        let coordinator = coordinator().await;
        let err = coordinator.get_segment("d1", "missing").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
