//! Search pipeline (C6): embed → vector search → segment materialization →
//! graph enrichment → optional rerank.

use super::progress::{report, ProgressCallback, ProgressStatus};
use crate::backends::graph::{source_chunks_node_query, source_chunks_relationship_query};
use crate::backends::{Embedder, GraphAdapter, GraphQueryResult, GraphRelationship, GraphReturnType, Reranker, VectorAdapter};
use crate::backends::vector::{SearchSimilarOptions, VectorDocument, VectorFilter};
use crate::config::CoordinatorConfig;
use crate::error::{CoreError, CoreResult};
use crate::types::{extract_collection_id_from_doc_id, get_collection_ids, GraphObject, Metadata, MetadataValue, Segment};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// One turn of conversational history, used to resolve `query` when the
/// caller passes an empty string (spec §4.5 step 2).
#[derive(Debug, Clone)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

#[derive(Clone, Default)]
pub struct SearchOptions {
    pub collection_id: Option<String>,
    pub document_id: Option<String>,
    pub query: String,
    pub history: Vec<HistoryMessage>,
    pub k: Option<usize>,
    pub filter: VectorFilter,
    pub include_content: bool,
    /// Per-call reranker override. Falls back to the pipeline's configured
    /// reranker (if `features.enable_reranking`) when absent.
    pub reranker: Option<Arc<dyn Reranker>>,
}

pub struct SearchPipeline {
    vector: Arc<dyn VectorAdapter>,
    graph: Option<Arc<dyn GraphAdapter>>,
    embedder: Arc<dyn Embedder>,
    reranker: Option<Arc<dyn Reranker>>,
    config: CoordinatorConfig,
}

impl SearchPipeline {
    pub fn new(
        vector: Arc<dyn VectorAdapter>,
        graph: Option<Arc<dyn GraphAdapter>>,
        embedder: Arc<dyn Embedder>,
        reranker: Option<Arc<dyn Reranker>>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            vector,
            graph,
            embedder,
            reranker,
            config,
        }
    }

    /// `Search(ctx, query_options, progress?)` — spec §4.5.
    pub async fn search(&self, opts: &SearchOptions, progress: Option<ProgressCallback>) -> CoreResult<Vec<Segment>> {
        report(&progress, ProgressStatus::Pending, "validating request", 0.0);

        if opts.collection_id.is_none() && opts.document_id.is_none() {
            let err = CoreError::invalid_argument("either collection_id or document_id must be supplied");
            report(&progress, ProgressStatus::Error, err.to_string(), 100.0);
            return Err(err);
        }

        let query_text = match self.resolve_query_text(opts) {
            Some(text) => text,
            None => {
                let err = CoreError::invalid_argument("query must not be empty when history contains no user turn");
                report(&progress, ProgressStatus::Error, err.to_string(), 100.0);
                return Err(err);
            }
        };
        report(&progress, ProgressStatus::Pending, "query resolved", 10.0);

        let collection_id = match &opts.collection_id {
            Some(c) => c.clone(),
            None => extract_collection_id_from_doc_id(opts.document_id.as_deref().unwrap_or_default()),
        };
        let ids = get_collection_ids(&collection_id);

        let query_vector = match self.embedder.embed_query(&query_text).await {
            Ok(v) if !v.is_empty() => v,
            Ok(_) => {
                let err = CoreError::BackendFailure(anyhow::anyhow!("embedder returned an empty vector"));
                report(&progress, ProgressStatus::Error, err.to_string(), 100.0);
                return Err(err);
            }
            Err(e) => {
                let err = CoreError::BackendFailure(e);
                report(&progress, ProgressStatus::Error, err.to_string(), 100.0);
                return Err(err);
            }
        };
        report(&progress, ProgressStatus::Pending, "query embedded", 30.0);

        let mut filter = opts.filter.clone();
        if let Some(document_id) = &opts.document_id {
            filter.doc_id = Some(document_id.clone());
        }

        let search_opts = SearchSimilarOptions {
            collection: ids.vector.clone(),
            query_vector,
            k: opts.k.unwrap_or(self.config.search.default_k),
            filter,
            include_metadata: true,
            include_content: opts.include_content,
        };

        let docs = self
            .vector
            .search_similar(&search_opts)
            .await
            .map_err(|e| {
                let err = CoreError::BackendFailure(e);
                report(&progress, ProgressStatus::Error, err.to_string(), 100.0);
                err
            })?;

        let mut segments: Vec<Segment> = docs
            .into_iter()
            .map(|doc| materialize_segment(doc, &collection_id, opts.document_id.as_deref().unwrap_or_default()))
            .collect();
        report(&progress, ProgressStatus::Pending, "vector search complete", 60.0);

        if let Some(graph) = &self.graph {
            if self.config.features.enable_knowledge_graph && graph.is_connected().await {
                enrich_with_graph(graph.as_ref(), &ids.graph, &mut segments).await;
            }
        }
        report(&progress, ProgressStatus::Pending, "graph enrichment complete", 80.0);

        let reranker = opts
            .reranker
            .clone()
            .or_else(|| if self.config.features.enable_reranking { self.reranker.clone() } else { None });
        if let Some(reranker) = reranker {
            match reranker.rerank(&query_text, segments.clone()).await {
                Ok(reranked) => segments = reranked,
                Err(e) => tracing::warn!(error = %e, "rerank failed, keeping original order"),
            }
        }
        report(&progress, ProgressStatus::Pending, "rerank complete", 90.0);

        report(&progress, ProgressStatus::Success, "search complete", 100.0);
        Ok(segments)
    }

    /// `MultiSearch(ctx, [query_options], progress?)` — spec §4.5. Runs the
    /// constituent searches in parallel; returns the partial result map and
    /// the first error observed, matching the "best-effort batch" pattern
    /// used elsewhere in this core.
    pub async fn multi_search(
        &self,
        query_options: Vec<SearchOptions>,
        progress: Option<ProgressCallback>,
    ) -> (HashMap<String, Vec<Segment>>, Option<CoreError>) {
        let results: Arc<Mutex<HashMap<String, Vec<Segment>>>> = Arc::new(Mutex::new(HashMap::new()));
        let (error_tx, mut error_rx) = tokio::sync::mpsc::channel::<CoreError>(query_options.len().max(1));

        let tasks: Vec<_> = query_options
            .into_iter()
            .enumerate()
            .map(|(index, opts)| {
                let results = Arc::clone(&results);
                let error_tx = error_tx.clone();
                let key = generate_query_key(&opts.query, index);
                let pipeline_vector = Arc::clone(&self.vector);
                let pipeline_graph = self.graph.clone();
                let pipeline_embedder = Arc::clone(&self.embedder);
                let pipeline_reranker = self.reranker.clone();
                let pipeline_config = self.config.clone();
                tokio::spawn(async move {
                    let pipeline = SearchPipeline::new(
                        pipeline_vector,
                        pipeline_graph,
                        pipeline_embedder,
                        pipeline_reranker,
                        pipeline_config,
                    );
                    match pipeline.search(&opts, None).await {
                        Ok(segments) => {
                            results.lock().insert(key, segments);
                        }
                        Err(e) => {
                            let _ = error_tx.send(e).await;
                        }
                    }
                })
            })
            .collect();
        drop(error_tx);

        report(&progress, ProgressStatus::Pending, "dispatched sub-searches", 10.0);
        futures::future::join_all(tasks).await;
        report(&progress, ProgressStatus::Success, "multi-search complete", 100.0);

        let first_error = error_rx.recv().await;
        let map = Arc::try_unwrap(results).map(Mutex::into_inner).unwrap_or_else(|arc| arc.lock().clone());
        (map, first_error)
    }

    fn resolve_query_text(&self, opts: &SearchOptions) -> Option<String> {
        if !opts.query.is_empty() {
            return Some(opts.query.clone());
        }
        opts.history
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.clone())
    }
}

/// Truncated query text, or `query_{index}` when empty — spec §4.5.
fn generate_query_key(query: &str, index: usize) -> String {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        format!("query_{index}")
    } else {
        trimmed.chars().take(40).collect()
    }
}

/// Extract `weight`, `positive`, `negative`, `hit`, `score_dimensions`,
/// timestamps and `parents` from vector metadata into typed `Segment`
/// fields, removing them from the surviving metadata mapping. `score` is
/// the similarity score from the vector search, not a metadata key — any
/// persisted feedback `score` entry is left untouched in `metadata`.
pub(crate) fn materialize_segment(mut doc: VectorDocument, collection_id: &str, document_id: &str) -> Segment {
    let weight = doc.metadata.remove("weight").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let positive = doc.metadata.remove("positive").and_then(|v| v.as_i64()).unwrap_or(0);
    let negative = doc.metadata.remove("negative").and_then(|v| v.as_i64()).unwrap_or(0);
    let hit = doc.metadata.remove("hit").and_then(|v| v.as_i64()).unwrap_or(0);

    let score_dimensions = match doc.metadata.remove("score_dimensions") {
        Some(MetadataValue::Map(m)) => {
            let dims: HashMap<String, f64> = m.iter().filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f))).collect();
            if dims.is_empty() {
                None
            } else {
                Some(dims)
            }
        }
        _ => None,
    };

    let created_at = parse_timestamp(doc.metadata.remove("created_at"));
    let updated_at = parse_timestamp(doc.metadata.remove("updated_at"));
    let parents = doc.metadata.remove("parents").map(|v| v.safe_string_list()).unwrap_or_default();

    Segment {
        id: doc.id,
        collection_id: collection_id.to_string(),
        document_id: document_id.to_string(),
        text: doc.text.unwrap_or_default(),
        metadata: doc.metadata,
        parents,
        weight,
        score: doc.score.map(|s| s as f64).unwrap_or(0.0),
        positive,
        negative,
        hit,
        score_dimensions,
        created_at,
        updated_at,
        version: 1,
        nodes: Vec::new(),
        relationships: Vec::new(),
    }
}

fn parse_timestamp(value: Option<MetadataValue>) -> DateTime<Utc> {
    value
        .and_then(|v| v.as_str().map(str::to_string))
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

/// Collect segment IDs, issue the two `source_chunks` membership queries
/// per segment, and attach matching graph objects to every segment whose ID
/// appears in the returned object's `source_chunks`.
async fn enrich_with_graph(graph: &dyn GraphAdapter, graph_name: &str, segments: &mut [Segment]) {
    for segment in segments.iter_mut() {
        let mut params = Metadata::new();
        params.insert("sid".to_string(), MetadataValue::Str(segment.id.clone()));

        match graph.query(graph_name, source_chunks_node_query(), &params, GraphReturnType::Nodes).await {
            Ok(GraphQueryResult::Nodes(nodes)) => segment.nodes = nodes,
            Ok(_) => {}
            Err(e) => tracing::warn!(segment_id = %segment.id, error = %e, "graph node enrichment failed"),
        }

        match graph
            .query(graph_name, source_chunks_relationship_query(), &params, GraphReturnType::Relationships)
            .await
        {
            Ok(GraphQueryResult::Relationships(rels)) => {
                segment.relationships = rels.into_iter().map(relationship_to_graph_object).collect();
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(segment_id = %segment.id, error = %e, "graph relationship enrichment failed"),
        }
    }
}

fn relationship_to_graph_object(rel: GraphRelationship) -> GraphObject {
    let mut properties = rel.properties;
    properties.insert("from".to_string(), MetadataValue::Str(rel.from));
    properties.insert("to".to_string(), MetadataValue::Str(rel.to));
    GraphObject {
        id: rel.id,
        labels: vec![rel.rel_type],
        properties,
        source_chunks: rel.source_chunks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::{MemoryGraphAdapter, MemoryVectorAdapter};
    use crate::types::GraphObject;
    use async_trait::async_trait;

    struct StaticEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for StaticEmbedder {
        async fn embed_query(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    struct EmptyEmbedder;

    #[async_trait]
    impl Embedder for EmptyEmbedder {
        async fn embed_query(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(Vec::new())
        }
    }

    async fn seeded_vector() -> Arc<MemoryVectorAdapter> {
        let vector = Arc::new(MemoryVectorAdapter::new());
        let mut doc = VectorDocument::default();
        doc.id = "s1".into();
        doc.doc_id = "d1".into();
        doc.text = Some("hello world".into());
        doc.embedding = Some(vec![1.0, 0.0]);
        doc.metadata.insert("weight".into(), MetadataValue::Float(2.0));
        doc.metadata.insert("parents".into(), MetadataValue::List(vec![MetadataValue::Str("p1".into())]));
        vector.add_documents("default", vec![doc], true, 10).await.unwrap();
        vector
    }

    #[tokio::test]
    async fn search_materializes_segments_and_strips_reserved_keys() {
        let vector = seeded_vector().await;
        let pipeline = SearchPipeline::new(
            vector,
            None,
            Arc::new(StaticEmbedder(vec![1.0, 0.0])),
            None,
            CoordinatorConfig::default(),
        );
        let opts = SearchOptions {
            document_id: Some("d1".into()),
            query: "hello".into(),
            ..Default::default()
        };
        let segments = pipeline.search(&opts, None).await.unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].weight, 2.0);
        assert_eq!(segments[0].parents, vec!["p1".to_string()]);
        assert!(!segments[0].metadata.contains_key("weight"));
    }

    #[tokio::test]
    async fn empty_embedding_is_fatal() {
        let vector = seeded_vector().await;
        let pipeline = SearchPipeline::new(vector, None, Arc::new(EmptyEmbedder), None, CoordinatorConfig::default());
        let opts = SearchOptions {
            document_id: Some("d1".into()),
            query: "hello".into(),
            ..Default::default()
        };
        let err = pipeline.search(&opts, None).await.unwrap_err();
        assert!(err.is_backend_failure());
    }

    #[tokio::test]
    async fn disconnected_graph_matches_connected_but_empty_graph() {
        let opts = SearchOptions {
            document_id: Some("d1".into()),
            query: "hello".into(),
            ..Default::default()
        };

        let without_graph = SearchPipeline::new(
            seeded_vector().await,
            None,
            Arc::new(StaticEmbedder(vec![1.0, 0.0])),
            None,
            CoordinatorConfig::default(),
        );
        let without_graph_results = without_graph.search(&opts, None).await.unwrap();

        let with_empty_graph = SearchPipeline::new(
            seeded_vector().await,
            Some(Arc::new(MemoryGraphAdapter::new())),
            Arc::new(StaticEmbedder(vec![1.0, 0.0])),
            None,
            CoordinatorConfig::default(),
        );
        let with_empty_graph_results = with_empty_graph.search(&opts, None).await.unwrap();

        let ids_a: Vec<_> = without_graph_results.iter().map(|s| s.id.clone()).collect();
        let ids_b: Vec<_> = with_empty_graph_results.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
        assert_eq!(without_graph_results[0].score, with_empty_graph_results[0].score);
    }

    #[tokio::test]
    async fn query_resolved_from_history_when_empty() {
        let vector = seeded_vector().await;
        let pipeline = SearchPipeline::new(
            vector,
            None,
            Arc::new(StaticEmbedder(vec![1.0, 0.0])),
            None,
            CoordinatorConfig::default(),
        );
        let opts = SearchOptions {
            document_id: Some("d1".into()),
            history: vec![
                HistoryMessage { role: "assistant".into(), content: "ignored".into() },
                HistoryMessage { role: "user".into(), content: "hello".into() },
            ],
            ..Default::default()
        };
        let segments = pipeline.search(&opts, None).await.unwrap();
        assert_eq!(segments.len(), 1);
    }

    #[tokio::test]
    async fn graph_enrichment_attaches_matching_nodes() {
        let vector = seeded_vector().await;
        let graph = Arc::new(MemoryGraphAdapter::new());
        let node = GraphObject {
            id: "n1".into(),
            labels: vec!["Entity".into()],
            properties: Metadata::new(),
            source_chunks: vec!["s1".into()],
        };
        graph.add_nodes("default_graph", vec![node], true).await.unwrap();

        let pipeline = SearchPipeline::new(
            vector,
            Some(graph as Arc<dyn GraphAdapter>),
            Arc::new(StaticEmbedder(vec![1.0, 0.0])),
            None,
            CoordinatorConfig::default(),
        );
        let opts = SearchOptions {
            document_id: Some("d1".into()),
            query: "hello".into(),
            ..Default::default()
        };
        let segments = pipeline.search(&opts, None).await.unwrap();
        assert_eq!(segments[0].nodes.len(), 1);
        assert_eq!(segments[0].nodes[0].id, "n1");
    }

    #[tokio::test]
    async fn multi_search_collects_keyed_results() {
        let vector = seeded_vector().await;
        let pipeline = SearchPipeline::new(
            vector,
            None,
            Arc::new(StaticEmbedder(vec![1.0, 0.0])),
            None,
            CoordinatorConfig::default(),
        );
        let queries = vec![
            SearchOptions {
                document_id: Some("d1".into()),
                query: "hello".into(),
                ..Default::default()
            },
            SearchOptions {
                document_id: Some("d1".into()),
                query: "".into(),
                ..Default::default()
            },
        ];
        let (map, err) = pipeline.multi_search(queries, None).await;
        assert!(err.is_some(), "the second query has no history so it should error");
        assert!(map.contains_key("hello"));
    }
}
