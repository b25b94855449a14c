//! End-to-end exercises of the coordination layer against the in-memory
//! reference adapters: feedback, search and removal wired together through
//! a single `Coordinator`, the way a caller with no external backends would
//! actually use the crate.

use async_trait::async_trait;
use shodh_segments::backends::memory::{MemoryGraphAdapter, MemoryKvAdapter, MemoryVectorAdapter};
use shodh_segments::backends::vector::VectorDocument;
use shodh_segments::backends::{Embedder, GraphAdapter, KvAdapter, VectorAdapter};
use shodh_segments::config::CoordinatorConfig;
use shodh_segments::feedback::{HitInput, ScoreInput, VoteInput, VoteRemoval, WeightInput};
use shodh_segments::search::SearchOptions;
use shodh_segments::types::{GraphObject, Metadata, MetadataValue, VotePolarity};
use shodh_segments::{Coordinator, CoordinatorBuilder};
use std::collections::HashMap;
use std::sync::Arc;

struct StaticEmbedder(Vec<f32>);

#[async_trait]
impl Embedder for StaticEmbedder {
    async fn embed_query(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

fn segment(id: &str, doc_id: &str, embedding: Vec<f32>) -> VectorDocument {
    let mut doc = VectorDocument::default();
    doc.id = id.into();
    doc.doc_id = doc_id.into();
    doc.text = Some(format!("text for {id}"));
    doc.embedding = Some(embedding);
    doc
}

async fn seeded_coordinator() -> (Coordinator, Arc<MemoryVectorAdapter>, Arc<MemoryKvAdapter>) {
    let vector = Arc::new(MemoryVectorAdapter::new());
    let kv = Arc::new(MemoryKvAdapter::new());
    vector
        .add_documents(
            "default",
            vec![segment("s1", "d1", vec![1.0, 0.0]), segment("s2", "d1", vec![0.0, 1.0])],
            true,
            10,
        )
        .await
        .unwrap();

    let coordinator = Coordinator::new(
        CoordinatorConfig::default(),
        Arc::clone(&vector) as _,
        None,
        Some(Arc::clone(&kv) as _),
        Arc::new(StaticEmbedder(vec![1.0, 0.0])),
        None,
    )
    .unwrap();

    (coordinator, vector, kv)
}

#[tokio::test]
async fn search_returns_the_nearest_segment_by_embedding() {
    let (coordinator, _vector, _kv) = seeded_coordinator().await;

    let opts = SearchOptions {
        document_id: Some("d1".into()),
        query: "anything".into(),
        k: Some(5),
        include_content: true,
        ..Default::default()
    };
    let results = coordinator.search(&opts, None).await.unwrap();

    assert_eq!(results[0].id, "s1");
    assert!(results[0].score >= results[1].score);
}

#[tokio::test]
async fn votes_accumulate_then_removal_clears_both_stores() {
    let (coordinator, _vector, kv) = seeded_coordinator().await;

    coordinator
        .update_votes("d1", vec![VoteInput::new("s1", VotePolarity::Positive)], None)
        .await
        .unwrap();
    coordinator
        .update_votes("d1", vec![VoteInput::new("s1", VotePolarity::Negative)], None)
        .await
        .unwrap();

    let segment = coordinator.get_segment("d1", "s1").await.unwrap();
    assert_eq!(segment.positive, 1);
    assert_eq!(segment.negative, 1);

    let page = coordinator
        .scroll_votes("d1", "s1", Default::default())
        .await
        .unwrap();
    assert_eq!(page.total, 2);

    let removed = coordinator.remove_votes_by_segment_id("d1", "s1").await.unwrap();
    assert_eq!(removed, 2);

    let segment = coordinator.get_segment("d1", "s1").await.unwrap();
    assert_eq!(segment.positive, 0);
    assert_eq!(segment.negative, 0);
    assert!(!kv.has(&shodh_segments::keys::votes_key("d1", "s1")).await.unwrap());
}

#[tokio::test]
async fn removing_one_vote_leaves_the_other_intact() {
    let (coordinator, _vector, _kv) = seeded_coordinator().await;

    coordinator
        .update_votes(
            "d1",
            vec![
                VoteInput::new("s1", VotePolarity::Positive),
                VoteInput::new("s1", VotePolarity::Positive),
            ],
            None,
        )
        .await
        .unwrap();

    let page = coordinator.scroll_votes("d1", "s1", Default::default()).await.unwrap();
    assert_eq!(page.items.len(), 2);
    let first_vote_id = page.items[0].vote_id.clone();

    coordinator
        .remove_votes(
            "d1",
            vec![VoteRemoval {
                segment_id: "s1".into(),
                vote_id: first_vote_id,
            }],
        )
        .await
        .unwrap();

    let segment = coordinator.get_segment("d1", "s1").await.unwrap();
    assert_eq!(segment.positive, 1);
}

#[tokio::test]
async fn hits_and_scores_and_weights_round_trip_through_get_segment() {
    let (coordinator, _vector, _kv) = seeded_coordinator().await;

    coordinator.update_hits("d1", vec![HitInput::new("s1")], None).await.unwrap();
    coordinator
        .update_scores("d1", vec![ScoreInput::new("s1", 0.75)], None)
        .await
        .unwrap();
    coordinator
        .update_weights("d1", vec![WeightInput::new("s1", 2.5)], None)
        .await
        .unwrap();

    let segment = coordinator.get_segment("d1", "s1").await.unwrap();
    assert_eq!(segment.hit, 1);
    assert_eq!(segment.score, 0.75);
    assert_eq!(segment.weight, 2.5);
}

#[tokio::test]
async fn removing_a_segment_drops_its_source_chunk_from_the_graph() {
    let vector = Arc::new(MemoryVectorAdapter::new());
    vector
        .add_documents("default", vec![segment("s1", "d1", vec![1.0, 0.0])], true, 10)
        .await
        .unwrap();
    let graph = Arc::new(MemoryGraphAdapter::new());

    let mut props: Metadata = HashMap::new();
    props.insert("name".into(), MetadataValue::Str("node-a".into()));
    graph
        .add_nodes(
            "default_graph",
            vec![GraphObject {
                id: "n1".into(),
                labels: vec!["Entity".into()],
                properties: props,
                source_chunks: vec!["s1".into()],
            }],
            true,
        )
        .await
        .unwrap();

    let coordinator = Coordinator::new(
        CoordinatorConfig::default(),
        vector,
        Some(Arc::clone(&graph) as _),
        None,
        Arc::new(StaticEmbedder(vec![1.0, 0.0])),
        None,
    )
    .unwrap();

    coordinator.remove_segments("d1", &["s1".to_string()]).await.unwrap();

    let stats = graph.get_stats("default_graph").await.unwrap();
    assert_eq!(stats.node_count, 0);
}

#[tokio::test]
async fn builder_defaults_to_in_memory_vector_adapter() {
    let coordinator = CoordinatorBuilder::default()
        .embedder(Arc::new(StaticEmbedder(vec![1.0, 0.0])))
        .build()
        .unwrap();

    let err = coordinator.get_segment("d1", "missing").await.unwrap_err();
    assert!(err.is_not_found());
}
