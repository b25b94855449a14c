use super::{dual_write, FeedbackEngine, ScalarComputeHook};
use crate::error::{join_errors, CoreError, CoreResult};
use crate::keys::{score_dimensions_key, score_key};
use crate::metadata_batch::{update_segment_metadata_batch, MetadataAssignment};
use crate::types::MetadataValue;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ScoreInput {
    pub segment_id: String,
    pub score: f64,
    pub dimensions: Option<HashMap<String, f64>>,
}

impl ScoreInput {
    pub fn new(segment_id: impl Into<String>, score: f64) -> Self {
        Self {
            segment_id: segment_id.into(),
            score,
            dimensions: None,
        }
    }
}

#[derive(Default, Clone)]
pub struct UpdateScoresOptions {
    pub compute: Option<Arc<dyn ScalarComputeHook>>,
}

impl FeedbackEngine {
    /// `UpdateScores(ctx, docID, records, options?)` — spec §4.3.3. Scalar
    /// overwrite (no list); when `compute` is present it replaces every
    /// input's scalar, with per-input failures joined into one error
    /// before any write occurs so a partial compute never produces a
    /// partial persist.
    pub async fn update_scores(
        &self,
        doc_id: &str,
        mut inputs: Vec<ScoreInput>,
        options: Option<UpdateScoresOptions>,
    ) -> CoreResult<usize> {
        if inputs.is_empty() {
            return Ok(0);
        }
        if doc_id.is_empty() {
            return Err(CoreError::invalid_argument("doc_id must not be empty"));
        }

        let compute = options
            .and_then(|o| o.compute)
            .filter(|_| self.config.features.enable_compute_hooks);
        if let Some(hook) = compute {
            let segment_ids: Vec<String> = inputs.iter().map(|i| i.segment_id.clone()).collect();
            match hook.compute(doc_id, &segment_ids).await {
                Ok(values) if values.len() == inputs.len() => {
                    for (input, value) in inputs.iter_mut().zip(values) {
                        input.score = value;
                    }
                }
                Ok(values) => {
                    return Err(CoreError::invalid_argument(format!(
                        "compute hook returned {} scores for {} inputs",
                        values.len(),
                        inputs.len()
                    )));
                }
                Err(e) => return Err(CoreError::BackendFailure(join_errors(vec![e]))),
            }
        }

        let metadata_assignments = |inputs: &[ScoreInput]| -> Vec<MetadataAssignment> {
            inputs
                .iter()
                .flat_map(|i| {
                    let mut a = vec![MetadataAssignment {
                        segment_id: i.segment_id.clone(),
                        metadata_key: "score".to_string(),
                        value: Some(MetadataValue::Float(i.score)),
                    }];
                    if let Some(dims) = &i.dimensions {
                        let dims_value: HashMap<String, MetadataValue> =
                            dims.iter().map(|(k, v)| (k.clone(), MetadataValue::Float(*v))).collect();
                        a.push(MetadataAssignment {
                            segment_id: i.segment_id.clone(),
                            metadata_key: "score_dimensions".to_string(),
                            value: Some(MetadataValue::Map(dims_value)),
                        });
                    }
                    a
                })
                .collect()
        };

        match &self.kv {
            None => {
                update_segment_metadata_batch(self.vector.as_ref(), doc_id, metadata_assignments(&inputs)).await?;
            }
            Some(kv) => {
                let kv = Arc::clone(kv);
                let inputs_for_kv = inputs.clone();
                let doc_id_owned = doc_id.to_string();
                let kv_branch = async move {
                    for input in &inputs_for_kv {
                        kv.set(&score_key(&doc_id_owned, &input.segment_id), &input.score.to_string(), 0)
                            .await?;
                        if let Some(dims) = &input.dimensions {
                            let serialized = serde_json::to_string(dims)?;
                            kv.set(&score_dimensions_key(&doc_id_owned, &input.segment_id), &serialized, 0)
                                .await?;
                        }
                    }
                    Ok(())
                };

                let vector = Arc::clone(&self.vector);
                let assignments = metadata_assignments(&inputs);
                let doc_id_owned = doc_id.to_string();
                let vector_branch = async move {
                    update_segment_metadata_batch(vector.as_ref(), &doc_id_owned, assignments)
                        .await
                        .map_err(anyhow::Error::from)
                };

                dual_write(doc_id, "update_scores", kv_branch, vector_branch).await?;
            }
        }

        Ok(inputs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::{MemoryKvAdapter, MemoryVectorAdapter};
    use crate::backends::vector::VectorDocument;
    use crate::config::CoordinatorConfig;
    use async_trait::async_trait;

    fn engine_with_kv() -> FeedbackEngine {
        FeedbackEngine::new(
            Arc::new(MemoryVectorAdapter::new()),
            Some(Arc::new(MemoryKvAdapter::new())),
            CoordinatorConfig::default(),
        )
    }

    async fn seed_segment(engine: &FeedbackEngine, segment_id: &str) {
        let mut doc = VectorDocument::default();
        doc.id = segment_id.to_string();
        engine.vector.add_documents("default", vec![doc], true, 10).await.unwrap();
    }

    struct FailingCompute;

    #[async_trait]
    impl ScalarComputeHook for FailingCompute {
        async fn compute(&self, _doc_id: &str, _segment_ids: &[String]) -> anyhow::Result<Vec<f64>> {
            Err(anyhow::anyhow!("compute failed"))
        }
    }

    #[tokio::test]
    async fn update_scores_overwrites() {
        let engine = engine_with_kv();
        seed_segment(&engine, "s1").await;
        engine.update_scores("d1", vec![ScoreInput::new("s1", 0.5)], None).await.unwrap();
        engine.update_scores("d1", vec![ScoreInput::new("s1", 0.9)], None).await.unwrap();
        let meta = engine.vector.get_metadata("default", "s1").await.unwrap().unwrap();
        assert_eq!(meta.get("score").and_then(|v| v.as_f64()), Some(0.9));
    }

    #[tokio::test]
    async fn compute_failure_yields_no_partial_persist() {
        let engine = engine_with_kv();
        seed_segment(&engine, "s1").await;
        let options = UpdateScoresOptions {
            compute: Some(Arc::new(FailingCompute)),
        };
        let err = engine
            .update_scores("d1", vec![ScoreInput::new("s1", 0.5)], Some(options))
            .await
            .unwrap_err();
        assert!(err.is_backend_failure());
        let meta = engine.vector.get_metadata("default", "s1").await.unwrap().unwrap();
        assert!(!meta.contains_key("score"));
    }
}
