use super::{dual_write, FeedbackEngine, ScalarComputeHook};
use crate::error::{join_errors, CoreError, CoreResult};
use crate::keys::weight_key;
use crate::metadata_batch::{update_segment_metadata_batch, MetadataAssignment};
use crate::types::MetadataValue;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct WeightInput {
    pub segment_id: String,
    pub weight: f64,
}

impl WeightInput {
    pub fn new(segment_id: impl Into<String>, weight: f64) -> Self {
        Self {
            segment_id: segment_id.into(),
            weight,
        }
    }
}

#[derive(Default, Clone)]
pub struct UpdateWeightsOptions {
    pub compute: Option<Arc<dyn ScalarComputeHook>>,
}

impl FeedbackEngine {
    /// `UpdateWeights(ctx, docID, records, options?)` — spec §4.3.3.
    pub async fn update_weights(
        &self,
        doc_id: &str,
        mut inputs: Vec<WeightInput>,
        options: Option<UpdateWeightsOptions>,
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
                        input.weight = value;
                    }
                }
                Ok(values) => {
                    return Err(CoreError::invalid_argument(format!(
                        "compute hook returned {} weights for {} inputs",
                        values.len(),
                        inputs.len()
                    )));
                }
                Err(e) => return Err(CoreError::BackendFailure(join_errors(vec![e]))),
            }
        }

        let metadata_assignments = |inputs: &[WeightInput]| -> Vec<MetadataAssignment> {
            inputs
                .iter()
                .map(|i| MetadataAssignment {
                    segment_id: i.segment_id.clone(),
                    metadata_key: "weight".to_string(),
                    value: Some(MetadataValue::Float(i.weight)),
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
                        kv.set(&weight_key(&doc_id_owned, &input.segment_id), &input.weight.to_string(), 0)
                            .await?;
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

                dual_write(doc_id, "update_weights", kv_branch, vector_branch).await?;
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

    fn engine_with_kv() -> FeedbackEngine {
        FeedbackEngine::new(
            Arc::new(MemoryVectorAdapter::new()),
            Some(Arc::new(MemoryKvAdapter::new())),
            CoordinatorConfig::default(),
        )
    }

    #[tokio::test]
    async fn update_weights_overwrites_and_writes_kv() {
        let engine = engine_with_kv();
        let mut doc = VectorDocument::default();
        doc.id = "s1".into();
        engine.vector.add_documents("default", vec![doc], true, 10).await.unwrap();

        engine.update_weights("d1", vec![WeightInput::new("s1", 1.0)], None).await.unwrap();
        engine.update_weights("d1", vec![WeightInput::new("s1", 2.5)], None).await.unwrap();

        let meta = engine.vector.get_metadata("default", "s1").await.unwrap().unwrap();
        assert_eq!(meta.get("weight").and_then(|v| v.as_f64()), Some(2.5));

        let kv = engine.kv.as_ref().unwrap();
        assert_eq!(kv.get(&weight_key("d1", "s1")).await.unwrap(), Some("2.5".to_string()));
    }
}
