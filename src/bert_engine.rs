use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::ops::softmax;
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertModelConfig, DTYPE};
use hf_hub::{Repo, RepoType, api::tokio::Api};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tokenizers::{PaddingParams, Tokenizer};

use crate::engine::BatchedClassifier;
use crate::types::ClassificationResult;

/// BERT encoder with the pooler and linear head of a sequence classifier.
pub struct BertBatchedClassifier {
    model: BertModel,
    pooler: Linear,
    classifier: Linear,
    tokenizer: Tokenizer,
    device: Device,
    id2label: HashMap<u32, String>,
}

#[derive(Debug, Clone)]
pub struct BertConfig {
    pub model_id: Option<String>,
    pub model_path: Option<PathBuf>,
    /// Hub repository to fetch `tokenizer.json` from when the model repo has none.
    pub tokenizer_id: Option<String>,
    pub revision: String,
    pub use_pth: bool,
    pub cpu: bool,
    pub max_sequence_length: usize,
}

impl Default for BertConfig {
    fn default() -> Self {
        Self {
            model_id: None,
            model_path: None,
            tokenizer_id: None,
            revision: "main".to_string(),
            use_pth: false,
            cpu: false,
            max_sequence_length: 512,
        }
    }
}

/// The parts of a Hugging Face `config.json` the classification head needs.
#[derive(Debug, Deserialize)]
struct HeadConfig {
    hidden_size: usize,
    #[serde(default)]
    id2label: HashMap<String, String>,
}

impl HeadConfig {
    fn labels(&self) -> Result<HashMap<u32, String>> {
        if self.id2label.is_empty() {
            bail!("id2label not found in the model configuration");
        }
        self.id2label
            .iter()
            .map(|(id, label)| {
                let id = id
                    .parse::<u32>()
                    .with_context(|| format!("invalid label id {id:?} in id2label"))?;
                Ok((id, label.clone()))
            })
            .collect()
    }
}

struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
    use_pth: bool,
}

fn label_for(id2label: &HashMap<u32, String>, prediction: u32) -> String {
    id2label
        .get(&prediction)
        .cloned()
        .unwrap_or_else(|| format!("LABEL_{prediction}"))
}

impl BertBatchedClassifier {
    fn device(cpu: bool) -> Result<Device> {
        if cpu {
            Ok(Device::Cpu)
        } else if metal_is_available() {
            tracing::info!("Using metal acceleration");
            Ok(Device::new_metal(0)?)
        } else if cuda_is_available() {
            tracing::info!("Using CUDA GPU acceleration");
            Ok(Device::new_cuda(0)?)
        } else {
            tracing::info!(
                "CUDA not available, running on CPU. To run on GPU, build with `--features cuda`"
            );
            Ok(Device::Cpu)
        }
    }

    async fn fetch_files(config: &BertConfig) -> Result<ModelFiles> {
        if let Some(base_path) = &config.model_path {
            if !base_path.is_dir() {
                bail!("Model path {} is not a directory.", base_path.display());
            }
            let weights = if config.use_pth {
                base_path.join("pytorch_model.bin")
            } else {
                base_path.join("model.safetensors")
            };
            return Ok(ModelFiles {
                config: base_path.join("config.json"),
                tokenizer: base_path.join("tokenizer.json"),
                weights,
                use_pth: config.use_pth,
            });
        }

        let Some(model_id) = config.model_id.clone() else {
            bail!("Either model_id or model_path must be specified");
        };

        let api = Api::new()?;
        let repo = api.repo(Repo::with_revision(
            model_id.clone(),
            RepoType::Model,
            config.revision.clone(),
        ));

        let config_file = repo.get("config.json").await?;
        let tokenizer_file = match &config.tokenizer_id {
            Some(tokenizer_id) => {
                api.model(tokenizer_id.clone())
                    .get("tokenizer.json")
                    .await?
            }
            None => repo.get("tokenizer.json").await?,
        };

        // Older checkpoints on the hub only ship PyTorch weights.
        let (weights, use_pth) = if config.use_pth {
            (repo.get("pytorch_model.bin").await?, true)
        } else {
            match repo.get("model.safetensors").await {
                Ok(weights) => (weights, false),
                Err(err) => {
                    tracing::warn!(
                        model_id = %model_id,
                        "model.safetensors unavailable ({err}), falling back to pytorch_model.bin"
                    );
                    (repo.get("pytorch_model.bin").await?, true)
                }
            }
        };

        Ok(ModelFiles {
            config: config_file,
            tokenizer: tokenizer_file,
            weights,
            use_pth,
        })
    }

    #[tracing::instrument(skip(config), fields(model_id = ?config.model_id, cpu = config.cpu))]
    pub async fn new(config: BertConfig) -> Result<Self> {
        let device = Self::device(config.cpu)?;
        let files = Self::fetch_files(&config).await?;

        let raw_config = std::fs::read_to_string(&files.config)?;
        let model_config: BertModelConfig = serde_json::from_str(&raw_config)?;
        let head_config: HeadConfig = serde_json::from_str(&raw_config)?;
        let id2label = head_config.labels()?;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| anyhow::anyhow!("Tokenizer error: {e}"))?;
        tokenizer.with_padding(Some(PaddingParams::default()));
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: config.max_sequence_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Tokenizer truncation error: {e}"))?;

        let vb = if files.use_pth {
            VarBuilder::from_pth(&files.weights, DTYPE, &device)?
        } else {
            unsafe { VarBuilder::from_mmaped_safetensors(&[&files.weights], DTYPE, &device)? }
        };

        let model = BertModel::load(vb.pp("bert"), &model_config)?;
        let hidden = head_config.hidden_size;
        let pooler = candle_nn::linear(hidden, hidden, vb.pp("bert.pooler.dense"))?;
        let classifier = candle_nn::linear(hidden, id2label.len(), vb.pp("classifier"))?;

        tracing::info!(num_labels = id2label.len(), "Classifier loaded");

        Ok(Self {
            model,
            pooler,
            classifier,
            tokenizer,
            device,
            id2label,
        })
    }

    fn logits(
        &self,
        input_ids: &Tensor,
        token_type_ids: &Tensor,
        attention_mask: &Tensor,
    ) -> Result<Tensor> {
        let hidden_states = self
            .model
            .forward(input_ids, token_type_ids, Some(attention_mask))?;
        // [CLS] token of every sequence
        let cls = hidden_states.i((.., 0))?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        Ok(self.classifier.forward(&pooled)?)
    }
}

#[async_trait]
impl BatchedClassifier for BertBatchedClassifier {
    #[tracing::instrument(skip(self, texts), fields(batch_size = texts.len()))]
    async fn classify_batch(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Result<ClassificationResult>>> {
        let tokenizer = self.tokenizer.clone();
        let (input_ids, attention_mask, token_type_ids) = tokio::task::spawn_blocking(move || {
            tokenizer
                .encode_batch(texts, true)
                .map_err(|e| anyhow::anyhow!("Tokenization error: {e}"))
                .map(|encodings| {
                    let mut id_stack = Vec::with_capacity(encodings.len());
                    let mut mask_stack = Vec::with_capacity(encodings.len());
                    let mut type_stack = Vec::with_capacity(encodings.len());

                    for encoding in &encodings {
                        id_stack.push(encoding.get_ids().to_vec());
                        mask_stack.push(encoding.get_attention_mask().to_vec());
                        type_stack.push(encoding.get_type_ids().to_vec());
                    }

                    (id_stack, mask_stack, type_stack)
                })
        })
        .await??;

        let to_tensor = |rows: &[Vec<u32>]| -> Result<Tensor> {
            let rows = rows
                .iter()
                .map(|row| Tensor::new(row.as_slice(), &self.device))
                .collect::<candle_core::Result<Vec<_>>>()?;
            Ok(Tensor::stack(&rows, 0)?)
        };

        let input_ids = to_tensor(&input_ids)?;
        let attention_mask = to_tensor(&attention_mask)?;
        let token_type_ids = to_tensor(&token_type_ids)?;

        let logits = self.logits(&input_ids, &token_type_ids, &attention_mask)?;
        let predictions = logits.argmax(1)?.to_vec1::<u32>()?;
        let probs = softmax(&logits, 1)?.to_vec2::<f32>()?;

        Ok(predictions
            .into_iter()
            .zip(probs)
            .map(|(prediction, row)| {
                let score = row
                    .get(prediction as usize)
                    .copied()
                    .ok_or_else(|| anyhow::anyhow!("prediction {prediction} out of range"))?;
                Ok(ClassificationResult {
                    label: label_for(&self.id2label, prediction),
                    score: score as f64,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_config_reads_hub_id2label() {
        let raw = r#"{
            "hidden_size": 312,
            "id2label": {"0": "neutral", "1": "positive", "2": "negative"},
            "vocab_size": 83828
        }"#;
        let head: HeadConfig = serde_json::from_str(raw).unwrap();
        let labels = head.labels().unwrap();

        assert_eq!(head.hidden_size, 312);
        assert_eq!(labels.len(), 3);
        assert_eq!(label_for(&labels, 1), "positive");
        assert_eq!(label_for(&labels, 7), "LABEL_7");
    }

    #[test]
    fn head_config_without_labels_is_rejected() {
        let head: HeadConfig = serde_json::from_str(r#"{"hidden_size": 768}"#).unwrap();
        assert!(head.labels().is_err());

        let head: HeadConfig =
            serde_json::from_str(r#"{"hidden_size": 768, "id2label": {"x": "joy"}}"#).unwrap();
        assert!(head.labels().is_err());
    }

    #[tokio::test]
    async fn missing_model_directory_fails_fast() {
        let config = BertConfig {
            model_path: Some(PathBuf::from("/definitely/not/a/model/dir")),
            cpu: true,
            ..Default::default()
        };
        let err = BertBatchedClassifier::new(config).await.err().unwrap();
        assert!(err.to_string().contains("is not a directory"));
    }
}
