use crate::types::ClassificationResult;
use anyhow::Result;
use async_trait::async_trait;

/// Produces the single best label for one input text.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: String) -> Result<ClassificationResult>;
}

/// A model that scores several texts in one forward pass.
#[async_trait]
pub trait BatchedClassifier: Send + Sync {
    async fn classify_batch(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Result<ClassificationResult>>>;
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::time::Duration;

    /// Always answers with the same label and score.
    pub struct FixedClassifier {
        pub label: String,
        pub score: f64,
    }

    impl FixedClassifier {
        pub fn new(label: &str, score: f64) -> Self {
            Self {
                label: label.to_string(),
                score,
            }
        }
    }

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(&self, _text: String) -> Result<ClassificationResult> {
            Ok(ClassificationResult {
                label: self.label.clone(),
                score: self.score,
            })
        }
    }

    pub struct FailingClassifier;

    #[async_trait]
    impl Classifier for FailingClassifier {
        async fn classify(&self, _text: String) -> Result<ClassificationResult> {
            anyhow::bail!("CUDA out of memory")
        }
    }

    pub struct SlowClassifier(pub Duration);

    #[async_trait]
    impl Classifier for SlowClassifier {
        async fn classify(&self, _text: String) -> Result<ClassificationResult> {
            tokio::time::sleep(self.0).await;
            Ok(ClassificationResult {
                label: "neutral".to_string(),
                score: 0.5,
            })
        }
    }
}
