use std::sync::Arc;
use std::time::Duration;

use crate::batched_engine::EngineClosed;
use crate::engine::Classifier;
use crate::error::AnalysisError;
use crate::types::{ClassificationResult, Mode};

/// The two classifiers, selected per call by [`Mode`].
#[derive(Clone)]
pub struct ClassifierPipeline {
    sentiment: Arc<dyn Classifier>,
    emotion: Arc<dyn Classifier>,
    timeout: Duration,
}

impl ClassifierPipeline {
    pub fn new(
        sentiment: Arc<dyn Classifier>,
        emotion: Arc<dyn Classifier>,
        timeout: Duration,
    ) -> Self {
        Self {
            sentiment,
            emotion,
            timeout,
        }
    }

    fn classifier(&self, mode: Mode) -> &Arc<dyn Classifier> {
        match mode {
            Mode::Sentiment => &self.sentiment,
            Mode::Emotion => &self.emotion,
        }
    }

    /// Top-ranked label and score for `text`.
    pub async fn classify(
        &self,
        mode: Mode,
        text: &str,
    ) -> Result<ClassificationResult, AnalysisError> {
        if text.is_empty() {
            return Err(AnalysisError::EmptyText);
        }

        let call = self.classifier(mode).classify(text.to_string());
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) => Err(match err.downcast::<EngineClosed>() {
                Ok(closed) => AnalysisError::ClassifierUnavailable {
                    mode,
                    reason: closed.to_string(),
                },
                Err(source) => AnalysisError::ClassificationFailed { mode, source },
            }),
            Err(_) => Err(AnalysisError::ClassificationFailed {
                mode,
                source: anyhow::anyhow!("inference timed out after {:?}", self.timeout),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batched_engine::BatchedClassifierWrapper;
    use crate::config::BatchConfig;
    use crate::engine::BatchedClassifier;
    use crate::engine::testing::{FailingClassifier, FixedClassifier, SlowClassifier};
    use async_trait::async_trait;

    fn pipeline(
        sentiment: impl Classifier + 'static,
        emotion: impl Classifier + 'static,
    ) -> ClassifierPipeline {
        ClassifierPipeline::new(
            Arc::new(sentiment),
            Arc::new(emotion),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn routes_by_mode() {
        let p = pipeline(
            FixedClassifier::new("positive", 0.91),
            FixedClassifier::new("joy", 0.77),
        );

        let sentiment = p.classify(Mode::Sentiment, "Я так рад").await.unwrap();
        assert_eq!(sentiment.label, "positive");

        let emotion = p.classify(Mode::Emotion, "I am happy").await.unwrap();
        assert_eq!(emotion.label, "joy");
        assert_eq!(emotion.score, 0.77);
    }

    #[tokio::test]
    async fn inference_errors_keep_their_cause() {
        let p = pipeline(FixedClassifier::new("neutral", 0.5), FailingClassifier);

        let err = p.classify(Mode::Emotion, "text").await.unwrap_err();
        match err {
            AnalysisError::ClassificationFailed { mode, source } => {
                assert_eq!(mode, Mode::Emotion);
                assert!(source.to_string().contains("out of memory"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_inference_times_out() {
        let p = ClassifierPipeline::new(
            Arc::new(SlowClassifier(Duration::from_secs(60))),
            Arc::new(FixedClassifier::new("joy", 0.5)),
            Duration::from_millis(100),
        );

        let err = p.classify(Mode::Sentiment, "text").await.unwrap_err();
        assert!(matches!(err, AnalysisError::ClassificationFailed { .. }));
        assert!(err.to_string().contains("timed out"));
    }

    struct NeverCalled;

    #[async_trait]
    impl BatchedClassifier for NeverCalled {
        async fn classify_batch(
            &self,
            _texts: Vec<String>,
        ) -> anyhow::Result<Vec<anyhow::Result<ClassificationResult>>> {
            unreachable!("worker was never started")
        }
    }

    #[tokio::test]
    async fn stopped_worker_is_unavailable() {
        let config = BatchConfig {
            name: "sentiment".to_string(),
            batch_size: 1,
            tick_duration: Duration::from_millis(10),
        };
        let (wrapper, processor) = BatchedClassifierWrapper::new(config, NeverCalled);
        drop(processor);

        let p = pipeline(wrapper, FixedClassifier::new("joy", 0.5));
        let err = p.classify(Mode::Sentiment, "text").await.unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::ClassifierUnavailable {
                mode: Mode::Sentiment,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let p = pipeline(
            FixedClassifier::new("neutral", 0.5),
            FixedClassifier::new("joy", 0.5),
        );
        assert!(matches!(
            p.classify(Mode::Sentiment, "").await,
            Err(AnalysisError::EmptyText)
        ));
    }
}
