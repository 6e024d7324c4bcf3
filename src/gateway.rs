use metrics::counter;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::AnalysisError;
use crate::localizer::localize;
use crate::pipeline::ClassifierPipeline;
use crate::types::{AnalysisRequest, AnalysisResponse, Mode};

/// Stateless request handler shared by the HTTP API and the bot.
pub struct Gateway {
    pipeline: ClassifierPipeline,
    api_key: String,
}

/// Two decimals, ties to even.
fn round2(score: f64) -> f64 {
    (score * 100.0).round_ties_even() / 100.0
}

impl Gateway {
    pub fn new(pipeline: ClassifierPipeline, api_key: impl Into<String>) -> Self {
        Self {
            pipeline,
            api_key: api_key.into(),
        }
    }

    /// Exact comparison against the configured secret. A missing key never
    /// matches, and neither does anything when the configured secret is empty.
    pub fn authorize(&self, presented_key: Option<&str>) -> Result<(), AnalysisError> {
        match presented_key {
            Some(key) if !self.api_key.is_empty() && key == self.api_key => Ok(()),
            other => {
                // Only the length of the rejected key is logged, never its value.
                tracing::warn!(
                    key_present = other.is_some(),
                    key_len = other.map_or(0, str::len),
                    "Rejected request with invalid API key"
                );
                counter!("analysis_failures_total", "kind" => "unauthorized").increment(1);
                Err(AnalysisError::Unauthorized)
            }
        }
    }

    /// Authorize, validate and answer one API call.
    pub async fn handle(
        &self,
        request: &AnalysisRequest,
        presented_key: Option<&str>,
    ) -> Result<AnalysisResponse, AnalysisError> {
        self.authorize(presented_key)?;

        let mode: Mode = request.mode.parse().map_err(|_| {
            counter!("analysis_failures_total", "kind" => "invalid_mode").increment(1);
            AnalysisError::InvalidMode(request.mode.clone())
        })?;

        self.analyze(&request.text, mode).await
    }

    /// Classify and localize `text`; no key check. Used by the bot.
    pub async fn analyze(
        &self,
        text: &str,
        mode: Mode,
    ) -> Result<AnalysisResponse, AnalysisError> {
        let request_id = Uuid::new_v4().simple();
        let text_length = text.chars().count();
        let start = Instant::now();
        counter!("analysis_requests_total", "mode" => mode.as_str()).increment(1);
        tracing::debug!(%request_id, %mode, text_length, "Request received");

        let result = match self.pipeline.classify(mode, text).await {
            Ok(result) => result,
            Err(err) => {
                counter!("analysis_failures_total", "kind" => err.kind()).increment(1);
                tracing::error!(%request_id, %mode, error = %err, "Analysis failed");
                return Err(err);
            }
        };

        let response = AnalysisResponse {
            mode,
            result: localize(mode, &result.label),
            score: round2(result.score),
        };

        tracing::info!(
            %request_id,
            %mode,
            text_length,
            elapsed_ms = start.elapsed().as_millis() as u64,
            result = %response.result,
            score = response.score,
            "Request processed"
        );

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{FailingClassifier, FixedClassifier};
    use std::sync::Arc;
    use std::time::Duration;

    const KEY: &str = "my_secret_api_key_12345";

    fn gateway(sentiment: (&str, f64), emotion: (&str, f64)) -> Gateway {
        let pipeline = ClassifierPipeline::new(
            Arc::new(FixedClassifier::new(sentiment.0, sentiment.1)),
            Arc::new(FixedClassifier::new(emotion.0, emotion.1)),
            Duration::from_secs(5),
        );
        Gateway::new(pipeline, KEY)
    }

    fn request(text: &str, mode: &str) -> AnalysisRequest {
        AnalysisRequest {
            text: text.to_string(),
            mode: mode.to_string(),
        }
    }

    #[test]
    fn rounding_keeps_two_decimals() {
        assert_eq!(round2(0.8732), 0.87);
        assert_eq!(round2(0.876), 0.88);
        assert_eq!(round2(0.999), 1.0);
        assert_eq!(round2(0.0), 0.0);
        // Exact halves go to the even neighbour.
        assert_eq!(round2(0.125), 0.12);
        assert_eq!(round2(0.625), 0.62);
        assert_eq!(round2(0.375), 0.38);
    }

    #[tokio::test]
    async fn localized_sentiment_with_rounded_score() {
        let gw = gateway(("positive", 0.8732), ("joy", 0.5));

        let response = gw
            .handle(&request("Я так рад", "sentiment"), Some(KEY))
            .await
            .unwrap();

        assert_eq!(
            response,
            AnalysisResponse {
                mode: Mode::Sentiment,
                result: "позитив".to_string(),
                score: 0.87,
            }
        );
    }

    #[tokio::test]
    async fn emotion_mode_uses_emotion_table() {
        let gw = gateway(("neutral", 0.5), ("surprise", 0.6149));

        let response = gw
            .handle(&request("wow", "emotion"), Some(KEY))
            .await
            .unwrap();

        assert_eq!(response.result, "удивление");
        assert_eq!(response.score, 0.61);
    }

    #[tokio::test]
    async fn any_other_key_is_unauthorized() {
        let gw = gateway(("neutral", 0.5), ("joy", 0.5));

        let keys = [
            None,
            Some(""),
            Some("wrong"),
            Some("my_secret_api_key_1234"),
            Some(" my_secret_api_key_12345"),
            Some("MY_SECRET_API_KEY_12345"),
        ];
        for key in keys {
            let err = gw
                .handle(&request("hi", "sentiment"), key)
                .await
                .unwrap_err();
            assert!(matches!(err, AnalysisError::Unauthorized), "{key:?}");
        }
    }

    #[tokio::test]
    async fn auth_is_checked_before_mode() {
        let gw = gateway(("neutral", 0.5), ("joy", 0.5));

        let err = gw
            .handle(&request("hi", "unknown"), Some("bad"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Unauthorized));
    }

    #[tokio::test]
    async fn mode_matching_is_case_sensitive() {
        let gw = gateway(("neutral", 0.5), ("joy", 0.5));

        for mode in ["", "unknown", "Sentiment", "EMOTION", "emotion "] {
            let err = gw.handle(&request("hi", mode), Some(KEY)).await.unwrap_err();
            assert!(matches!(&err, AnalysisError::InvalidMode(m) if m == mode), "{mode:?}");
        }
    }

    #[tokio::test]
    async fn unknown_native_label_passes_through() {
        let gw = gateway(("LABEL_5", 0.333), ("joy", 0.5));

        let response = gw.analyze("hi", Mode::Sentiment).await.unwrap();
        assert_eq!(response.result, "LABEL_5");
        assert_eq!(response.score, 0.33);
    }

    #[tokio::test]
    async fn classifier_failure_is_reported() {
        let pipeline = ClassifierPipeline::new(
            Arc::new(FailingClassifier),
            Arc::new(FixedClassifier::new("joy", 0.5)),
            Duration::from_secs(5),
        );
        let gw = Gateway::new(pipeline, KEY);

        let err = gw.analyze("hi", Mode::Sentiment).await.unwrap_err();
        assert!(matches!(err, AnalysisError::ClassificationFailed { .. }));
    }
}
