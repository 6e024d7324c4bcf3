use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AnalysisError;

/// Which classifier a request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Sentiment,
    Emotion,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Sentiment, Mode::Emotion];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Sentiment => "sentiment",
            Mode::Emotion => "emotion",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Matching is exact and case-sensitive.
impl FromStr for Mode {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sentiment" => Ok(Mode::Sentiment),
            "emotion" => Ok(Mode::Emotion),
            other => Err(AnalysisError::UnsupportedMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisRequest {
    pub text: String,
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub label: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResponse {
    pub mode: Mode,
    pub result: String,
    pub score: f64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub models: [Mode; 2],
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok",
            models: Mode::ALL,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parsing_is_exact() {
        assert_eq!("sentiment".parse::<Mode>().unwrap(), Mode::Sentiment);
        assert_eq!("emotion".parse::<Mode>().unwrap(), Mode::Emotion);

        for bad in ["", "Sentiment", "EMOTION", " emotion", "unknown"] {
            assert!(
                matches!(bad.parse::<Mode>(), Err(AnalysisError::UnsupportedMode(m)) if m == bad),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn health_body_lists_both_models() {
        let body = serde_json::to_value(HealthResponse::default()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"status": "ok", "models": ["sentiment", "emotion"]})
        );
    }
}
