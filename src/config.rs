use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::bert_engine::BertConfig;
use crate::types::Mode;

/// Placeholder secret used when `API_KEY` is not set.
pub const DEFAULT_API_KEY: &str = "default_key";

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", global = true)]
    pub log_json: bool,

    /// Also append plain-text logs to this file
    #[arg(long, env = "LOG_FILE", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Serve the HTTP analysis API
    Serve(ServeArgs),
    /// Run the Telegram bot
    Bot(BotArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Shared secret expected in the X-API-Key header
    #[arg(long, env = "API_KEY", default_value = DEFAULT_API_KEY, hide_env_values = true)]
    pub api_key: String,

    /// Refuse to start while the API key is the built-in placeholder
    #[arg(long, env = "STRICT_API_KEY")]
    pub strict_api_key: bool,

    /// Server host to bind to
    #[arg(long, env = "API_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to bind to
    #[arg(long, env = "API_PORT", default_value = "8000")]
    pub port: u16,

    /// Origins allowed to call the API from a browser
    #[arg(
        long,
        env = "CORS_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:5173"
    )]
    pub cors_origins: Vec<String>,

    #[command(flatten)]
    pub models: ModelArgs,
}

impl ServeArgs {
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn uses_default_api_key(&self) -> bool {
        self.api_key == DEFAULT_API_KEY
    }
}

#[derive(Debug, Clone, Args)]
pub struct BotArgs {
    /// Telegram bot token
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    pub bot_token: String,

    /// Base URL of the Telegram Bot API
    #[arg(long, env = "TELEGRAM_API_URL", default_value = "https://api.telegram.org")]
    pub telegram_api_url: String,

    /// Long-polling timeout in seconds
    #[arg(long, env = "POLL_TIMEOUT_SECS", default_value = "30")]
    pub poll_timeout_secs: u64,

    #[command(flatten)]
    pub models: ModelArgs,
}

#[derive(Debug, Clone, Args)]
pub struct ModelArgs {
    /// Sentiment model ID on the Hugging Face Hub
    #[arg(
        long,
        env = "SENTIMENT_MODEL_ID",
        default_value = "cointegrated/rubert-tiny-sentiment-balanced"
    )]
    pub sentiment_model_id: String,

    /// Local directory holding the sentiment model, overrides the hub ID
    #[arg(long, env = "SENTIMENT_MODEL_PATH")]
    pub sentiment_model_path: Option<PathBuf>,

    /// Hub repository to take the sentiment tokenizer from
    #[arg(long, env = "SENTIMENT_TOKENIZER_ID")]
    pub sentiment_tokenizer_id: Option<String>,

    /// Emotion model ID on the Hugging Face Hub
    #[arg(
        long,
        env = "EMOTION_MODEL_ID",
        default_value = "bhadresh-savani/bert-base-uncased-emotion"
    )]
    pub emotion_model_id: String,

    /// Local directory holding the emotion model, overrides the hub ID
    #[arg(long, env = "EMOTION_MODEL_PATH")]
    pub emotion_model_path: Option<PathBuf>,

    /// Hub repository to take the emotion tokenizer from
    #[arg(
        long,
        env = "EMOTION_TOKENIZER_ID",
        default_value = "google-bert/bert-base-uncased"
    )]
    pub emotion_tokenizer_id: Option<String>,

    /// Model revision/branch on Hugging Face
    #[arg(long, env = "MODEL_REVISION", default_value = "main")]
    pub model_revision: String,

    /// Use PyTorch weights instead of safetensors
    #[arg(long, env = "USE_PTH")]
    pub use_pth: bool,

    /// Run on CPU instead of GPU
    #[arg(long, env = "CPU_ONLY")]
    pub cpu_only: bool,

    /// Maximum sequence length allowed
    #[arg(long, env = "MAX_SEQUENCE_LENGTH", default_value = "512")]
    pub max_sequence_length: usize,

    /// Batch size for processing requests
    #[arg(long, env = "BATCH_SIZE", default_value = "8")]
    pub batch_size: usize,

    /// Tick duration in milliseconds for batch processing
    #[arg(long, env = "TICK_DURATION_MS", default_value = "100")]
    pub tick_duration_ms: u64,

    /// Upper bound for a single classification call
    #[arg(long, env = "INFERENCE_TIMEOUT_MS", default_value = "30000")]
    pub inference_timeout_ms: u64,
}

impl ModelArgs {
    pub fn bert_config(&self, mode: Mode) -> BertConfig {
        let (model_id, model_path, tokenizer_id) = match mode {
            Mode::Sentiment => (
                &self.sentiment_model_id,
                &self.sentiment_model_path,
                &self.sentiment_tokenizer_id,
            ),
            Mode::Emotion => (
                &self.emotion_model_id,
                &self.emotion_model_path,
                &self.emotion_tokenizer_id,
            ),
        };

        BertConfig {
            model_id: Some(model_id.clone()),
            model_path: model_path.clone(),
            tokenizer_id: tokenizer_id.clone(),
            revision: self.model_revision.clone(),
            use_pth: self.use_pth,
            cpu: self.cpu_only,
            max_sequence_length: self.max_sequence_length,
        }
    }

    pub fn batch_config(&self, mode: Mode) -> BatchConfig {
        BatchConfig {
            name: mode.to_string(),
            batch_size: self.batch_size,
            tick_duration: Duration::from_millis(self.tick_duration_ms),
        }
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub name: String,
    pub batch_size: usize,
    pub tick_duration: Duration,
}
