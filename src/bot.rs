//! Telegram front end.
//!
//! The bot keeps each chat's selected mode and forwards every other message to
//! [`Gateway::analyze`]. Updates arrive by long polling `getUpdates`.

use anyhow::{Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::gateway::Gateway;
use crate::types::{AnalysisResponse, Mode};

const RETRY_DELAY: Duration = Duration::from_secs(5);

const HELP: &str = "Отправьте текст, и я определю его тональность или эмоцию.\n\
/sentiment - режим тональности (RU)\n\
/emotion - режим эмоций (EN)\n\
/mode - текущий режим";

const ANALYSIS_FAILED: &str = "Ошибка: не удалось проанализировать текст.";

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            _ => bail!(
                "Telegram API error: {}",
                self.description.unwrap_or_else(|| "no description".to_string())
            ),
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

/// Where the bot reads updates from and writes replies to.
#[async_trait]
pub trait BotTransport: Send + Sync {
    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>>;
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;
}

/// Bot API client over HTTPS.
pub struct TelegramClient {
    base_url: String,
    poll_timeout_secs: u64,
    http: Client,
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str, poll_timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(poll_timeout_secs + 10))
            .build()?;
        Ok(Self {
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
            poll_timeout_secs,
            http,
        })
    }

    async fn call<B: Serialize + ?Sized, T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T> {
        // The URL carries the token, so it is stripped from transport errors.
        let response = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| e.without_url())?;
        let body: ApiResponse<T> = response.json().await.map_err(|e| e.without_url())?;
        body.into_result()
    }
}

#[async_trait]
impl BotTransport for TelegramClient {
    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message"],
        });
        self.call("getUpdates", &body).await
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call("sendMessage", &SendMessage { chat_id, text })
            .await?;
        Ok(())
    }
}

/// Per-chat state and reply logic.
pub struct BotSession {
    gateway: Arc<Gateway>,
    modes: Mutex<HashMap<i64, Mode>>,
}

fn render(response: &AnalysisResponse) -> String {
    let title = match response.mode {
        Mode::Sentiment => "Тональность",
        Mode::Emotion => "Эмоция",
    };
    format!(
        "{title}: {} (уверенность: {})",
        response.result, response.score
    )
}

fn mode_name(mode: Mode) -> &'static str {
    match mode {
        Mode::Sentiment => "тональность",
        Mode::Emotion => "эмоции",
    }
}

impl BotSession {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            modes: Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self, chat_id: i64) -> Mode {
        self.modes
            .lock()
            .map(|modes| modes.get(&chat_id).copied().unwrap_or(Mode::Sentiment))
            .unwrap_or(Mode::Sentiment)
    }

    fn set_mode(&self, chat_id: i64, mode: Mode) {
        if let Ok(mut modes) = self.modes.lock() {
            modes.insert(chat_id, mode);
        }
    }

    /// Reply for one incoming message, `None` when there is nothing to say.
    pub async fn reply(&self, chat_id: i64, text: &str) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        if let Some(command) = text.strip_prefix('/') {
            // "/emotion@my_bot arg" -> "emotion"
            let command = command
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .split('@')
                .next()
                .unwrap_or_default();
            return Some(self.command(chat_id, command));
        }

        let mode = self.mode(chat_id);
        match self.gateway.analyze(text, mode).await {
            Ok(response) => Some(render(&response)),
            Err(err) => {
                tracing::warn!(chat_id, error = %err, "Bot analysis failed");
                Some(ANALYSIS_FAILED.to_string())
            }
        }
    }

    fn command(&self, chat_id: i64, command: &str) -> String {
        match command {
            "sentiment" | "emotion" => {
                let mode = if command == "sentiment" {
                    Mode::Sentiment
                } else {
                    Mode::Emotion
                };
                self.set_mode(chat_id, mode);
                format!("Режим: {}. Отправьте текст для анализа.", mode_name(mode))
            }
            "mode" => format!("Текущий режим: {}", mode_name(self.mode(chat_id))),
            "start" => format!(
                "Привет! {HELP}\n\nТекущий режим: {}",
                mode_name(self.mode(chat_id))
            ),
            _ => HELP.to_string(),
        }
    }
}

/// Poll for updates and answer them until `shutdown` is cancelled.
pub async fn run(
    transport: impl BotTransport,
    session: BotSession,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut offset = 0;
    tracing::info!("Bot started");

    loop {
        let updates = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            updates = transport.get_updates(offset) => updates,
        };

        let updates = match updates {
            Ok(updates) => updates,
            Err(err) => {
                tracing::warn!("Polling failed: {err:#}, retrying in {RETRY_DELAY:?}");
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(RETRY_DELAY) => continue,
                }
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(Message {
                chat,
                text: Some(text),
            }) = update.message
            else {
                continue;
            };

            if let Some(reply) = session.reply(chat.id, &text).await {
                if let Err(err) = transport.send_message(chat.id, &reply).await {
                    tracing::warn!(chat_id = chat.id, "Failed to send reply: {err:#}");
                }
            }
        }
    }

    tracing::info!("Bot stopped");
    Ok(())
}
