mod batched_engine;
mod bert_engine;
mod bot;
mod config;
mod engine;
mod error;
mod gateway;
mod localizer;
mod logging;
mod pipeline;
mod server;
mod types;

use anyhow::Context;
use axum::routing::get;
use axum_prometheus::PrometheusMetricLayer;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use batched_engine::BatchedClassifierWrapper;
use bert_engine::BertBatchedClassifier;
use bot::{BotSession, TelegramClient};
use config::{BotArgs, Cli, Command, ModelArgs, ServeArgs};
use engine::Classifier;
use gateway::Gateway;
use pipeline::ClassifierPipeline;
use server::AppState;
use types::Mode;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Held for the whole run so the file writer flushes on exit.
    let _log_guard = logging::init(cli.log_json, cli.log_file.as_deref())?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
            }
            shutdown.cancel();
        }
    });

    match cli.command {
        Command::Serve(args) => serve(args, shutdown).await,
        Command::Bot(args) => run_bot(args, shutdown).await,
    }
}

/// Load one classifier and start the worker that batches its requests.
async fn load_classifier(models: &ModelArgs, mode: Mode) -> anyhow::Result<Arc<dyn Classifier>> {
    tracing::info!(%mode, "Loading classifier...");
    let bert = BertBatchedClassifier::new(models.bert_config(mode))
        .await
        .with_context(|| format!("failed to load the {mode} classifier"))?;

    let (classifier, processor) = BatchedClassifierWrapper::new(models.batch_config(mode), bert);
    tokio::spawn(async move {
        if let Err(e) = processor.run_forever().await {
            tracing::error!(%mode, "Batch processor error: {}", e);
        }
    });
    tracing::info!(%mode, "Classifier ready");

    Ok(Arc::new(classifier))
}

/// Both classifiers must load before anything is served.
async fn load_pipeline(models: &ModelArgs) -> anyhow::Result<ClassifierPipeline> {
    let (sentiment, emotion) = tokio::try_join!(
        load_classifier(models, Mode::Sentiment),
        load_classifier(models, Mode::Emotion),
    )?;
    Ok(ClassifierPipeline::new(
        sentiment,
        emotion,
        models.inference_timeout(),
    ))
}

async fn serve(args: ServeArgs, shutdown: CancellationToken) -> anyhow::Result<()> {
    tracing::info!(
        address = %args.server_address(),
        cors_origins = ?args.cors_origins,
        "Starting analysis API"
    );

    if args.uses_default_api_key() {
        if args.strict_api_key {
            anyhow::bail!("API_KEY is not set and STRICT_API_KEY is enabled");
        }
        tracing::warn!("API_KEY is not set, using the built-in placeholder key");
    }

    let pipeline = load_pipeline(&args.models).await?;
    let gateway = Arc::new(Gateway::new(pipeline, args.api_key.clone()));

    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
    let app = server::router(AppState::new(gateway), &args.cors_origins)?
        .route("/metrics", get(|| async move { metric_handle.render() }))
        .layer(prometheus_layer);

    let listener = TcpListener::bind(&args.server_address()).await?;
    tracing::info!("Server running on http://{}", args.server_address());
    tracing::info!(
        "Batch size: {}, Tick duration: {}ms",
        args.models.batch_size,
        args.models.tick_duration_ms
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn run_bot(args: BotArgs, shutdown: CancellationToken) -> anyhow::Result<()> {
    tracing::info!(api_url = %args.telegram_api_url, "Starting Telegram bot");

    let pipeline = load_pipeline(&args.models).await?;
    // The bot skips the API key check, so the gateway's key is never compared.
    let gateway = Arc::new(Gateway::new(pipeline, String::new()));

    let client = TelegramClient::new(
        &args.telegram_api_url,
        &args.bot_token,
        args.poll_timeout_secs,
    )?;
    bot::run(client, BotSession::new(gateway), shutdown).await
}
