use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::{Instant, interval};

use crate::config::BatchConfig;
use crate::engine::{BatchedClassifier, Classifier};
use crate::types::ClassificationResult;

type ResponseSender = oneshot::Sender<Result<ClassificationResult>>;

/// The worker behind a wrapper stopped before answering.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct EngineClosed(&'static str);

#[derive(Debug)]
struct QueuedRequest {
    text: String,
    response_tx: ResponseSender,
}

/// Front half of a batching worker: hands texts to the [`BatchProcessor`] and
/// waits for its answer.
pub struct BatchedClassifierWrapper {
    request_tx: flume::Sender<QueuedRequest>,
}

impl BatchedClassifierWrapper {
    pub fn new<T: BatchedClassifier + 'static>(
        config: BatchConfig,
        batched_classifier: T,
    ) -> (Self, BatchProcessor<T>) {
        let (request_tx, request_rx) = flume::bounded(0); // Rendezvous channel

        let processor = BatchProcessor {
            request_rx,
            config,
            request_queue: VecDeque::new(),
            batched_classifier,
        };

        (Self { request_tx }, processor)
    }
}

#[async_trait]
impl Classifier for BatchedClassifierWrapper {
    #[tracing::instrument(skip(self, text), fields(text_len = text.len()))]
    async fn classify(&self, text: String) -> Result<ClassificationResult> {
        let (response_tx, response_rx) = oneshot::channel();

        self.request_tx
            .send_async(QueuedRequest { text, response_tx })
            .await
            .map_err(|_| EngineClosed("classifier queue is closed"))?;

        response_rx
            .await
            .map_err(|_| EngineClosed("response channel closed"))?
    }
}

pub struct BatchProcessor<T: BatchedClassifier> {
    request_rx: flume::Receiver<QueuedRequest>,
    config: BatchConfig,
    request_queue: VecDeque<QueuedRequest>,
    batched_classifier: T,
}

impl<T: BatchedClassifier> BatchProcessor<T> {
    #[tracing::instrument(skip(self), fields(name = %self.config.name))]
    pub async fn run_forever(mut self) -> Result<()> {
        let mut tick_timer = interval(self.config.tick_duration);

        loop {
            tokio::select! {
                request = self.request_rx.recv_async() => {
                    match request {
                        Ok(req) => {
                            self.request_queue.push_back(req);
                            tracing::trace!(queue_size = self.request_queue.len(), "Request queued");

                            if self.request_queue.len() >= self.config.batch_size {
                                self.process_batch().await;
                            }
                        }
                        Err(_) => {
                            tracing::info!("Channel closed, draining queue and exiting");
                            while !self.request_queue.is_empty() {
                                self.process_batch().await;
                            }
                            break Ok(());
                        }
                    }
                }

                _ = tick_timer.tick() => {
                    if !self.request_queue.is_empty() {
                        tracing::trace!(pending_requests = self.request_queue.len(), "Tick flush");
                        self.process_batch().await;
                    }
                }
            }
        }
    }

    async fn process_batch(&mut self) {
        let batch_start = Instant::now();

        let take = self.config.batch_size.max(1).min(self.request_queue.len());
        let batch: Vec<_> = self.request_queue.drain(..take).collect();

        if batch.is_empty() {
            return;
        }

        let batch_size = batch.len();
        let (texts, response_channels): (Vec<_>, Vec<_>) = batch
            .into_iter()
            .map(|req| (req.text, req.response_tx))
            .unzip();

        match self.batched_classifier.classify_batch(texts).await {
            Ok(results) if results.len() == batch_size => {
                for (response_tx, result) in response_channels.into_iter().zip(results) {
                    let _ = response_tx.send(result);
                }
            }
            Ok(results) => {
                tracing::error!(
                    expected = batch_size,
                    got = results.len(),
                    "Classifier returned a mismatched number of results"
                );
                for response_tx in response_channels {
                    let _ = response_tx.send(Err(anyhow::anyhow!(
                        "classifier returned {} results for {} inputs",
                        results.len(),
                        batch_size
                    )));
                }
            }
            Err(err) => {
                tracing::error!("Batch processing failed: {:#}", err);
                for response_tx in response_channels {
                    let _ =
                        response_tx.send(Err(anyhow::anyhow!("Batch processing failed: {err:#}")));
                }
            }
        }

        tracing::debug!(
            batch_size,
            processing_time_ms = batch_start.elapsed().as_millis(),
            "Batch processed"
        );
    }
}
