use std::{pin::Pin, sync::Arc, time::SystemTime};

use futures::{future, Stream, StreamExt};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn now(payload: T) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    /// A single record failed validation; the pipeline drops it and carries on.
    #[error("record rejected: {0}")]
    Rejected(String),
    #[error("sink error: {0}")]
    Sink(String),
}

pub type RecordStream<T> = Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(&self) -> RecordStream<T>;
}

#[async_trait::async_trait]
pub trait Transform<T>: Send + Sync {
    async fn apply(&self, input: Envelope<T>) -> Result<Envelope<T>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static;
}

pub struct Pipeline<S, T, K> {
    pub name: String,
    pub source: S,
    pub transforms: Vec<Arc<dyn Transform<T>>>,
    pub sink: K,
}

impl<T, S, K> Pipeline<S, T, K>
where
    T: Send + 'static,
    S: Source<T> + Send + Sync + 'static,
    K: Sink<T> + Send + Sync + 'static,
{
    pub async fn run(self) -> Result<(), PipelineError> {
        tracing::info!(pipeline = %self.name, transforms = self.transforms.len(), "starting pipeline");

        let mut stream = self.source.stream().await;

        for t in self.transforms {
            stream = Box::pin(stream.then(move |item| {
                let t = t.clone();
                async move {
                    match item {
                        Ok(env) => t.apply(env).await,
                        Err(e) => Err(e),
                    }
                }
            }));
        }

        let name = self.name.clone();
        let accepted = stream.filter(move |item| {
            let keep = match item {
                Err(PipelineError::Rejected(reason)) => {
                    tracing::debug!(pipeline = %name, %reason, "dropping rejected record");
                    metrics::counter!("pipeline_records_rejected_total", "pipeline" => name.clone())
                        .increment(1);
                    false
                }
                _ => true,
            };
            future::ready(keep)
        });

        let res = self.sink.run(Box::pin(accepted)).await;
        match &res {
            Ok(()) => tracing::info!(pipeline = %self.name, "pipeline finished"),
            Err(e) => tracing::error!(pipeline = %self.name, error = %e, "pipeline failed"),
        }
        res
    }
}
