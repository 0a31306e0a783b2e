use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::AsyncBufRead;
use tokio::sync::{mpsc, Mutex};
use tokio::task;
use tokio_util::sync::CancellationToken;

use crate::fetch::{build_client, ClientOptions, FetchError};
use crate::output::ensure_output_dir;
use crate::report::{run_reporter, FetchResult, ResultSink, RunSummary};
use crate::source::{produce_urls, SourceError, UrlSource};
use crate::worker::Worker;

/// Errors that end a whole run. Per-URL failures never show up here; they become
/// failed `FetchResult`s instead.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("unable to create destination directory {path}: {source}")]
    OutputDir { path: PathBuf, source: io::Error },
    #[error("unable to create new file {path}: {source}")]
    CreateFile { path: PathBuf, source: io::Error },
    #[error("unable to build HTTP client: {0}")]
    Client(#[source] FetchError),
    #[error("pipeline task failed: {0}")]
    Join(#[from] task::JoinError),
    #[error("download cancelled")]
    Cancelled,
}

/// Download manager configuration
#[derive(Debug, Clone)]
pub struct DownloadManagerConfig {
    pub dest_dir: PathBuf,
    pub workers: usize,
    /// Capacity of the URL queue; a full queue holds the producer back.
    pub queue_capacity: usize,
    pub source: UrlSource,
    pub client: ClientOptions,
}

impl Default for DownloadManagerConfig {
    fn default() -> Self {
        Self::new("out", 4)
    }
}

impl DownloadManagerConfig {
    /// Config reading stdin, with the URL queue as deep as the pool is wide.
    pub fn new(dest_dir: impl Into<PathBuf>, workers: usize) -> Self {
        Self {
            dest_dir: dest_dir.into(),
            workers,
            queue_capacity: workers,
            source: UrlSource::Stdin,
            client: ClientOptions::default(),
        }
    }

    pub fn with_source(mut self, source: UrlSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_client_options(mut self, client: ClientOptions) -> Self {
        self.client = client;
        self
    }
}

/// Producer -> bounded URL queue -> worker pool -> result queue -> single reporter.
pub struct DownloadManager {
    config: DownloadManagerConfig,
}

impl DownloadManager {
    pub fn new(config: DownloadManagerConfig) -> Result<Self, DownloadError> {
        if config.workers == 0 {
            return Err(DownloadError::InvalidConfig("worker count must be at least 1".into()));
        }
        if config.queue_capacity == 0 {
            return Err(DownloadError::InvalidConfig("queue capacity must be at least 1".into()));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &DownloadManagerConfig {
        &self.config
    }

    /// Open the configured source and run the pipeline over it.
    ///
    /// The source is opened before the destination directory is touched, so a missing
    /// input file fails without side effects.
    pub async fn run(
        &self,
        sink: Box<dyn ResultSink>,
        cancel: CancellationToken,
    ) -> Result<RunSummary, DownloadError> {
        let reader = self.config.source.open().await?;
        self.run_with_reader(reader, sink, cancel).await
    }

    /// Run the pipeline over URLs read from `reader`.
    ///
    /// Shutdown order: the producer closes the URL queue, the workers drain it and exit,
    /// the result queue is closed, the reporter drains it, and only then is the sink told
    /// the run finished. A fatal error in any worker stops the others and is returned
    /// once everything has wound down.
    pub async fn run_with_reader<R>(
        &self,
        reader: R,
        sink: Box<dyn ResultSink>,
        cancel: CancellationToken,
    ) -> Result<RunSummary, DownloadError>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let dest_dir = &self.config.dest_dir;
        ensure_output_dir(dest_dir).map_err(|source| DownloadError::OutputDir {
            path: dest_dir.clone(),
            source,
        })?;
        let client = build_client(&self.config.client).map_err(DownloadError::Client)?;

        // Fatal errors cancel this token only, never the caller's.
        let stop = cancel.child_token();

        let (url_tx, url_rx) = mpsc::channel::<String>(self.config.queue_capacity);
        let (result_tx, result_rx) = mpsc::unbounded_channel::<FetchResult>();
        let url_rx = Arc::new(Mutex::new(url_rx));

        let reporter = task::spawn(run_reporter(result_rx, sink));

        let mut workers = Vec::with_capacity(self.config.workers);
        for id in 0..self.config.workers {
            let worker = Worker::new(id, client.clone(), dest_dir.clone(), stop.clone());
            let urls = Arc::clone(&url_rx);
            let results = result_tx.clone();
            let stop = stop.clone();
            workers.push(task::spawn(async move {
                let outcome = worker.run(urls, results).await;
                if outcome.is_err() {
                    stop.cancel();
                }
                outcome
            }));
        }
        drop(url_rx);

        let producer = {
            let stop = stop.clone();
            task::spawn(async move { produce_urls(reader, url_tx, &stop).await })
        };

        let mut first_error: Option<DownloadError> = None;
        let queued = match producer.await {
            Ok(Ok(queued)) => queued,
            Ok(Err(e)) => {
                first_error = Some(e.into());
                0
            }
            Err(e) => {
                stop.cancel();
                first_error = Some(e.into());
                0
            }
        };

        for handle in workers {
            match handle.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    stop.cancel();
                    first_error.get_or_insert(e.into());
                }
            }
        }

        // Every worker has exited, so nothing can send on the result queue any more.
        drop(result_tx);
        let (mut sink, summary) = reporter.await?;

        log::info!(
            "{queued} urls queued, {} completed, {} failed",
            summary.completed,
            summary.failed
        );

        if let Some(e) = first_error {
            return Err(e);
        }
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        sink.finish(&summary);
        Ok(summary)
    }
}
