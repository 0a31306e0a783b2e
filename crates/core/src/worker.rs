use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use reqwest::{Client, Response};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::download_manager::DownloadError;
use crate::fetch::{content_type, fetch_response};
use crate::filename::resolve_filename;
use crate::report::FetchResult;

/// URL queue shared by all workers. Whoever holds the lock receives the next URL.
pub type SharedUrlQueue = Arc<Mutex<mpsc::Receiver<String>>>;

/// How many times a name is re-resolved after another worker claimed it first.
const CREATE_ATTEMPTS: usize = 8;

#[derive(Error, Debug)]
enum BodyError {
    #[error("reading response body: {0}")]
    Read(#[from] reqwest::Error),
    #[error("writing file: {0}")]
    Write(#[from] io::Error),
    #[error("cancelled")]
    Cancelled,
}

/// One member of the worker pool.
pub struct Worker {
    id: usize,
    client: Client,
    dest_dir: PathBuf,
    cancel: CancellationToken,
}

impl Worker {
    pub fn new(id: usize, client: Client, dest_dir: PathBuf, cancel: CancellationToken) -> Self {
        Self {
            id,
            client,
            dest_dir,
            cancel,
        }
    }

    /// Take URLs off `urls` until it is closed and drained (or `cancel` fires), sending
    /// one result per URL to `results`.
    ///
    /// Returns the number of URLs handled. An `Err` is a fatal error; the failed result
    /// for the URL that caused it has already been sent.
    pub async fn run(
        self,
        urls: SharedUrlQueue,
        results: UnboundedSender<FetchResult>,
    ) -> Result<usize, DownloadError> {
        let mut handled = 0;
        loop {
            let url = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                url = async { urls.lock().await.recv().await } => url,
            };
            let Some(url) = url else { break };
            handled += 1;

            let (result, fatal) = match self.download(&url).await {
                Ok(result) => (result, None),
                Err(e) => (FetchResult::failed(url.as_str(), None), Some(e)),
            };
            if results.send(result).is_err() {
                log::warn!("worker {}: result queue closed, stopping", self.id);
                break;
            }
            if let Some(e) = fatal {
                log::error!("worker {}: {e}", self.id);
                return Err(e);
            }
        }
        log::debug!("worker {} done after {handled} urls", self.id);
        Ok(handled)
    }

    /// Fetch one URL and save its body. The response never outlives this call.
    async fn download(&self, url: &str) -> Result<FetchResult, DownloadError> {
        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(FetchResult::failed(url, None)),
            fetched = fetch_response(&self.client, url) => fetched,
        };
        let response = match fetched {
            Ok(response) => response,
            Err(e) => {
                log::warn!("error while fetching {url}: {e}");
                return Ok(FetchResult::failed(url, None));
            }
        };

        let Some((filename, path, file)) = self.create_output(url, content_type(&response)).await?
        else {
            return Ok(FetchResult::failed(url, None));
        };

        match self.stream_body(file, response).await {
            Ok(bytes) => {
                log::debug!("wrote {bytes} bytes from {url} to {}", path.display());
                Ok(FetchResult::completed(url, filename))
            }
            Err(e) => {
                log::warn!("unable to write data to {}: {e}", path.display());
                Ok(FetchResult::failed(url, Some(filename)))
            }
        }
    }

    /// Resolve a name and create the file with create-new semantics.
    ///
    /// `Ok(None)` means no name could be derived for this URL; a file that cannot be
    /// created is fatal.
    async fn create_output(
        &self,
        url: &str,
        content_type: Option<&str>,
    ) -> Result<Option<(String, PathBuf, File)>, DownloadError> {
        let mut path = self.dest_dir.clone();
        for _ in 0..CREATE_ATTEMPTS {
            let filename = match resolve_filename(url, content_type, &self.dest_dir) {
                Ok(filename) => filename,
                Err(e) => {
                    log::warn!("unable to pick a filename for {url}: {e}");
                    return Ok(None);
                }
            };
            path = self.dest_dir.join(&filename);
            match create_new(&path).await {
                Ok(file) => return Ok(Some((filename, path, file))),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    log::debug!("{} was claimed concurrently, resolving again", path.display());
                }
                Err(source) => return Err(DownloadError::CreateFile { path, source }),
            }
        }
        Err(DownloadError::CreateFile {
            path,
            source: io::Error::new(ErrorKind::AlreadyExists, "no free filename found"),
        })
    }

    async fn stream_body(&self, file: File, response: Response) -> Result<u64, BodyError> {
        let mut writer = BufWriter::new(file);
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(BodyError::Cancelled),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        writer.flush().await?;
        Ok(written)
    }
}

async fn create_new(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path).await
}
