use std::borrow::Cow;
use std::io::ErrorKind;
use std::path::PathBuf;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("input file {0} not found")]
    NotFound(PathBuf),
    #[error("unable to read input: {0}")]
    Io(#[from] std::io::Error),
}

/// Where the newline-delimited URL list comes from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum UrlSource {
    #[default]
    Stdin,
    File(PathBuf),
}

pub type UrlReader = Box<dyn AsyncBufRead + Unpin + Send>;

impl UrlSource {
    /// Open the source. A missing file is reported as `SourceError::NotFound`.
    pub async fn open(&self) -> Result<UrlReader, SourceError> {
        match self {
            UrlSource::Stdin => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
            UrlSource::File(path) => match tokio::fs::File::open(path).await {
                Ok(file) => Ok(Box::new(BufReader::new(file))),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    Err(SourceError::NotFound(path.clone()))
                }
                Err(e) => Err(SourceError::Io(e)),
            },
        }
    }
}

/// Feed every non-blank line of `reader` into `queue`, trimmed.
///
/// Lines are not required to be UTF-8; invalid bytes are replaced and the URL is
/// left to fail on its own when fetched.
///
/// Returns how many URLs were queued. The queue is closed when this returns, since
/// `queue` is the only sender and is dropped here. Stops early, without error, when
/// `cancel` fires or every receiver is gone.
pub async fn produce_urls<R>(
    reader: R,
    queue: Sender<String>,
    cancel: &CancellationToken,
) -> Result<usize, SourceError>
where
    R: AsyncBufRead + Unpin,
{
    let mut reader = reader;
    let mut buf = Vec::new();
    let mut queued = 0;

    loop {
        buf.clear();
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            read = reader.read_until(b'\n', &mut buf) => read?,
        };
        if read == 0 {
            break;
        }

        let line = String::from_utf8_lossy(&buf);
        if matches!(line, Cow::Owned(_)) {
            log::warn!("input line {} is not valid UTF-8", line.trim());
        }
        let url = line.trim();
        if url.is_empty() {
            continue;
        }

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = queue.send(url.to_string()) => sent,
        };
        if sent.is_err() {
            log::warn!("url queue closed early, {queued} urls queued");
            break;
        }
        queued += 1;
    }

    log::debug!("input exhausted after {queued} urls");
    Ok(queued)
}
