use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedReceiver;

/// Outcome of one URL's download attempt. Exactly one is produced per URL taken off the queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchResult {
    pub url: String,
    pub ok: bool,
    /// Name of the file written under the destination directory. Also set on a failed
    /// result when the body copy broke off after the file was created.
    pub filename: Option<String>,
}

impl FetchResult {
    pub fn completed(url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ok: true,
            filename: Some(filename.into()),
        }
    }

    pub fn failed(url: impl Into<String>, filename: Option<String>) -> Self {
        Self {
            url: url.into(),
            ok: false,
            filename,
        }
    }

    /// The filename, or "" when none was written.
    pub fn filename_or_empty(&self) -> &str {
        self.filename.as_deref().unwrap_or("")
    }
}

/// Totals accumulated by the reporter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn record(&mut self, result: &FetchResult) {
        if result.ok {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.completed + self.failed
    }
}

/// Where the single reporter sends each result.
pub trait ResultSink: Send {
    fn record(&mut self, result: &FetchResult);

    /// Called once after the result queue has been drained on a clean run.
    fn finish(&mut self, _summary: &RunSummary) {}
}

/// Drain `results` into `sink` until every sender is gone, then hand the sink back.
pub async fn run_reporter(
    mut results: UnboundedReceiver<FetchResult>,
    mut sink: Box<dyn ResultSink>,
) -> (Box<dyn ResultSink>, RunSummary) {
    let mut summary = RunSummary::default();
    while let Some(result) = results.recv().await {
        if result.ok {
            log::debug!("{} -> {}", result.url, result.filename_or_empty());
        } else {
            log::debug!("{} failed", result.url);
        }
        summary.record(&result);
        sink.record(&result);
    }
    (sink, summary)
}

/// Prints `Download completed: <name>` / `Download failed: <name>` lines and a final `Completed`.
pub struct ConsoleReporter<W: Write + Send> {
    out: W,
}

impl ConsoleReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write + Send> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> ResultSink for ConsoleReporter<W> {
    fn record(&mut self, result: &FetchResult) {
        let line = if result.ok {
            format!("Download completed: {}", result.filename_or_empty())
        } else {
            format!("Download failed: {}", result.filename_or_empty())
        };
        // A closed stdout must not take the pipeline down with it.
        if let Err(e) = writeln!(self.out, "{line}") {
            log::warn!("could not write result line: {e}");
        }
    }

    fn finish(&mut self, _summary: &RunSummary) {
        if let Err(e) = writeln!(self.out, "Completed").and_then(|_| self.out.flush()) {
            log::warn!("could not write completion marker: {e}");
        }
    }
}

/// Keeps every result in memory. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemoryReporter {
    inner: Arc<Mutex<Vec<FetchResult>>>,
    finished: Arc<Mutex<Option<RunSummary>>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<FetchResult> {
        self.inner.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// The summary passed to `finish`, if the run got that far.
    pub fn finished(&self) -> Option<RunSummary> {
        self.finished.lock().ok().and_then(|s| *s)
    }
}

impl ResultSink for MemoryReporter {
    fn record(&mut self, result: &FetchResult) {
        if let Ok(mut results) = self.inner.lock() {
            results.push(result.clone());
        }
    }

    fn finish(&mut self, summary: &RunSummary) {
        if let Ok(mut finished) = self.finished.lock() {
            *finished = Some(*summary);
        }
    }
}
