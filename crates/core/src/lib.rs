pub mod download_manager;
pub mod fetch;
pub mod filename;
pub mod output;
pub mod report;
pub mod source;
pub mod worker;

pub use download_manager::{DownloadError, DownloadManager, DownloadManagerConfig};
pub use fetch::{build_client, fetch_response, ClientOptions, FetchError};
pub use filename::{extension_for_content_type, resolve_filename, FilenameError};
pub use output::ensure_output_dir;
pub use report::{ConsoleReporter, FetchResult, MemoryReporter, ResultSink, RunSummary};
pub use source::{produce_urls, SourceError, UrlSource};
