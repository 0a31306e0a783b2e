use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use bulkget_core::{
    ClientOptions, ConsoleReporter, DownloadError, DownloadManager, DownloadManagerConfig,
    UrlSource,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(version, about = "Download a list of URLs in parallel")]
struct Cli {
    /// File with one URL per line; reads stdin when omitted
    #[arg(long, value_name = "FILE")]
    urls_file: Option<PathBuf>,

    /// Destination folder
    #[arg(long, value_name = "DIR", default_value = "out")]
    dest: PathBuf,

    /// Maximum parallel workers
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..))]
    max_workers: u16,

    /// Capacity of the URL queue (defaults to the worker count)
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    queue_capacity: Option<u16>,

    /// Give up on a single download after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Connect timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    connect_timeout: u64,

    /// Log progress details to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> DownloadManagerConfig {
        let workers = usize::from(self.max_workers);
        let source = match self.urls_file {
            Some(path) => UrlSource::File(path),
            None => UrlSource::Stdin,
        };
        let client = ClientOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout),
            request_timeout: self.timeout.map(Duration::from_secs),
            ..ClientOptions::default()
        };
        DownloadManagerConfig::new(self.dest, workers)
            .with_queue_capacity(self.queue_capacity.map_or(workers, usize::from))
            .with_source(source)
            .with_client_options(client)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let manager = match DownloadManager::new(cli.into_config()) {
        Ok(manager) => manager,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("interrupted, stopping workers");
                cancel.cancel();
            }
        });
    }

    let code = match manager.run(Box::new(ConsoleReporter::stdout()), cancel).await {
        Ok(_) => return ExitCode::SUCCESS,
        Err(DownloadError::Cancelled) => {
            eprintln!("cancelled");
            130
        }
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    };
    // Exit right away: a stdin read abandoned mid-line would keep the runtime from shutting down.
    std::process::exit(code);
}
