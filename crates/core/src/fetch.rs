use reqwest::{Client, Response, Url};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),
    #[error("server responded with HTTP {0}")]
    HttpStatus(u16),
    #[error(transparent)]
    Network(#[from] reqwest::Error),
}

/// Settings for the shared HTTP client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub user_agent: String,
    pub connect_timeout: Duration,
    /// Whole-request limit, body included. `None` lets large files take as long as they need.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            user_agent: concat!("bulkget/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: None,
        }
    }
}

/// Build the client every worker shares. Redirects follow reqwest's default policy.
pub fn build_client(options: &ClientOptions) -> Result<Client, FetchError> {
    let mut builder = Client::builder()
        .user_agent(options.user_agent.as_str())
        .connect_timeout(options.connect_timeout);
    if let Some(timeout) = options.request_timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

/// Issue a GET for `url` and hand back the response with its body still unread.
///
/// Transport failures and non-2xx statuses both come back as `Err`; a non-2xx
/// response is dropped here without reading its body.
pub async fn fetch_response(client: &Client, url: &str) -> Result<Response, FetchError> {
    let url = Url::parse(url)?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(FetchError::UnsupportedScheme(other.to_string())),
    }

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }
    Ok(response)
}

/// The response's `Content-Type` header, if present and valid UTF-8.
pub fn content_type(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}
