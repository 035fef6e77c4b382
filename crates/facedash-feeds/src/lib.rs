//! facedash-feeds — Dashboard data sources.
//!
//! News headlines come from NewsAPI and stock quotes from Yahoo Finance.
//! Every lookup degrades to built-in sample data instead of failing, so
//! the dashboard always has something to show on a flaky connection.

pub mod news;
pub mod samples;
pub mod stocks;

use std::time::Duration;
use thiserror::Error;

pub use news::Headlines;
pub use stocks::Quote;

const DEFAULT_NEWS_URL: &str = "https://newsapi.org/v2/top-headlines";
const DEFAULT_QUOTE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = concat!("facedash/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("no news API key configured")]
    MissingApiKey,
}

/// Endpoints, credentials and deadlines.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub news_api_key: Option<String>,
    pub news_url: String,
    pub quote_url: String,
    /// Timeout for each HTTP request.
    pub request_timeout: Duration,
    /// Deadline shared by all requests of one refresh.
    pub overall_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            news_api_key: None,
            news_url: DEFAULT_NEWS_URL.to_string(),
            quote_url: DEFAULT_QUOTE_URL.to_string(),
            request_timeout: Duration::from_secs(5),
            overall_timeout: Duration::from_secs(10),
        }
    }
}

impl FeedConfig {
    /// Defaults overridden by `FACEDASH_NEWS_API_KEY`, `FACEDASH_NEWS_URL`
    /// and `FACEDASH_QUOTE_URL`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.news_api_key = std::env::var("FACEDASH_NEWS_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        if let Ok(url) = std::env::var("FACEDASH_NEWS_URL") {
            config.news_url = url;
        }
        if let Ok(url) = std::env::var("FACEDASH_QUOTE_URL") {
            config.quote_url = url;
        }
        config
    }
}

/// Shared HTTP client for both feeds.
#[derive(Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    config: FeedConfig,
}

impl FeedClient {
    pub fn new(config: FeedConfig) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { http, config })
    }
}

/// Run `fetch` for every key concurrently under one shared deadline.
///
/// Keys still pending at the deadline are aborted and absent from the result.
pub(crate) async fn gather<T, F, Fut>(
    keys: &[String],
    deadline: Duration,
    fetch: F,
) -> std::collections::HashMap<String, Result<T, FeedError>>
where
    T: Send + 'static,
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = Result<T, FeedError>> + Send + 'static,
{
    let mut set = tokio::task::JoinSet::new();
    for key in keys {
        let fut = fetch(key.clone());
        let key = key.clone();
        set.spawn(async move { (key, fut.await) });
    }

    let until = tokio::time::Instant::now() + deadline;
    let mut results = std::collections::HashMap::new();
    loop {
        match tokio::time::timeout_at(until, set.join_next()).await {
            Ok(Some(Ok((key, result)))) => {
                results.insert(key, result);
            }
            Ok(Some(Err(e))) => tracing::warn!(error = %e, "feed task failed"),
            Ok(None) => break,
            Err(_) => {
                tracing::warn!(pending = set.len(), "feed deadline reached");
                set.abort_all();
                break;
            }
        }
    }
    results
}

/// Loopback HTTP endpoints for exercising the clients without a network.
#[cfg(test)]
pub(crate) mod testserver {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accepts connections and never answers. Returns the base URL.
    pub async fn silent() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{addr}")
    }

    /// Answers every request with `200 OK` and a JSON `body`.
    pub async fn json(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{addr}")
    }
}
