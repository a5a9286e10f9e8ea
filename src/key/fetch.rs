//! Fetching subscription feeds over HTTP

use crate::key::parser::FeedParser;
use crate::Result;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for feed downloads in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default user agent; feeds routinely refuse unknown clients
const DEFAULT_USER_AGENT: &str = "v2rayNG/1.8.5";

/// Environment variable holding newline-separated feed URLs
pub const SOURCES_ENV_VAR: &str = "SUBSCRIPTION_URLS";

/// Default feed list file in the working directory
pub const SOURCES_FILE: &str = "subscriptions.txt";

/// Result of fetching a single feed
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// The feed URL that was fetched
    pub source: String,
    /// Keys extracted from the feed
    pub keys: Vec<String>,
    /// Error message if fetching failed
    pub error: Option<String>,
}

impl FetchResult {
    /// Create a successful fetch result
    pub fn success(source: String, keys: Vec<String>) -> Self {
        Self {
            source,
            keys,
            error: None,
        }
    }

    /// Create a failed fetch result
    pub fn failure(source: String, error: String) -> Self {
        Self {
            source,
            keys: Vec::new(),
            error: Some(error),
        }
    }

    /// Check if the fetch was successful
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Configuration for the subscription fetcher
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Timeout for feed downloads
    pub timeout: Duration,
    /// User agent sent to feed servers
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetcherConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the download timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent
    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Fetcher for downloading and parsing subscription feeds
pub struct SubscriptionFetcher {
    client: Client,
}

impl SubscriptionFetcher {
    /// Create a new fetcher with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(FetcherConfig::default())
    }

    /// Create a new fetcher with custom configuration
    pub fn with_config(config: FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .no_proxy()
            .build()?;

        Ok(Self { client })
    }

    /// Fetch one feed and extract its keys
    pub async fn fetch_url(&self, url: &str) -> Result<Vec<String>> {
        debug!("fetching feed {}", url);
        let response = self.client.get(url).send().await?;
        let response = response.error_for_status()?;
        let content = response.text().await?;
        Ok(FeedParser::parse_string(&content))
    }

    /// Fetch multiple feeds, returning a result for each source
    pub async fn fetch_urls_with_results(&self, urls: &[String]) -> Vec<FetchResult> {
        let mut results = Vec::new();

        for url in urls {
            let result = match self.fetch_url(url).await {
                Ok(keys) => FetchResult::success(url.clone(), keys),
                Err(e) => {
                    warn!("failed to fetch {}: {}", url, e);
                    FetchResult::failure(url.clone(), e.to_string())
                }
            };
            results.push(result);
        }

        results
    }
}

/// Gather feed URLs from explicit arguments, a URL file, the environment
/// and the default feed list
///
/// Blank lines and lines starting with '#' are skipped. The default file is
/// only consulted when the other sources produced nothing.
pub fn load_source_urls(explicit: &[String], url_file: Option<&Path>) -> Result<Vec<String>> {
    let mut urls: Vec<String> = explicit.to_vec();

    if let Some(path) = url_file {
        let content = std::fs::read_to_string(path)?;
        urls.extend(feed_lines(&content));
    }

    if let Ok(env_urls) = std::env::var(SOURCES_ENV_VAR) {
        urls.extend(feed_lines(&env_urls));
    }

    if urls.is_empty() && Path::new(SOURCES_FILE).exists() {
        let content = std::fs::read_to_string(SOURCES_FILE)?;
        urls.extend(feed_lines(&content));
    }

    Ok(urls)
}

fn feed_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}
