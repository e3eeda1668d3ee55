//! Blocking Wayback Machine CDX client with an injected timeout and cancellable requests.

use super::error::LookupError;
use crate::cancel::CancelToken;
use reqwest::StatusCode;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

/// Host of the archive itself. URLs on it are never looked up.
pub const WAYBACK_HOST: &str = "web.archive.org";

const DEFAULT_ENDPOINT: &str = "https://web.archive.org/cdx/search/cdx";
const DEFAULT_USER_AGENT: &str = concat!("webarchive/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
const MAX_REDIRECTS: usize = 10;
/// How often a waiting lookup re-checks the cancellation token.
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// One URL in, one archived URL out. The resolver only sees this trait.
pub trait Lookup {
    fn lookup(&self, url: &str, cancel: &CancelToken) -> Result<String, LookupError>;
}

/// Build the archived address for `url` from CDX rows (header row, then data row).
///
/// Only `rows[0]` and `rows[1]` are consulted; extra rows are ignored.
pub fn snapshot_url(rows: &[Vec<String>], url: &str) -> Result<String, LookupError> {
    let malformed = || LookupError::MalformedResponse {
        rows: rows.to_vec(),
    };
    if rows.len() < 2 || rows[0].len() != rows[1].len() {
        return Err(malformed());
    }
    let ts_index = rows[0]
        .iter()
        .position(|column| column == "timestamp")
        .ok_or_else(malformed)?;
    Ok(format!(
        "https://{}/{}/{}",
        WAYBACK_HOST, rows[1][ts_index], url
    ))
}

/// CDX index client. Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct WaybackClient {
    inner: reqwest::blocking::Client,
    endpoint: String,
    from: Option<String>,
}

impl WaybackClient {
    /// Client with default timeout, user agent and endpoint, and no date filter.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::builder().build()
    }

    pub fn builder() -> WaybackClientBuilder {
        WaybackClientBuilder::default()
    }

    /// Lower date bound sent with every lookup, if any.
    pub fn from_date(&self) -> Option<&str> {
        self.from.as_deref()
    }

    /// Plain GET returning the body as text. Used to read a remote input source.
    pub fn fetch_text(&self, url: &str) -> Result<String, reqwest::Error> {
        self.inner.get(url).send()?.error_for_status()?.text()
    }

    fn request(&self, url: &str) -> Result<reqwest::blocking::Request, reqwest::Error> {
        let mut builder = self
            .inner
            .get(&self.endpoint)
            .query(&[("output", "json"), ("limit", "1"), ("url", url)]);
        if let Some(from) = &self.from {
            builder = builder.query(&[("from", from.as_str())]);
        }
        builder.build()
    }
}

/// Send the CDX request and decode the JSON rows. Runs on a worker thread.
fn fetch_rows(
    client: &reqwest::blocking::Client,
    request: reqwest::blocking::Request,
    url: &str,
) -> Result<Vec<Vec<String>>, LookupError> {
    let response = client
        .execute(request)
        .map_err(|source| LookupError::Connectivity { source })?;
    if response.status() == StatusCode::NOT_FOUND {
        return Err(LookupError::NotFound {
            url: url.to_string(),
        });
    }
    response
        .error_for_status()
        .and_then(|r| r.json::<Vec<Vec<String>>>())
        .map_err(|source| LookupError::Connectivity { source })
}

impl Lookup for WaybackClient {
    /// Most recent snapshot for `url` (respecting `from`), as `https://web.archive.org/<ts>/<url>`.
    ///
    /// The request runs on a worker thread so that cancellation can abandon it mid-flight.
    fn lookup(&self, url: &str, cancel: &CancelToken) -> Result<String, LookupError> {
        let cancelled = || LookupError::Cancelled {
            url: url.to_string(),
        };
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        let request = self
            .request(url)
            .map_err(|source| LookupError::Connectivity { source })?;

        let (tx, rx) = mpsc::channel();
        let client = self.inner.clone();
        let target = url.to_string();
        let worker = std::thread::spawn(move || {
            let _ = tx.send(fetch_rows(&client, request, &target));
        });

        loop {
            match rx.recv_timeout(CANCEL_POLL) {
                Ok(rows) => return snapshot_url(&rows?, url),
                Err(RecvTimeoutError::Timeout) => {
                    if cancel.is_cancelled() {
                        // The worker finishes on its own; its result is dropped.
                        return Err(cancelled());
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // The sender only goes away unused if the worker panicked.
                    if let Err(panic) = worker.join() {
                        std::panic::resume_unwind(panic);
                    }
                    return Err(cancelled());
                }
            }
        }
    }
}

/// Builder for [WaybackClient]: timeout, user agent, `from` filter and endpoint.
#[derive(Debug)]
pub struct WaybackClientBuilder {
    timeout: Duration,
    user_agent: Option<String>,
    from: Option<String>,
    endpoint: String,
}

impl Default for WaybackClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: None,
            from: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

impl WaybackClientBuilder {
    /// Per-request timeout. Default 10 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Custom User-Agent. Default `webarchive/<version>`.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Only consider snapshots taken on or after this date (YYYYMMDD).
    pub fn from_date(mut self, from: Option<String>) -> Self {
        self.from = from.filter(|s| !s.is_empty());
        self
    }

    /// CDX search endpoint. Tests point this at a local mock server.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn build(self) -> Result<WaybackClient, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(self.timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(WaybackClient {
            inner,
            endpoint: self.endpoint,
            from: self.from,
        })
    }
}
