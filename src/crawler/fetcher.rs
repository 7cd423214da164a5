//! HTTP fetcher implementation
//!
//! This module defines what the orchestrator asks for ([`FetchRequest`]),
//! what it gets back ([`FetchOutcome`]), and the [`NetworkFetcher`] seam
//! between the two. [`HttpFetcher`] is the reqwest-backed implementation:
//! - Builds one cookie-keeping client per session (form tokens are session bound)
//! - Sends GET requests or url-encoded form POSTs
//! - Applies per-request timeout overrides
//! - Maps transport errors onto retryable categories

use crate::config::SiteConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{redirect::Policy, Client};
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Search strategy of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchMode {
    /// Case-number search through the search form
    ByIdentifier,
    /// Party tax-id enumeration through the stable route
    ByParty,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ByIdentifier => "numero",
            Self::ByParty => "cnpj",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "numero" => Some(Self::ByIdentifier),
            "cnpj" => Some(Self::ByParty),
            _ => None,
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of endpoint a request targets; selects the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    Form,
    Detail,
    List,
    StableRoute,
}

impl EndpointClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Form => "form",
            Self::Detail => "detail",
            Self::List => "list",
            Self::StableRoute => "stable_route",
        }
    }
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// One request issued by a job
///
/// Requests are never mutated after being issued; a retry is a new request
/// built with [`FetchRequest::retried`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: Url,
    pub method: HttpMethod,
    /// Form fields in submission order (POST only)
    pub form_fields: Option<Vec<(String, String)>>,
    pub search_mode: SearchMode,
    pub page_index: u32,
    pub target: String,
    pub endpoint: EndpointClass,
    pub retry_count: u32,
    pub timeout_override: Option<Duration>,
}

impl FetchRequest {
    /// Creates a GET request
    pub fn get(
        url: Url,
        endpoint: EndpointClass,
        search_mode: SearchMode,
        target: &str,
        page_index: u32,
    ) -> Self {
        Self {
            url,
            method: HttpMethod::Get,
            form_fields: None,
            search_mode,
            page_index,
            target: target.to_string(),
            endpoint,
            retry_count: 0,
            timeout_override: None,
        }
    }

    /// Creates a form submission
    pub fn submit(
        url: Url,
        method: HttpMethod,
        fields: Vec<(String, String)>,
        endpoint: EndpointClass,
        search_mode: SearchMode,
        target: &str,
    ) -> Self {
        let mut request = Self::get(url, endpoint, search_mode, target, 0);
        match method {
            HttpMethod::Post => {
                request.method = HttpMethod::Post;
                request.form_fields = Some(fields);
            }
            HttpMethod::Get => {
                request.url.query_pairs_mut().extend_pairs(fields);
            }
        }
        request
    }

    /// Builds the next attempt of this request
    ///
    /// # Arguments
    ///
    /// * `timeout_override` - Replaces the timeout when set, keeps the current one otherwise
    pub fn retried(&self, timeout_override: Option<Duration>) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            timeout_override: timeout_override.or(self.timeout_override),
            ..self.clone()
        }
    }
}

/// Category of a transport-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportFailureKind {
    Timeout,
    ConnectTimeout,
    ReadTimeout,
    ConnectionRefused,
    Dns,
    Tunnel,
    Other,
}

impl TransportFailureKind {
    /// Returns true for categories worth another attempt
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectTimeout => "connect_timeout",
            Self::ReadTimeout => "read_timeout",
            Self::ConnectionRefused => "connection_refused",
            Self::Dns => "dns",
            Self::Tunnel => "tunnel",
            Self::Other => "other",
        }
    }
}

/// A categorized transport failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub kind: TransportFailureKind,
    pub message: String,
}

impl TransportFailure {
    pub fn new(kind: TransportFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

/// Either a response or a transport failure, never both
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    Response {
        status: u16,
        /// URL after redirects
        final_url: String,
        headers: Vec<(String, String)>,
        body: String,
    },
    Failed(TransportFailure),
}

/// Result of one fetch, stamped with the time it completed
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub result: FetchResult,
    pub fetched_at: DateTime<Utc>,
}

impl FetchOutcome {
    pub fn response(status: u16, final_url: &str, body: impl Into<String>) -> Self {
        Self {
            result: FetchResult::Response {
                status,
                final_url: final_url.to_string(),
                headers: Vec::new(),
                body: body.into(),
            },
            fetched_at: Utc::now(),
        }
    }

    pub fn failed(failure: TransportFailure) -> Self {
        Self {
            result: FetchResult::Failed(failure),
            fetched_at: Utc::now(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match &self.result {
            FetchResult::Response { status, .. } => Some(*status),
            FetchResult::Failed(_) => None,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match &self.result {
            FetchResult::Response { body, .. } => Some(body.as_str()),
            FetchResult::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&TransportFailure> {
        match &self.result {
            FetchResult::Failed(failure) => Some(failure),
            FetchResult::Response { .. } => None,
        }
    }
}

/// Transport seam used by the orchestrator
///
/// Implementations must report transport problems as categorized
/// [`TransportFailure`]s inside the outcome; they never return errors.
#[async_trait]
pub trait NetworkFetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The site configuration (user agent, timeout, redirects)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use trf5_crawler::config::SiteConfig;
/// use trf5_crawler::crawler::build_http_client;
///
/// let client = build_http_client(&SiteConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &SiteConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs_f64(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(config.max_redirects))
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed [`NetworkFetcher`]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &SiteConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl NetworkFetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(request.url.clone()),
            HttpMethod::Post => self.client.post(request.url.clone()),
        };
        if let Some(fields) = &request.form_fields {
            builder = builder.form(fields);
        }
        if let Some(timeout) = request.timeout_override {
            builder = builder.timeout(timeout);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return FetchOutcome::failed(classify_transport_error(&e, false)),
        };

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        match response.text().await {
            Ok(body) => FetchOutcome {
                result: FetchResult::Response {
                    status,
                    final_url,
                    headers,
                    body,
                },
                fetched_at: Utc::now(),
            },
            Err(e) => FetchOutcome::failed(classify_transport_error(&e, true)),
        }
    }
}

/// Maps a reqwest error onto a transport failure category
///
/// # Arguments
///
/// * `error` - The error returned by reqwest
/// * `reading_body` - Whether the error happened while reading the body
pub fn classify_transport_error(error: &reqwest::Error, reading_body: bool) -> TransportFailure {
    let mut chain = error.to_string().to_lowercase();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push_str(" | ");
        chain.push_str(&cause.to_string().to_lowercase());
        source = cause.source();
    }

    let kind = if chain.contains("dns")
        || chain.contains("failed to lookup address")
        || chain.contains("name or service not known")
        || chain.contains("no such host")
    {
        TransportFailureKind::Dns
    } else if chain.contains("tunnel") || chain.contains("proxy") {
        TransportFailureKind::Tunnel
    } else if error.is_timeout() && error.is_connect() {
        TransportFailureKind::ConnectTimeout
    } else if error.is_timeout() && reading_body {
        TransportFailureKind::ReadTimeout
    } else if error.is_timeout() {
        TransportFailureKind::Timeout
    } else if error.is_connect() {
        TransportFailureKind::ConnectionRefused
    } else {
        TransportFailureKind::Other
    };

    TransportFailure::new(kind, error.to_string())
}
