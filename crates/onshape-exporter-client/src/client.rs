//! Signed HTTP client for the Onshape REST API.
//!
//! Every request is signed with [`Signer`] right before it is sent. The
//! transport never follows redirects on its own: a `307 Temporary Redirect`
//! is followed here, by re-signing a bare GET against the `Location` target.
//! Long-running exports rely on this.
//!
//! Status codes are not interpreted beyond that. A `200` with a JSON content
//! type is decoded; everything else, including 4xx and 5xx, is handed back as
//! raw bytes for the caller to inspect.

use crate::signing::{encode_query, Credentials, Signer, SigningError};
use onshape_exporter_bom::BomParseError;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, LOCATION};
use reqwest::{redirect, Client, Method, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Default Onshape API host.
pub const DEFAULT_BASE_URL: &str = "https://cad.onshape.com";

/// Default number of 307 hops followed per call.
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

const JSON_MIME: &str = "application/json";

/// Onshape client configuration.
#[derive(Debug, Clone)]
pub struct OnshapeClientConfig {
    /// Base URL requests are sent to (e.g., <https://cad.onshape.com>)
    pub base_url: String,
    /// Optional transport timeout per request
    pub timeout: Option<Duration>,
    /// Maximum 307 hops followed by a single call
    pub max_redirects: usize,
}

impl Default for OnshapeClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl OnshapeClientConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ONSHAPE_BASE_URL`: API base URL
    /// - `ONSHAPE_TIMEOUT_SECS`: request timeout in seconds
    /// - `ONSHAPE_MAX_REDIRECTS`: 307 hop limit
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if a numeric variable cannot be parsed.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build configuration from a variable lookup, defaulting unset ones.
    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let mut config = Self::default();

        if let Some(url) = var("ONSHAPE_BASE_URL") {
            config.base_url = url;
        }

        if let Some(secs) = var("ONSHAPE_TIMEOUT_SECS") {
            let secs = secs
                .parse::<u64>()
                .map_err(|e| ClientError::Config(format!("invalid ONSHAPE_TIMEOUT_SECS: {e}")))?;
            config.timeout = Some(Duration::from_secs(secs));
        }

        if let Some(hops) = var("ONSHAPE_MAX_REDIRECTS") {
            config.max_redirects = hops
                .parse()
                .map_err(|e| ClientError::Config(format!("invalid ONSHAPE_MAX_REDIRECTS: {e}")))?;
        }

        Ok(config)
    }
}

/// A single API call: method, path, ordered query, headers and JSON body.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    json: Option<Value>,
    base_url: Option<String>,
}

impl ApiRequest {
    /// Create a request for `path` (e.g. `/api/documents`).
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            json: None,
            base_url: None,
        }
    }

    /// Create a GET request for `path`.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Append a query parameter. Order is kept as given.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Set caller headers. `Content-Type` is always sent as `application/json`.
    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.json = Some(body);
        self
    }

    /// Send to this base URL instead of the configured one.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// The request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The query parameters in send order.
    #[must_use]
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    /// Bare GET to a redirect target: no body, no caller headers.
    ///
    /// Blank values are dropped and a repeated key keeps its last value, in
    /// the position where the key first appeared.
    fn redirect_to(target: &Url) -> Self {
        let mut query: Vec<(String, String)> = Vec::new();
        for (key, value) in target.query_pairs().into_owned() {
            if value.is_empty() {
                continue;
            }
            match query.iter_mut().find(|(k, _)| *k == key) {
                Some(pair) => pair.1 = value,
                None => query.push((key, value)),
            }
        }

        Self {
            method: Method::GET,
            path: target.path().to_string(),
            query,
            headers: HeaderMap::new(),
            json: None,
            base_url: Some(target.origin().ascii_serialization()),
        }
    }
}

/// Response of a call: decoded JSON, or the untouched body.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    /// `200 OK` with a JSON content type
    Json(Value),
    /// Any other response body, regardless of status
    Raw(Vec<u8>),
}

impl ApiResponse {
    /// The JSON value, if the response was JSON.
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Raw(_) => None,
        }
    }

    /// The raw body, if the response was not JSON.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Json(_) => None,
            Self::Raw(bytes) => Some(bytes),
        }
    }

    /// Consume into the JSON value, if any.
    #[must_use]
    pub fn into_json(self) -> Option<Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Raw(_) => None,
        }
    }

    /// Consume into the raw body, if any.
    #[must_use]
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Self::Json(_) => None,
            Self::Raw(bytes) => Some(bytes),
        }
    }
}

/// HMAC-authenticated client for Onshape API operations.
///
/// The underlying connection pool is shared by all concurrent calls on the
/// same client. It is released by [`OnshapeClient::close`] or on drop.
pub struct OnshapeClient {
    http: Option<Client>,
    signer: Signer,
    config: OnshapeClientConfig,
}

impl OnshapeClient {
    /// Create a new Onshape client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new(credentials: Credentials, config: OnshapeClientConfig) -> Result<Self, ClientError> {
        let mut builder = Client::builder().redirect(redirect::Policy::none());

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        let http = builder
            .build()
            .map_err(|e| ClientError::Init(e.to_string()))?;

        tracing::debug!(
            base_url = %config.base_url,
            access_key = credentials.access_key(),
            "Created Onshape client"
        );

        Ok(Self {
            http: Some(http),
            signer: Signer::new(credentials),
            config,
        })
    }

    /// Create a client from `ONSHAPE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns error if credentials are missing or configuration is invalid.
    pub fn from_env() -> Result<Self, ClientError> {
        let credentials = Credentials::from_env()?;
        let config = OnshapeClientConfig::from_env()?;
        Self::new(credentials, config)
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &OnshapeClientConfig {
        &self.config
    }

    /// Release the connection pool. Safe to call more than once.
    pub fn close(&mut self) {
        if self.http.take().is_some() {
            tracing::debug!("Closed Onshape client");
        }
    }

    /// Whether [`OnshapeClient::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.http.is_none()
    }

    /// Perform a signed API call, following `307` redirects.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure, malformed redirects, exceeding the
    /// redirect limit, or a JSON response that does not decode. Error status
    /// codes are not errors; their bodies come back as [`ApiResponse::Raw`].
    pub async fn call(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let http = self.http.as_ref().ok_or(ClientError::Closed)?;
        let mut request = request;
        let mut hops = 0;

        loop {
            let response = self.send(http, &request).await?;
            let status = response.status();

            if status == StatusCode::OK && is_json(response.headers()) {
                let body = read_body(response).await?;
                let value =
                    serde_json::from_slice(&body).map_err(|e| ClientError::Parse(e.to_string()))?;
                return Ok(ApiResponse::Json(value));
            }

            if status == StatusCode::TEMPORARY_REDIRECT {
                if hops >= self.config.max_redirects {
                    tracing::warn!(
                        limit = self.config.max_redirects,
                        path = %request.path,
                        "Redirect limit exceeded"
                    );
                    return Err(ClientError::TooManyRedirects {
                        limit: self.config.max_redirects,
                    });
                }
                hops += 1;

                let target = redirect_target(&response)?;
                tracing::debug!(hop = hops, location = %target, "Following redirect");
                request = ApiRequest::redirect_to(&target);
                continue;
            }

            tracing::debug!(status = status.as_u16(), "Returning raw response body");
            return Ok(ApiResponse::Raw(read_body(response).await?));
        }
    }

    async fn send(&self, http: &Client, request: &ApiRequest) -> Result<Response, ClientError> {
        let mut headers = request.headers.clone();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_MIME));

        let query = encode_query(&request.query);
        self.signer
            .sign(request.method.as_str(), &request.path, &query, &mut headers)?;

        let base_url = request
            .base_url
            .as_deref()
            .unwrap_or(&self.config.base_url);
        let mut url = format!("{}{}", base_url.trim_end_matches('/'), request.path);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }
        let url = Url::parse(&url).map_err(|e| ClientError::InvalidUrl(format!("{url}: {e}")))?;

        tracing::debug!(method = %request.method, %url, "Sending request");

        let mut builder = http.request(request.method.clone(), url).headers(headers);
        if let Some(body) = &request.json {
            builder = builder.json(body);
        }

        builder
            .send()
            .await
            .map_err(|e| ClientError::Request(e.to_string()))
    }
}

/// Whether the response content type is `application/json`, ignoring parameters.
fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(JSON_MIME))
}

/// Resolve the `Location` of a redirect against the URL that produced it.
fn redirect_target(response: &Response) -> Result<Url, ClientError> {
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ClientError::MissingLocation)?;

    response
        .url()
        .join(location)
        .map_err(|e| ClientError::InvalidUrl(format!("{location}: {e}")))
}

async fn read_body(response: Response) -> Result<Vec<u8>, ClientError> {
    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| ClientError::Request(e.to_string()))
}

/// Errors that can occur with the Onshape client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// Client initialization failed
    #[error("client init error: {0}")]
    Init(String),
    /// Configuration could not be loaded
    #[error("config error: {0}")]
    Config(String),
    /// Network, TLS or timeout failure
    #[error("request error: {0}")]
    Request(String),
    /// A request or redirect URL could not be built
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// A 307 response had no usable `Location` header
    #[error("redirect without Location header")]
    MissingLocation,
    /// More consecutive 307 responses than allowed
    #[error("too many redirects (limit {limit})")]
    TooManyRedirects {
        /// Configured hop limit
        limit: usize,
    },
    /// A JSON response body could not be decoded
    #[error("parse error: {0}")]
    Parse(String),
    /// A JSON response was required but raw bytes arrived
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    /// Request signing failed
    #[error(transparent)]
    Signing(#[from] SigningError),
    /// The BOM payload was malformed
    #[error(transparent)]
    Bom(#[from] BomParseError),
    /// The client was already closed
    #[error("client is closed")]
    Closed,
}
