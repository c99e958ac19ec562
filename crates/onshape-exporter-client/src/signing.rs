//! Onshape API key request signing.
//!
//! Every request carries three headers derived from the API key pair:
//!
//! - `Date`: current UTC time as an HTTP-date, second precision
//! - `On-Nonce`: 25 random bytes, base64url-encoded without padding
//! - `Authorization`: `On {access_key}:HmacSHA256:{signature}`
//!
//! The signature is the base64 HMAC-SHA256 of the lowercased canonical string
//!
//! ```text
//! method \n nonce \n date \n content-type \n path \n query \n
//! ```
//!
//! The query string is signed exactly as it is sent, so [`encode_query`] is
//! also what the client uses to build request URLs.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, DATE};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Random bytes per nonce.
const NONCE_BYTES: usize = 25;

/// HTTP-date layout, e.g. `Mon, 19 Oct 2026 12:00:00 GMT`.
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Nonce header name.
pub const ON_NONCE: &str = "on-nonce";

/// Characters left unescaped in query keys and values. Space becomes `+`.
const QUERY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~');

/// Onshape API key pair.
///
/// The secret key never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key: String,
    secret_key: String,
}

impl Credentials {
    /// Environment variable holding the access key.
    pub const ACCESS_KEY_ENV: &'static str = "ONSHAPE_ACCESS_KEY";
    /// Environment variable holding the secret key.
    pub const SECRET_KEY_ENV: &'static str = "ONSHAPE_SECRET_KEY";

    /// Create credentials from an access/secret key pair.
    #[must_use]
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Load credentials from `ONSHAPE_ACCESS_KEY` and `ONSHAPE_SECRET_KEY`.
    ///
    /// # Errors
    ///
    /// Returns error if either variable is unset or not valid unicode.
    pub fn from_env() -> Result<Self, SigningError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, SigningError> {
        let read = |name: &'static str| var(name).ok_or(SigningError::MissingCredential(name));
        Ok(Self::new(
            read(Self::ACCESS_KEY_ENV)?,
            read(Self::SECRET_KEY_ENV)?,
        ))
    }

    /// The public access key.
    #[must_use]
    pub fn access_key(&self) -> &str {
        &self.access_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Computes Onshape authorization headers.
#[derive(Debug, Clone)]
pub struct Signer {
    credentials: Credentials,
}

impl Signer {
    /// Create a signer for the given key pair.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// The key pair this signer uses.
    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Sign a request in place with a fresh nonce and the current time.
    ///
    /// `Content-Type` must already be present in `headers`; it is part of
    /// the signed string. `query` is the encoded query string as sent.
    ///
    /// # Errors
    ///
    /// Returns error if a header value is not valid for HTTP.
    pub fn sign(
        &self,
        method: &str,
        path: &str,
        query: &str,
        headers: &mut HeaderMap,
    ) -> Result<(), SigningError> {
        let nonce = generate_nonce();
        let date = http_date(Utc::now());
        let content_type = match headers.get(CONTENT_TYPE) {
            Some(value) => value
                .to_str()
                .map_err(|e| SigningError::InvalidHeader(format!("content-type: {e}")))?,
            None => "",
        };

        let signature = self.signature(method, &nonce, &date, content_type, path, query)?;
        let authorization = format!(
            "On {}:HmacSHA256:{signature}",
            self.credentials.access_key
        );

        headers.insert(DATE, header_value(&date)?);
        headers.insert(HeaderName::from_static(ON_NONCE), header_value(&nonce)?);
        headers.insert(AUTHORIZATION, header_value(&authorization)?);

        Ok(())
    }

    /// Compute the base64 signature for fixed request parameters.
    ///
    /// # Errors
    ///
    /// Returns error if the secret key cannot key the HMAC.
    pub fn signature(
        &self,
        method: &str,
        nonce: &str,
        date: &str,
        content_type: &str,
        path: &str,
        query: &str,
    ) -> Result<String, SigningError> {
        let canonical =
            format!("{method}\n{nonce}\n{date}\n{content_type}\n{path}\n{query}\n").to_lowercase();

        let mut mac = HmacSha256::new_from_slice(self.credentials.secret_key.as_bytes())
            .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        mac.update(canonical.as_bytes());

        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

/// Generate a fresh request nonce.
#[must_use]
pub fn generate_nonce() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; NONCE_BYTES]>())
}

/// Format a timestamp as an HTTP-date with second precision.
#[must_use]
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE_FORMAT).to_string()
}

/// Form-encode query pairs in the order given.
///
/// # Examples
///
/// ```
/// use onshape_exporter_client::signing::encode_query;
///
/// let query = vec![
///     ("mode".to_string(), "binary".to_string()),
///     ("configuration".to_string(), "a=b c".to_string()),
/// ];
/// assert_eq!(encode_query(&query), "mode=binary&configuration=a%3Db+c");
/// ```
#[must_use]
pub fn encode_query(query: &[(String, String)]) -> String {
    query
        .iter()
        .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn encode_component(s: &str) -> String {
    // '%' is always escaped, so "%20" can only come from a space.
    utf8_percent_encode(s, QUERY_ESCAPE)
        .to_string()
        .replace("%20", "+")
}

fn header_value(value: &str) -> Result<HeaderValue, SigningError> {
    HeaderValue::from_str(value).map_err(|e| SigningError::InvalidHeader(e.to_string()))
}

/// Errors that can occur while signing a request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SigningError {
    /// A credential environment variable is not set
    #[error("missing credential: {0} is not set")]
    MissingCredential(&'static str),
    /// The secret key was rejected by the HMAC
    #[error("invalid secret key: {0}")]
    InvalidKey(String),
    /// A signed header value is not valid for HTTP
    #[error("invalid header value: {0}")]
    InvalidHeader(String),
}
