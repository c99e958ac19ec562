//! # Onshape Client
//!
//! HMAC-signed HTTP client for the Onshape REST API.
//!
//! ## Authentication
//!
//! Requests are signed with an API key pair (see [`signing`]). Each request
//! gets a fresh nonce and `Date`, so concurrent calls share nothing but the
//! connection pool.
//!
//! ## Redirects
//!
//! Exports answer with `307 Temporary Redirect`. The client follows these
//! itself, re-signing a bare GET to the new location, up to a configurable
//! hop limit.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod endpoints;
pub mod signing;

pub use client::{
    ApiRequest, ApiResponse, ClientError, OnshapeClient, OnshapeClientConfig, DEFAULT_BASE_URL,
};
pub use endpoints::ShadedViewOptions;
pub use signing::{Credentials, Signer, SigningError};
