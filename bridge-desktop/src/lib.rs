//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop hosts
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! Only the HTTP stack has a sensible desktop default: `HttpClient` using
//! `reqwest` with rustls. The audio backend and share sheet are always
//! supplied by the embedding application.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::ReqwestHttpClient;
//! use std::sync::Arc;
//!
//! let http = Arc::new(ReqwestHttpClient::new()?);
//! let config = SessionConfig::builder()
//!     .http_client(http)
//!     // ...
//! ```

mod http;

pub use http::ReqwestHttpClient;
