//! # Podcast API Provider
//!
//! Implements the podcast service bridge traits over the HTTP backend.
//!
//! ## Overview
//!
//! This module provides:
//! - Listening progress and listen-completion reports
//! - Bookmark listing, creation and deletion
//! - Resume position lookup
//! - Chapter markers
//! - AI summary, quotes and highlights (generate or read cached)
//!
//! Every request goes through the injected [`HttpClient`](bridge_traits::HttpClient),
//! so hosts choose the HTTP stack and tests replace it with a mock.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::PodcastApiConnector;
pub use error::{PodcastApiError, Result};
