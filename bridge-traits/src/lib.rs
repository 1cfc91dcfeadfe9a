//! # Host Bridge Traits
//!
//! Contracts that the podcast session core requires from its host and from the
//! remote podcast service.
//!
//! ## Overview
//!
//! This crate defines the boundary between the session core and everything it
//! does not own: the audio engine that decodes and renders the waveform, the
//! HTTP stack, the wall clock, the share sheet, and the podcast backend. Each
//! trait represents a capability the core needs but that is implemented
//! differently per host or per deployment.
//!
//! ## Traits
//!
//! ### Audio
//! - [`AudioBackend`](transport::AudioBackend) - Creates one transport per session
//! - [`AudioTransport`](transport::AudioTransport) - load/play/pause/seek/volume/rate/dispose
//!
//! ### Podcast service
//! - [`ProgressApi`](podcast::ProgressApi) - Listening progress and completion
//! - [`BookmarkApi`](podcast::BookmarkApi) - Timestamp bookmarks
//! - [`ResumeApi`](podcast::ResumeApi) - Stored resume position
//! - [`ChapterApi`](podcast::ChapterApi) - Chapter markers
//! - [`EnrichmentApi`](podcast::EnrichmentApi) - AI summary, quotes, highlights
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations with retry and TLS
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//! - [`ShareTarget`](share::ShareTarget) - Share sheet with clipboard fallback
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required capability is
//! missing:
//!
//! ```ignore
//! use core_runtime::Error;
//!
//! let backend = config.audio_backend
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "AudioBackend".to_string(),
//!         message: "No audio backend provided. Inject the host waveform player.".to_string(),
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should keep the server's user-displayable detail when one exists
//! ([`BridgeError::Api`]) so the core can surface it unchanged.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so that sessions can share them
//! across async tasks.

pub mod error;
pub mod http;
pub mod podcast;
pub mod share;
pub mod time;
pub mod transport;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use podcast::{
    Bookmark, BookmarkApi, CachedEnrichments, Chapter, ChapterApi, CompletionReport,
    EnrichmentApi, Highlight, HighlightsResult, NewBookmark, ProgressApi, ProgressReport,
    QuotesResult, ResumeApi, ResumePoint, SummaryResult,
};
pub use share::{ShareOutcome, ShareTarget};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
pub use transport::{
    AudioBackend, AudioTransport, TransportEvent, TransportEventReceiver, TransportEventSender,
    TransportOptions,
};
