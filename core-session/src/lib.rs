//! # Core Session Module
//!
//! Playback session controller for podcast episodes.
//!
//! ## Overview
//!
//! This crate owns everything that happens while one episode is open:
//! - **Controller**: the session state machine and the single audio transport
//! - **Progress**: periodic listening-position reports
//! - **Sleep timer**: pause after N minutes
//! - **Bookmarks**: server-backed timestamp markers
//! - **Resume**: "continue where you left off" negotiation
//! - **Enrichment**: AI summary, quotes and highlights per episode
//! - **Chapters**: chapter markers and navigation
//! - **Handoff**: moving the session between the full and floating players
//!
//! ## Usage
//!
//! ```ignore
//! use core_session::{MediaSource, SessionController, SessionDependencies};
//!
//! let deps = SessionDependencies::from_api(backend, Arc::new(connector));
//! let controller = SessionController::new("1024", PlaybackSettings::default(), deps)?;
//!
//! controller
//!     .open(MediaSource::from_api("https://podcasts.example.com", 42u64))
//!     .await?;
//! let mut snapshots = controller.subscribe();
//! controller.play().await?;
//! controller.arm_sleep_timer(15)?;
//! ```
//!
//! ## Threading
//!
//! The controller is `Send + Sync` and cheap to clone. It needs a Tokio
//! runtime: each session runs a driver task plus timer tasks.

pub mod bookmarks;
pub mod chapters;
pub mod controller;
pub mod enrichment;
pub mod error;
pub mod handoff;
pub mod media;
pub mod progress;
pub mod resume;
pub mod scope;
pub mod session;
pub mod sleep_timer;
pub mod transport;

pub use bookmarks::{bookmark_label, BookmarkManager};
pub use chapters::ChapterIndex;
pub use controller::{next_rate_preset, SessionController, SessionDependencies, RATE_PRESETS};
pub use enrichment::{
    format_quote, EnrichmentKind, EnrichmentOrchestrator, EnrichmentResult, JobStatus,
};
pub use error::{Result, SessionError};
pub use handoff::{FloatingPlayer, FloatingSnapshot, SurfaceKind};
pub use media::{format_timestamp, MediaSource};
pub use progress::{PositionSource, ProgressReporter, ProgressSample};
pub use resume::{ResumeDecision, ResumeNegotiator, ResumeState};
pub use scope::SessionScope;
pub use session::{MediaId, Session, SessionPhase, SessionSnapshot, SessionToken, UserId};
pub use sleep_timer::{SleepSignal, SleepTimer, SleepTimerStatus, TimerId};
pub use transport::{TransportAdapter, TransportSampler};
