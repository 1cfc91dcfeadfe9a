//! Podcast backend collaborator contracts.
//!
//! Each trait covers one concern of the remote podcast service. The session
//! core only depends on these traits; `provider-podcast-api` implements all of
//! them over HTTP, tests implement them with in-memory fakes.
//!
//! Identifiers are opaque strings at this boundary. Positions and timestamps
//! are seconds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ============================================================================
// Listening progress
// ============================================================================

/// Periodic listening position sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub media_id: String,
    pub user_id: String,
    pub position_secs: f64,
    pub duration_secs: f64,
}

/// Sent once when a listener reaches the end of an episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionReport {
    pub media_id: String,
    pub user_id: String,
    pub duration_secs: f64,
}

#[async_trait]
pub trait ProgressApi: Send + Sync {
    async fn report_progress(&self, report: ProgressReport) -> Result<()>;

    async fn report_completion(&self, report: CompletionReport) -> Result<()>;
}

// ============================================================================
// Bookmarks
// ============================================================================

/// A user-created timestamp marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    pub media_id: String,
    pub owner_id: String,
    /// Whole seconds from the start of the media.
    pub timestamp_secs: u64,
    pub note: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Payload for creating a bookmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBookmark {
    pub timestamp_secs: u64,
    pub note: Option<String>,
}

#[async_trait]
pub trait BookmarkApi: Send + Sync {
    async fn list_bookmarks(&self, media_id: &str, user_id: &str) -> Result<Vec<Bookmark>>;

    async fn create_bookmark(
        &self,
        media_id: &str,
        user_id: &str,
        bookmark: NewBookmark,
    ) -> Result<Bookmark>;

    async fn delete_bookmark(&self, bookmark_id: &str, user_id: &str) -> Result<()>;
}

// ============================================================================
// Resume
// ============================================================================

/// Last stored listening position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumePoint {
    pub position_secs: f64,
    pub duration_secs: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ResumeApi: Send + Sync {
    /// `Ok(None)` when nothing was stored for this listener.
    async fn resume_point(&self, media_id: &str, user_id: &str) -> Result<Option<ResumePoint>>;
}

// ============================================================================
// Chapters
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub start_time_secs: f64,
    pub end_time_secs: f64,
    pub description: Option<String>,
}

#[async_trait]
pub trait ChapterApi: Send + Sync {
    async fn chapters(&self, media_id: &str) -> Result<Vec<Chapter>>;
}

// ============================================================================
// AI enrichment
// ============================================================================

/// A notable segment detected by the enrichment service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub title: String,
    pub description: Option<String>,
    pub reason: Option<String>,
    pub start_time_secs: f64,
    pub end_time_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub text: String,
    /// `true` when the server returned a previously generated result.
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotesResult {
    pub quotes: Vec<String>,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightsResult {
    pub highlights: Vec<Highlight>,
    pub cached: bool,
}

/// Everything the server has already generated for a media item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedEnrichments {
    pub summary: Option<String>,
    pub quotes: Option<Vec<String>>,
    pub highlights: Option<Vec<Highlight>>,
}

#[async_trait]
pub trait EnrichmentApi: Send + Sync {
    async fn summary(&self, media_id: &str, force_regenerate: bool) -> Result<SummaryResult>;

    async fn quotes(
        &self,
        media_id: &str,
        count: u32,
        force_regenerate: bool,
    ) -> Result<QuotesResult>;

    async fn highlights(
        &self,
        media_id: &str,
        count: u32,
        force_regenerate: bool,
    ) -> Result<HighlightsResult>;

    /// Previously generated results, without triggering generation.
    async fn cached(&self, media_id: &str) -> Result<CachedEnrichments>;
}
