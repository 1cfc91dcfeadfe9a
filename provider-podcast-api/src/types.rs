//! Podcast API wire types
//!
//! Data structures for the JSON bodies exchanged with the podcast backend.
//! Conversions into the bridge types live next to each DTO.

use bridge_traits::{Bookmark, CachedEnrichments, Chapter, Highlight, ResumePoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default highlight length when the server omits `end_time`.
pub const DEFAULT_HIGHLIGHT_SECS: f64 = 60.0;

/// XP granted for finishing an episode.
pub const LISTEN_XP_AMOUNT: u32 = 10;

/// Action name recorded for a finished episode.
pub const LISTEN_XP_ACTION: &str = "podcast_listened";

/// Parse an ISO 8601 / RFC 3339 timestamp, ignoring malformed values.
pub fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

// ============================================================================
// Bookmarks
// ============================================================================

/// Bookmark resource
#[derive(Debug, Clone, Deserialize)]
pub struct BookmarkDto {
    pub id: String,
    pub user_id: String,
    pub podcast_id: String,
    /// Seconds from the start; stored as an integer but accepted as any number.
    pub timestamp: f64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl From<BookmarkDto> for Bookmark {
    fn from(dto: BookmarkDto) -> Self {
        Bookmark {
            id: dto.id,
            media_id: dto.podcast_id,
            owner_id: dto.user_id,
            timestamp_secs: dto.timestamp.max(0.0).floor() as u64,
            note: dto.note.filter(|note| !note.trim().is_empty()),
            created_at: parse_timestamp(dto.created_at.as_deref()),
        }
    }
}

// ============================================================================
// Resume
// ============================================================================

/// `GET /podcasts/{id}/resume` response
#[derive(Debug, Clone, Deserialize)]
pub struct ResumeResponse {
    #[serde(default)]
    pub position: f64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl ResumeResponse {
    /// `None` when the server has no stored position.
    pub fn into_resume_point(self) -> Option<ResumePoint> {
        if !self.position.is_finite() || self.position <= 0.0 {
            return None;
        }
        Some(ResumePoint {
            position_secs: self.position,
            duration_secs: self.duration,
            last_updated: parse_timestamp(self.last_updated.as_deref()),
        })
    }
}

// ============================================================================
// Chapters
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ChapterDto {
    pub title: String,
    pub start_time: f64,
    #[serde(default)]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<ChapterDto> for Chapter {
    fn from(dto: ChapterDto) -> Self {
        Chapter {
            title: dto.title,
            start_time_secs: dto.start_time,
            end_time_secs: dto.end_time.unwrap_or(dto.start_time),
            description: dto.description,
        }
    }
}

// ============================================================================
// AI enrichment
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct HighlightDto {
    pub title: String,
    pub start_time: f64,
    #[serde(default)]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl From<HighlightDto> for Highlight {
    fn from(dto: HighlightDto) -> Self {
        Highlight {
            title: dto.title,
            description: dto.description,
            reason: dto.reason,
            start_time_secs: dto.start_time,
            end_time_secs: dto
                .end_time
                .unwrap_or(dto.start_time + DEFAULT_HIGHLIGHT_SECS),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
    #[serde(default)]
    pub cached: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuotesResponse {
    #[serde(default)]
    pub quotes: Vec<String>,
    #[serde(default)]
    pub cached: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HighlightsResponse {
    #[serde(default)]
    pub highlights: Vec<HighlightDto>,
    #[serde(default)]
    pub cached: bool,
}

/// `GET /ai/podcast/{id}/all` response
#[derive(Debug, Clone, Deserialize)]
pub struct AllEnrichmentsResponse {
    #[serde(default)]
    pub has_summary: bool,
    #[serde(default)]
    pub has_quotes: bool,
    #[serde(default)]
    pub has_highlights: bool,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub quotes: Vec<String>,
    #[serde(default)]
    pub highlights: Vec<HighlightDto>,
}

impl From<AllEnrichmentsResponse> for CachedEnrichments {
    fn from(all: AllEnrichmentsResponse) -> Self {
        CachedEnrichments {
            summary: all.summary.filter(|_| all.has_summary),
            quotes: (all.has_quotes && !all.quotes.is_empty()).then_some(all.quotes),
            highlights: (all.has_highlights && !all.highlights.is_empty())
                .then(|| all.highlights.into_iter().map(Highlight::from).collect()),
        }
    }
}

// ============================================================================
// Listen completion
// ============================================================================

/// `POST /xp/award` body
#[derive(Debug, Clone, Serialize)]
pub struct XpAwardRequest {
    pub user_id: String,
    pub action: &'static str,
    pub xp_amount: u32,
    pub metadata: XpAwardMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct XpAwardMetadata {
    pub podcast_id: String,
    pub duration_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bookmark_conversion() {
        let dto: BookmarkDto = serde_json::from_str(
            r#"{
                "id": "65f1",
                "user_id": "7",
                "podcast_id": "42",
                "timestamp": 42,
                "note": "intro",
                "created_at": "2024-03-01T10:00:00.123456+00:00"
            }"#,
        )
        .unwrap();

        let bookmark = Bookmark::from(dto);
        assert_eq!(bookmark.id, "65f1");
        assert_eq!(bookmark.media_id, "42");
        assert_eq!(bookmark.timestamp_secs, 42);
        assert_eq!(bookmark.note.as_deref(), Some("intro"));
        assert!(bookmark.created_at.is_some());
    }

    #[test]
    fn test_empty_resume_position() {
        let response: ResumeResponse =
            serde_json::from_str(r#"{"position": 0, "duration": 0}"#).unwrap();
        assert!(response.into_resume_point().is_none());

        let response: ResumeResponse =
            serde_json::from_str(r#"{"position": 120, "duration": 600, "last_updated": null}"#)
                .unwrap();
        let point = response.into_resume_point().unwrap();
        assert_eq!(point.position_secs, 120.0);
        assert_eq!(point.duration_secs, 600.0);
    }

    #[test]
    fn test_highlight_end_defaults() {
        let dto: HighlightDto =
            serde_json::from_str(r#"{"title": "Reveal", "start_time": 95}"#).unwrap();
        let highlight = Highlight::from(dto);
        assert_eq!(highlight.end_time_secs, 155.0);
    }

    #[test]
    fn test_cached_enrichments_respect_flags() {
        let all: AllEnrichmentsResponse = serde_json::from_str(
            r#"{
                "has_transcript": true,
                "has_summary": true,
                "has_quotes": false,
                "has_highlights": false,
                "summary": "Two hosts discuss tides.",
                "quotes": [],
                "highlights": []
            }"#,
        )
        .unwrap();

        let cached = CachedEnrichments::from(all);
        assert_eq!(cached.summary.as_deref(), Some("Two hosts discuss tides."));
        assert!(cached.quotes.is_none());
        assert!(cached.highlights.is_none());
    }
}
