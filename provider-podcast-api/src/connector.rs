//! Podcast API connector implementation
//!
//! Implements every podcast service bridge trait against the HTTP backend.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::{
    Bookmark, BookmarkApi, CachedEnrichments, Chapter, ChapterApi, CompletionReport,
    EnrichmentApi, Highlight, HighlightsResult, NewBookmark, ProgressApi, ProgressReport,
    QuotesResult, ResumeApi, ResumePoint, SummaryResult,
};
use core_runtime::logging::redact_url;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::PodcastApiError;
use crate::types::{
    AllEnrichmentsResponse, BookmarkDto, ChapterDto, HighlightsResponse, QuotesResponse,
    ResumeResponse, SummaryResponse, XpAwardMetadata, XpAwardRequest, LISTEN_XP_ACTION,
    LISTEN_XP_AMOUNT,
};

/// Timeout for ordinary API calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// AI generation runs a language model server-side
const GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Podcast backend connector
///
/// # Features
///
/// - Listening progress (single attempt) and listen completion
/// - Bookmark CRUD scoped to the listener
/// - Resume position lookup
/// - Chapter markers
/// - AI summary, quotes and highlights, generated or cached
///
/// Failed responses keep the server's `detail` so the session core can show
/// it unchanged.
///
/// # Example
///
/// ```ignore
/// use provider_podcast_api::PodcastApiConnector;
///
/// let connector = PodcastApiConnector::new(http_client, "https://podcasts.example.com");
/// let chapters = connector.chapters("42").await?;
/// ```
pub struct PodcastApiConnector {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
}

impl PodcastApiConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http_client,
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn podcast_url(&self, media_id: &str, suffix: &str) -> String {
        self.url(&format!("/podcasts/{}{}", urlencoding::encode(media_id), suffix))
    }

    fn ai_url(&self, media_id: &str, suffix: &str) -> String {
        self.url(&format!("/ai/podcast/{}{}", urlencoding::encode(media_id), suffix))
    }

    /// Execute a request and turn non-2xx answers into API errors.
    #[instrument(skip(self, request, policy), fields(method = ?request.method, url = %redact_url(&request.url)))]
    async fn send(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> std::result::Result<HttpResponse, PodcastApiError> {
        let request = request.header("Accept", "application/json");
        let response = self.http_client.execute_with_retry(request, policy).await?;

        if response.is_success() {
            debug!(status = response.status, "API request succeeded");
            Ok(response)
        } else {
            let error = PodcastApiError::from_response(response.status, &response.body);
            warn!(status = response.status, error = %error, "API request failed");
            Err(error)
        }
    }

    fn parse<T: DeserializeOwned>(
        response: &HttpResponse,
    ) -> std::result::Result<T, PodcastApiError> {
        serde_json::from_slice(&response.body)
            .map_err(|e| PodcastApiError::ParseError(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        let request = HttpRequest::new(HttpMethod::Get, url).timeout(REQUEST_TIMEOUT);
        let response = self.send(request, RetryPolicy::default()).await?;
        Ok(Self::parse(&response)?)
    }

    async fn generate<T: DeserializeOwned>(
        &self,
        media_id: &str,
        kind: &str,
        fields: &[(&str, String)],
    ) -> Result<T> {
        info!(media_id, kind, "Requesting AI enrichment");
        let request = HttpRequest::new(HttpMethod::Post, self.ai_url(media_id, &format!("/{}", kind)))
            .form(fields)
            .timeout(GENERATION_TIMEOUT);
        let response = self.send(request, RetryPolicy::no_retry()).await?;
        Ok(Self::parse(&response)?)
    }
}

// ============================================================================
// Progress
// ============================================================================

#[async_trait]
impl ProgressApi for PodcastApiConnector {
    #[instrument(skip(self, report), fields(media_id = %report.media_id))]
    async fn report_progress(&self, report: ProgressReport) -> Result<()> {
        let url = self.url(&format!(
            "/analytics/podcasts/{}/progress",
            urlencoding::encode(&report.media_id)
        ));
        let request = HttpRequest::new(HttpMethod::Post, url)
            .form(&[
                ("user_id", report.user_id.clone()),
                ("current_position", whole_secs(report.position_secs).to_string()),
                ("duration", whole_secs(report.duration_secs).to_string()),
            ])
            .timeout(REQUEST_TIMEOUT);

        self.send(request, RetryPolicy::no_retry()).await?;
        debug!(position_secs = report.position_secs, "Progress reported");
        Ok(())
    }

    #[instrument(skip(self, report), fields(media_id = %report.media_id))]
    async fn report_completion(&self, report: CompletionReport) -> Result<()> {
        let body = XpAwardRequest {
            user_id: report.user_id,
            action: LISTEN_XP_ACTION,
            xp_amount: LISTEN_XP_AMOUNT,
            metadata: XpAwardMetadata {
                podcast_id: report.media_id,
                duration_seconds: whole_secs(report.duration_secs),
            },
        };
        let request = HttpRequest::new(HttpMethod::Post, self.url("/xp/award"))
            .json(&body)?
            .timeout(REQUEST_TIMEOUT);

        self.send(request, RetryPolicy::no_retry()).await?;
        info!("Listen completion recorded");
        Ok(())
    }
}

// ============================================================================
// Bookmarks
// ============================================================================

#[async_trait]
impl BookmarkApi for PodcastApiConnector {
    #[instrument(skip(self, user_id))]
    async fn list_bookmarks(&self, media_id: &str, user_id: &str) -> Result<Vec<Bookmark>> {
        let url = format!(
            "{}?user_id={}",
            self.podcast_url(media_id, "/bookmarks"),
            urlencoding::encode(user_id)
        );
        let bookmarks: Vec<BookmarkDto> = self.get_json(url).await?;
        debug!(count = bookmarks.len(), "Bookmarks fetched");
        Ok(bookmarks.into_iter().map(Bookmark::from).collect())
    }

    #[instrument(skip(self, user_id, bookmark), fields(timestamp_secs = bookmark.timestamp_secs))]
    async fn create_bookmark(
        &self,
        media_id: &str,
        user_id: &str,
        bookmark: NewBookmark,
    ) -> Result<Bookmark> {
        let mut fields = vec![
            ("user_id", user_id.to_string()),
            ("timestamp", bookmark.timestamp_secs.to_string()),
        ];
        if let Some(note) = bookmark.note {
            fields.push(("note", note));
        }

        let request = HttpRequest::new(HttpMethod::Post, self.podcast_url(media_id, "/bookmarks"))
            .form(fields.as_slice())
            .timeout(REQUEST_TIMEOUT);
        let response = self.send(request, RetryPolicy::no_retry()).await?;
        let created: BookmarkDto = Self::parse(&response)?;

        info!(bookmark_id = %created.id, "Bookmark created");
        Ok(created.into())
    }

    #[instrument(skip(self, user_id))]
    async fn delete_bookmark(&self, bookmark_id: &str, user_id: &str) -> Result<()> {
        let url = format!(
            "{}?user_id={}",
            self.url(&format!("/bookmarks/{}", urlencoding::encode(bookmark_id))),
            urlencoding::encode(user_id)
        );
        let request = HttpRequest::new(HttpMethod::Delete, url).timeout(REQUEST_TIMEOUT);

        self.send(request, RetryPolicy::default()).await?;
        info!("Bookmark deleted");
        Ok(())
    }
}

// ============================================================================
// Resume and chapters
// ============================================================================

#[async_trait]
impl ResumeApi for PodcastApiConnector {
    #[instrument(skip(self, user_id))]
    async fn resume_point(&self, media_id: &str, user_id: &str) -> Result<Option<ResumePoint>> {
        let url = format!(
            "{}?user_id={}",
            self.podcast_url(media_id, "/resume"),
            urlencoding::encode(user_id)
        );
        let response: ResumeResponse = self.get_json(url).await?;
        Ok(response.into_resume_point())
    }
}

#[async_trait]
impl ChapterApi for PodcastApiConnector {
    #[instrument(skip(self))]
    async fn chapters(&self, media_id: &str) -> Result<Vec<Chapter>> {
        let chapters: Vec<ChapterDto> = self.get_json(self.podcast_url(media_id, "/chapters")).await?;
        Ok(chapters.into_iter().map(Chapter::from).collect())
    }
}

// ============================================================================
// AI enrichment
// ============================================================================

#[async_trait]
impl EnrichmentApi for PodcastApiConnector {
    async fn summary(&self, media_id: &str, force_regenerate: bool) -> Result<SummaryResult> {
        let response: SummaryResponse = self
            .generate(
                media_id,
                "summary",
                &[("force_regenerate", force_regenerate.to_string())],
            )
            .await?;
        Ok(SummaryResult {
            text: response.summary,
            cached: response.cached,
        })
    }

    async fn quotes(
        &self,
        media_id: &str,
        count: u32,
        force_regenerate: bool,
    ) -> Result<QuotesResult> {
        let response: QuotesResponse = self
            .generate(
                media_id,
                "quotes",
                &[
                    ("count", count.to_string()),
                    ("force_regenerate", force_regenerate.to_string()),
                ],
            )
            .await?;
        Ok(QuotesResult {
            quotes: response.quotes,
            cached: response.cached,
        })
    }

    async fn highlights(
        &self,
        media_id: &str,
        count: u32,
        force_regenerate: bool,
    ) -> Result<HighlightsResult> {
        let response: HighlightsResponse = self
            .generate(
                media_id,
                "highlights",
                &[
                    ("count", count.to_string()),
                    ("force_regenerate", force_regenerate.to_string()),
                ],
            )
            .await?;
        Ok(HighlightsResult {
            highlights: response
                .highlights
                .into_iter()
                .map(Highlight::from)
                .collect(),
            cached: response.cached,
        })
    }

    #[instrument(skip(self))]
    async fn cached(&self, media_id: &str) -> Result<CachedEnrichments> {
        let all: AllEnrichmentsResponse = self.get_json(self.ai_url(media_id, "/all")).await?;
        Ok(all.into())
    }
}

/// The backend stores positions as whole seconds.
fn whole_secs(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        secs.floor() as u64
    } else {
        0
    }
}
