//! # AI Enrichment Orchestrator
//!
//! Runs the three independent enrichment jobs of a session (summary, quotes,
//! highlights) and tracks their status per kind.
//!
//! At most one request per kind is in flight: asking again while a kind is
//! loading returns the loading status without another network call. There is
//! no timeout; a request that never completes leaves its kind loading until
//! the session closes.

use crate::error::{Result, SessionError};
use crate::scope::SessionScope;
use bridge_traits::{BridgeError, EnrichmentApi, Highlight, ShareOutcome, ShareTarget};
use core_runtime::events::{CoreEvent, EnrichmentEvent, EventBus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentKind {
    Summary,
    Quotes,
    Highlights,
}

impl EnrichmentKind {
    pub const ALL: [EnrichmentKind; 3] = [
        EnrichmentKind::Summary,
        EnrichmentKind::Quotes,
        EnrichmentKind::Highlights,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EnrichmentKind::Summary => "summary",
            EnrichmentKind::Quotes => "quotes",
            EnrichmentKind::Highlights => "highlights",
        }
    }
}

impl fmt::Display for EnrichmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnrichmentResult {
    Summary { text: String, cached: bool },
    Quotes { quotes: Vec<String>, cached: bool },
    Highlights { highlights: Vec<Highlight>, cached: bool },
}

impl EnrichmentResult {
    pub fn kind(&self) -> EnrichmentKind {
        match self {
            EnrichmentResult::Summary { .. } => EnrichmentKind::Summary,
            EnrichmentResult::Quotes { .. } => EnrichmentKind::Quotes,
            EnrichmentResult::Highlights { .. } => EnrichmentKind::Highlights,
        }
    }

    pub fn cached(&self) -> bool {
        match self {
            EnrichmentResult::Summary { cached, .. }
            | EnrichmentResult::Quotes { cached, .. }
            | EnrichmentResult::Highlights { cached, .. } => *cached,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Idle,
    Loading,
    Ready(EnrichmentResult),
    /// Message safe to display.
    Failed(String),
}

pub struct EnrichmentOrchestrator {
    api: Arc<dyn EnrichmentApi>,
    scope: SessionScope,
    events: EventBus,
    quote_count: u32,
    highlight_count: u32,
    share_target: Option<Arc<dyn ShareTarget>>,
    jobs: Mutex<HashMap<EnrichmentKind, JobStatus>>,
}

impl EnrichmentOrchestrator {
    pub fn new(
        api: Arc<dyn EnrichmentApi>,
        scope: SessionScope,
        events: EventBus,
        quote_count: u32,
        highlight_count: u32,
        share_target: Option<Arc<dyn ShareTarget>>,
    ) -> Self {
        Self {
            api,
            scope,
            events,
            quote_count,
            highlight_count,
            share_target,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Starts (or regenerates with `force_regenerate`) the job for `kind` and
    /// returns its final status. While the kind is already loading this
    /// returns [`JobStatus::Loading`] immediately.
    #[instrument(skip(self), fields(media_id = %self.scope.media_id()))]
    pub async fn request(&self, kind: EnrichmentKind, force_regenerate: bool) -> Result<JobStatus> {
        {
            let mut jobs = self.jobs.lock();
            if matches!(jobs.get(&kind), Some(JobStatus::Loading)) {
                debug!("Enrichment already loading");
                return Ok(JobStatus::Loading);
            }
            jobs.insert(kind, JobStatus::Loading);
        }
        self.emit(EnrichmentEvent::Started {
            media_id: self.media_id(),
            kind: kind.to_string(),
        });

        let outcome = self.fetch(kind, force_regenerate).await;
        self.scope.ensure_live()?;

        let (status, event) = match outcome {
            Ok(result) => {
                info!(cached = result.cached(), "Enrichment ready");
                let event = EnrichmentEvent::Ready {
                    media_id: self.media_id(),
                    kind: kind.to_string(),
                    cached: result.cached(),
                };
                (JobStatus::Ready(result), event)
            }
            Err(e) => {
                warn!(error = %e, "Enrichment failed");
                let message = failure_message(kind, &e);
                let event = EnrichmentEvent::Failed {
                    media_id: self.media_id(),
                    kind: kind.to_string(),
                    message: message.clone(),
                };
                (JobStatus::Failed(message), event)
            }
        };

        self.jobs.lock().insert(kind, status.clone());
        self.emit(event);
        Ok(status)
    }

    async fn fetch(
        &self,
        kind: EnrichmentKind,
        force_regenerate: bool,
    ) -> bridge_traits::error::Result<EnrichmentResult> {
        let media_id = self.scope.media_id().as_str();
        match kind {
            EnrichmentKind::Summary => {
                let summary = self.api.summary(media_id, force_regenerate).await?;
                Ok(EnrichmentResult::Summary {
                    text: summary.text,
                    cached: summary.cached,
                })
            }
            EnrichmentKind::Quotes => {
                let quotes = self
                    .api
                    .quotes(media_id, self.quote_count, force_regenerate)
                    .await?;
                Ok(EnrichmentResult::Quotes {
                    quotes: quotes.quotes,
                    cached: quotes.cached,
                })
            }
            EnrichmentKind::Highlights => {
                let highlights = self
                    .api
                    .highlights(media_id, self.highlight_count, force_regenerate)
                    .await?;
                Ok(EnrichmentResult::Highlights {
                    highlights: highlights.highlights,
                    cached: highlights.cached,
                })
            }
        }
    }

    /// Marks results the server already generated as ready, without
    /// triggering generation. Kinds that are not idle are left alone.
    /// Returns how many kinds were filled in.
    pub async fn hydrate(&self) -> Result<usize> {
        let result = self.api.cached(self.scope.media_id().as_str()).await;
        self.scope.ensure_live()?;

        let cached = match result {
            Ok(cached) => cached,
            Err(e) => {
                warn!(media_id = %self.scope.media_id(), error = %e, "Loading cached enrichments failed");
                return Ok(0);
            }
        };

        let mut ready = Vec::new();
        if let Some(text) = cached.summary {
            ready.push(EnrichmentResult::Summary { text, cached: true });
        }
        if let Some(quotes) = cached.quotes {
            ready.push(EnrichmentResult::Quotes {
                quotes,
                cached: true,
            });
        }
        if let Some(highlights) = cached.highlights {
            ready.push(EnrichmentResult::Highlights {
                highlights,
                cached: true,
            });
        }

        let mut filled = Vec::new();
        {
            let mut jobs = self.jobs.lock();
            for result in ready {
                let kind = result.kind();
                let status = jobs.entry(kind).or_default();
                if *status == JobStatus::Idle {
                    *status = JobStatus::Ready(result);
                    filled.push(kind);
                }
            }
        }

        for kind in &filled {
            self.emit(EnrichmentEvent::Ready {
                media_id: self.media_id(),
                kind: kind.to_string(),
                cached: true,
            });
        }
        Ok(filled.len())
    }

    pub fn status(&self, kind: EnrichmentKind) -> JobStatus {
        self.jobs.lock().get(&kind).cloned().unwrap_or_default()
    }

    pub fn statuses(&self) -> Vec<(EnrichmentKind, JobStatus)> {
        EnrichmentKind::ALL
            .into_iter()
            .map(|kind| (kind, self.status(kind)))
            .collect()
    }

    pub fn highlight(&self, index: usize) -> Option<Highlight> {
        match self.status(EnrichmentKind::Highlights) {
            JobStatus::Ready(EnrichmentResult::Highlights { highlights, .. }) => {
                highlights.into_iter().nth(index)
            }
            _ => None,
        }
    }

    pub fn quote(&self, index: usize) -> Option<String> {
        match self.status(EnrichmentKind::Quotes) {
            JobStatus::Ready(EnrichmentResult::Quotes { quotes, .. }) => {
                quotes.into_iter().nth(index)
            }
            _ => None,
        }
    }

    /// Hands a generated quote to the host share sheet.
    pub async fn share_quote(&self, index: usize, title: Option<&str>) -> Result<ShareOutcome> {
        let quote = self.quote(index).ok_or_else(|| {
            SessionError::InvalidArgument(format!("no quote at index {}", index))
        })?;
        let target = self.share_target.as_ref().ok_or_else(|| {
            SessionError::ShareUnavailable("no share target configured".to_string())
        })?;

        let text = format_quote(&quote, title);
        target
            .share_text(title.unwrap_or("Podcast quote"), &text)
            .await
            .map_err(|e| SessionError::ShareUnavailable(e.user_message()))
    }

    fn media_id(&self) -> String {
        self.scope.media_id().to_string()
    }

    fn emit(&self, event: EnrichmentEvent) {
        self.events.emit(CoreEvent::Enrichment(event)).ok();
    }
}

/// Share text for a quote, attributed to the episode when its title is known.
pub fn format_quote(quote: &str, title: Option<&str>) -> String {
    let quote = quote.trim().trim_matches('"');
    match title {
        Some(title) if !title.trim().is_empty() => {
            format!("\u{201c}{}\u{201d}\n\n{}", quote, title.trim())
        }
        _ => format!("\u{201c}{}\u{201d}", quote),
    }
}

fn failure_message(kind: EnrichmentKind, error: &BridgeError) -> String {
    match error {
        BridgeError::Api {
            detail: Some(detail),
            ..
        } if !detail.trim().is_empty() => detail.clone(),
        _ => format!("Failed to generate {}", kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MediaId, SessionToken};
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{CachedEnrichments, HighlightsResult, QuotesResult, SummaryResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeApi {
        summary_calls: AtomicUsize,
        quote_counts: Mutex<Vec<u32>>,
        fail_highlights: Option<BridgeError>,
        cached: CachedEnrichments,
    }

    #[async_trait]
    impl EnrichmentApi for FakeApi {
        async fn summary(&self, _media_id: &str, force_regenerate: bool) -> BridgeResult<SummaryResult> {
            self.summary_calls.fetch_add(1, Ordering::SeqCst);
            Ok(SummaryResult {
                text: "A talk about tides.".to_string(),
                cached: !force_regenerate,
            })
        }

        async fn quotes(&self, _media_id: &str, count: u32, _force: bool) -> BridgeResult<QuotesResult> {
            self.quote_counts.lock().push(count);
            Ok(QuotesResult {
                quotes: vec!["The sea keeps time.".to_string()],
                cached: false,
            })
        }

        async fn highlights(
            &self,
            _media_id: &str,
            _count: u32,
            _force: bool,
        ) -> BridgeResult<HighlightsResult> {
            match &self.fail_highlights {
                Some(BridgeError::Api { status, detail }) => Err(BridgeError::Api {
                    status: *status,
                    detail: detail.clone(),
                }),
                Some(other) => Err(BridgeError::OperationFailed(other.to_string())),
                None => Ok(HighlightsResult {
                    highlights: vec![highlight(95.0)],
                    cached: false,
                }),
            }
        }

        async fn cached(&self, _media_id: &str) -> BridgeResult<CachedEnrichments> {
            Ok(self.cached.clone())
        }
    }

    struct ClipboardShare {
        shared: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ShareTarget for ClipboardShare {
        async fn share_text(&self, title: &str, text: &str) -> BridgeResult<ShareOutcome> {
            self.shared.lock().push((title.to_string(), text.to_string()));
            Ok(ShareOutcome::Copied)
        }
    }

    fn highlight(start: f64) -> Highlight {
        Highlight {
            title: "Turning point".to_string(),
            description: None,
            reason: None,
            start_time_secs: start,
            end_time_secs: start + 60.0,
        }
    }

    fn orchestrator(
        api: Arc<FakeApi>,
        share: Option<Arc<dyn ShareTarget>>,
    ) -> (EnrichmentOrchestrator, SessionScope) {
        let scope = SessionScope::new(SessionToken(1), MediaId::from("42"));
        (
            EnrichmentOrchestrator::new(api, scope.clone(), EventBus::new(16), 5, 3, share),
            scope,
        )
    }

    #[tokio::test]
    async fn test_request_reaches_ready() {
        let api = Arc::new(FakeApi::default());
        let (orchestrator, _scope) = orchestrator(api.clone(), None);

        let status = orchestrator
            .request(EnrichmentKind::Summary, false)
            .await
            .unwrap();

        assert_eq!(
            status,
            JobStatus::Ready(EnrichmentResult::Summary {
                text: "A talk about tides.".to_string(),
                cached: true,
            })
        );
        assert_eq!(orchestrator.status(EnrichmentKind::Summary), status);
        assert_eq!(orchestrator.status(EnrichmentKind::Quotes), JobStatus::Idle);

        orchestrator.request(EnrichmentKind::Quotes, true).await.unwrap();
        assert_eq!(*api.quote_counts.lock(), vec![5]);
    }

    #[tokio::test]
    async fn test_failure_prefers_server_detail() {
        let api = Arc::new(FakeApi {
            fail_highlights: Some(BridgeError::Api {
                status: 503,
                detail: Some("AI service is not configured".to_string()),
            }),
            ..Default::default()
        });
        let (orchestrator, _scope) = orchestrator(api, None);

        assert_eq!(
            orchestrator
                .request(EnrichmentKind::Highlights, false)
                .await
                .unwrap(),
            JobStatus::Failed("AI service is not configured".to_string())
        );
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_generic_message() {
        let api = Arc::new(FakeApi {
            fail_highlights: Some(BridgeError::OperationFailed("reset".to_string())),
            ..Default::default()
        });
        let (orchestrator, _scope) = orchestrator(api, None);

        assert_eq!(
            orchestrator
                .request(EnrichmentKind::Highlights, false)
                .await
                .unwrap(),
            JobStatus::Failed("Failed to generate highlights".to_string())
        );
    }

    #[tokio::test]
    async fn test_result_after_close_is_discarded() {
        let api = Arc::new(FakeApi::default());
        let (orchestrator, scope) = orchestrator(api, None);
        scope.close();

        assert_eq!(
            orchestrator.request(EnrichmentKind::Summary, false).await,
            Err(SessionError::Stale)
        );
        assert_ne!(
            orchestrator.status(EnrichmentKind::Summary),
            JobStatus::Ready(EnrichmentResult::Summary {
                text: "A talk about tides.".to_string(),
                cached: true,
            })
        );
    }

    #[tokio::test]
    async fn test_hydrate_fills_idle_kinds_only() {
        let api = Arc::new(FakeApi {
            cached: CachedEnrichments {
                summary: Some("Stored summary".to_string()),
                quotes: None,
                highlights: Some(vec![highlight(10.0)]),
            },
            ..Default::default()
        });
        let (orchestrator, _scope) = orchestrator(api, None);
        orchestrator.request(EnrichmentKind::Summary, true).await.unwrap();

        assert_eq!(orchestrator.hydrate().await.unwrap(), 1);
        assert!(matches!(
            orchestrator.status(EnrichmentKind::Summary),
            JobStatus::Ready(EnrichmentResult::Summary { ref text, .. }) if text == "A talk about tides."
        ));
        assert_eq!(orchestrator.highlight(0), Some(highlight(10.0)));
        assert_eq!(orchestrator.status(EnrichmentKind::Quotes), JobStatus::Idle);
    }

    #[tokio::test]
    async fn test_share_quote() {
        let api = Arc::new(FakeApi::default());
        let share = Arc::new(ClipboardShare {
            shared: Mutex::new(Vec::new()),
        });
        let (orchestrator, _scope) = orchestrator(api, Some(share.clone()));

        assert!(matches!(
            orchestrator.share_quote(0, None).await,
            Err(SessionError::InvalidArgument(_))
        ));

        orchestrator.request(EnrichmentKind::Quotes, false).await.unwrap();
        let outcome = orchestrator
            .share_quote(0, Some("Tides, ep. 4"))
            .await
            .unwrap();

        assert_eq!(outcome, ShareOutcome::Copied);
        assert_eq!(
            *share.shared.lock(),
            vec![(
                "Tides, ep. 4".to_string(),
                "\u{201c}The sea keeps time.\u{201d}\n\nTides, ep. 4".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_share_without_target() {
        let api = Arc::new(FakeApi::default());
        let (orchestrator, _scope) = orchestrator(api, None);
        orchestrator.request(EnrichmentKind::Quotes, false).await.unwrap();

        assert!(matches!(
            orchestrator.share_quote(0, None).await,
            Err(SessionError::ShareUnavailable(_))
        ));
    }

    #[test]
    fn test_format_quote() {
        assert_eq!(format_quote("\"Hi\"", None), "\u{201c}Hi\u{201d}");
        assert_eq!(format_quote("Hi", Some("  ")), "\u{201c}Hi\u{201d}");
    }

    #[test]
    fn test_job_status_serialization() {
        let json = serde_json::to_string(&JobStatus::Failed("nope".to_string())).unwrap();
        assert_eq!(json, r#"{"status":"failed","data":"nope"}"#);
        let json = serde_json::to_string(&JobStatus::Idle).unwrap();
        assert_eq!(json, r#"{"status":"idle"}"#);
    }
}
