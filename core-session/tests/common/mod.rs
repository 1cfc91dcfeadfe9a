//! In-memory collaborators for controller tests.
#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    AudioBackend, AudioTransport, Bookmark, BookmarkApi, BridgeError, CachedEnrichments, Chapter,
    ChapterApi, CompletionReport, EnrichmentApi, Highlight, HighlightsResult, NewBookmark,
    ProgressApi, ProgressReport, QuotesResult, ResumeApi, ResumePoint, SummaryResult,
    TransportEvent, TransportEventSender, TransportOptions,
};
use core_runtime::config::PlaybackSettings;
use core_session::{SessionController, SessionDependencies};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub const USER_ID: &str = "7";

/// Lets spawned tasks run without advancing the clock.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Gate
// ============================================================================

/// Holds collaborator calls until the test lets them through.
pub struct Gate(Semaphore);

impl Gate {
    pub fn closed() -> Arc<Self> {
        Arc::new(Gate(Semaphore::new(0)))
    }

    pub fn open(&self, calls: usize) {
        self.0.add_permits(calls);
    }

    async fn pass(&self) {
        if let Ok(permit) = self.0.acquire().await {
            permit.forget();
        }
    }
}

async fn pass(gate: &Mutex<Option<Arc<Gate>>>) {
    let gate = gate.lock().clone();
    if let Some(gate) = gate {
        gate.pass().await;
    }
}

// ============================================================================
// Audio
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Load(String),
    Play,
    Pause,
    Seek(f64),
    Volume(f32),
    Rate(f32),
    Dispose,
}

/// Everything one fake transport was asked to do.
#[derive(Default)]
pub struct TransportLog {
    pub calls: Mutex<Vec<Call>>,
    pub position: Mutex<f64>,
    pub options: Mutex<Option<TransportOptions>>,
    events: Mutex<Option<TransportEventSender>>,
}

impl TransportLog {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Seek(fraction) => Some(*fraction),
                _ => None,
            })
            .collect()
    }

    pub fn last_volume(&self) -> Option<f32> {
        self.calls.lock().iter().rev().find_map(|call| match call {
            Call::Volume(volume) => Some(*volume),
            _ => None,
        })
    }

    /// Pushes an event as the host engine would.
    pub fn emit(&self, event: TransportEvent) {
        if let Some(sender) = self.events.lock().as_ref() {
            let _ = sender.send(event);
        }
    }
}

struct FakeTransport {
    log: Arc<TransportLog>,
    duration_secs: f64,
    auto_ready: bool,
    fail_load: bool,
    hang_load: bool,
}

#[async_trait]
impl AudioTransport for FakeTransport {
    async fn load(&self, url: &str) -> BridgeResult<()> {
        self.log.calls.lock().push(Call::Load(url.to_string()));
        if self.fail_load {
            return Err(BridgeError::Transport("unsupported media".to_string()));
        }
        if self.hang_load {
            std::future::pending::<()>().await;
        }
        if self.auto_ready {
            self.log.emit(TransportEvent::Ready {
                duration_secs: self.duration_secs,
            });
        }
        Ok(())
    }

    async fn play(&self) -> BridgeResult<()> {
        self.log.calls.lock().push(Call::Play);
        Ok(())
    }

    async fn pause(&self) -> BridgeResult<()> {
        self.log.calls.lock().push(Call::Pause);
        Ok(())
    }

    async fn seek_fraction(&self, fraction: f64) -> BridgeResult<()> {
        self.log.calls.lock().push(Call::Seek(fraction));
        *self.log.position.lock() = fraction * self.duration_secs;
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> BridgeResult<()> {
        self.log.calls.lock().push(Call::Volume(volume));
        Ok(())
    }

    async fn set_rate(&self, rate: f32) -> BridgeResult<()> {
        self.log.calls.lock().push(Call::Rate(rate));
        Ok(())
    }

    async fn position(&self) -> BridgeResult<f64> {
        Ok(*self.log.position.lock())
    }

    async fn dispose(&self) -> BridgeResult<()> {
        self.log.calls.lock().push(Call::Dispose);
        Ok(())
    }
}

pub struct FakeBackend {
    pub duration_secs: Mutex<f64>,
    pub auto_ready: AtomicBool,
    pub fail_load: AtomicBool,
    /// Loads never complete, like media on an unreachable host.
    pub hang_load: AtomicBool,
    pub transports: Mutex<Vec<Arc<TransportLog>>>,
}

impl FakeBackend {
    pub fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs: Mutex::new(duration_secs),
            auto_ready: AtomicBool::new(true),
            fail_load: AtomicBool::new(false),
            hang_load: AtomicBool::new(false),
            transports: Mutex::new(Vec::new()),
        }
    }

    pub fn created(&self) -> usize {
        self.transports.lock().len()
    }

    /// The most recently created transport.
    pub fn last(&self) -> Arc<TransportLog> {
        self.transports
            .lock()
            .last()
            .cloned()
            .expect("no transport created")
    }
}

#[async_trait]
impl AudioBackend for FakeBackend {
    async fn create_transport(
        &self,
        options: TransportOptions,
        events: TransportEventSender,
    ) -> BridgeResult<Box<dyn AudioTransport>> {
        let log = Arc::new(TransportLog::default());
        *log.options.lock() = Some(options);
        *log.events.lock() = Some(events);
        self.transports.lock().push(log.clone());

        Ok(Box::new(FakeTransport {
            log,
            duration_secs: *self.duration_secs.lock(),
            auto_ready: self.auto_ready.load(Ordering::SeqCst),
            fail_load: self.fail_load.load(Ordering::SeqCst),
            hang_load: self.hang_load.load(Ordering::SeqCst),
        }))
    }
}

// ============================================================================
// Backend API
// ============================================================================

#[derive(Default)]
pub struct FakeApi {
    pub progress: Mutex<Vec<ProgressReport>>,
    pub completions: Mutex<Vec<CompletionReport>>,
    pub bookmarks: Mutex<HashMap<String, Vec<Bookmark>>>,
    pub bookmark_gate: Mutex<Option<Arc<Gate>>>,
    next_bookmark: AtomicUsize,
    pub resume_positions: Mutex<HashMap<String, f64>>,
    pub chapters: Mutex<Vec<Chapter>>,
    pub summary_calls: AtomicUsize,
    pub enrichment_gate: Mutex<Option<Arc<Gate>>>,
    pub highlights: Mutex<Vec<Highlight>>,
}

impl FakeApi {
    pub fn bookmark_calls_gated(&self) -> Arc<Gate> {
        let gate = Gate::closed();
        *self.bookmark_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn enrichment_calls_gated(&self) -> Arc<Gate> {
        let gate = Gate::closed();
        *self.enrichment_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn stored_bookmarks(&self, media_id: &str) -> Vec<Bookmark> {
        self.bookmarks
            .lock()
            .get(media_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProgressApi for FakeApi {
    async fn report_progress(&self, report: ProgressReport) -> BridgeResult<()> {
        self.progress.lock().push(report);
        Ok(())
    }

    async fn report_completion(&self, report: CompletionReport) -> BridgeResult<()> {
        self.completions.lock().push(report);
        Ok(())
    }
}

#[async_trait]
impl BookmarkApi for FakeApi {
    async fn list_bookmarks(&self, media_id: &str, _user_id: &str) -> BridgeResult<Vec<Bookmark>> {
        let stored = self.stored_bookmarks(media_id);
        pass(&self.bookmark_gate).await;
        Ok(stored)
    }

    async fn create_bookmark(
        &self,
        media_id: &str,
        user_id: &str,
        bookmark: NewBookmark,
    ) -> BridgeResult<Bookmark> {
        let id = self.next_bookmark.fetch_add(1, Ordering::SeqCst) + 1;
        let created = Bookmark {
            id: format!("bm-{}", id),
            media_id: media_id.to_string(),
            owner_id: user_id.to_string(),
            timestamp_secs: bookmark.timestamp_secs,
            note: bookmark.note,
            created_at: None,
        };
        self.bookmarks
            .lock()
            .entry(media_id.to_string())
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn delete_bookmark(&self, bookmark_id: &str, _user_id: &str) -> BridgeResult<()> {
        for list in self.bookmarks.lock().values_mut() {
            list.retain(|bookmark| bookmark.id != bookmark_id);
        }
        Ok(())
    }
}

#[async_trait]
impl ResumeApi for FakeApi {
    async fn resume_point(&self, media_id: &str, _user_id: &str) -> BridgeResult<Option<ResumePoint>> {
        Ok(self
            .resume_positions
            .lock()
            .get(media_id)
            .map(|position_secs| ResumePoint {
                position_secs: *position_secs,
                duration_secs: 600.0,
                last_updated: None,
            }))
    }
}

#[async_trait]
impl ChapterApi for FakeApi {
    async fn chapters(&self, _media_id: &str) -> BridgeResult<Vec<Chapter>> {
        Ok(self.chapters.lock().clone())
    }
}

#[async_trait]
impl EnrichmentApi for FakeApi {
    async fn summary(&self, _media_id: &str, _force_regenerate: bool) -> BridgeResult<SummaryResult> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        pass(&self.enrichment_gate).await;
        Ok(SummaryResult {
            text: "Two hosts discuss tide tables.".to_string(),
            cached: false,
        })
    }

    async fn quotes(&self, _media_id: &str, count: u32, _force: bool) -> BridgeResult<QuotesResult> {
        Ok(QuotesResult {
            quotes: (1..=count).map(|i| format!("Quote {}", i)).collect(),
            cached: false,
        })
    }

    async fn highlights(&self, _media_id: &str, _count: u32, _force: bool) -> BridgeResult<HighlightsResult> {
        Ok(HighlightsResult {
            highlights: self.highlights.lock().clone(),
            cached: false,
        })
    }

    async fn cached(&self, _media_id: &str) -> BridgeResult<CachedEnrichments> {
        Ok(CachedEnrichments::default())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub controller: SessionController,
    pub backend: Arc<FakeBackend>,
    pub api: Arc<FakeApi>,
}

pub fn harness(settings: PlaybackSettings) -> Harness {
    let backend = Arc::new(FakeBackend::new(600.0));
    let api = Arc::new(FakeApi::default());
    let deps = SessionDependencies::from_api(backend.clone(), api.clone());
    Harness {
        controller: SessionController::new(USER_ID, settings, deps).unwrap(),
        backend,
        api,
    }
}

pub fn chapter(title: &str, start: f64, end: f64) -> Chapter {
    Chapter {
        title: title.to_string(),
        start_time_secs: start,
        end_time_secs: end,
        description: None,
    }
}
