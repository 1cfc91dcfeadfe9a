//! # Session Controller
//!
//! Owns the single live playback session and every component attached to it.
//!
//! ## Overview
//!
//! ```text
//!                 ┌──────────────────────────── SessionController ───────────────────────────┐
//!  surfaces ─────>│ play / pause / seek / skip / volume / rate / sleep / bookmarks / resume   │
//!  (primary,      │                                                                          │
//!   floating)     │  ControllerState (one lock) ──> watch<SessionSnapshot> ──> surfaces      │
//!                 │        │                                                                 │
//!                 │        └─ ActiveSession { scope, transport, progress, sleep timer,        │
//!                 │                           bookmarks, resume, enrichment, chapters }      │
//!                 └────────────────────────────────┬─────────────────────────────────────────┘
//!                                                  │ driver task (per session)
//!                       transport events ──────────┤
//!                       sleep timer signals ───────┘
//! ```
//!
//! ## Concurrency
//!
//! All mutation happens under one `parking_lot` lock that is never held across
//! an `.await`. Every operation that talks to the transport or the backend
//! captures the session scope first and applies its effect only if that scope
//! is still the live one afterwards. A per-session driver task consumes
//! transport events and sleep-timer signals; it stops when the scope closes.

use crate::bookmarks::BookmarkManager;
use crate::chapters::ChapterIndex;
use crate::enrichment::{EnrichmentKind, EnrichmentOrchestrator, JobStatus};
use crate::error::{Result, SessionError};
use crate::handoff::{FloatingPlayer, FloatingSnapshot, SurfaceKind};
use crate::media::MediaSource;
use crate::progress::ProgressReporter;
use crate::resume::{ResumeDecision, ResumeNegotiator, ResumeState};
use crate::scope::SessionScope;
use crate::session::{secs_to_ms, Session, SessionPhase, SessionSnapshot, SessionToken, UserId};
use crate::sleep_timer::{SleepSignal, SleepTimer, SleepTimerStatus};
use crate::transport::{clamp_rate, TransportAdapter, TransportSampler};
use bridge_traits::{
    AudioBackend, Bookmark, BookmarkApi, Chapter, ChapterApi, Clock, CompletionReport,
    EnrichmentApi, ProgressApi, ResumeApi, ShareOutcome, ShareTarget, SystemClock,
    TransportEvent, TransportEventReceiver, TransportOptions,
};
use core_runtime::config::PlaybackSettings;
use core_runtime::events::{
    CoreEvent, EventBus, EventStream, SessionEvent, SleepTimerEvent, SurfaceEvent,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Rates offered by [`SessionController::cycle_rate`].
pub const RATE_PRESETS: [f32; 7] = [0.5, 0.75, 1.0, 1.25, 1.5, 1.75, 2.0];

// ============================================================================
// Dependencies
// ============================================================================

/// Collaborators injected into the controller.
#[derive(Clone)]
pub struct SessionDependencies {
    pub audio_backend: Arc<dyn AudioBackend>,
    pub progress_api: Arc<dyn ProgressApi>,
    pub bookmark_api: Arc<dyn BookmarkApi>,
    pub resume_api: Arc<dyn ResumeApi>,
    pub chapter_api: Arc<dyn ChapterApi>,
    pub enrichment_api: Arc<dyn EnrichmentApi>,
    pub clock: Arc<dyn Clock>,
    pub share_target: Option<Arc<dyn ShareTarget>>,
}

impl SessionDependencies {
    /// Uses one backend connector for every collaborator role.
    pub fn from_api<A>(audio_backend: Arc<dyn AudioBackend>, api: Arc<A>) -> Self
    where
        A: ProgressApi + BookmarkApi + ResumeApi + ChapterApi + EnrichmentApi + 'static,
    {
        Self {
            audio_backend,
            progress_api: api.clone(),
            bookmark_api: api.clone(),
            resume_api: api.clone(),
            chapter_api: api.clone(),
            enrichment_api: api,
            clock: Arc::new(SystemClock),
            share_target: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_share_target(mut self, target: Arc<dyn ShareTarget>) -> Self {
        self.share_target = Some(target);
        self
    }
}

// ============================================================================
// Internal state
// ============================================================================

struct ActiveSession {
    scope: SessionScope,
    session: Session,
    transport: Arc<TransportAdapter>,
    progress: ProgressReporter,
    sleep_timer: SleepTimer,
    bookmarks: Arc<BookmarkManager>,
    resume: Arc<ResumeNegotiator>,
    enrichment: Arc<EnrichmentOrchestrator>,
    chapters: Arc<ChapterIndex>,
    autoplay_pending: bool,
    completion_reported: bool,
    driver: Option<JoinHandle<()>>,
}

impl ActiveSession {
    /// Closes the scope and stops every timer. Idempotent.
    fn shutdown(&mut self) {
        self.scope.close();
        self.progress.stop();
        self.sleep_timer.cancel();
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }

    fn output_event(&self) -> SessionEvent {
        SessionEvent::OutputChanged {
            media_id: self.session.media_id.to_string(),
            volume_percent: (self.session.volume * 100.0).round() as u8,
            muted: self.session.is_muted,
            rate_percent: (self.session.playback_rate * 100.0).round() as u16,
        }
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct ControllerState {
    disposed: bool,
    active: Option<ActiveSession>,
    surface: SurfaceKind,
}

impl ControllerState {
    fn active(&self) -> Result<&ActiveSession> {
        if self.disposed {
            return Err(SessionError::Disposed);
        }
        self.active.as_ref().ok_or(SessionError::NoActiveSession)
    }

    fn active_mut(&mut self) -> Result<&mut ActiveSession> {
        if self.disposed {
            return Err(SessionError::Disposed);
        }
        self.active.as_mut().ok_or(SessionError::NoActiveSession)
    }

    /// The active session, only if it is the one `scope` belongs to.
    fn live_mut(&mut self, scope: &SessionScope) -> Option<&mut ActiveSession> {
        if self.disposed || !scope.is_live() {
            return None;
        }
        self.active
            .as_mut()
            .filter(|active| active.scope.token() == scope.token())
    }

    fn snapshot(&self, settings: &PlaybackSettings) -> SessionSnapshot {
        let mut snapshot = match &self.active {
            None => SessionSnapshot::idle(settings.initial_volume, settings.default_rate),
            Some(active) => {
                let session = &active.session;
                SessionSnapshot {
                    token: Some(active.scope.token()),
                    media_id: Some(session.media_id.clone()),
                    title: session.title.clone(),
                    phase: session.phase,
                    position_secs: session.position_secs,
                    duration_secs: session.duration_secs,
                    is_playing: session.is_playing,
                    volume: session.volume,
                    is_muted: session.is_muted,
                    playback_rate: session.playback_rate,
                    sleep_timer: active.sleep_timer.status(),
                    resume: active.resume.state(),
                    surface: self.surface,
                }
            }
        };
        if self.disposed {
            snapshot.phase = SessionPhase::Disposed;
        }
        snapshot.surface = self.surface;
        snapshot
    }
}

struct ControllerInner {
    user_id: UserId,
    settings: PlaybackSettings,
    deps: SessionDependencies,
    events: EventBus,
    snapshots: watch::Sender<SessionSnapshot>,
    next_token: AtomicU64,
    open_lock: tokio::sync::Mutex<()>,
    state: Mutex<ControllerState>,
}

// ============================================================================
// Controller handle
// ============================================================================

/// Cheap-to-clone handle to the session controller.
///
/// Every player surface holds a clone; all of them drive the same transport.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

impl SessionController {
    /// Fails when `settings` do not validate; timers and the event bus
    /// require non-zero intervals and capacity.
    pub fn new(
        user_id: impl Into<UserId>,
        settings: PlaybackSettings,
        deps: SessionDependencies,
    ) -> Result<Self> {
        settings
            .validate()
            .map_err(|e| SessionError::InvalidArgument(e.to_string()))?;

        let initial = SessionSnapshot::idle(settings.initial_volume, settings.default_rate);
        let (snapshots, _) = watch::channel(initial);
        let events = EventBus::new(settings.event_buffer_size);

        Ok(Self {
            inner: Arc::new(ControllerInner {
                user_id: user_id.into(),
                settings,
                deps,
                events,
                snapshots,
                next_token: AtomicU64::new(0),
                open_lock: tokio::sync::Mutex::new(()),
                state: Mutex::new(ControllerState {
                    disposed: false,
                    active: None,
                    surface: SurfaceKind::Primary,
                }),
            }),
        })
    }

    pub fn user_id(&self) -> &UserId {
        &self.inner.user_id
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.inner.settings
    }

    // ------------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------------

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    /// Snapshot stream shared by every surface.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Notification stream (transitions, failures, notices).
    pub fn events(&self) -> EventStream {
        EventStream::new(self.inner.events.subscribe())
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn phase(&self) -> SessionPhase {
        self.snapshot().phase
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Tears down the current session (if any) and starts loading `media`.
    ///
    /// Returns once the transport accepted the media; the session becomes
    /// `Ready` when the transport reports its duration.
    #[instrument(skip(self, media), fields(media_id = %media.media_id))]
    pub async fn open(&self, media: MediaSource) -> Result<SessionToken> {
        self.inner.open(media).await
    }

    /// Alias of [`open`](Self::open).
    pub async fn load(&self, media: MediaSource) -> Result<SessionToken> {
        self.open(media).await
    }

    /// Tears down the current session and returns to idle.
    #[instrument(skip(self))]
    pub async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    /// Tears everything down. Timers stop before the first await; later calls
    /// are no-ops and every other operation fails with `Disposed`.
    #[instrument(skip(self))]
    pub async fn dispose(&self) {
        self.inner.dispose().await
    }

    // ------------------------------------------------------------------------
    // Transport controls
    // ------------------------------------------------------------------------

    pub async fn play(&self) -> Result<()> {
        self.inner.play(None).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.inner.pause(None).await
    }

    /// Plays when paused, pauses when playing. Returns whether playback runs.
    pub async fn toggle_play(&self) -> Result<bool> {
        let playing = self.inner.read(|active| active.session.is_playing)?;
        if playing {
            self.pause().await?;
            Ok(false)
        } else {
            self.play().await?;
            Ok(true)
        }
    }

    /// Moves the playhead to `position_secs`, clamped to the media. Returns
    /// the applied position.
    #[instrument(skip(self))]
    pub async fn seek(&self, position_secs: f64) -> Result<f64> {
        self.inner.seek(position_secs).await
    }

    pub async fn seek_fraction(&self, fraction: f64) -> Result<f64> {
        if !fraction.is_finite() {
            return Err(SessionError::InvalidArgument(format!(
                "seek fraction must be finite (got {})",
                fraction
            )));
        }
        let duration = self.inner.read(|active| active.session.duration_secs)?;
        self.seek(fraction.clamp(0.0, 1.0) * duration).await
    }

    /// Moves the playhead by `delta_secs` (negative rewinds).
    pub async fn skip(&self, delta_secs: f64) -> Result<f64> {
        if !delta_secs.is_finite() {
            return Err(SessionError::InvalidArgument(format!(
                "skip delta must be finite (got {})",
                delta_secs
            )));
        }
        let position = self.inner.read(|active| active.session.position_secs)?;
        self.seek(position + delta_secs).await
    }

    pub async fn rewind_10(&self) -> Result<f64> {
        self.skip(-10.0).await
    }

    pub async fn rewind_15(&self) -> Result<f64> {
        self.skip(-15.0).await
    }

    pub async fn rewind_30(&self) -> Result<f64> {
        self.skip(-30.0).await
    }

    pub async fn forward_10(&self) -> Result<f64> {
        self.skip(10.0).await
    }

    pub async fn forward_15(&self) -> Result<f64> {
        self.skip(15.0).await
    }

    pub async fn forward_30(&self) -> Result<f64> {
        self.skip(30.0).await
    }

    // ------------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------------

    /// Sets the listener volume (`0.0..=1.0`). A positive volume unmutes.
    pub async fn set_volume(&self, volume: f32) -> Result<f32> {
        if !volume.is_finite() {
            return Err(SessionError::InvalidArgument(format!(
                "volume must be finite (got {})",
                volume
            )));
        }
        let volume = volume.clamp(0.0, 1.0);
        let (scope, transport, muted) = self.inner.controllable("set volume", |active| {
            active.session.is_muted && volume == 0.0
        })?;

        let effective = if muted { 0.0 } else { volume };
        transport
            .set_volume(effective)
            .await
            .map_err(|e| self.inner.transport_failed(&scope, e))?;

        self.inner.apply_output(&scope, |session| {
            session.volume = volume;
            session.is_muted = muted;
        })?;
        Ok(volume)
    }

    pub async fn set_muted(&self, muted: bool) -> Result<()> {
        let (scope, transport, volume) =
            self.inner.controllable("mute", |active| active.session.volume)?;

        transport
            .set_volume(if muted { 0.0 } else { volume })
            .await
            .map_err(|e| self.inner.transport_failed(&scope, e))?;

        self.inner
            .apply_output(&scope, |session| session.is_muted = muted)
    }

    /// Returns the new mute state.
    pub async fn toggle_mute(&self) -> Result<bool> {
        let muted = !self.inner.read(|active| active.session.is_muted)?;
        self.set_muted(muted).await?;
        Ok(muted)
    }

    /// Sets the playback rate, clamped to the supported range. Returns the
    /// applied rate.
    pub async fn set_rate(&self, rate: f32) -> Result<f32> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(SessionError::InvalidArgument(format!(
                "playback rate must be a positive number (got {})",
                rate
            )));
        }
        let rate = clamp_rate(rate);
        let (scope, transport, _) = self.inner.controllable("change speed", |_| ())?;

        transport
            .set_rate(rate)
            .await
            .map_err(|e| self.inner.transport_failed(&scope, e))?;

        self.inner
            .apply_output(&scope, |session| session.playback_rate = rate)?;
        Ok(rate)
    }

    /// Steps to the next rate in [`RATE_PRESETS`], wrapping to the slowest.
    pub async fn cycle_rate(&self) -> Result<f32> {
        let current = self.inner.read(|active| active.session.playback_rate)?;
        self.set_rate(next_rate_preset(current)).await
    }

    // ------------------------------------------------------------------------
    // Sleep timer
    // ------------------------------------------------------------------------

    /// Arms the sleep timer, replacing any armed one. `0` cancels.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn arm_sleep_timer(&self, minutes: u32) -> Result<Option<SleepTimerStatus>> {
        let (status, was_armed) = {
            let mut state = self.inner.state.lock();
            let active = state.active_mut()?;
            let was_armed = active.sleep_timer.is_armed();
            let status = active.sleep_timer.arm(minutes);
            self.inner.publish(&state);
            (status, was_armed)
        };

        match &status {
            Some(status) => {
                info!(minutes, "Sleep timer set");
                self.inner.emit(CoreEvent::SleepTimer(SleepTimerEvent::Armed {
                    minutes,
                    deadline_unix_ms: status.deadline_at.timestamp_millis(),
                }));
            }
            None if was_armed => {
                self.inner
                    .emit(CoreEvent::SleepTimer(SleepTimerEvent::Cancelled));
            }
            None => {}
        }
        Ok(status)
    }

    /// Clears the sleep timer without pausing. Returns `true` if one was armed.
    pub fn cancel_sleep_timer(&self) -> Result<bool> {
        let cancelled = {
            let mut state = self.inner.state.lock();
            let cancelled = state.active_mut()?.sleep_timer.cancel();
            self.inner.publish(&state);
            cancelled
        };
        if cancelled {
            info!("Sleep timer cancelled");
            self.inner
                .emit(CoreEvent::SleepTimer(SleepTimerEvent::Cancelled));
        }
        Ok(cancelled)
    }

    pub fn sleep_timer_status(&self) -> Result<Option<SleepTimerStatus>> {
        self.inner.read(|active| active.sleep_timer.status())
    }

    // ------------------------------------------------------------------------
    // Bookmarks
    // ------------------------------------------------------------------------

    pub async fn add_bookmark(&self, position_secs: f64, note: Option<String>) -> Result<Bookmark> {
        let (bookmarks, duration) = self
            .inner
            .read(|active| (active.bookmarks.clone(), active.session.duration_secs))?;
        bookmarks.add(position_secs, duration, note).await
    }

    /// Bookmarks the current playhead.
    pub async fn bookmark_here(&self, note: Option<String>) -> Result<Bookmark> {
        let position = self.inner.read(|active| active.session.position_secs)?;
        self.add_bookmark(position, note).await
    }

    pub async fn remove_bookmark(&self, bookmark_id: &str) -> Result<()> {
        let bookmarks = self.inner.read(|active| active.bookmarks.clone())?;
        bookmarks.remove(bookmark_id).await
    }

    pub async fn refresh_bookmarks(&self) -> Result<usize> {
        let bookmarks = self.inner.read(|active| active.bookmarks.clone())?;
        bookmarks.refresh().await
    }

    /// Bookmarks of the live session, ordered by timestamp.
    pub fn bookmarks(&self) -> Result<Vec<Bookmark>> {
        self.inner.read(|active| active.bookmarks.sorted())
    }

    /// Seeks to a bookmark. No-op while the duration is unknown.
    pub async fn jump_to_bookmark(&self, bookmark_id: &str) -> Result<()> {
        let (bookmarks, duration) = self
            .inner
            .read(|active| (active.bookmarks.clone(), active.session.duration_secs))?;
        match bookmarks.jump_fraction(bookmark_id, duration)? {
            Some(fraction) => self.seek_fraction(fraction).await.map(|_| ()),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------------
    // Resume
    // ------------------------------------------------------------------------

    pub fn resume_state(&self) -> Result<ResumeState> {
        self.inner.read(|active| active.resume.state())
    }

    /// Answers the pending resume offer, then starts any deferred autoplay.
    #[instrument(skip(self))]
    pub async fn choose_resume(&self, decision: ResumeDecision) -> Result<()> {
        let (resume, scope) = self
            .inner
            .read(|active| (active.resume.clone(), active.scope.clone()))?;

        let seek_to = resume.decide(decision)?;
        self.inner.update(&scope, |_| ());

        if let Some(position) = seek_to {
            self.seek(position).await?;
        }
        self.inner.run_deferred_autoplay(&scope).await;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // AI enrichment
    // ------------------------------------------------------------------------

    pub async fn request_enrichment(
        &self,
        kind: EnrichmentKind,
        force_regenerate: bool,
    ) -> Result<JobStatus> {
        let enrichment = self.inner.read(|active| active.enrichment.clone())?;
        enrichment.request(kind, force_regenerate).await
    }

    pub fn enrichment_status(&self, kind: EnrichmentKind) -> Result<JobStatus> {
        self.inner.read(|active| active.enrichment.status(kind))
    }

    pub fn enrichment_statuses(&self) -> Result<Vec<(EnrichmentKind, JobStatus)>> {
        self.inner.read(|active| active.enrichment.statuses())
    }

    /// Seeks to the start of a highlight.
    pub async fn jump_to_highlight(&self, start_time_secs: f64) -> Result<f64> {
        self.seek(start_time_secs).await
    }

    /// Seeks to the start of the `index`-th generated highlight.
    pub async fn jump_to_highlight_index(&self, index: usize) -> Result<f64> {
        let highlight = self
            .inner
            .read(|active| active.enrichment.highlight(index))?
            .ok_or_else(|| {
                SessionError::InvalidArgument(format!("no highlight at index {}", index))
            })?;
        self.jump_to_highlight(highlight.start_time_secs).await
    }

    pub async fn share_quote(&self, index: usize) -> Result<ShareOutcome> {
        let (enrichment, title) = self
            .inner
            .read(|active| (active.enrichment.clone(), active.session.title.clone()))?;
        enrichment.share_quote(index, title.as_deref()).await
    }

    // ------------------------------------------------------------------------
    // Chapters
    // ------------------------------------------------------------------------

    pub fn chapters(&self) -> Result<Vec<Chapter>> {
        self.inner.read(|active| active.chapters.list())
    }

    pub fn current_chapter(&self) -> Result<Option<Chapter>> {
        self.inner
            .read(|active| active.chapters.current(active.session.position_secs))
    }

    pub async fn jump_to_chapter(&self, index: usize) -> Result<f64> {
        let chapter = self
            .inner
            .read(|active| active.chapters.get(index))?
            .ok_or_else(|| SessionError::InvalidArgument(format!("no chapter at index {}", index)))?;
        self.seek(chapter.start_time_secs).await
    }

    /// Seeks to the next chapter. Returns `None` in the last chapter.
    pub async fn next_chapter(&self) -> Result<Option<f64>> {
        let start = self
            .inner
            .read(|active| active.chapters.next_start(active.session.position_secs))?;
        match start {
            Some(start) => self.seek(start).await.map(Some),
            None => Ok(None),
        }
    }

    /// Restarts the current chapter, or goes to the previous one when the
    /// playhead is near the current chapter's start.
    pub async fn previous_chapter(&self) -> Result<Option<f64>> {
        let start = self
            .inner
            .read(|active| active.chapters.previous_start(active.session.position_secs))?;
        match start {
            Some(start) => self.seek(start).await.map(Some),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------------
    // Surfaces
    // ------------------------------------------------------------------------

    /// Hands the session to the floating player.
    pub fn enter_floating(&self) -> Result<FloatingPlayer> {
        let (opened_with, media_id) = {
            let mut state = self.inner.state.lock();
            let active = state.active()?;
            let opened_with = FloatingSnapshot::capture(&active.session);
            let media_id = active.session.media_id.to_string();
            state.surface = SurfaceKind::Floating;
            self.inner.publish(&state);
            (opened_with, media_id)
        };

        info!(media_id = %media_id, "Floating player opened");
        self.inner
            .emit(CoreEvent::Surface(SurfaceEvent::FloatingOpened { media_id }));
        Ok(FloatingPlayer::new(self.clone(), opened_with, self.subscribe()))
    }

    /// Dismisses the floating player. Playback is not affected.
    pub fn exit_floating(&self, maximized: bool) -> Result<()> {
        let media_id = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return Err(SessionError::Disposed);
            }
            if state.surface != SurfaceKind::Floating {
                return Ok(());
            }
            state.surface = SurfaceKind::Primary;
            self.inner.publish(&state);
            state
                .active
                .as_ref()
                .map(|active| active.session.media_id.to_string())
        };

        debug!(maximized, "Floating player closed");
        self.inner
            .emit(CoreEvent::Surface(SurfaceEvent::FloatingClosed { media_id, maximized }));
        Ok(())
    }

    pub fn active_surface(&self) -> SurfaceKind {
        self.inner.state.lock().surface
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("SessionController")
            .field("media_id", &snapshot.media_id)
            .field("phase", &snapshot.phase)
            .finish()
    }
}

/// Next faster preset, wrapping to the slowest.
pub fn next_rate_preset(current: f32) -> f32 {
    RATE_PRESETS
        .iter()
        .copied()
        .find(|preset| *preset > current + 0.01)
        .unwrap_or(RATE_PRESETS[0])
}

// ============================================================================
// Controller internals
// ============================================================================

impl ControllerInner {
    fn emit(&self, event: CoreEvent) {
        self.events.emit(event).ok();
    }

    fn emit_session(&self, event: SessionEvent) {
        self.emit(CoreEvent::Session(event));
    }

    fn publish(&self, state: &ControllerState) {
        self.snapshots.send_replace(state.snapshot(&self.settings));
    }

    fn read<R>(&self, f: impl FnOnce(&ActiveSession) -> R) -> Result<R> {
        let state = self.state.lock();
        state.active().map(f)
    }

    /// Applies `f` to the session `scope` belongs to and republishes.
    /// Returns `None` when that session is no longer live.
    fn update<R>(&self, scope: &SessionScope, f: impl FnOnce(&mut ActiveSession) -> R) -> Option<R> {
        let mut state = self.state.lock();
        let result = state.live_mut(scope).map(f)?;
        self.publish(&state);
        Some(result)
    }

    /// Captures what an output control needs, refusing sessions in error.
    fn controllable<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&ActiveSession) -> R,
    ) -> Result<(SessionScope, Arc<TransportAdapter>, R)> {
        let state = self.state.lock();
        let active = state.active()?;
        if active.session.phase == SessionPhase::Error {
            return Err(SessionError::InvalidState {
                operation,
                phase: SessionPhase::Error,
            });
        }
        Ok((active.scope.clone(), active.transport.clone(), f(active)))
    }

    fn apply_output(&self, scope: &SessionScope, f: impl FnOnce(&mut Session)) -> Result<()> {
        let event = self
            .update(scope, |active| {
                f(&mut active.session);
                active.output_event()
            })
            .ok_or(SessionError::Stale)?;
        self.emit_session(event);
        Ok(())
    }

    /// Moves the session into its error phase for fatal errors.
    fn transport_failed(&self, scope: &SessionScope, err: SessionError) -> SessionError {
        if !err.is_fatal() {
            return err;
        }

        let media_id = self.update(scope, |active| {
            active.session.phase = SessionPhase::Error;
            active.session.is_playing = false;
            active.autoplay_pending = false;
            active.progress.stop();
            active.session.media_id.to_string()
        });

        if let Some(media_id) = media_id {
            error!(media_id = %media_id, error = %err, "Audio transport failed");
            self.emit_session(SessionEvent::Error {
                media_id: Some(media_id),
                message: err.to_string(),
            });
        }
        err
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    async fn open(self: &Arc<Self>, media: MediaSource) -> Result<SessionToken> {
        if media.url.trim().is_empty() {
            return Err(SessionError::InvalidArgument(
                "media URL cannot be empty".to_string(),
            ));
        }

        let opening = self.open_lock.lock().await;

        let previous = {
            let mut state = self.state.lock();
            if state.disposed {
                return Err(SessionError::Disposed);
            }
            state.active.take()
        };
        if let Some(previous) = previous {
            self.retire(previous).await;
        }

        let token = SessionToken(self.next_token.fetch_add(1, Ordering::Relaxed) + 1);
        let scope = SessionScope::new(token, media.media_id.clone());
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let options = TransportOptions {
            initial_volume: self.settings.initial_volume,
            initial_rate: self.settings.default_rate,
            render_waveform: true,
        };

        let transport = match self.deps.audio_backend.create_transport(options, event_tx).await {
            Ok(transport) => Arc::new(TransportAdapter::new(transport)),
            Err(e) => {
                let err = SessionError::from(e);
                error!(error = %err, "Failed to create audio transport");
                self.emit_session(SessionEvent::Error {
                    media_id: Some(media.media_id.to_string()),
                    message: err.to_string(),
                });
                return Err(err);
            }
        };

        let (sleep_tx, sleep_rx) = mpsc::unbounded_channel();
        let active = self.build_session(&scope, &media, transport.clone(), sleep_tx);

        let installed = {
            let mut state = self.state.lock();
            if state.disposed {
                false
            } else {
                state.active = Some(active);
                self.publish(&state);
                true
            }
        };
        if !installed {
            transport.dispose().await.ok();
            return Err(SessionError::Disposed);
        }

        info!(token = token.0, url = %core_runtime::logging::redact_url(&media.url), "Session opened");
        self.emit_session(SessionEvent::Opened {
            media_id: media.media_id.to_string(),
            token: token.0,
        });

        let driver = tokio::spawn(drive(Arc::downgrade(self), scope.clone(), event_rx, sleep_rx));
        if let Some(driver) = self.update(&scope, |active| active.driver.replace(driver)).flatten() {
            driver.abort();
        }

        // The session is installed; a later open or close may retire it while
        // the host is still loading.
        drop(opening);

        let loaded = transport.load(&media.url).await;
        if !scope.is_live() {
            debug!(token = token.0, "Session retired while loading");
            return Err(SessionError::Stale);
        }
        loaded.map_err(|e| self.transport_failed(&scope, e))?;
        Ok(token)
    }

    fn build_session(
        &self,
        scope: &SessionScope,
        media: &MediaSource,
        transport: Arc<TransportAdapter>,
        sleep_tx: mpsc::UnboundedSender<SleepSignal>,
    ) -> ActiveSession {
        let settings = &self.settings;
        let deps = &self.deps;

        ActiveSession {
            scope: scope.clone(),
            session: Session::loading(
                media.media_id.clone(),
                media.url.clone(),
                media.title.clone(),
                settings.initial_volume,
                settings.default_rate,
            ),
            transport,
            progress: ProgressReporter::new(
                deps.progress_api.clone(),
                self.user_id.clone(),
                scope.clone(),
                settings.progress_interval,
            ),
            sleep_timer: SleepTimer::new(
                deps.clock.clone(),
                settings.sleep_timer_refresh_interval,
                sleep_tx,
            ),
            bookmarks: Arc::new(BookmarkManager::new(
                deps.bookmark_api.clone(),
                scope.clone(),
                self.user_id.clone(),
                self.events.clone(),
            )),
            resume: Arc::new(ResumeNegotiator::new(
                deps.resume_api.clone(),
                scope.clone(),
                self.user_id.clone(),
                settings.resume_threshold_secs,
                self.events.clone(),
            )),
            enrichment: Arc::new(EnrichmentOrchestrator::new(
                deps.enrichment_api.clone(),
                scope.clone(),
                self.events.clone(),
                settings.quote_count,
                settings.highlight_count,
                deps.share_target.clone(),
            )),
            chapters: Arc::new(ChapterIndex::new(deps.chapter_api.clone(), scope.clone())),
            autoplay_pending: settings.autoplay,
            completion_reported: false,
            driver: None,
        }
    }

    /// Shuts a detached session down and releases its transport.
    async fn retire(&self, mut previous: ActiveSession) {
        previous.shutdown();
        let media_id = previous.session.media_id.to_string();
        let transport = previous.transport.clone();
        drop(previous);

        info!(media_id = %media_id, "Session closed");
        self.emit_session(SessionEvent::Closed { media_id });

        if let Err(e) = transport.dispose().await {
            warn!(error = %e, "Failed to dispose audio transport");
        }
    }

    async fn close(&self) -> Result<()> {
        let _opening = self.open_lock.lock().await;

        let (previous, floating_media) = {
            let mut state = self.state.lock();
            if state.disposed {
                return Err(SessionError::Disposed);
            }
            let previous = state.active.take();
            let floating_media = (state.surface == SurfaceKind::Floating)
                .then(|| previous.as_ref().map(|p| p.session.media_id.to_string()));
            state.surface = SurfaceKind::Primary;
            self.publish(&state);
            (previous, floating_media)
        };

        if let Some(media_id) = floating_media {
            self.emit(CoreEvent::Surface(SurfaceEvent::FloatingClosed {
                media_id,
                maximized: false,
            }));
        }
        if let Some(previous) = previous {
            self.retire(previous).await;
        }
        Ok(())
    }

    async fn dispose(&self) {
        let previous = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            let mut previous = state.active.take();
            if let Some(previous) = previous.as_mut() {
                previous.shutdown();
            }
            state.surface = SurfaceKind::Primary;
            self.publish(&state);
            previous
        };

        info!("Session controller disposed");
        if let Some(previous) = previous {
            self.retire(previous).await;
        }
    }

    // ------------------------------------------------------------------------
    // Transport controls
    // ------------------------------------------------------------------------

    async fn play(&self, expected: Option<SessionToken>) -> Result<()> {
        let (scope, transport) = {
            let mut state = self.state.lock();
            let active = state.active_mut()?;
            if expected.is_some_and(|token| token != active.scope.token()) {
                return Err(SessionError::Stale);
            }
            match active.session.phase {
                SessionPhase::Playing => return Ok(()),
                SessionPhase::Ready | SessionPhase::Paused => {}
                phase => {
                    return Err(SessionError::InvalidState {
                        operation: "play",
                        phase,
                    })
                }
            }
            active.autoplay_pending = false;
            (active.scope.clone(), active.transport.clone())
        };

        transport
            .play()
            .await
            .map_err(|e| self.transport_failed(&scope, e))?;

        let started = self
            .update(&scope, |active| {
                if !matches!(
                    active.session.phase,
                    SessionPhase::Ready | SessionPhase::Paused
                ) {
                    return None;
                }
                active.session.phase = SessionPhase::Playing;
                active.session.is_playing = true;
                let sampler =
                    TransportSampler::new(active.transport.clone(), active.session.duration_secs);
                active.progress.start(Arc::new(sampler));
                Some(active.session.position_ms())
            })
            .ok_or(SessionError::Stale)?;

        if let Some(position_ms) = started {
            info!(media_id = %scope.media_id(), position_ms, "Playback started");
            self.emit_session(SessionEvent::Playing {
                media_id: scope.media_id().to_string(),
                position_ms,
            });
        }
        Ok(())
    }

    async fn pause(&self, expected: Option<SessionToken>) -> Result<()> {
        let (scope, transport) = {
            let mut state = self.state.lock();
            let active = state.active_mut()?;
            if expected.is_some_and(|token| token != active.scope.token()) {
                return Err(SessionError::Stale);
            }
            if active.session.phase != SessionPhase::Playing {
                active.autoplay_pending = false;
                return Ok(());
            }
            (active.scope.clone(), active.transport.clone())
        };

        transport
            .pause()
            .await
            .map_err(|e| self.transport_failed(&scope, e))?;

        let paused = self
            .update(&scope, |active| {
                if active.session.phase != SessionPhase::Playing {
                    return None;
                }
                active.session.phase = SessionPhase::Paused;
                active.session.is_playing = false;
                active.progress.stop();
                Some(active.session.position_ms())
            })
            .ok_or(SessionError::Stale)?;

        if let Some(position_ms) = paused {
            info!(media_id = %scope.media_id(), position_ms, "Playback paused");
            self.emit_session(SessionEvent::Paused {
                media_id: scope.media_id().to_string(),
                position_ms,
            });
        }
        Ok(())
    }

    async fn seek(&self, position_secs: f64) -> Result<f64> {
        if !position_secs.is_finite() {
            return Err(SessionError::InvalidArgument(format!(
                "seek position must be finite (got {})",
                position_secs
            )));
        }

        let (scope, transport, target, fraction) = {
            let state = self.state.lock();
            let active = state.active()?;
            let phase = active.session.phase;
            if !phase.accepts_seek() {
                return Err(SessionError::InvalidState {
                    operation: "seek",
                    phase,
                });
            }
            let duration = active.session.duration_secs;
            if duration <= 0.0 {
                return Err(SessionError::UnknownDuration);
            }
            let target = position_secs.clamp(0.0, duration);
            (
                active.scope.clone(),
                active.transport.clone(),
                target,
                target / duration,
            )
        };

        transport
            .seek_fraction(fraction)
            .await
            .map_err(|e| self.transport_failed(&scope, e))?;

        let applied = self
            .update(&scope, |active| {
                if !active.session.phase.accepts_seek() {
                    return false;
                }
                active.session.position_secs = target;
                true
            })
            .ok_or(SessionError::Stale)?;

        if applied {
            debug!(media_id = %scope.media_id(), position_secs = target, "Seeked");
            self.emit_session(SessionEvent::Seeked {
                media_id: scope.media_id().to_string(),
                position_ms: secs_to_ms(target),
            });
        }
        Ok(target)
    }

    /// Starts playback held back by autoplay once no resume offer is pending.
    async fn run_deferred_autoplay(&self, scope: &SessionScope) {
        let should_play = self
            .update(scope, |active| {
                if active.autoplay_pending && !active.resume.holds_autoplay() {
                    active.autoplay_pending = false;
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);

        if should_play {
            debug!(media_id = %scope.media_id(), "Starting autoplay");
            if let Err(e) = self.play(Some(scope.token())).await {
                if !e.is_stale() {
                    warn!(error = %e, "Autoplay failed");
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Driver callbacks
    // ------------------------------------------------------------------------

    async fn on_transport_event(self: &Arc<Self>, scope: &SessionScope, event: TransportEvent) {
        match event {
            TransportEvent::Ready { duration_secs } => self.on_ready(scope, duration_secs),
            TransportEvent::PositionTick { position_secs } => {
                if !position_secs.is_finite() {
                    return;
                }
                self.update(scope, |active| {
                    let session = &mut active.session;
                    if matches!(session.phase, SessionPhase::Playing | SessionPhase::Paused) {
                        session.position_secs = if session.duration_secs > 0.0 {
                            position_secs.clamp(0.0, session.duration_secs)
                        } else {
                            position_secs.max(0.0)
                        };
                    }
                });
            }
            TransportEvent::Finished => self.on_finished(scope),
            TransportEvent::Error { reason } => {
                self.transport_failed(scope, SessionError::Transport(reason));
            }
        }
    }

    fn on_ready(self: &Arc<Self>, scope: &SessionScope, duration_secs: f64) {
        let duration_secs = if duration_secs.is_finite() && duration_secs > 0.0 {
            duration_secs
        } else {
            0.0
        };

        let accepted = self
            .update(scope, |active| {
                if active.session.phase != SessionPhase::Loading {
                    return false;
                }
                active.session.duration_secs = duration_secs;
                active.session.phase = SessionPhase::Ready;
                true
            })
            .unwrap_or(false);
        if !accepted {
            return;
        }

        info!(media_id = %scope.media_id(), duration_secs, "Media ready");
        self.emit_session(SessionEvent::Ready {
            media_id: scope.media_id().to_string(),
            duration_ms: secs_to_ms(duration_secs),
        });
        tokio::spawn(self.clone().prepare_session(scope.clone()));
    }

    /// Loads the session's side data and runs the resume check.
    async fn prepare_session(self: Arc<Self>, scope: SessionScope) {
        let components = {
            let mut state = self.state.lock();
            state.live_mut(&scope).map(|active| {
                (
                    active.bookmarks.clone(),
                    active.chapters.clone(),
                    active.enrichment.clone(),
                    active.resume.clone(),
                )
            })
        };
        let Some((bookmarks, chapters, enrichment, resume)) = components else {
            return;
        };

        tokio::spawn(async move {
            if let Err(e) = bookmarks.refresh().await {
                log_background_failure("bookmarks", &e);
            }
        });
        tokio::spawn(async move {
            if let Err(e) = chapters.load().await {
                log_background_failure("chapters", &e);
            }
        });
        tokio::spawn(async move {
            if let Err(e) = enrichment.hydrate().await {
                log_background_failure("cached enrichments", &e);
            }
        });

        if let Err(e) = resume.check().await {
            log_background_failure("resume check", &e);
            return;
        }
        self.update(&scope, |_| ());
        self.run_deferred_autoplay(&scope).await;
    }

    fn on_finished(self: &Arc<Self>, scope: &SessionScope) {
        let user_id = self.user_id.to_string();
        let outcome = self.update(scope, |active| {
            if matches!(
                active.session.phase,
                SessionPhase::Finished | SessionPhase::Error | SessionPhase::Loading
            ) {
                return None;
            }
            let session = &mut active.session;
            session.phase = SessionPhase::Finished;
            session.is_playing = false;
            if session.duration_secs > 0.0 {
                session.position_secs = session.duration_secs;
            }
            active.progress.stop();

            let report = (!active.completion_reported).then(|| CompletionReport {
                media_id: active.session.media_id.to_string(),
                user_id: user_id.clone(),
                duration_secs: active.session.duration_secs,
            });
            active.completion_reported = true;
            Some(report)
        });
        let Some(Some(report)) = outcome else {
            return;
        };

        info!(media_id = %scope.media_id(), "Episode finished");
        self.emit_session(SessionEvent::Finished {
            media_id: scope.media_id().to_string(),
        });

        let Some(report) = report else {
            return;
        };
        let inner = self.clone();
        let scope = scope.clone();
        tokio::spawn(async move {
            match inner.deps.progress_api.report_completion(report).await {
                Ok(()) if scope.is_live() => {
                    inner.emit_session(SessionEvent::CompletionReported {
                        media_id: scope.media_id().to_string(),
                    });
                }
                Ok(()) => {}
                Err(e) => {
                    warn!(media_id = %scope.media_id(), error = %e, "Listen completion report failed");
                }
            }
        });
    }

    async fn on_sleep_signal(&self, scope: &SessionScope, signal: SleepSignal) {
        match signal {
            SleepSignal::Refresh(id) => {
                let remaining = self
                    .update(scope, |active| {
                        if active.sleep_timer.is_current(id) {
                            active.sleep_timer.remaining_minutes()
                        } else {
                            None
                        }
                    })
                    .flatten();
                if let Some(remaining_minutes) = remaining {
                    debug!(remaining_minutes, "Sleep timer tick");
                    self.emit(CoreEvent::SleepTimer(SleepTimerEvent::Tick {
                        remaining_minutes,
                    }));
                }
            }
            SleepSignal::Expired(id) => {
                let was_playing = self
                    .update(scope, |active| {
                        active
                            .sleep_timer
                            .take_expired(id)
                            .then_some(active.session.is_playing)
                    })
                    .flatten();
                let Some(was_playing) = was_playing else {
                    debug!(timer = id.0, "Ignoring stale sleep timer signal");
                    return;
                };

                if was_playing {
                    if let Err(e) = self.pause(Some(scope.token())).await {
                        warn!(error = %e, "Sleep timer could not pause playback");
                    }
                }
                info!(paused_playback = was_playing, "Sleep timer expired");
                self.emit(CoreEvent::SleepTimer(SleepTimerEvent::Expired {
                    paused_playback: was_playing,
                }));
            }
        }
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        if let Some(active) = self.state.get_mut().active.as_mut() {
            active.shutdown();
        }
    }
}

fn log_background_failure(what: &str, err: &SessionError) {
    if err.is_stale() {
        debug!(what, "Discarded result for a closed session");
    } else {
        warn!(what, error = %err, "Background load failed");
    }
}

/// Per-session event loop. Ends when the scope closes or the controller is
/// dropped.
async fn drive(
    controller: Weak<ControllerInner>,
    scope: SessionScope,
    mut transport_events: TransportEventReceiver,
    mut sleep_signals: mpsc::UnboundedReceiver<SleepSignal>,
) {
    loop {
        tokio::select! {
            _ = scope.closed() => break,
            Some(event) = transport_events.recv() => {
                let Some(inner) = controller.upgrade() else { break };
                inner.on_transport_event(&scope, event).await;
            }
            Some(signal) = sleep_signals.recv() => {
                let Some(inner) = controller.upgrade() else { break };
                inner.on_sleep_signal(&scope, signal).await;
            }
            else => break,
        }
    }
    debug!(token = scope.token().0, "Session driver stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_rate_preset_cycles() {
        assert_eq!(next_rate_preset(1.0), 1.25);
        assert_eq!(next_rate_preset(1.1), 1.25);
        assert_eq!(next_rate_preset(2.0), 0.5);
        assert_eq!(next_rate_preset(2.5), 0.5);
        assert_eq!(next_rate_preset(0.5), 0.75);
    }
}
