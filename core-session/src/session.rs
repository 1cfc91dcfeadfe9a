//! Session identity, phase and the snapshot published to player surfaces.

use crate::handoff::SurfaceKind;
use crate::resume::ResumeState;
use crate::sleep_timer::SleepTimerStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque identifier of a podcast episode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(String);

impl MediaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MediaId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for MediaId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Listener identity, passed explicitly to every collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Generation number of a session. Every `open` gets a larger token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(pub u64);

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Phase
// ============================================================================

/// Controller state machine.
///
/// ```text
/// Idle -> Loading -> Ready -> Playing <-> Paused -> Finished
///            |         |        |          |
///            +---------+--------+----------+-----> Error
/// ```
///
/// `Disposed` is terminal and reachable from every phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Finished,
    Error,
    Disposed,
}

impl SessionPhase {
    /// Returns `true` once the transport knows the media duration.
    pub fn is_loaded(self) -> bool {
        matches!(
            self,
            SessionPhase::Ready | SessionPhase::Playing | SessionPhase::Paused | SessionPhase::Finished
        )
    }

    /// Returns `true` while seeking and transport controls are accepted.
    pub fn accepts_seek(self) -> bool {
        matches!(
            self,
            SessionPhase::Ready | SessionPhase::Playing | SessionPhase::Paused
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Loading => "loading",
            SessionPhase::Ready => "ready",
            SessionPhase::Playing => "playing",
            SessionPhase::Paused => "paused",
            SessionPhase::Finished => "finished",
            SessionPhase::Error => "in error",
            SessionPhase::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Session
// ============================================================================

/// Mutable state of the live session. Only the controller touches it, always
/// under its lock.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub media_id: MediaId,
    pub media_url: String,
    pub title: Option<String>,
    pub duration_secs: f64,
    pub position_secs: f64,
    pub is_playing: bool,
    /// Listener volume, kept while muted.
    pub volume: f32,
    pub is_muted: bool,
    pub playback_rate: f32,
    pub phase: SessionPhase,
}

impl Session {
    pub(crate) fn loading(
        media_id: MediaId,
        media_url: String,
        title: Option<String>,
        volume: f32,
        playback_rate: f32,
    ) -> Self {
        Self {
            media_id,
            media_url,
            title,
            duration_secs: 0.0,
            position_secs: 0.0,
            is_playing: false,
            volume,
            is_muted: false,
            playback_rate,
            phase: SessionPhase::Loading,
        }
    }

    /// Volume actually sent to the transport.
    pub fn effective_volume(&self) -> f32 {
        if self.is_muted {
            0.0
        } else {
            self.volume
        }
    }

    pub(crate) fn position_ms(&self) -> u64 {
        secs_to_ms(self.position_secs)
    }
}

pub(crate) fn secs_to_ms(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        (secs * 1000.0).round() as u64
    } else {
        0
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Immutable view of the controller, published on every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub token: Option<SessionToken>,
    pub media_id: Option<MediaId>,
    pub title: Option<String>,
    pub phase: SessionPhase,
    pub position_secs: f64,
    pub duration_secs: f64,
    pub is_playing: bool,
    pub volume: f32,
    pub is_muted: bool,
    pub playback_rate: f32,
    pub sleep_timer: Option<SleepTimerStatus>,
    pub resume: ResumeState,
    pub surface: SurfaceKind,
}

impl SessionSnapshot {
    /// Snapshot of a controller with nothing loaded.
    pub fn idle(volume: f32, playback_rate: f32) -> Self {
        Self {
            token: None,
            media_id: None,
            title: None,
            phase: SessionPhase::Idle,
            position_secs: 0.0,
            duration_secs: 0.0,
            is_playing: false,
            volume,
            is_muted: false,
            playback_rate,
            sleep_timer: None,
            resume: ResumeState::Init,
            surface: SurfaceKind::Primary,
        }
    }

    /// Playhead as a fraction of the duration, `0.0` while unknown.
    pub fn progress_fraction(&self) -> f64 {
        if self.duration_secs > 0.0 {
            (self.position_secs / self.duration_secs).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}
