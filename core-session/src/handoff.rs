//! # Primary / Floating Handoff
//!
//! The floating mini player is a second view of the same session, never a
//! second transport. Entering it snapshots the session for the first frame;
//! afterwards it follows the shared snapshot stream and sends every command
//! through the controller.

use crate::controller::SessionController;
use crate::error::Result;
use crate::session::{MediaId, Session, SessionSnapshot};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Which surface currently presents the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceKind {
    Primary,
    Floating,
}

/// What the floating player renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FloatingSnapshot {
    pub media_id: Option<MediaId>,
    pub is_playing: bool,
    pub position_secs: f64,
    pub duration_secs: f64,
    pub volume: f32,
}

impl FloatingSnapshot {
    pub(crate) fn capture(session: &Session) -> Self {
        Self {
            media_id: Some(session.media_id.clone()),
            is_playing: session.is_playing,
            position_secs: session.position_secs,
            duration_secs: session.duration_secs,
            volume: session.effective_volume(),
        }
    }
}

impl From<&SessionSnapshot> for FloatingSnapshot {
    fn from(snapshot: &SessionSnapshot) -> Self {
        Self {
            media_id: snapshot.media_id.clone(),
            is_playing: snapshot.is_playing,
            position_secs: snapshot.position_secs,
            duration_secs: snapshot.duration_secs,
            volume: if snapshot.is_muted { 0.0 } else { snapshot.volume },
        }
    }
}

/// Handle held by the floating surface.
pub struct FloatingPlayer {
    controller: SessionController,
    opened_with: FloatingSnapshot,
    updates: watch::Receiver<SessionSnapshot>,
}

impl FloatingPlayer {
    pub(crate) fn new(
        controller: SessionController,
        opened_with: FloatingSnapshot,
        updates: watch::Receiver<SessionSnapshot>,
    ) -> Self {
        Self {
            controller,
            opened_with,
            updates,
        }
    }

    /// State captured when the handoff happened.
    pub fn opened_with(&self) -> &FloatingSnapshot {
        &self.opened_with
    }

    pub fn current(&self) -> FloatingSnapshot {
        FloatingSnapshot::from(&*self.updates.borrow())
    }

    /// Waits for the next session change. `None` once the controller is gone.
    pub async fn changed(&mut self) -> Option<FloatingSnapshot> {
        self.updates.changed().await.ok()?;
        Some(self.current())
    }

    /// Returns whether playback runs afterwards.
    pub async fn play_pause(&self) -> Result<bool> {
        self.controller.toggle_play().await
    }

    pub async fn skip(&self, delta_secs: f64) -> Result<f64> {
        self.controller.skip(delta_secs).await
    }

    pub async fn set_volume(&self, volume: f32) -> Result<f32> {
        self.controller.set_volume(volume).await
    }

    /// Returns to the full player.
    pub fn maximize(self) -> Result<()> {
        self.controller.exit_floating(true)
    }

    /// Dismisses the floating player; playback continues.
    pub fn close(self) -> Result<()> {
        self.controller.exit_floating(false)
    }
}

impl std::fmt::Debug for FloatingPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FloatingPlayer")
            .field("opened_with", &self.opened_with)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_conversion_uses_effective_volume() {
        let mut snapshot = SessionSnapshot::idle(0.6, 1.0);
        snapshot.media_id = Some(MediaId::from("42"));
        snapshot.is_muted = true;

        let floating = FloatingSnapshot::from(&snapshot);
        assert_eq!(floating.volume, 0.0);
        assert_eq!(floating.media_id, Some(MediaId::from("42")));
    }

    #[test]
    fn test_surface_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&SurfaceKind::Floating).unwrap(),
            "\"floating\""
        );
    }
}
