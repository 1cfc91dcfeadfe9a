//! Audio transport bridge traits.
//!
//! The host owns waveform decoding and rendering. The core only drives it
//! through the small set of transport primitives below and listens to the
//! events it pushes back. Positions are expressed in seconds, seeks as a
//! fraction of the total duration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

/// Events pushed by a host transport into the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum TransportEvent {
    /// Media decoded far enough to know its length.
    Ready { duration_secs: f64 },
    /// Periodic playhead report (also sent after a seek settles).
    PositionTick { position_secs: f64 },
    /// Playback reached the end of the media.
    Finished,
    /// Unrecoverable failure (malformed media, device loss, network).
    Error { reason: String },
}

/// Sender half handed to the transport at creation time.
pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiver half consumed by the owning session.
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Presentation options used when a transport is created.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportOptions {
    /// Initial volume in `0.0..=1.0`.
    pub initial_volume: f32,
    /// Initial playback rate multiplier.
    pub initial_rate: f32,
    /// Whether the host should render the waveform for this transport.
    pub render_waveform: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            initial_volume: 1.0,
            initial_rate: 1.0,
            render_waveform: true,
        }
    }
}

/// A single loaded (or loading) piece of media inside the host backend.
///
/// Implementations must tolerate calls in any order; the core guarantees it
/// stops calling after [`dispose`](AudioTransport::dispose) returns.
#[async_trait]
pub trait AudioTransport: Send + Sync {
    /// Start loading `url`. Completion is signalled with
    /// [`TransportEvent::Ready`]; an immediate failure is returned as an error.
    async fn load(&self, url: &str) -> Result<()>;

    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    /// Move the playhead to `fraction` of the duration, `fraction ∈ [0, 1]`.
    async fn seek_fraction(&self, fraction: f64) -> Result<()>;

    /// Volume normalized to `0.0..=1.0`.
    async fn set_volume(&self, volume: f32) -> Result<()>;

    /// Playback rate multiplier (1.0 = normal speed).
    async fn set_rate(&self, rate: f32) -> Result<()>;

    /// Current playhead in seconds.
    async fn position(&self) -> Result<f64>;

    /// Release every host resource bound to this transport.
    async fn dispose(&self) -> Result<()>;
}

/// Factory for transports. Each session creates exactly one.
#[async_trait]
pub trait AudioBackend: Send + Sync {
    async fn create_transport(
        &self,
        options: TransportOptions,
        events: TransportEventSender,
    ) -> Result<Box<dyn AudioTransport>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_options_default_values() {
        let opts = TransportOptions::default();
        assert_eq!(opts.initial_volume, 1.0);
        assert_eq!(opts.initial_rate, 1.0);
        assert!(opts.render_waveform);
    }

    #[test]
    fn transport_event_serializes_with_tag() {
        let json = serde_json::to_string(&TransportEvent::Ready {
            duration_secs: 600.0,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"Ready","duration_secs":600.0}"#);
    }

    #[tokio::test]
    async fn event_channel_delivers_in_order() {
        let (tx, mut rx): (TransportEventSender, TransportEventReceiver) =
            mpsc::unbounded_channel();
        tx.send(TransportEvent::PositionTick { position_secs: 1.0 })
            .unwrap();
        tx.send(TransportEvent::Finished).unwrap();

        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::PositionTick { position_secs: 1.0 })
        );
        assert_eq!(rx.recv().await, Some(TransportEvent::Finished));
    }
}
