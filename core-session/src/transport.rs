//! # Audio Transport Adapter
//!
//! Wraps the host [`AudioTransport`] the controller owns for one session.
//!
//! The adapter validates and clamps every argument before it reaches the
//! host, maps host failures onto [`SessionError::Transport`], and remembers
//! that it was disposed: every later call becomes a no-op instead of reaching
//! a torn-down host object.

use crate::error::{Result, SessionError};
use crate::progress::{PositionSource, ProgressSample};
use async_trait::async_trait;
use bridge_traits::AudioTransport;
use core_runtime::config::{MAX_PLAYBACK_RATE, MIN_PLAYBACK_RATE};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct TransportAdapter {
    inner: Box<dyn AudioTransport>,
    disposed: AtomicBool,
}

impl TransportAdapter {
    pub fn new(inner: Box<dyn AudioTransport>) -> Self {
        Self {
            inner,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub async fn load(&self, url: &str) -> Result<()> {
        if self.is_disposed() {
            return Ok(());
        }
        self.inner.load(url).await.map_err(SessionError::from)
    }

    pub async fn play(&self) -> Result<()> {
        if self.is_disposed() {
            return Ok(());
        }
        self.inner.play().await.map_err(SessionError::from)
    }

    pub async fn pause(&self) -> Result<()> {
        if self.is_disposed() {
            return Ok(());
        }
        self.inner.pause().await.map_err(SessionError::from)
    }

    /// Seeks to `fraction` of the media, clamped to `0.0..=1.0`.
    pub async fn seek_fraction(&self, fraction: f64) -> Result<()> {
        if !fraction.is_finite() {
            return Err(SessionError::InvalidArgument(format!(
                "seek fraction must be finite (got {})",
                fraction
            )));
        }
        if self.is_disposed() {
            return Ok(());
        }
        self.inner
            .seek_fraction(fraction.clamp(0.0, 1.0))
            .await
            .map_err(SessionError::from)
    }

    /// Sets the output volume, clamped to `0.0..=1.0`.
    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        if !volume.is_finite() {
            return Err(SessionError::InvalidArgument(format!(
                "volume must be finite (got {})",
                volume
            )));
        }
        if self.is_disposed() {
            return Ok(());
        }
        self.inner
            .set_volume(volume.clamp(0.0, 1.0))
            .await
            .map_err(SessionError::from)
    }

    /// Sets the playback rate, clamped to the supported range.
    pub async fn set_rate(&self, rate: f32) -> Result<()> {
        if !rate.is_finite() {
            return Err(SessionError::InvalidArgument(format!(
                "playback rate must be finite (got {})",
                rate
            )));
        }
        if self.is_disposed() {
            return Ok(());
        }
        self.inner
            .set_rate(clamp_rate(rate))
            .await
            .map_err(SessionError::from)
    }

    pub async fn position(&self) -> Result<f64> {
        if self.is_disposed() {
            return Err(SessionError::Disposed);
        }
        self.inner.position().await.map_err(SessionError::from)
    }

    /// Releases the host transport. Only the first call reaches the host.
    pub async fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!("Disposing audio transport");
        self.inner.dispose().await.map_err(SessionError::from)
    }
}

impl std::fmt::Debug for TransportAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportAdapter")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Clamps a rate to `MIN_PLAYBACK_RATE..=MAX_PLAYBACK_RATE`.
pub fn clamp_rate(rate: f32) -> f32 {
    rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)
}

/// Samples the transport playhead for the progress reporter.
pub struct TransportSampler {
    transport: Arc<TransportAdapter>,
    duration_secs: f64,
}

impl TransportSampler {
    pub fn new(transport: Arc<TransportAdapter>, duration_secs: f64) -> Self {
        Self {
            transport,
            duration_secs,
        }
    }
}

#[async_trait]
impl PositionSource for TransportSampler {
    async fn sample(&self) -> Option<ProgressSample> {
        match self.transport.position().await {
            Ok(position_secs) => Some(ProgressSample {
                position_secs,
                duration_secs: self.duration_secs,
            }),
            Err(SessionError::Disposed) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read playback position");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::BridgeError;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail_play: bool,
    }

    struct RecordingTransport(Arc<Recorder>);

    #[async_trait]
    impl AudioTransport for RecordingTransport {
        async fn load(&self, url: &str) -> BridgeResult<()> {
            self.0.calls.lock().push(format!("load {}", url));
            Ok(())
        }

        async fn play(&self) -> BridgeResult<()> {
            if self.0.fail_play {
                return Err(BridgeError::Transport("device lost".to_string()));
            }
            self.0.calls.lock().push("play".to_string());
            Ok(())
        }

        async fn pause(&self) -> BridgeResult<()> {
            self.0.calls.lock().push("pause".to_string());
            Ok(())
        }

        async fn seek_fraction(&self, fraction: f64) -> BridgeResult<()> {
            self.0.calls.lock().push(format!("seek {}", fraction));
            Ok(())
        }

        async fn set_volume(&self, volume: f32) -> BridgeResult<()> {
            self.0.calls.lock().push(format!("volume {}", volume));
            Ok(())
        }

        async fn set_rate(&self, rate: f32) -> BridgeResult<()> {
            self.0.calls.lock().push(format!("rate {}", rate));
            Ok(())
        }

        async fn position(&self) -> BridgeResult<f64> {
            Ok(12.5)
        }

        async fn dispose(&self) -> BridgeResult<()> {
            self.0.calls.lock().push("dispose".to_string());
            Ok(())
        }
    }

    fn adapter() -> (TransportAdapter, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (
            TransportAdapter::new(Box::new(RecordingTransport(recorder.clone()))),
            recorder,
        )
    }

    #[tokio::test]
    async fn test_arguments_are_clamped() {
        let (transport, recorder) = adapter();
        transport.seek_fraction(1.7).await.unwrap();
        transport.set_volume(-0.2).await.unwrap();
        transport.set_rate(8.0).await.unwrap();
        transport.set_rate(0.1).await.unwrap();

        assert_eq!(
            *recorder.calls.lock(),
            vec!["seek 1", "volume 0", "rate 3", "rate 0.5"]
        );
    }

    #[tokio::test]
    async fn test_non_finite_arguments_are_rejected() {
        let (transport, recorder) = adapter();
        assert!(matches!(
            transport.seek_fraction(f64::NAN).await,
            Err(SessionError::InvalidArgument(_))
        ));
        assert!(matches!(
            transport.set_volume(f32::INFINITY).await,
            Err(SessionError::InvalidArgument(_))
        ));
        assert!(recorder.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_calls_after_dispose_are_no_ops() {
        let (transport, recorder) = adapter();
        transport.dispose().await.unwrap();
        transport.dispose().await.unwrap();
        transport.play().await.unwrap();
        transport.seek_fraction(0.5).await.unwrap();

        assert!(transport.is_disposed());
        assert_eq!(*recorder.calls.lock(), vec!["dispose"]);
        assert_eq!(transport.position().await, Err(SessionError::Disposed));
    }

    #[tokio::test]
    async fn test_host_failures_map_to_transport_errors() {
        let recorder = Arc::new(Recorder {
            fail_play: true,
            ..Default::default()
        });
        let transport = TransportAdapter::new(Box::new(RecordingTransport(recorder)));
        let err = transport.play().await.unwrap_err();
        assert_eq!(err, SessionError::Transport("device lost".to_string()));
    }

    #[tokio::test]
    async fn test_sampler_reports_duration() {
        let (transport, _) = adapter();
        let sampler = TransportSampler::new(Arc::new(transport), 600.0);
        assert_eq!(
            sampler.sample().await,
            Some(ProgressSample {
                position_secs: 12.5,
                duration_secs: 600.0
            })
        );
    }
}
