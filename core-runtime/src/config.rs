//! # Session Configuration Module
//!
//! Provides configuration management for the podcast session core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! `SessionConfig` that holds the listener identity, the backend location,
//! every injected bridge, and the playback tunables. It enforces fail-fast
//! validation so a controller is never created with a missing capability.
//!
//! ## Required Dependencies
//!
//! - `AudioBackend` - the host waveform/audio engine
//! - `HttpClient` - HTTP operations (desktop default: reqwest)
//!
//! ## Optional Dependencies
//!
//! - `Clock` - wall-clock source (default: `SystemClock`)
//! - `ShareTarget` - share sheet used for quote sharing
//! - `LoggerSink` - forwards logs into the host pipeline
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{PlaybackSettings, SessionConfig};
//! use std::time::Duration;
//!
//! let config = SessionConfig::builder()
//!     .user_id("1024")
//!     .api_base_url("https://podcasts.example.com")
//!     .audio_backend(Arc::new(HostWaveformBackend::new()))
//!     .playback(PlaybackSettings::default().with_autoplay(true))
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::SessionConfig;
//!
//! // Panics with an actionable message: no audio backend was injected.
//! let config = SessionConfig::builder()
//!     .user_id("1024")
//!     .api_base_url("https://podcasts.example.com")
//!     .build()
//!     .expect("Should fail - missing audio backend");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{AudioBackend, Clock, HttpClient, LoggerSink, ShareTarget, SystemClock};
use std::sync::Arc;
use std::time::Duration;

/// Default interval between listening-progress reports.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// Default interval at which the sleep-timer countdown is republished.
pub const DEFAULT_SLEEP_TIMER_REFRESH: Duration = Duration::from_secs(60);

/// Stored positions at or below this many seconds are not worth offering.
pub const DEFAULT_RESUME_THRESHOLD_SECS: f64 = 10.0;

/// Slowest and fastest playback rates accepted by the controller.
pub const MIN_PLAYBACK_RATE: f32 = 0.5;
pub const MAX_PLAYBACK_RATE: f32 = 3.0;

// ============================================================================
// Playback Settings
// ============================================================================

/// Tunables for a playback session.
///
/// Every value has a sensible default; hosts only override what they need.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSettings {
    /// How often the listening position is reported while playing.
    pub progress_interval: Duration,

    /// How often the sleep-timer countdown is republished for display.
    pub sleep_timer_refresh_interval: Duration,

    /// Minimum stored position (seconds) that triggers a resume offer.
    pub resume_threshold_secs: f64,

    /// Number of quotes requested from the enrichment service.
    pub quote_count: u32,

    /// Number of highlights requested from the enrichment service.
    pub highlight_count: u32,

    /// Start playback as soon as the media is ready (deferred while a resume
    /// offer is pending).
    pub autoplay: bool,

    /// Volume applied to every new transport, `0.0..=1.0`.
    pub initial_volume: f32,

    /// Playback rate applied to every new transport.
    pub default_rate: f32,

    /// Capacity of the session event bus.
    pub event_buffer_size: usize,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            sleep_timer_refresh_interval: DEFAULT_SLEEP_TIMER_REFRESH,
            resume_threshold_secs: DEFAULT_RESUME_THRESHOLD_SECS,
            quote_count: 5,
            highlight_count: 3,
            autoplay: false,
            initial_volume: 1.0,
            default_rate: 1.0,
            event_buffer_size: crate::events::DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

impl PlaybackSettings {
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_sleep_timer_refresh(mut self, interval: Duration) -> Self {
        self.sleep_timer_refresh_interval = interval;
        self
    }

    pub fn with_resume_threshold_secs(mut self, secs: f64) -> Self {
        self.resume_threshold_secs = secs;
        self
    }

    pub fn with_quote_count(mut self, count: u32) -> Self {
        self.quote_count = count;
        self
    }

    pub fn with_highlight_count(mut self, count: u32) -> Self {
        self.highlight_count = count;
        self
    }

    pub fn with_autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }

    pub fn with_initial_volume(mut self, volume: f32) -> Self {
        self.initial_volume = volume;
        self
    }

    pub fn with_default_rate(mut self, rate: f32) -> Self {
        self.default_rate = rate;
        self
    }

    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }

    /// Validates the settings
    pub fn validate(&self) -> Result<()> {
        if self.progress_interval.is_zero() {
            return Err(Error::Config(
                "Progress interval must be greater than zero".to_string(),
            ));
        }

        if self.sleep_timer_refresh_interval.is_zero() {
            return Err(Error::Config(
                "Sleep timer refresh interval must be greater than zero".to_string(),
            ));
        }

        if !self.resume_threshold_secs.is_finite() || self.resume_threshold_secs < 0.0 {
            return Err(Error::Config(
                "Resume threshold must be a non-negative number of seconds".to_string(),
            ));
        }

        if self.quote_count == 0 || self.highlight_count == 0 {
            return Err(Error::Config(
                "Quote and highlight counts must be at least 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(Error::Config(format!(
                "Initial volume {} is outside 0.0..=1.0",
                self.initial_volume
            )));
        }

        if !(MIN_PLAYBACK_RATE..=MAX_PLAYBACK_RATE).contains(&self.default_rate) {
            return Err(Error::Config(format!(
                "Default rate {} is outside {}..={}",
                self.default_rate, MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE
            )));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Configuration for the podcast session core.
///
/// Use [`SessionConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct SessionConfig {
    /// Listener identity, passed explicitly to every collaborator call.
    pub user_id: String,

    /// Base URL of the podcast backend, without trailing slash.
    pub api_base_url: String,

    /// HTTP client for backend requests.
    pub http_client: Arc<dyn HttpClient>,

    /// Host audio engine; one transport is created per session.
    pub audio_backend: Arc<dyn AudioBackend>,

    /// Wall-clock source.
    pub clock: Arc<dyn Clock>,

    /// Share sheet for quotes (optional; sharing fails gracefully without it).
    pub share_target: Option<Arc<dyn ShareTarget>>,

    /// Host log pipeline (optional).
    pub logger_sink: Option<Arc<dyn LoggerSink>>,

    /// Playback tunables.
    pub playback: PlaybackSettings,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("user_id", &self.user_id)
            .field("api_base_url", &self.api_base_url)
            .field("http_client", &"HttpClient { ... }")
            .field("audio_backend", &"AudioBackend { ... }")
            .field(
                "share_target",
                &self.share_target.as_ref().map(|_| "ShareTarget { ... }"),
            )
            .field(
                "logger_sink",
                &self.logger_sink.as_ref().map(|_| "LoggerSink { ... }"),
            )
            .field("playback", &self.playback)
            .finish()
    }
}

impl SessionConfig {
    /// Creates a new builder for constructing a `SessionConfig`.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - User id is not empty
    /// - API base URL is an absolute http(s) URL
    /// - Playback settings are within range
    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(Error::Config("User id cannot be empty".to_string()));
        }

        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://"))
        {
            return Err(Error::Config(format!(
                "API base URL must start with http:// or https:// (got '{}')",
                self.api_base_url
            )));
        }

        self.playback.validate()
    }
}

fn audio_backend_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "AudioBackend".to_string(),
        message: "An AudioBackend implementation is required to decode and render media. \
                 Inject the host waveform player via .audio_backend()."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new().map_err(|e| Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: format!("Failed to create the default desktop HTTP client: {}", e),
    })?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required to reach the podcast API. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default ReqwestHttpClient. \
                 Mobile: inject the platform-native HTTP stack."
            .to_string(),
    })
}

/// Builder for constructing [`SessionConfig`] instances.
#[derive(Default)]
pub struct SessionConfigBuilder {
    user_id: Option<String>,
    api_base_url: Option<String>,
    http_client: Option<Arc<dyn HttpClient>>,
    audio_backend: Option<Arc<dyn AudioBackend>>,
    clock: Option<Arc<dyn Clock>>,
    share_target: Option<Arc<dyn ShareTarget>>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
    playback: Option<PlaybackSettings>,
}

impl SessionConfigBuilder {
    /// Sets the listener identity (required).
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the podcast backend base URL (required).
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn audio_backend(mut self, backend: Arc<dyn AudioBackend>) -> Self {
        self.audio_backend = Some(backend);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn share_target(mut self, target: Arc<dyn ShareTarget>) -> Self {
        self.share_target = Some(target);
        self
    }

    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn playback(mut self, settings: PlaybackSettings) -> Self {
        self.playback = Some(settings);
        self
    }

    /// Builds the final `SessionConfig` instance.
    ///
    /// Returns an error if a required field or capability is missing, or if
    /// any value is out of range.
    pub fn build(self) -> Result<SessionConfig> {
        let user_id = self.user_id.ok_or_else(|| {
            Error::Config("User id is required. Use .user_id() to set it.".to_string())
        })?;

        let api_base_url = self.api_base_url.ok_or_else(|| {
            Error::Config("API base URL is required. Use .api_base_url() to set it.".to_string())
        })?;

        let audio_backend = self.audio_backend.ok_or_else(audio_backend_missing_error)?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let config = SessionConfig {
            user_id,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            http_client,
            audio_backend,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            share_target: self.share_target,
            logger_sink: self.logger_sink,
            playback: self.playback.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use bridge_traits::transport::{AudioTransport, TransportEventSender, TransportOptions};

    struct NoopHttpClient;

    #[async_trait]
    impl HttpClient for NoopHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            unimplemented!("not used in config tests")
        }
    }

    struct NoopBackend;

    #[async_trait]
    impl AudioBackend for NoopBackend {
        async fn create_transport(
            &self,
            _options: TransportOptions,
            _events: TransportEventSender,
        ) -> BridgeResult<Box<dyn AudioTransport>> {
            unimplemented!("not used in config tests")
        }
    }

    fn complete_builder() -> SessionConfigBuilder {
        SessionConfig::builder()
            .user_id("1024")
            .api_base_url("https://podcasts.example.com/")
            .http_client(Arc::new(NoopHttpClient))
            .audio_backend(Arc::new(NoopBackend))
    }

    #[test]
    fn test_builder_with_all_required_fields() {
        let config = complete_builder().build().unwrap();

        assert_eq!(config.user_id, "1024");
        assert_eq!(config.api_base_url, "https://podcasts.example.com");
        assert_eq!(config.playback, PlaybackSettings::default());
        assert!(config.share_target.is_none());
    }

    #[test]
    fn test_builder_requires_user_id() {
        let err = SessionConfig::builder()
            .api_base_url("https://podcasts.example.com")
            .http_client(Arc::new(NoopHttpClient))
            .audio_backend(Arc::new(NoopBackend))
            .build()
            .unwrap_err();

        assert!(err.to_string().contains("User id is required"));
    }

    #[test]
    fn test_builder_requires_audio_backend() {
        let err = SessionConfig::builder()
            .user_id("1024")
            .api_base_url("https://podcasts.example.com")
            .http_client(Arc::new(NoopHttpClient))
            .build()
            .unwrap_err();

        assert!(matches!(err, Error::CapabilityMissing { ref capability, .. } if capability == "AudioBackend"));
    }

    #[test]
    fn test_validate_rejects_relative_base_url() {
        let err = complete_builder()
            .api_base_url("podcasts.example.com")
            .build()
            .unwrap_err();

        assert!(err.to_string().contains("http:// or https://"));
    }

    #[test]
    fn test_validate_rejects_blank_user() {
        let err = complete_builder().user_id("  ").build().unwrap_err();
        assert!(err.to_string().contains("User id cannot be empty"));
    }

    #[test]
    fn test_playback_defaults() {
        let settings = PlaybackSettings::default();
        assert_eq!(settings.progress_interval, Duration::from_secs(10));
        assert_eq!(settings.sleep_timer_refresh_interval, Duration::from_secs(60));
        assert_eq!(settings.resume_threshold_secs, 10.0);
        assert_eq!(settings.quote_count, 5);
        assert_eq!(settings.highlight_count, 3);
        assert!(!settings.autoplay);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_playback_validation() {
        assert!(PlaybackSettings::default()
            .with_progress_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(PlaybackSettings::default()
            .with_initial_volume(1.5)
            .validate()
            .is_err());
        assert!(PlaybackSettings::default()
            .with_default_rate(4.0)
            .validate()
            .is_err());
        assert!(PlaybackSettings::default()
            .with_quote_count(0)
            .validate()
            .is_err());
        assert!(PlaybackSettings::default()
            .with_resume_threshold_secs(-1.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_custom_playback_settings_survive_build() {
        let config = complete_builder()
            .playback(
                PlaybackSettings::default()
                    .with_autoplay(true)
                    .with_quote_count(8),
            )
            .build()
            .unwrap();

        assert!(config.playback.autoplay);
        assert_eq!(config.playback.quote_count, 8);
    }
}
