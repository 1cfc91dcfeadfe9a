//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (audio backend, HTTP,
//! clock, share sheet, log sink) and the podcast API connector into a ready
//! [`SessionController`]. Desktop apps typically enable the `desktop-shims`
//! feature, which supplies a reqwest-based HTTP client when none is injected.

pub mod error;

pub use error::{CoreError, Result};

pub use core_runtime::config::{PlaybackSettings, SessionConfig, SessionConfigBuilder};
pub use core_runtime::events::{CoreEvent, EventStream};
pub use core_session::{MediaSource, SessionController, SessionPhase, SessionSnapshot};

use std::sync::Arc;

use core_runtime::logging::{init_logging, redact_if_sensitive, LoggingConfig};
use core_session::{SessionDependencies, SessionToken};
use provider_podcast_api::PodcastApiConnector;
use tracing::{debug, info};

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<SessionConfig>,
    controller: SessionController,
}

impl CoreService {
    /// Build the service from a validated configuration.
    ///
    /// Does not touch global logging; see [`bootstrap`] for that.
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;

        let connector = Arc::new(PodcastApiConnector::new(
            config.http_client.clone(),
            config.api_base_url.clone(),
        ));
        let mut deps = SessionDependencies::from_api(config.audio_backend.clone(), connector)
            .with_clock(config.clock.clone());
        if let Some(target) = &config.share_target {
            deps = deps.with_share_target(target.clone());
        }

        let controller =
            SessionController::new(config.user_id.clone(), config.playback.clone(), deps)?;

        Ok(Self {
            config: Arc::new(config),
            controller,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The controller shared by every player surface.
    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Media source for an episode served by the configured backend.
    pub fn media_source(&self, media_id: &str) -> MediaSource {
        MediaSource::from_api(&self.config.api_base_url, media_id)
    }

    /// Opens an episode of the configured backend by id.
    pub async fn open_episode(&self, media_id: &str, title: Option<&str>) -> Result<SessionToken> {
        let mut media = self.media_source(media_id);
        if let Some(title) = title {
            media = media.with_title(title);
        }
        Ok(self.controller.open(media).await?)
    }

    /// Disposes the controller. The service is unusable afterwards.
    pub async fn shutdown(&self) {
        self.controller.dispose().await;
    }
}

/// Initializes logging (forwarding to the configured sink) and builds the
/// service.
///
/// Logging can only be installed once per process; later calls keep the
/// existing subscriber.
pub fn bootstrap(config: SessionConfig) -> Result<CoreService> {
    let mut logging = LoggingConfig::default();
    if let Some(sink) = &config.logger_sink {
        logging = logging.with_logger_sink(sink.clone());
    }
    if let Err(e) = init_logging(logging) {
        debug!(error = %e, "Keeping existing log subscriber");
    }

    let service = CoreService::new(config)?;
    info!(
        user_id = %redact_if_sensitive("user_id", &service.config.user_id),
        api_base_url = %service.config.api_base_url,
        "Podcast session core ready"
    );
    Ok(service)
}

/// Convenience bootstrapper for desktop hosts using the bundled HTTP client.
///
/// ```ignore
/// let core = core_service::bootstrap_desktop("1024", "https://podcasts.example.com", backend)?;
/// core.open_episode("42", Some("Tide Tables")).await?;
/// ```
#[cfg(feature = "desktop-shims")]
pub fn bootstrap_desktop(
    user_id: &str,
    api_base_url: &str,
    audio_backend: Arc<dyn bridge_traits::AudioBackend>,
) -> anyhow::Result<CoreService> {
    use anyhow::Context;

    let config = SessionConfig::builder()
        .user_id(user_id)
        .api_base_url(api_base_url)
        .audio_backend(audio_backend)
        .build()
        .context("invalid desktop session configuration")?;

    bootstrap(config).context("failed to start the podcast session core")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
    use bridge_traits::{
        AudioBackend, AudioTransport, BridgeError, TransportEventSender, TransportOptions,
    };

    struct OfflineHttpClient;

    #[async_trait]
    impl HttpClient for OfflineHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Err(BridgeError::NotAvailable("offline".to_string()))
        }
    }

    struct SilentTransport;

    #[async_trait]
    impl AudioTransport for SilentTransport {
        async fn load(&self, _url: &str) -> BridgeResult<()> {
            Ok(())
        }
        async fn play(&self) -> BridgeResult<()> {
            Ok(())
        }
        async fn pause(&self) -> BridgeResult<()> {
            Ok(())
        }
        async fn seek_fraction(&self, _fraction: f64) -> BridgeResult<()> {
            Ok(())
        }
        async fn set_volume(&self, _volume: f32) -> BridgeResult<()> {
            Ok(())
        }
        async fn set_rate(&self, _rate: f32) -> BridgeResult<()> {
            Ok(())
        }
        async fn position(&self) -> BridgeResult<f64> {
            Ok(0.0)
        }
        async fn dispose(&self) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct SilentBackend;

    #[async_trait]
    impl AudioBackend for SilentBackend {
        async fn create_transport(
            &self,
            _options: TransportOptions,
            _events: TransportEventSender,
        ) -> BridgeResult<Box<dyn AudioTransport>> {
            Ok(Box::new(SilentTransport))
        }
    }

    fn config() -> SessionConfig {
        SessionConfig::builder()
            .user_id("1024")
            .api_base_url("https://podcasts.example.com/")
            .http_client(Arc::new(OfflineHttpClient))
            .audio_backend(Arc::new(SilentBackend))
            .build()
            .unwrap()
    }

    #[test]
    fn test_media_source_uses_backend_url() {
        let core = CoreService::new(config()).unwrap();

        assert_eq!(core.controller().user_id().as_str(), "1024");
        assert_eq!(
            core.media_source("42").url,
            "https://podcasts.example.com/api/podcasts/42/audio"
        );
    }

    #[tokio::test]
    async fn test_open_episode_starts_loading() {
        let core = bootstrap(config()).unwrap();

        core.open_episode("42", Some("Tide Tables")).await.unwrap();

        let snapshot = core.controller().snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Loading);
        assert_eq!(snapshot.title.as_deref(), Some("Tide Tables"));

        core.shutdown().await;
        assert!(matches!(
            core.open_episode("43", None).await,
            Err(CoreError::Session(core_session::SessionError::Disposed))
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = config();
        config.user_id = " ".to_string();

        assert!(matches!(
            CoreService::new(config),
            Err(CoreError::Runtime(core_runtime::Error::Config(_)))
        ));
    }
}
