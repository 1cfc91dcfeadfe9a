//! Media sources and display formatting for playback times.

use crate::session::MediaId;
use serde::{Deserialize, Serialize};

/// Where a session's audio comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSource {
    pub media_id: MediaId,
    pub url: String,
    /// Episode title, used when sharing quotes.
    pub title: Option<String>,
}

impl MediaSource {
    pub fn new(media_id: impl Into<MediaId>, url: impl Into<String>) -> Self {
        Self {
            media_id: media_id.into(),
            url: url.into(),
            title: None,
        }
    }

    /// Streams the episode from the podcast backend's audio endpoint.
    pub fn from_api(api_base_url: &str, media_id: impl Into<MediaId>) -> Self {
        let media_id = media_id.into();
        let url = format!(
            "{}/api/podcasts/{}/audio",
            api_base_url.trim_end_matches('/'),
            urlencoding::encode(media_id.as_str())
        );
        Self {
            media_id,
            url,
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Same audio served as an attachment.
    pub fn download_url(&self) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}download=true", self.url, separator)
    }
}

/// Formats seconds as `m:ss`, or `h:mm:ss` from one hour on.
///
/// ```
/// use core_session::media::format_timestamp;
///
/// assert_eq!(format_timestamp(42.9), "0:42");
/// assert_eq!(format_timestamp(3725.0), "1:02:05");
/// ```
pub fn format_timestamp(secs: f64) -> String {
    let total = if secs.is_finite() && secs > 0.0 {
        secs.floor() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_api_builds_audio_endpoint() {
        let source = MediaSource::from_api("https://podcasts.example.com/", 42u64);
        assert_eq!(source.url, "https://podcasts.example.com/api/podcasts/42/audio");
        assert_eq!(
            source.download_url(),
            "https://podcasts.example.com/api/podcasts/42/audio?download=true"
        );
    }

    #[test]
    fn test_download_url_with_existing_query() {
        let source = MediaSource::new("7", "https://cdn.example.com/a.mp3?sig=x");
        assert_eq!(
            source.download_url(),
            "https://cdn.example.com/a.mp3?sig=x&download=true"
        );
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "0:00");
        assert_eq!(format_timestamp(-5.0), "0:00");
        assert_eq!(format_timestamp(599.99), "9:59");
        assert_eq!(format_timestamp(3600.0), "1:00:00");
    }
}
