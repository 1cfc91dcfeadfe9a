//! Error types for the podcast API provider

use bridge_traits::error::BridgeError;
use serde::Deserialize;
use thiserror::Error;

/// Podcast API provider errors
#[derive(Error, Debug)]
pub enum PodcastApiError {
    /// The server answered with a non-success status
    #[error("Podcast API error (status {status}): {}", detail.as_deref().unwrap_or("no detail"))]
    ApiError { status: u16, detail: Option<String> },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Bridge error
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Result type for podcast API operations
pub type Result<T> = std::result::Result<T, PodcastApiError>;

impl PodcastApiError {
    /// Builds an [`ApiError`](Self::ApiError) from a failed response body.
    ///
    /// The backend reports failures as `{"detail": "..."}`; validation errors
    /// carry a list instead of a string and are reported without detail.
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        #[derive(Deserialize)]
        struct ErrorBody {
            detail: serde_json::Value,
        }

        let detail = serde_json::from_slice::<ErrorBody>(body)
            .ok()
            .and_then(|body| match body.detail {
                serde_json::Value::String(detail) if !detail.trim().is_empty() => Some(detail),
                _ => None,
            });

        PodcastApiError::ApiError { status, detail }
    }
}

impl From<PodcastApiError> for BridgeError {
    fn from(error: PodcastApiError) -> Self {
        match error {
            PodcastApiError::ApiError { status, detail } => BridgeError::Api { status, detail },
            PodcastApiError::ParseError(msg) => {
                BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            PodcastApiError::Bridge(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = PodcastApiError::ApiError {
            status: 404,
            detail: Some("Podcast not found".to_string()),
        };

        assert_eq!(
            error.to_string(),
            "Podcast API error (status 404): Podcast not found"
        );
    }

    #[test]
    fn test_detail_is_extracted_from_body() {
        let error = PodcastApiError::from_response(
            400,
            br#"{"detail":"Podcast must be transcribed first."}"#,
        );
        let bridge_error: BridgeError = error.into();

        assert_eq!(bridge_error.user_message(), "Podcast must be transcribed first.");
    }

    #[test]
    fn test_validation_errors_have_no_detail() {
        let error = PodcastApiError::from_response(
            422,
            br#"{"detail":[{"loc":["body","user_id"],"msg":"field required"}]}"#,
        );
        assert!(matches!(
            error,
            PodcastApiError::ApiError {
                status: 422,
                detail: None
            }
        ));

        let error = PodcastApiError::from_response(502, b"<html>Bad gateway</html>");
        assert!(matches!(error, PodcastApiError::ApiError { detail: None, .. }));
    }
}
