use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// The remote API rejected the call. `detail` is the user-displayable
    /// reason reported by the server, when it sent one.
    #[error("Remote API error (status {status}): {}", detail.as_deref().unwrap_or("no detail"))]
    Api { status: u16, detail: Option<String> },

    /// The host audio backend failed (malformed or unreachable media, device loss).
    #[error("Audio transport error: {0}")]
    Transport(String),
}

impl BridgeError {
    /// Returns the message suitable for showing to a listener.
    ///
    /// Server-provided details win; everything else falls back to the error's
    /// display text.
    pub fn user_message(&self) -> String {
        match self {
            BridgeError::Api {
                detail: Some(detail),
                ..
            } => detail.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
