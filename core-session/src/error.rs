//! # Session Error Types
//!
//! Errors produced by the session controller and its components.

use crate::session::SessionPhase;
use bridge_traits::BridgeError;
use thiserror::Error;

/// Errors that can occur while driving a playback session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// The host audio transport failed. Fatal for the session: the phase stays
    /// `Error` until the next `open`.
    #[error("Audio transport error: {0}")]
    Transport(String),

    // ========================================================================
    // Collaborator Errors
    // ========================================================================
    /// A backend call failed. Never fatal; `message` is safe to display.
    #[error("{operation} failed: {message}")]
    Network { operation: String, message: String },

    /// Sharing is not possible on this host.
    #[error("Sharing unavailable: {0}")]
    ShareUnavailable(String),

    // ========================================================================
    // Control Errors
    // ========================================================================
    #[error("Position {position}s is outside 0..={duration}s")]
    InvalidPosition { position: f64, duration: f64 },

    #[error("Cannot {operation} while {phase}")]
    InvalidState {
        operation: &'static str,
        phase: SessionPhase,
    },

    #[error("Media duration is not known yet")]
    UnknownDuration,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No media is loaded")]
    NoActiveSession,

    #[error("Session controller has been disposed")]
    Disposed,

    #[error("No resume offer is pending")]
    NoResumeOffer,

    #[error("Bookmark not found: {0}")]
    BookmarkNotFound(String),

    /// The session that started this work was closed before it completed; the
    /// result was discarded.
    #[error("Session changed before the operation completed")]
    Stale,
}

impl SessionError {
    /// Wraps a collaborator failure, keeping the server's displayable detail.
    pub fn network(operation: impl Into<String>, error: &BridgeError) -> Self {
        SessionError::Network {
            operation: operation.into(),
            message: error.user_message(),
        }
    }

    /// Returns `true` when the error moved the session into its error phase.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Transport(_))
    }

    /// Returns `true` when the error only means the result arrived too late.
    pub fn is_stale(&self) -> bool {
        matches!(self, SessionError::Stale)
    }
}

impl From<BridgeError> for SessionError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Transport(reason) => SessionError::Transport(reason),
            other => SessionError::Transport(other.to_string()),
        }
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
