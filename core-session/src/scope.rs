//! Session scope: the token every deferred effect carries.
//!
//! A scope is opened with each session and closed when the session is torn
//! down. Timers and network completions check it before touching state, so
//! work started for an old media item never lands on a newer one.

use crate::error::{Result, SessionError};
use crate::session::{MediaId, SessionToken};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct SessionScope {
    token: SessionToken,
    media_id: MediaId,
    cancellation: CancellationToken,
}

impl SessionScope {
    pub fn new(token: SessionToken, media_id: MediaId) -> Self {
        Self {
            token,
            media_id,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn media_id(&self) -> &MediaId {
        &self.media_id
    }

    pub fn is_live(&self) -> bool {
        !self.cancellation.is_cancelled()
    }

    /// Fails with [`SessionError::Stale`] once the scope is closed.
    pub fn ensure_live(&self) -> Result<()> {
        if self.is_live() {
            Ok(())
        } else {
            Err(SessionError::Stale)
        }
    }

    /// Closes the scope. Idempotent.
    pub fn close(&self) {
        self.cancellation.cancel();
    }

    /// Resolves when the scope is closed.
    pub async fn closed(&self) {
        self.cancellation.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_close_is_observed_by_clones() {
        let scope = SessionScope::new(SessionToken(3), MediaId::from("9"));
        let clone = scope.clone();
        assert!(clone.ensure_live().is_ok());

        scope.close();
        scope.close();

        assert!(!clone.is_live());
        assert_eq!(clone.ensure_live(), Err(SessionError::Stale));
        clone.closed().await;
        assert_eq!(clone.token(), SessionToken(3));
        assert_eq!(clone.media_id().as_str(), "9");
    }
}
