//! # Resume Negotiator
//!
//! Offers to continue an episode from where the listener left off.
//!
//! ```text
//! Init -> Checking -> Offering(position) -> Resumed | Restarted
//!                  \-> Skipped
//! ```
//!
//! The check runs once per session, after the transport is ready. While an
//! offer is pending the controller holds back autoplay.

use crate::error::{Result, SessionError};
use crate::scope::SessionScope;
use crate::session::{secs_to_ms, UserId};
use bridge_traits::ResumeApi;
use core_runtime::events::{CoreEvent, EventBus, ResumeEvent};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResumeState {
    Init,
    Checking,
    Offering { position_secs: f64 },
    Skipped,
    Resumed { position_secs: f64 },
    Restarted,
}

/// The listener's answer to a resume offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeDecision {
    Resume,
    RestartFromBeginning,
}

pub struct ResumeNegotiator {
    api: Arc<dyn ResumeApi>,
    scope: SessionScope,
    user_id: UserId,
    threshold_secs: f64,
    events: EventBus,
    state: Mutex<ResumeState>,
}

impl ResumeNegotiator {
    pub fn new(
        api: Arc<dyn ResumeApi>,
        scope: SessionScope,
        user_id: UserId,
        threshold_secs: f64,
        events: EventBus,
    ) -> Self {
        Self {
            api,
            scope,
            user_id,
            threshold_secs,
            events,
            state: Mutex::new(ResumeState::Init),
        }
    }

    /// Looks up the stored position. Only the first call queries the server;
    /// later calls return the current state.
    pub async fn check(&self) -> Result<ResumeState> {
        {
            let mut state = self.state.lock();
            if *state != ResumeState::Init {
                return Ok(*state);
            }
            *state = ResumeState::Checking;
        }

        let result = self
            .api
            .resume_point(self.scope.media_id().as_str(), self.user_id.as_str())
            .await;
        self.scope.ensure_live()?;

        let media_id = self.scope.media_id().to_string();
        let (next, event) = match result {
            Ok(Some(point))
                if point.position_secs.is_finite() && point.position_secs > self.threshold_secs =>
            {
                info!(media_id = %media_id, position_secs = point.position_secs, "Offering resume");
                (
                    ResumeState::Offering {
                        position_secs: point.position_secs,
                    },
                    ResumeEvent::Offered {
                        media_id,
                        position_ms: secs_to_ms(point.position_secs),
                    },
                )
            }
            Ok(_) => {
                debug!(media_id = %media_id, "No resume position worth offering");
                (ResumeState::Skipped, ResumeEvent::Skipped { media_id })
            }
            Err(e) => {
                warn!(media_id = %media_id, error = %e, "Resume lookup failed");
                (ResumeState::Skipped, ResumeEvent::Skipped { media_id })
            }
        };

        *self.state.lock() = next;
        self.events.emit(CoreEvent::Resume(event)).ok();
        Ok(next)
    }

    /// Applies the listener's decision.
    ///
    /// Returns the position to seek to for [`ResumeDecision::Resume`]. A
    /// decision is accepted once; afterwards this fails with
    /// [`SessionError::NoResumeOffer`].
    pub fn decide(&self, decision: ResumeDecision) -> Result<Option<f64>> {
        let mut state = self.state.lock();
        let ResumeState::Offering { position_secs } = *state else {
            return Err(SessionError::NoResumeOffer);
        };

        let media_id = self.scope.media_id().to_string();
        let (next, event, seek_to) = match decision {
            ResumeDecision::Resume => (
                ResumeState::Resumed { position_secs },
                ResumeEvent::Resumed {
                    media_id,
                    position_ms: secs_to_ms(position_secs),
                },
                Some(position_secs),
            ),
            ResumeDecision::RestartFromBeginning => (
                ResumeState::Restarted,
                ResumeEvent::Restarted { media_id },
                None,
            ),
        };
        *state = next;
        drop(state);

        self.events.emit(CoreEvent::Resume(event)).ok();
        Ok(seek_to)
    }

    pub fn state(&self) -> ResumeState {
        *self.state.lock()
    }

    /// `true` while autoplay must wait (lookup running or offer pending).
    pub fn holds_autoplay(&self) -> bool {
        matches!(
            self.state(),
            ResumeState::Checking | ResumeState::Offering { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MediaId, SessionToken};
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{BridgeError, ResumePoint};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StoredPosition {
        position: Option<f64>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl StoredPosition {
        fn at(position: Option<f64>) -> Self {
            Self {
                position,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ResumeApi for StoredPosition {
        async fn resume_point(
            &self,
            _media_id: &str,
            _user_id: &str,
        ) -> BridgeResult<Option<ResumePoint>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BridgeError::OperationFailed("offline".to_string()));
            }
            Ok(self.position.map(|position_secs| ResumePoint {
                position_secs,
                duration_secs: 600.0,
                last_updated: None,
            }))
        }
    }

    fn negotiator(api: Arc<StoredPosition>) -> ResumeNegotiator {
        ResumeNegotiator::new(
            api,
            SessionScope::new(SessionToken(1), MediaId::from("42")),
            UserId::from("7"),
            10.0,
            EventBus::new(16),
        )
    }

    #[tokio::test]
    async fn test_offers_only_above_threshold() {
        let offering = negotiator(Arc::new(StoredPosition::at(Some(120.0))));
        assert_eq!(
            offering.check().await.unwrap(),
            ResumeState::Offering {
                position_secs: 120.0
            }
        );
        assert!(offering.holds_autoplay());

        let at_threshold = negotiator(Arc::new(StoredPosition::at(Some(10.0))));
        assert_eq!(at_threshold.check().await.unwrap(), ResumeState::Skipped);

        let nothing = negotiator(Arc::new(StoredPosition::at(None)));
        assert_eq!(nothing.check().await.unwrap(), ResumeState::Skipped);
        assert!(!nothing.holds_autoplay());
    }

    #[tokio::test]
    async fn test_lookup_failure_skips() {
        let api = Arc::new(StoredPosition {
            fail: true,
            ..StoredPosition::at(Some(300.0))
        });
        assert_eq!(negotiator(api).check().await.unwrap(), ResumeState::Skipped);
    }

    #[tokio::test]
    async fn test_check_runs_once() {
        let api = Arc::new(StoredPosition::at(Some(120.0)));
        let negotiator = negotiator(api.clone());
        negotiator.check().await.unwrap();
        negotiator.check().await.unwrap();
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_decisions() {
        let resume = negotiator(Arc::new(StoredPosition::at(Some(120.0))));
        resume.check().await.unwrap();
        assert_eq!(resume.decide(ResumeDecision::Resume), Ok(Some(120.0)));
        assert_eq!(
            resume.decide(ResumeDecision::Resume),
            Err(SessionError::NoResumeOffer)
        );

        let restart = negotiator(Arc::new(StoredPosition::at(Some(120.0))));
        restart.check().await.unwrap();
        assert_eq!(restart.decide(ResumeDecision::RestartFromBeginning), Ok(None));
        assert_eq!(restart.state(), ResumeState::Restarted);
    }

    #[tokio::test]
    async fn test_decide_without_offer() {
        let negotiator = negotiator(Arc::new(StoredPosition::at(None)));
        assert_eq!(
            negotiator.decide(ResumeDecision::Resume),
            Err(SessionError::NoResumeOffer)
        );
    }
}
