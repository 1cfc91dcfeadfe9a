//! # Progress Reporter
//!
//! Reports the listening position to the backend while playback runs.
//!
//! Reporting is fire-and-forget: a failed report is logged and the next tick
//! tries again with a fresh position. The reporter never outlives its session;
//! it checks the session scope on every tick and is aborted on pause, finish
//! and close.

use crate::scope::SessionScope;
use crate::session::UserId;
use async_trait::async_trait;
use bridge_traits::{ProgressApi, ProgressReport};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// One position reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub position_secs: f64,
    pub duration_secs: f64,
}

/// Something that can tell where the playhead is.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Returns `None` when no reading is available right now.
    async fn sample(&self) -> Option<ProgressSample>;
}

pub struct ProgressReporter {
    api: Arc<dyn ProgressApi>,
    user_id: UserId,
    scope: SessionScope,
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ProgressReporter {
    pub fn new(
        api: Arc<dyn ProgressApi>,
        user_id: UserId,
        scope: SessionScope,
        interval: Duration,
    ) -> Self {
        Self {
            api,
            user_id,
            scope,
            interval,
            task: Mutex::new(None),
        }
    }

    /// Starts reporting. The first report is sent one interval from now.
    /// Calling `start` while already running keeps the existing task.
    pub fn start(&self, source: Arc<dyn PositionSource>) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let api = self.api.clone();
        let user_id = self.user_id.clone();
        let scope = self.scope.clone();
        let period = self.interval;

        *task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = scope.closed() => break,
                    _ = ticker.tick() => {}
                }

                let Some(sample) = source.sample().await else {
                    continue;
                };
                if !scope.is_live() {
                    break;
                }

                let report = ProgressReport {
                    media_id: scope.media_id().to_string(),
                    user_id: user_id.to_string(),
                    position_secs: sample.position_secs,
                    duration_secs: sample.duration_secs,
                };
                debug!(
                    media_id = %report.media_id,
                    position_secs = report.position_secs,
                    "Reporting listening progress"
                );
                if let Err(e) = api.report_progress(report).await {
                    warn!(media_id = %scope.media_id(), error = %e, "Progress report failed");
                }
            }
        }));
    }

    /// Stops reporting immediately.
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MediaId, SessionToken};
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{BridgeError, CompletionReport};

    #[derive(Default)]
    struct RecordingApi {
        reports: Mutex<Vec<ProgressReport>>,
        fail: bool,
    }

    #[async_trait]
    impl ProgressApi for RecordingApi {
        async fn report_progress(&self, report: ProgressReport) -> BridgeResult<()> {
            self.reports.lock().push(report);
            if self.fail {
                return Err(BridgeError::Api {
                    status: 500,
                    detail: None,
                });
            }
            Ok(())
        }

        async fn report_completion(&self, _report: CompletionReport) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct FixedSource(f64);

    #[async_trait]
    impl PositionSource for FixedSource {
        async fn sample(&self) -> Option<ProgressSample> {
            Some(ProgressSample {
                position_secs: self.0,
                duration_secs: 600.0,
            })
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn reporter(api: Arc<RecordingApi>) -> (ProgressReporter, SessionScope) {
        let scope = SessionScope::new(SessionToken(1), MediaId::from("42"));
        let reporter = ProgressReporter::new(
            api,
            UserId::from("7"),
            scope.clone(),
            Duration::from_secs(10),
        );
        (reporter, scope)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_every_interval() {
        let api = Arc::new(RecordingApi::default());
        let (reporter, _scope) = reporter(api.clone());

        reporter.start(Arc::new(FixedSource(33.0)));
        reporter.start(Arc::new(FixedSource(99.0)));
        settle().await;
        assert!(api.reports.lock().is_empty());

        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;

        let reports = api.reports.lock().clone();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].media_id, "42");
        assert_eq!(reports[0].user_id, "7");
        assert_eq!(reports[0].position_secs, 33.0);
        assert_eq!(reports[0].duration_secs, 600.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_and_scope_close_end_reporting() {
        let api = Arc::new(RecordingApi::default());
        let (reporter, scope) = reporter(api.clone());

        reporter.start(Arc::new(FixedSource(1.0)));
        assert!(reporter.is_running());
        reporter.stop();
        assert!(!reporter.is_running());

        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert!(api.reports.lock().is_empty());

        reporter.start(Arc::new(FixedSource(1.0)));
        scope.close();
        settle().await;
        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert!(api.reports.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_reporting() {
        let api = Arc::new(RecordingApi {
            fail: true,
            ..Default::default()
        });
        let (reporter, _scope) = reporter(api.clone());
        reporter.start(Arc::new(FixedSource(5.0)));

        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(10)).await;
            settle().await;
        }

        assert_eq!(api.reports.lock().len(), 3);
        assert!(reporter.is_running());
    }
}
