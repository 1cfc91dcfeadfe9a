//! Chapter markers for the live session.

use crate::error::{Result, SessionError};
use crate::scope::SessionScope;
use bridge_traits::{Chapter, ChapterApi};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Seconds into a chapter after which "previous" restarts the current one.
const RESTART_GRACE_SECS: f64 = 3.0;

pub struct ChapterIndex {
    api: Arc<dyn ChapterApi>,
    scope: SessionScope,
    chapters: Mutex<Vec<Chapter>>,
}

impl ChapterIndex {
    pub fn new(api: Arc<dyn ChapterApi>, scope: SessionScope) -> Self {
        Self {
            api,
            scope,
            chapters: Mutex::new(Vec::new()),
        }
    }

    /// Fetches the chapter list, ordered by start time.
    pub async fn load(&self) -> Result<usize> {
        let result = self.api.chapters(self.scope.media_id().as_str()).await;
        self.scope.ensure_live()?;

        let mut chapters = result.map_err(|e| {
            warn!(media_id = %self.scope.media_id(), error = %e, "Loading chapters failed");
            SessionError::network("Load chapters", &e)
        })?;
        chapters.retain(|chapter| chapter.start_time_secs.is_finite());
        chapters.sort_by(|a, b| a.start_time_secs.total_cmp(&b.start_time_secs));

        let count = chapters.len();
        debug!(media_id = %self.scope.media_id(), count, "Chapters loaded");
        *self.chapters.lock() = chapters;
        Ok(count)
    }

    pub fn list(&self) -> Vec<Chapter> {
        self.chapters.lock().clone()
    }

    pub fn get(&self, index: usize) -> Option<Chapter> {
        self.chapters.lock().get(index).cloned()
    }

    /// Index of the chapter containing `position_secs`.
    pub fn current_index(&self, position_secs: f64) -> Option<usize> {
        self.chapters
            .lock()
            .iter()
            .rposition(|chapter| chapter.start_time_secs <= position_secs)
    }

    pub fn current(&self, position_secs: f64) -> Option<Chapter> {
        self.current_index(position_secs)
            .and_then(|index| self.get(index))
    }

    /// Start of the first chapter beginning after `position_secs`.
    pub fn next_start(&self, position_secs: f64) -> Option<f64> {
        self.chapters
            .lock()
            .iter()
            .map(|chapter| chapter.start_time_secs)
            .find(|start| *start > position_secs)
    }

    /// Start of the current chapter when more than a few seconds in,
    /// otherwise the start of the one before it.
    pub fn previous_start(&self, position_secs: f64) -> Option<f64> {
        let index = self.current_index(position_secs)?;
        let chapters = self.chapters.lock();
        let current = chapters.get(index)?;
        if position_secs - current.start_time_secs > RESTART_GRACE_SECS || index == 0 {
            Some(current.start_time_secs)
        } else {
            chapters.get(index - 1).map(|chapter| chapter.start_time_secs)
        }
    }
}
