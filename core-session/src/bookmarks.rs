//! # Bookmark Manager
//!
//! Keeps the listener's bookmarks for the live session in sync with the
//! backend. The server is the source of truth: local state only changes after
//! the server accepted the change, and results that arrive after the session
//! closed are dropped.
//!
//! A list fetched while the listener adds or removes bookmarks predates those
//! changes. Each local change bumps a generation and is journaled, so a
//! refresh that started earlier replays the newer changes on top of the
//! server's answer instead of overwriting them.

use crate::error::{Result, SessionError};
use crate::media::format_timestamp;
use crate::scope::SessionScope;
use crate::session::UserId;
use bridge_traits::{Bookmark, BookmarkApi, BridgeError, NewBookmark};
use core_runtime::events::{BookmarkEvent, CoreEvent, EventBus};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct BookmarkManager {
    api: Arc<dyn BookmarkApi>,
    scope: SessionScope,
    user_id: UserId,
    events: EventBus,
    items: Mutex<BookmarkList>,
}

enum LocalChange {
    Added(Bookmark),
    Removed(String),
}

#[derive(Default)]
struct BookmarkList {
    items: Vec<Bookmark>,
    /// Bumped by every local add or remove.
    generation: u64,
    /// Generation the last applied server list was requested at.
    synced_at: u64,
    /// Local changes not yet confirmed by a server list.
    journal: Vec<(u64, LocalChange)>,
}

impl BookmarkList {
    fn record(&mut self, change: LocalChange) {
        self.generation += 1;
        match &change {
            LocalChange::Added(bookmark) => self.items.push(bookmark.clone()),
            LocalChange::Removed(id) => self.items.retain(|bookmark| &bookmark.id != id),
        }
        self.journal.push((self.generation, change));
    }

    /// Applies a server list requested at generation `requested_at`.
    /// Returns `false` when a newer list was applied already.
    fn apply_server(&mut self, requested_at: u64, mut server: Vec<Bookmark>) -> bool {
        if requested_at < self.synced_at {
            return false;
        }
        for (generation, change) in &self.journal {
            if *generation <= requested_at {
                continue;
            }
            match change {
                LocalChange::Added(bookmark) => {
                    if !server.iter().any(|b| b.id == bookmark.id) {
                        server.push(bookmark.clone());
                    }
                }
                LocalChange::Removed(id) => server.retain(|b| &b.id != id),
            }
        }
        self.journal
            .retain(|(generation, _)| *generation > requested_at);
        self.items = server;
        self.synced_at = requested_at;
        true
    }
}

impl BookmarkManager {
    pub fn new(
        api: Arc<dyn BookmarkApi>,
        scope: SessionScope,
        user_id: UserId,
        events: EventBus,
    ) -> Self {
        Self {
            api,
            scope,
            user_id,
            events,
            items: Mutex::new(BookmarkList::default()),
        }
    }

    /// Replaces the local list with the server's, keeping local changes made
    /// while the request was in flight.
    #[instrument(skip(self), fields(media_id = %self.scope.media_id()))]
    pub async fn refresh(&self) -> Result<usize> {
        let requested_at = self.items.lock().generation;
        let result = self
            .api
            .list_bookmarks(self.scope.media_id().as_str(), self.user_id.as_str())
            .await;
        self.scope.ensure_live()?;

        match result {
            Ok(bookmarks) => {
                let count = {
                    let mut list = self.items.lock();
                    if !list.apply_server(requested_at, bookmarks) {
                        debug!("Discarded bookmark list older than the applied one");
                    }
                    list.items.len()
                };
                self.emit(BookmarkEvent::Loaded {
                    media_id: self.media_id(),
                    count,
                });
                Ok(count)
            }
            Err(e) => Err(self.failed("load", "Load bookmarks", &e)),
        }
    }

    /// Persists a bookmark at `position_secs` (floored to whole seconds).
    #[instrument(skip(self, note), fields(media_id = %self.scope.media_id()))]
    pub async fn add(
        &self,
        position_secs: f64,
        duration_secs: f64,
        note: Option<String>,
    ) -> Result<Bookmark> {
        if !position_secs.is_finite() {
            return Err(SessionError::InvalidArgument(format!(
                "bookmark position must be finite (got {})",
                position_secs
            )));
        }
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(SessionError::UnknownDuration);
        }
        if position_secs < 0.0 || position_secs > duration_secs {
            return Err(SessionError::InvalidPosition {
                position: position_secs,
                duration: duration_secs,
            });
        }

        let request = NewBookmark {
            timestamp_secs: position_secs.floor() as u64,
            note: note
                .map(|note| note.trim().to_string())
                .filter(|note| !note.is_empty()),
        };

        let result = self
            .api
            .create_bookmark(
                self.scope.media_id().as_str(),
                self.user_id.as_str(),
                request,
            )
            .await;
        self.scope.ensure_live()?;

        let bookmark = result.map_err(|e| self.failed("add", "Add bookmark", &e))?;
        info!(bookmark_id = %bookmark.id, timestamp_secs = bookmark.timestamp_secs, "Bookmark added");
        self.items
            .lock()
            .record(LocalChange::Added(bookmark.clone()));
        self.emit(BookmarkEvent::Added {
            media_id: self.media_id(),
            bookmark_id: bookmark.id.clone(),
            timestamp_secs: bookmark.timestamp_secs,
        });
        Ok(bookmark)
    }

    /// Deletes a bookmark on the server, then locally.
    #[instrument(skip(self), fields(media_id = %self.scope.media_id()))]
    pub async fn remove(&self, bookmark_id: &str) -> Result<()> {
        if self.get(bookmark_id).is_none() {
            return Err(SessionError::BookmarkNotFound(bookmark_id.to_string()));
        }

        let result = self
            .api
            .delete_bookmark(bookmark_id, self.user_id.as_str())
            .await;
        self.scope.ensure_live()?;
        result.map_err(|e| self.failed("delete", "Delete bookmark", &e))?;

        self.items
            .lock()
            .record(LocalChange::Removed(bookmark_id.to_string()));
        self.emit(BookmarkEvent::Removed {
            media_id: self.media_id(),
            bookmark_id: bookmark_id.to_string(),
        });
        Ok(())
    }

    /// Bookmarks in the order they were loaded or added.
    pub fn list(&self) -> Vec<Bookmark> {
        self.items.lock().items.clone()
    }

    /// Bookmarks ordered by timestamp; ties keep insertion order.
    pub fn sorted(&self) -> Vec<Bookmark> {
        let mut bookmarks = self.list();
        bookmarks.sort_by_key(|bookmark| bookmark.timestamp_secs);
        bookmarks
    }

    pub fn get(&self, bookmark_id: &str) -> Option<Bookmark> {
        self.items
            .lock()
            .items
            .iter()
            .find(|bookmark| bookmark.id == bookmark_id)
            .cloned()
    }

    /// Seek fraction for a bookmark, `None` while the duration is unknown.
    pub fn jump_fraction(&self, bookmark_id: &str, duration_secs: f64) -> Result<Option<f64>> {
        let bookmark = self
            .get(bookmark_id)
            .ok_or_else(|| SessionError::BookmarkNotFound(bookmark_id.to_string()))?;

        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Ok(None);
        }
        Ok(Some(
            (bookmark.timestamp_secs as f64 / duration_secs).clamp(0.0, 1.0),
        ))
    }

    fn media_id(&self) -> String {
        self.scope.media_id().to_string()
    }

    fn failed(&self, operation: &str, label: &str, error: &BridgeError) -> SessionError {
        warn!(operation, error = %error, "Bookmark operation failed");
        let err = SessionError::network(label, error);
        self.emit(BookmarkEvent::Failed {
            media_id: self.media_id(),
            operation: operation.to_string(),
            message: error.user_message(),
        });
        err
    }

    fn emit(&self, event: BookmarkEvent) {
        self.events.emit(CoreEvent::Bookmark(event)).ok();
    }
}

/// Display label such as `12:05 - intro`.
pub fn bookmark_label(bookmark: &Bookmark) -> String {
    let time = format_timestamp(bookmark.timestamp_secs as f64);
    match &bookmark.note {
        Some(note) => format!("{} - {}", time, note),
        None => time,
    }
}
