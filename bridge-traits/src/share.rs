//! Host share sheet / clipboard abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How the host delivered shared text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShareOutcome {
    /// A native share sheet accepted the text.
    Shared,
    /// No share sheet was available; the text went to the clipboard.
    Copied,
}

#[async_trait]
pub trait ShareTarget: Send + Sync {
    /// Share `text`, falling back to the clipboard when sharing is unavailable.
    async fn share_text(&self, title: &str, text: &str) -> Result<ShareOutcome>;
}
