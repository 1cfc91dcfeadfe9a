//! Workspace placeholder crate.
//!
//! This crate exposes feature flags that map to the individual workspace
//! crates. Host applications can depend on `podcast-session-workspace` and pick
//! either the full desktop façade (`desktop-shims`, default) or only the
//! session controller (`session-only`) when they inject their own bridges.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;

#[cfg(all(feature = "session-only", not(feature = "desktop-shims")))]
pub use core_session::*;
