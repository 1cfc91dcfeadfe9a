//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the podcast session core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the session controller and
//! the service façade depend on. It establishes the logging conventions, the
//! fail-fast configuration builder, and the event broadcasting mechanism used
//! to notify every attached player surface.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
