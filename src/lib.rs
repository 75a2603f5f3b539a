//! Version parsing, comparison and update detection for module ecosystems
//! that mix semantic versions with platform-coupled contrib versions
//! (`8.x-1.2-beta1`).
//!
//! # Modules
//!
//! - [`version`]: Pure parsing and comparison engine
//! - [`update`]: Update detection over injected data-access traits
//! - [`config`]: Configuration loading and data directory resolution
//! - [`logging`]: Tracing subscriber setup

pub mod config;
pub mod logging;
pub mod update;
pub mod version;
