//! Version parsing and comparison engine
//!
//! Pure computation over version strings: nothing here performs I/O or holds
//! shared mutable state, apart from a [`cache::ParseCache`] a caller may inject.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │   Parser    │────▶│  Comparator  │────▶│  Detector   │
//! │ (grammars)  │     │ (order/query)│     │  (update/)  │
//! └─────────────┘     └──────────────┘     └─────────────┘
//!                            ▲
//!                     ┌──────┴──────┐
//!                     │ ParseCache  │
//!                     │ (optional)  │
//!                     └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`parser`]: Grammar-priority parsing, normalization and validation
//! - [`comparator`]: Total order and latest/security/branch/compatibility queries
//! - [`cache`]: Optional caller-scoped memo of parse results
//! - [`error`]: Parse error type
//! - [`types`]: `ReleaseType`, `ParsedVersion`, `VersionDistance`

pub mod cache;
pub mod comparator;
pub mod error;
pub mod parser;
pub mod types;
