//! Update detection layer
//!
//! Applies the version comparator to module catalogs to produce per-installation
//! update status. All storage access goes through the traits in [`store`].
//!
//! # Modules
//!
//! - [`detector`]: `UpdateDetector` orchestrating checks, batch checks and flag writes
//! - [`store`]: `VersionCatalog` and `InstallationStore` data-access traits
//! - [`memory`]: In-memory store loaded from a JSON snapshot
//! - [`error`]: Read and write errors surfaced by stores
//! - [`types`]: Identifiers, `UpdateInfo` and `UpdateFlags`

pub mod detector;
pub mod error;
pub mod memory;
pub mod store;
pub mod types;
