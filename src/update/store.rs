//! Data-access seams consumed by the update detector

use std::collections::HashMap;

#[cfg(test)]
use mockall::automock;

use crate::update::error::{ReadError, WriteError};
use crate::update::types::{
    Installation, InstallationId, ModuleId, ModuleVersionPair, UpdateFlags,
};

/// Read access to the catalog of known module versions
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait VersionCatalog: Send + Sync {
    /// Fetch every known version string of a module
    ///
    /// Order is not significant to the detector.
    async fn fetch_versions(&self, module_id: ModuleId) -> Result<Vec<String>, ReadError>;

    /// Fetch the versions of several modules in one request
    ///
    /// Modules without versions may be missing from the returned map.
    async fn fetch_versions_for_modules(
        &self,
        module_ids: &[ModuleId],
    ) -> Result<HashMap<ModuleId, Vec<String>>, ReadError>;
}

/// Read/write access to installation records
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait InstallationStore: Send + Sync {
    /// Resolve an installation to its module and installed version
    async fn fetch_installation(
        &self,
        installation_id: InstallationId,
    ) -> Result<Option<Installation>, ReadError>;

    /// Distinct module/version pairs of enabled installations with a known version
    async fn fetch_pending_installations(
        &self,
        limit: usize,
    ) -> Result<Vec<ModuleVersionPair>, ReadError>;

    /// Store the cached update flags of an installation
    async fn persist_flags(
        &self,
        installation_id: InstallationId,
        flags: UpdateFlags,
    ) -> Result<(), WriteError>;
}
