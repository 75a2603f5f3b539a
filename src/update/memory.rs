//! In-memory implementation of the data-access traits
//!
//! Backed by a JSON snapshot of modules, their catalogs and installations.
//! Used by the command line tool and by tests; it keeps nothing on disk.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::update::error::{ReadError, WriteError};
use crate::update::store::{InstallationStore, VersionCatalog};
use crate::update::types::{
    Installation, InstallationId, ModuleId, ModuleVersionPair, UpdateFlags,
};

/// Serialized form of a [`MemoryStore`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Snapshot {
    pub modules: Vec<ModuleRecord>,
    pub installations: Vec<InstallationRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRecord {
    pub id: ModuleId,
    pub name: String,
    #[serde(default)]
    pub versions: Vec<VersionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub version: String,
    #[serde(default)]
    pub released_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub security: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationRecord {
    pub id: InstallationId,
    pub module_id: ModuleId,
    #[serde(default)]
    pub current_version: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub update_available: bool,
    #[serde(default)]
    pub security_update_available: bool,
    #[serde(default)]
    pub latest_version: Option<String>,
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Default)]
pub struct MemoryStore {
    modules: RwLock<IndexMap<ModuleId, ModuleRecord>>,
    installations: RwLock<IndexMap<InstallationId, InstallationRecord>>,
}

impl MemoryStore {
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        debug!(
            "Loading snapshot with {} modules and {} installations",
            snapshot.modules.len(),
            snapshot.installations.len()
        );

        Self {
            modules: RwLock::new(
                snapshot
                    .modules
                    .into_iter()
                    .map(|module| (module.id, module))
                    .collect(),
            ),
            installations: RwLock::new(
                snapshot
                    .installations
                    .into_iter()
                    .map(|installation| (installation.id, installation))
                    .collect(),
            ),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json).map(Self::from_snapshot)
    }

    fn read_modules(
        &self,
    ) -> Result<RwLockReadGuard<'_, IndexMap<ModuleId, ModuleRecord>>, ReadError> {
        self.modules.read().map_err(|_| ReadError::LockPoisoned)
    }

    fn read_installations(
        &self,
    ) -> Result<RwLockReadGuard<'_, IndexMap<InstallationId, InstallationRecord>>, ReadError> {
        self.installations.read().map_err(|_| ReadError::LockPoisoned)
    }

    fn write_installations(
        &self,
    ) -> Result<RwLockWriteGuard<'_, IndexMap<InstallationId, InstallationRecord>>, WriteError>
    {
        self.installations
            .write()
            .map_err(|_| WriteError::LockPoisoned)
    }

    /// Copy the current state into a snapshot
    pub fn snapshot(&self) -> Result<Snapshot, ReadError> {
        Ok(Snapshot {
            modules: self.read_modules()?.values().cloned().collect(),
            installations: self.read_installations()?.values().cloned().collect(),
        })
    }

    pub fn installation(
        &self,
        installation_id: InstallationId,
    ) -> Result<Option<InstallationRecord>, ReadError> {
        Ok(self.read_installations()?.get(&installation_id).cloned())
    }
}

/// Version strings of a module, most recently released first
fn versions_newest_first(module: &ModuleRecord) -> Vec<String> {
    let mut versions: Vec<&VersionRecord> = module.versions.iter().collect();
    // Records without a release date sort last
    versions.sort_by(|a, b| b.released_at.cmp(&a.released_at));
    versions.into_iter().map(|v| v.version.clone()).collect()
}

#[async_trait::async_trait]
impl VersionCatalog for MemoryStore {
    async fn fetch_versions(&self, module_id: ModuleId) -> Result<Vec<String>, ReadError> {
        Ok(self
            .read_modules()?
            .get(&module_id)
            .map(versions_newest_first)
            .unwrap_or_default())
    }

    async fn fetch_versions_for_modules(
        &self,
        module_ids: &[ModuleId],
    ) -> Result<HashMap<ModuleId, Vec<String>>, ReadError> {
        let modules = self.read_modules()?;

        Ok(module_ids
            .iter()
            .filter_map(|id| modules.get(id))
            .map(|module| (module.id, versions_newest_first(module)))
            .collect())
    }
}

#[async_trait::async_trait]
impl InstallationStore for MemoryStore {
    async fn fetch_installation(
        &self,
        installation_id: InstallationId,
    ) -> Result<Option<Installation>, ReadError> {
        Ok(self
            .read_installations()?
            .get(&installation_id)
            .map(|record| Installation {
                module_id: record.module_id,
                current_version: record.current_version.clone(),
            }))
    }

    async fn fetch_pending_installations(
        &self,
        limit: usize,
    ) -> Result<Vec<ModuleVersionPair>, ReadError> {
        let installations = self.read_installations()?;

        Ok(installations
            .values()
            .filter(|record| record.enabled)
            .filter_map(|record| {
                record
                    .current_version
                    .as_ref()
                    .map(|version| ModuleVersionPair::new(record.module_id, version.clone()))
            })
            .collect::<IndexSet<_>>()
            .into_iter()
            .take(limit)
            .collect())
    }

    async fn persist_flags(
        &self,
        installation_id: InstallationId,
        flags: UpdateFlags,
    ) -> Result<(), WriteError> {
        let mut installations = self.write_installations()?;
        let record = installations
            .get_mut(&installation_id)
            .ok_or(WriteError::UnknownInstallation(installation_id))?;

        record.update_available = flags.update_available;
        record.security_update_available = flags.security_update_available;
        record.latest_version = flags.latest_version;
        record.last_checked = Some(flags.checked_at);

        debug!("Stored update flags for installation {}", installation_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::from_json(
            &json!({
                "modules": [
                    {
                        "id": 1,
                        "name": "views_extras",
                        "versions": [
                            { "version": "8.x-1.0", "releasedAt": "2024-01-10T00:00:00Z" },
                            { "version": "8.x-1.2", "releasedAt": "2024-06-01T00:00:00Z" },
                            { "version": "8.x-1.1-security1", "releasedAt": "2024-03-01T00:00:00Z", "security": true },
                            { "version": "8.x-1.x-dev" }
                        ]
                    },
                    { "id": 2, "name": "token_tools" }
                ],
                "installations": [
                    { "id": 10, "moduleId": 1, "currentVersion": "8.x-1.0" },
                    { "id": 11, "moduleId": 1, "currentVersion": "8.x-1.0" },
                    { "id": 12, "moduleId": 2, "currentVersion": "1.0.0", "enabled": false },
                    { "id": 13, "moduleId": 2 }
                ]
            })
            .to_string(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn fetch_versions_returns_newest_first() {
        let versions = store().fetch_versions(ModuleId(1)).await.unwrap();

        assert_eq!(
            versions,
            vec!["8.x-1.2", "8.x-1.1-security1", "8.x-1.0", "8.x-1.x-dev"]
        );
    }

    #[tokio::test]
    async fn fetch_versions_for_unknown_module_is_empty() {
        assert!(store().fetch_versions(ModuleId(99)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_versions_for_modules_skips_unknown_ids() {
        let catalogs = store()
            .fetch_versions_for_modules(&[ModuleId(1), ModuleId(2), ModuleId(99)])
            .await
            .unwrap();

        assert_eq!(catalogs.len(), 2);
        assert_eq!(catalogs[&ModuleId(1)].len(), 4);
        assert!(catalogs[&ModuleId(2)].is_empty());
    }

    #[tokio::test]
    async fn fetch_installation_resolves_module_and_version() {
        let store = store();

        assert_eq!(
            store.fetch_installation(InstallationId(10)).await.unwrap(),
            Some(Installation {
                module_id: ModuleId(1),
                current_version: Some("8.x-1.0".to_string()),
            })
        );
        assert_eq!(
            store.fetch_installation(InstallationId(404)).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn fetch_pending_installations_returns_distinct_enabled_pairs() {
        let pending = store().fetch_pending_installations(10).await.unwrap();

        assert_eq!(pending, vec![ModuleVersionPair::new(ModuleId(1), "8.x-1.0")]);
    }

    #[tokio::test]
    async fn fetch_pending_installations_respects_limit() {
        assert!(store().fetch_pending_installations(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persist_flags_updates_record() {
        let store = store();
        let checked_at = Utc::now();

        store
            .persist_flags(
                InstallationId(10),
                UpdateFlags {
                    update_available: true,
                    security_update_available: true,
                    latest_version: Some("8.x-1.2".to_string()),
                    checked_at,
                },
            )
            .await
            .unwrap();

        let record = store.installation(InstallationId(10)).unwrap().unwrap();
        assert!(record.update_available);
        assert!(record.security_update_available);
        assert_eq!(record.latest_version.as_deref(), Some("8.x-1.2"));
        assert_eq!(record.last_checked, Some(checked_at));
    }

    #[tokio::test]
    async fn persist_flags_for_unknown_installation_fails() {
        let result = store()
            .persist_flags(
                InstallationId(404),
                UpdateFlags {
                    update_available: false,
                    security_update_available: false,
                    latest_version: None,
                    checked_at: Utc::now(),
                },
            )
            .await;

        assert!(matches!(
            result,
            Err(WriteError::UnknownInstallation(InstallationId(404)))
        ));
    }

    #[test]
    fn snapshot_preserves_record_order_and_defaults() {
        let snapshot = store().snapshot().unwrap();

        assert_eq!(
            snapshot.modules.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![ModuleId(1), ModuleId(2)]
        );
        let ids: Vec<_> = snapshot.installations.iter().map(|i| i.id).collect();
        assert_eq!(
            ids,
            vec![
                InstallationId(10),
                InstallationId(11),
                InstallationId(12),
                InstallationId(13)
            ]
        );
        assert!(snapshot.installations[0].enabled);
        assert!(!snapshot.installations[2].enabled);
    }
}
