//! Update detection for installed module versions
//!
//! The detector applies the [`VersionComparator`] to the version catalog of a
//! module. Check operations never fail: unreadable catalogs, unknown
//! installations and unparsable current versions all degrade to an
//! [`UpdateInfo`] with every flag cleared. Only flag writes return errors.
//!
//! Refreshing is stricter: a failed read skips the write, so previously
//! stored flags survive a backend outage.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, info, warn};

use crate::update::error::{ReadError, RefreshError, WriteError};
use crate::update::store::{InstallationStore, VersionCatalog};
use crate::update::types::{
    Installation, InstallationId, ModuleId, ModuleVersionPair, UpdateFlags, UpdateInfo,
};
use crate::version::comparator::VersionComparator;

/// Result of checking and persisting one installation
#[derive(Debug)]
pub struct RefreshOutcome {
    pub installation_id: InstallationId,
    pub result: Result<UpdateInfo, RefreshError>,
}

pub struct UpdateDetector<C, I> {
    catalog: Arc<C>,
    installations: Arc<I>,
    comparator: VersionComparator,
}

impl<C: VersionCatalog, I: InstallationStore> UpdateDetector<C, I> {
    pub fn new(catalog: Arc<C>, installations: Arc<I>) -> Self {
        Self {
            catalog,
            installations,
            comparator: VersionComparator::new(),
        }
    }

    /// Replace the comparator, e.g. with one backed by a parse cache
    pub fn with_comparator(mut self, comparator: VersionComparator) -> Self {
        self.comparator = comparator;
        self
    }

    /// Compute the update status of `current_version` against a catalog
    ///
    /// Only catalog entries on the same track and major as the current version
    /// are considered.
    pub fn evaluate(&self, current_version: &str, versions: &[String]) -> UpdateInfo {
        if versions.is_empty() {
            return UpdateInfo::no_information(current_version);
        }

        let Ok(current) = self.comparator.parse(current_version).inspect_err(|e| {
            warn!(
                "Cannot check updates for current version '{}': {}",
                current_version, e
            )
        }) else {
            return UpdateInfo::no_information(current_version);
        };

        let compatible = self.comparator.filter_compatible_versions(
            versions,
            current.platform_track.as_deref(),
            Some(current.major),
        );

        let latest_version = self
            .comparator
            .is_update_available(current_version, &compatible)
            .ok()
            .flatten();
        let latest_security_version = self
            .comparator
            .is_security_update_available(current_version, &compatible)
            .ok()
            .flatten();

        let version_lag = latest_version.as_deref().and_then(|latest| {
            self.comparator
                .calculate_version_distance(current_version, latest)
                .ok()
        });

        UpdateInfo {
            current_version: current_version.to_string(),
            update_available: latest_version.is_some(),
            security_update_available: latest_security_version.is_some(),
            latest_version,
            latest_security_version,
            version_lag,
        }
    }

    async fn module_update_info(
        &self,
        module_id: ModuleId,
        current_version: &str,
    ) -> Result<UpdateInfo, ReadError> {
        let versions = self.catalog.fetch_versions(module_id).await?;

        debug!(
            "Checking module {} at '{}' against {} versions",
            module_id,
            current_version,
            versions.len()
        );

        Ok(self.evaluate(current_version, &versions))
    }

    /// Module and current version of an installation, None when either is unknown
    async fn resolve_installation(
        &self,
        installation_id: InstallationId,
    ) -> Result<Option<(ModuleId, String)>, ReadError> {
        match self.installations.fetch_installation(installation_id).await? {
            Some(Installation {
                module_id,
                current_version: Some(current_version),
            }) => Ok(Some((module_id, current_version))),
            _ => {
                debug!(
                    "Installation {} or its current version is unknown",
                    installation_id
                );
                Ok(None)
            }
        }
    }

    /// Check one module's catalog against an installed version
    pub async fn check_module_updates(
        &self,
        module_id: ModuleId,
        current_version: &str,
    ) -> UpdateInfo {
        self.module_update_info(module_id, current_version)
            .await
            .unwrap_or_else(|e| {
                warn!("Failed to fetch versions for module {}: {}", module_id, e);
                UpdateInfo::no_information(current_version)
            })
    }

    /// Check the module and version recorded for an installation
    pub async fn check_site_module_updates(&self, installation_id: InstallationId) -> UpdateInfo {
        let resolved = self
            .resolve_installation(installation_id)
            .await
            .inspect_err(|e| warn!("Failed to fetch installation {}: {}", installation_id, e))
            .ok()
            .flatten();

        match resolved {
            Some((module_id, current_version)) => {
                self.check_module_updates(module_id, &current_version).await
            }
            None => UpdateInfo::unknown(),
        }
    }

    /// Check many installed versions with a single catalog fetch.
    ///
    /// Results are keyed by module; when a module appears more than once the
    /// last pair's result is kept.
    pub async fn batch_check_updates(
        &self,
        pairs: &[ModuleVersionPair],
    ) -> IndexMap<ModuleId, UpdateInfo> {
        if pairs.is_empty() {
            return IndexMap::new();
        }

        let module_ids: Vec<ModuleId> = pairs
            .iter()
            .map(|pair| pair.module_id)
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();

        let catalogs = self
            .catalog
            .fetch_versions_for_modules(&module_ids)
            .await
            .inspect_err(|e| {
                warn!(
                    "Failed to fetch versions for {} modules: {}",
                    module_ids.len(),
                    e
                )
            })
            .unwrap_or_default();

        let mut results = IndexMap::with_capacity(module_ids.len());
        for pair in pairs {
            let versions = catalogs
                .get(&pair.module_id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            results.insert(
                pair.module_id,
                self.evaluate(&pair.current_version, versions),
            );
        }

        info!(
            "Checked {} installed versions across {} modules",
            pairs.len(),
            module_ids.len()
        );

        results
    }

    /// Persist the flags of `info` on an installation, stamped with the current time
    pub async fn update_site_module_flags(
        &self,
        installation_id: InstallationId,
        info: &UpdateInfo,
    ) -> Result<(), WriteError> {
        let flags = UpdateFlags {
            update_available: info.update_available,
            security_update_available: info.security_update_available,
            latest_version: info.latest_version.clone(),
            checked_at: Utc::now(),
        };

        self.installations
            .persist_flags(installation_id, flags)
            .await
    }

    /// Distinct module/version pairs of enabled installations, at most `limit`
    pub async fn get_modules_needing_check(
        &self,
        limit: usize,
    ) -> Result<Vec<ModuleVersionPair>, ReadError> {
        let pairs = self.installations.fetch_pending_installations(limit).await?;

        Ok(pairs
            .into_iter()
            .collect::<IndexSet<_>>()
            .into_iter()
            .take(limit)
            .collect())
    }

    /// Branch key of a version, None if it does not parse
    pub fn get_version_branch(&self, version: &str) -> Option<String> {
        self.comparator
            .parse(version)
            .ok()
            .map(|parsed| parsed.branch())
    }

    async fn refresh_installation(
        &self,
        installation_id: InstallationId,
    ) -> Result<UpdateInfo, RefreshError> {
        let info = match self.resolve_installation(installation_id).await? {
            Some((module_id, current_version)) => {
                self.module_update_info(module_id, &current_version).await?
            }
            None => UpdateInfo::unknown(),
        };

        self.update_site_module_flags(installation_id, &info).await?;
        Ok(info)
    }

    /// Check and persist several installations concurrently.
    ///
    /// A failed read leaves the stored flags untouched. Each failure is
    /// reported for its installation and does not affect the others; no
    /// ordering or atomicity holds across the batch.
    pub async fn refresh_installations(
        &self,
        installation_ids: &[InstallationId],
    ) -> Vec<RefreshOutcome> {
        let refreshes = installation_ids.iter().map(|&installation_id| async move {
            let result = self
                .refresh_installation(installation_id)
                .await
                .inspect_err(|e| {
                    warn!("Failed to refresh installation {}: {}", installation_id, e)
                });

            RefreshOutcome {
                installation_id,
                result,
            }
        });

        join_all(refreshes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use mockall::predicate::eq;
    use rstest::rstest;

    use crate::update::store::{MockInstallationStore, MockVersionCatalog};
    use crate::version::types::VersionDistance;

    fn strings(versions: &[&str]) -> Vec<String> {
        versions.iter().map(|s| s.to_string()).collect()
    }

    fn detector(
        catalog: MockVersionCatalog,
        installations: MockInstallationStore,
    ) -> UpdateDetector<MockVersionCatalog, MockInstallationStore> {
        UpdateDetector::new(Arc::new(catalog), Arc::new(installations))
    }

    fn catalog_with(versions: &'static [&'static str]) -> MockVersionCatalog {
        let mut catalog = MockVersionCatalog::new();
        catalog
            .expect_fetch_versions()
            .with(eq(ModuleId(1)))
            .times(1)
            .returning(move |_| Ok(strings(versions)));
        catalog
    }

    #[tokio::test]
    async fn check_module_updates_with_empty_catalog_returns_no_information() {
        let detector = detector(catalog_with(&[]), MockInstallationStore::new());

        let info = detector.check_module_updates(ModuleId(1), "1.0.0").await;

        assert_eq!(info, UpdateInfo::no_information("1.0.0"));
    }

    #[tokio::test]
    async fn check_module_updates_reports_latest_and_lag() {
        let detector = detector(
            catalog_with(&["1.0.0", "1.1.0", "1.2.3", "1.3.0-beta1", "2.0.0"]),
            MockInstallationStore::new(),
        );

        let info = detector.check_module_updates(ModuleId(1), "1.0.0").await;

        assert_eq!(
            info,
            UpdateInfo {
                current_version: "1.0.0".to_string(),
                latest_version: Some("1.2.3".to_string()),
                latest_security_version: None,
                update_available: true,
                security_update_available: false,
                version_lag: Some(VersionDistance {
                    major: 0,
                    minor: 2,
                    patch: 3,
                    release_type_diff: 0,
                }),
            }
        );
    }

    #[tokio::test]
    async fn check_module_updates_stays_on_current_track() {
        let detector = detector(
            catalog_with(&["8.x-1.1", "8.x-1.2-security1", "9.x-1.5", "8.x-2.0", "1.9.0"]),
            MockInstallationStore::new(),
        );

        let info = detector.check_module_updates(ModuleId(1), "8.x-1.0").await;

        assert_eq!(info.latest_version.as_deref(), Some("8.x-1.2-security1"));
        assert_eq!(
            info.latest_security_version.as_deref(),
            Some("8.x-1.2-security1")
        );
        assert!(info.update_available);
        assert!(info.security_update_available);
        assert_eq!(
            info.version_lag,
            Some(VersionDistance {
                major: 0,
                minor: 2,
                patch: 0,
                release_type_diff: 1,
            })
        );
    }

    #[tokio::test]
    async fn check_module_updates_with_current_latest_has_no_lag() {
        let detector = detector(catalog_with(&["1.0.0", "1.1.0"]), MockInstallationStore::new());

        let info = detector.check_module_updates(ModuleId(1), "1.1.0").await;

        assert!(!info.update_available);
        assert_eq!(info.version_lag, None);
    }

    #[rstest]
    #[case("")]
    #[case("not-a-version")]
    #[tokio::test]
    async fn check_module_updates_with_invalid_current_returns_no_information(
        #[case] current: &str,
    ) {
        let detector = detector(catalog_with(&["1.0.0", "2.0.0"]), MockInstallationStore::new());

        let info = detector.check_module_updates(ModuleId(1), current).await;

        assert_eq!(info, UpdateInfo::no_information(current));
    }

    #[tokio::test]
    async fn check_module_updates_with_read_error_returns_no_information() {
        let mut catalog = MockVersionCatalog::new();
        catalog
            .expect_fetch_versions()
            .returning(|_| Err(ReadError::Backend("connection reset".to_string())));
        let detector = detector(catalog, MockInstallationStore::new());

        let info = detector.check_module_updates(ModuleId(1), "1.0.0").await;

        assert_eq!(info, UpdateInfo::no_information("1.0.0"));
    }

    #[tokio::test]
    async fn check_site_module_updates_delegates_to_module_check() {
        let mut installations = MockInstallationStore::new();
        installations
            .expect_fetch_installation()
            .with(eq(InstallationId(10)))
            .returning(|_| {
                Ok(Some(Installation {
                    module_id: ModuleId(1),
                    current_version: Some("1.0.0".to_string()),
                }))
            });
        let detector = detector(catalog_with(&["1.0.0", "1.0.1"]), installations);

        let info = detector.check_site_module_updates(InstallationId(10)).await;

        assert_eq!(info.current_version, "1.0.0");
        assert_eq!(info.latest_version.as_deref(), Some("1.0.1"));
    }

    #[rstest]
    #[case(Ok(None))]
    #[case(Ok(Some(Installation { module_id: ModuleId(1), current_version: None })))]
    #[case(Err(ReadError::LockPoisoned))]
    #[tokio::test]
    async fn check_site_module_updates_returns_unknown_without_current_version(
        #[case] installation: Result<Option<Installation>, ReadError>,
    ) {
        let mut installations = MockInstallationStore::new();
        installations
            .expect_fetch_installation()
            .return_once(move |_| installation);
        let mut catalog = MockVersionCatalog::new();
        catalog.expect_fetch_versions().never();
        let detector = detector(catalog, installations);

        let info = detector.check_site_module_updates(InstallationId(10)).await;

        assert_eq!(info, UpdateInfo::unknown());
    }

    #[tokio::test]
    async fn batch_check_updates_fetches_each_module_once() {
        let mut catalog = MockVersionCatalog::new();
        catalog.expect_fetch_versions().never();
        catalog
            .expect_fetch_versions_for_modules()
            .withf(|ids| ids.to_vec() == vec![ModuleId(1), ModuleId(2)])
            .times(1)
            .returning(|_| {
                Ok(HashMap::from([
                    (ModuleId(1), strings(&["1.0.0", "1.1.0"])),
                    (ModuleId(2), strings(&["8.x-2.0", "8.x-2.1"])),
                ]))
            });
        let detector = detector(catalog, MockInstallationStore::new());

        let results = detector
            .batch_check_updates(&[
                ModuleVersionPair::new(ModuleId(1), "1.0.0"),
                ModuleVersionPair::new(ModuleId(2), "8.x-2.0"),
                ModuleVersionPair::new(ModuleId(1), "1.1.0"),
            ])
            .await;

        assert_eq!(results.len(), 2);
        // The later pair for module 1 replaces the earlier one
        assert_eq!(results[&ModuleId(1)].current_version, "1.1.0");
        assert!(!results[&ModuleId(1)].update_available);
        assert_eq!(
            results[&ModuleId(2)].latest_version.as_deref(),
            Some("8.x-2.1")
        );
    }

    #[tokio::test]
    async fn batch_check_updates_treats_missing_catalog_as_empty() {
        let mut catalog = MockVersionCatalog::new();
        catalog
            .expect_fetch_versions_for_modules()
            .times(1)
            .returning(|_| Ok(HashMap::new()));
        let detector = detector(catalog, MockInstallationStore::new());

        let results = detector
            .batch_check_updates(&[ModuleVersionPair::new(ModuleId(5), "1.0.0")])
            .await;

        assert_eq!(results[&ModuleId(5)], UpdateInfo::no_information("1.0.0"));
    }

    #[tokio::test]
    async fn batch_check_updates_with_read_error_returns_no_information() {
        let mut catalog = MockVersionCatalog::new();
        catalog
            .expect_fetch_versions_for_modules()
            .returning(|_| Err(ReadError::Backend("timeout".to_string())));
        let detector = detector(catalog, MockInstallationStore::new());

        let results = detector
            .batch_check_updates(&[ModuleVersionPair::new(ModuleId(1), "1.0.0")])
            .await;

        assert_eq!(results[&ModuleId(1)], UpdateInfo::no_information("1.0.0"));
    }

    #[tokio::test]
    async fn batch_check_updates_with_no_pairs_skips_fetch() {
        let mut catalog = MockVersionCatalog::new();
        catalog.expect_fetch_versions_for_modules().never();
        let detector = detector(catalog, MockInstallationStore::new());

        assert!(detector.batch_check_updates(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn update_site_module_flags_persists_info_flags() {
        let mut installations = MockInstallationStore::new();
        installations
            .expect_persist_flags()
            .withf(|id, flags| {
                *id == InstallationId(3)
                    && flags.update_available
                    && !flags.security_update_available
                    && flags.latest_version.as_deref() == Some("1.2.0")
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let detector = detector(MockVersionCatalog::new(), installations);
        let info = UpdateInfo {
            latest_version: Some("1.2.0".to_string()),
            update_available: true,
            ..UpdateInfo::no_information("1.0.0")
        };

        detector
            .update_site_module_flags(InstallationId(3), &info)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_site_module_flags_propagates_write_errors() {
        let mut installations = MockInstallationStore::new();
        installations
            .expect_persist_flags()
            .returning(|id, _| Err(WriteError::UnknownInstallation(id)));
        let detector = detector(MockVersionCatalog::new(), installations);

        let result = detector
            .update_site_module_flags(InstallationId(4), &UpdateInfo::unknown())
            .await;

        assert!(matches!(
            result,
            Err(WriteError::UnknownInstallation(InstallationId(4)))
        ));
    }

    #[tokio::test]
    async fn get_modules_needing_check_removes_duplicates() {
        let mut installations = MockInstallationStore::new();
        installations
            .expect_fetch_pending_installations()
            .with(eq(10))
            .returning(|_| {
                Ok(vec![
                    ModuleVersionPair::new(ModuleId(1), "1.0.0"),
                    ModuleVersionPair::new(ModuleId(2), "2.0.0"),
                    ModuleVersionPair::new(ModuleId(1), "1.0.0"),
                ])
            });
        let detector = detector(MockVersionCatalog::new(), installations);

        let pairs = detector.get_modules_needing_check(10).await.unwrap();

        assert_eq!(
            pairs,
            vec![
                ModuleVersionPair::new(ModuleId(1), "1.0.0"),
                ModuleVersionPair::new(ModuleId(2), "2.0.0"),
            ]
        );
    }

    #[tokio::test]
    async fn get_modules_needing_check_propagates_read_errors() {
        let mut installations = MockInstallationStore::new();
        installations
            .expect_fetch_pending_installations()
            .returning(|_| Err(ReadError::LockPoisoned));
        let detector = detector(MockVersionCatalog::new(), installations);

        assert!(detector.get_modules_needing_check(5).await.is_err());
    }

    #[rstest]
    #[case("8.x-1.3", Some("8.x-1.x"))]
    #[case("8.x-2.x-dev", Some("8.x-2.x"))]
    #[case("3.1.4", Some("3.x"))]
    #[case("garbage", None)]
    fn get_version_branch_returns_expected(#[case] version: &str, #[case] expected: Option<&str>) {
        let detector = detector(MockVersionCatalog::new(), MockInstallationStore::new());

        assert_eq!(
            detector.get_version_branch(version),
            expected.map(|s| s.to_string())
        );
    }

    #[tokio::test]
    async fn refresh_installations_reports_each_outcome() {
        let mut installations = MockInstallationStore::new();
        installations.expect_fetch_installation().returning(|_| {
            Ok(Some(Installation {
                module_id: ModuleId(1),
                current_version: Some("1.0.0".to_string()),
            }))
        });
        installations.expect_persist_flags().returning(|id, _| {
            if id == InstallationId(2) {
                Err(WriteError::Backend("read-only".to_string()))
            } else {
                Ok(())
            }
        });
        let mut catalog = MockVersionCatalog::new();
        catalog
            .expect_fetch_versions()
            .times(2)
            .returning(|_| Ok(strings(&["1.0.0", "1.5.0"])));
        let detector = detector(catalog, installations);

        let outcomes = detector
            .refresh_installations(&[InstallationId(1), InstallationId(2)])
            .await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].installation_id, InstallationId(1));
        assert_eq!(
            outcomes[0].result.as_ref().unwrap().latest_version.as_deref(),
            Some("1.5.0")
        );
        assert!(matches!(
            outcomes[1].result,
            Err(RefreshError::Write(WriteError::Backend(_)))
        ));
    }

    #[tokio::test]
    async fn refresh_installations_keeps_flags_when_catalog_read_fails() {
        let mut installations = MockInstallationStore::new();
        installations.expect_fetch_installation().returning(|_| {
            Ok(Some(Installation {
                module_id: ModuleId(1),
                current_version: Some("1.0.0".to_string()),
            }))
        });
        installations.expect_persist_flags().never();
        let mut catalog = MockVersionCatalog::new();
        catalog
            .expect_fetch_versions()
            .times(1)
            .returning(|_| Err(ReadError::Backend("timeout".to_string())));
        let detector = detector(catalog, installations);

        let outcomes = detector.refresh_installations(&[InstallationId(1)]).await;

        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            outcomes[0].result,
            Err(RefreshError::Read(ReadError::Backend(_)))
        ));
    }

    #[tokio::test]
    async fn refresh_installations_keeps_flags_when_installation_read_fails() {
        let mut installations = MockInstallationStore::new();
        installations
            .expect_fetch_installation()
            .returning(|_| Err(ReadError::LockPoisoned));
        installations.expect_persist_flags().never();
        let mut catalog = MockVersionCatalog::new();
        catalog.expect_fetch_versions().never();
        let detector = detector(catalog, installations);

        let outcomes = detector.refresh_installations(&[InstallationId(7)]).await;

        assert!(matches!(
            outcomes[0].result,
            Err(RefreshError::Read(ReadError::LockPoisoned))
        ));
    }

    #[tokio::test]
    async fn check_site_module_updates_with_catalog_read_error_returns_no_information() {
        let mut installations = MockInstallationStore::new();
        installations.expect_fetch_installation().returning(|_| {
            Ok(Some(Installation {
                module_id: ModuleId(1),
                current_version: Some("1.0.0".to_string()),
            }))
        });
        let mut catalog = MockVersionCatalog::new();
        catalog
            .expect_fetch_versions()
            .returning(|_| Err(ReadError::Backend("timeout".to_string())));
        let detector = detector(catalog, installations);

        let info = detector.check_site_module_updates(InstallationId(1)).await;

        assert_eq!(info, UpdateInfo::no_information("1.0.0"));
    }
}
