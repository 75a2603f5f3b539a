//! Common types for update detection

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::version::types::VersionDistance;

/// Opaque identifier of a module in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(pub u64);

/// Opaque identifier of a site's installation of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstallationId(pub u64);

macro_rules! id_impls {
    ($name:ident) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map($name)
            }
        }
    };
}

id_impls!(ModuleId);
id_impls!(InstallationId);

/// Installation as resolved by the installation store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installation {
    pub module_id: ModuleId,
    pub current_version: Option<String>,
}

/// A module together with an installed version awaiting a check
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleVersionPair {
    pub module_id: ModuleId,
    pub current_version: String,
}

impl ModuleVersionPair {
    pub fn new(module_id: ModuleId, current_version: impl Into<String>) -> Self {
        Self {
            module_id,
            current_version: current_version.into(),
        }
    }
}

/// Cached update flags written back to an installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateFlags {
    pub update_available: bool,
    pub security_update_available: bool,
    pub latest_version: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Update status of one installed version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateInfo {
    pub current_version: String,
    pub latest_version: Option<String>,
    pub latest_security_version: Option<String>,
    pub update_available: bool,
    pub security_update_available: bool,
    /// Distance to `latest_version`, only computed when an update exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_lag: Option<VersionDistance>,
}

impl UpdateInfo {
    /// Result carrying only the current version, with every flag cleared
    pub fn no_information(current_version: impl Into<String>) -> Self {
        Self {
            current_version: current_version.into(),
            latest_version: None,
            latest_security_version: None,
            update_available: false,
            security_update_available: false,
            version_lag: None,
        }
    }

    /// Result for an installation whose current version is not known
    pub fn unknown() -> Self {
        Self::no_information("unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_has_placeholder_version_and_no_flags() {
        let info = UpdateInfo::unknown();

        assert_eq!(info.current_version, "unknown");
        assert!(!info.update_available);
        assert!(!info.security_update_available);
        assert_eq!(info.latest_version, None);
    }

    #[test]
    fn ids_parse_from_decimal_strings() {
        assert_eq!("42".parse::<ModuleId>().unwrap(), ModuleId(42));
        assert!("forty-two".parse::<InstallationId>().is_err());
        assert_eq!(InstallationId(7).to_string(), "7");
    }

    #[test]
    fn update_info_serializes_without_lag_when_absent() {
        let value = serde_json::to_value(UpdateInfo::no_information("1.0.0")).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "current_version": "1.0.0",
                "latest_version": null,
                "latest_security_version": null,
                "update_available": false,
                "security_update_available": false,
            })
        );
    }
}
