//! Common types for parsed versions

use std::cmp::Ordering;
use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

/// Kind of release encoded in a version string
///
/// Ordered by precedence: a security release outranks a stable release of the
/// same numeric triple, which in turn outranks every pre-release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseType {
    Dev,
    Alpha,
    Beta,
    ReleaseCandidate,
    #[default]
    Stable,
    Security,
}

impl ReleaseType {
    /// Returns the ordering precedence of the release type
    pub fn precedence(&self) -> u8 {
        match self {
            ReleaseType::Dev => 0,
            ReleaseType::Alpha => 1,
            ReleaseType::Beta => 2,
            ReleaseType::ReleaseCandidate => 3,
            ReleaseType::Stable => 4,
            ReleaseType::Security => 5,
        }
    }

    /// Returns the token used in version strings
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseType::Dev => "dev",
            ReleaseType::Alpha => "alpha",
            ReleaseType::Beta => "beta",
            ReleaseType::ReleaseCandidate => "rc",
            ReleaseType::Stable => "stable",
            ReleaseType::Security => "security",
        }
    }

    /// Map a release token (case-insensitive) to its release type
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "dev" => Some(ReleaseType::Dev),
            "alpha" => Some(ReleaseType::Alpha),
            "beta" => Some(ReleaseType::Beta),
            "rc" => Some(ReleaseType::ReleaseCandidate),
            "security" => Some(ReleaseType::Security),
            _ => None,
        }
    }
}

impl PartialOrd for ReleaseType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReleaseType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence().cmp(&other.precedence())
    }
}

impl fmt::Display for ReleaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured form of a version string
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedVersion {
    /// Platform track such as `8.x`, only present for contrib-style versions
    pub platform_track: Option<String>,
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub release_type: ReleaseType,
    /// Distinguishes pre-releases of the same type (`beta1` vs `beta2`)
    pub release_number: Option<u64>,
    /// Build metadata after `+`, ignored for ordering
    pub extra: Option<String>,
    /// The exact input string
    pub original: String,
}

/// Numeric prefix of a platform track string, None unless it is `{n}.x`
pub fn track_number_of(track: &str) -> Option<u64> {
    track.strip_suffix(".x").and_then(|n| n.parse().ok())
}

impl ParsedVersion {
    /// Numeric prefix of the platform track (`"8.x"` -> 8)
    pub fn track_number(&self) -> Option<u64> {
        self.platform_track.as_deref().and_then(track_number_of)
    }

    /// Branch key: `{track}-{major}.x` with a track, `{major}.x` without
    pub fn branch(&self) -> String {
        match &self.platform_track {
            Some(track) => format!("{}-{}.x", track, self.major),
            None => format!("{}.x", self.major),
        }
    }

    /// True for stable and security releases
    pub fn is_stable_like(&self) -> bool {
        matches!(
            self.release_type,
            ReleaseType::Stable | ReleaseType::Security
        )
    }

    /// Tuple compared once track rules are settled
    pub(crate) fn precedence_key(&self) -> (u64, u64, u64, u8, u64) {
        (
            self.major,
            self.minor,
            self.patch,
            self.release_type.precedence(),
            self.release_number.unwrap_or(0),
        )
    }

    /// Key used to pick the maximum from a list of versions
    pub(crate) fn sort_key(&self) -> (u64, (u64, u64, u64, u8, u64)) {
        (self.track_number().unwrap_or(0), self.precedence_key())
    }
}

impl fmt::Display for ParsedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.release_type != ReleaseType::Stable {
            write!(f, "-{}", self.release_type)?;
            if let Some(number) = self.release_number {
                write!(f, "{}", number)?;
            }
        }
        if let Some(extra) = &self.extra {
            write!(f, "+{}", extra)?;
        }
        Ok(())
    }
}

/// Component-wise distance between two versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct VersionDistance {
    pub major: i64,
    pub minor: i64,
    pub patch: i64,
    /// Signed: precedence of the target minus precedence of the source
    pub release_type_diff: i64,
}

impl VersionDistance {
    /// Mapping form keyed by component name
    pub fn to_map(&self) -> IndexMap<&'static str, i64> {
        IndexMap::from([
            ("major", self.major),
            ("minor", self.minor),
            ("patch", self.patch),
            ("release_type_diff", self.release_type_diff),
        ])
    }
}
