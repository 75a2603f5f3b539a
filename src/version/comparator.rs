//! Version ordering and derived queries
//!
//! Every operation accepts raw version strings. Entries of a list that fail to
//! parse are dropped from the computation; a required single argument that
//! fails to parse is returned to the caller as a [`ParseError`].

use std::cmp::Ordering;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::version::cache::ParseCache;
use crate::version::error::ParseError;
use crate::version::parser::parse;
use crate::version::types::{ParsedVersion, ReleaseType, VersionDistance, track_number_of};

/// Order two parsed versions.
///
/// 1. Both tracked on different tracks: the track numbers decide alone.
/// 2. Only one side tracked: the tracked side is newer.
/// 3. Otherwise `(major, minor, patch, precedence, release_number)` decides.
pub fn compare_parsed(a: &ParsedVersion, b: &ParsedVersion) -> Ordering {
    match (a.track_number(), b.track_number()) {
        (Some(track_a), Some(track_b)) if track_a != track_b => track_a.cmp(&track_b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => a.precedence_key().cmp(&b.precedence_key()),
    }
}

/// Component-wise distance from `from` to `to`
pub fn distance_between(from: &ParsedVersion, to: &ParsedVersion) -> VersionDistance {
    let abs_diff = |a: u64, b: u64| i64::try_from(a.abs_diff(b)).unwrap_or(i64::MAX);

    VersionDistance {
        major: abs_diff(from.major, to.major),
        minor: abs_diff(from.minor, to.minor),
        patch: abs_diff(from.patch, to.patch),
        release_type_diff: i64::from(to.release_type.precedence())
            - i64::from(from.release_type.precedence()),
    }
}

/// Maximum by the latest-selection key; the first of equal maxima wins
fn latest_of(versions: impl Iterator<Item = ParsedVersion>) -> Option<ParsedVersion> {
    versions.fold(None, |best, candidate| match best {
        Some(best) if best.sort_key() >= candidate.sort_key() => Some(best),
        _ => Some(candidate),
    })
}

/// Comparator over raw version strings, optionally backed by a [`ParseCache`]
#[derive(Clone, Default)]
pub struct VersionComparator {
    cache: Option<Arc<ParseCache>>,
}

impl VersionComparator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(cache: Arc<ParseCache>) -> Self {
        Self { cache: Some(cache) }
    }

    pub fn parse(&self, input: &str) -> Result<ParsedVersion, ParseError> {
        match &self.cache {
            Some(cache) => cache.get_or_parse(input),
            None => parse(input),
        }
    }

    fn parse_all<'a>(&'a self, versions: &'a [String]) -> impl Iterator<Item = ParsedVersion> + 'a {
        versions.iter().filter_map(|version| {
            self.parse(version)
                .inspect_err(|e| debug!("Skipping version '{}': {}", version, e))
                .ok()
        })
    }

    fn latest_parsed(&self, versions: &[String], stable_only: bool) -> Option<ParsedVersion> {
        latest_of(
            self.parse_all(versions)
                .filter(|version| !stable_only || version.is_stable_like()),
        )
    }

    /// Compare two version strings
    pub fn compare(&self, a: &str, b: &str) -> Result<Ordering, ParseError> {
        Ok(compare_parsed(&self.parse(a)?, &self.parse(b)?))
    }

    /// Select the latest version from a list.
    ///
    /// With `stable_only`, only stable and security releases are considered.
    /// Returns None if no entry parses.
    pub fn get_latest_version(&self, versions: &[String], stable_only: bool) -> Option<String> {
        self.latest_parsed(versions, stable_only)
            .map(|latest| latest.original)
    }

    /// Returns the latest stable version if it is newer than `current`
    pub fn is_update_available(
        &self,
        current: &str,
        available: &[String],
    ) -> Result<Option<String>, ParseError> {
        let current = self.parse(current)?;

        let Some(latest) = self.latest_parsed(available, true) else {
            return Ok(None);
        };

        Ok((compare_parsed(&current, &latest) == Ordering::Less).then_some(latest.original))
    }

    /// Returns the latest security release newer than `current`.
    ///
    /// When both `current` and a candidate carry a platform track, the track
    /// numbers must be equal for the candidate to qualify.
    pub fn is_security_update_available(
        &self,
        current: &str,
        available: &[String],
    ) -> Result<Option<String>, ParseError> {
        let current = self.parse(current)?;

        let candidates = self
            .parse_all(available)
            .filter(|version| version.release_type == ReleaseType::Security)
            .filter(|version| compare_parsed(version, &current) == Ordering::Greater)
            .filter(|version| match (version.track_number(), current.track_number()) {
                (Some(candidate_track), Some(current_track)) => candidate_track == current_track,
                _ => true,
            });

        Ok(latest_of(candidates).map(|latest| latest.original))
    }

    /// Group versions by branch key, each branch sorted ascending
    pub fn group_versions_by_branch(&self, versions: &[String]) -> IndexMap<String, Vec<String>> {
        let mut branches: IndexMap<String, Vec<ParsedVersion>> = IndexMap::new();
        for version in self.parse_all(versions) {
            branches.entry(version.branch()).or_default().push(version);
        }

        branches
            .into_iter()
            .map(|(branch, mut members)| {
                members.sort_by(compare_parsed);
                let originals = members.into_iter().map(|v| v.original).collect();
                (branch, originals)
            })
            .collect()
    }

    /// Keep versions on the given track and/or major, in input order.
    ///
    /// Tracks match on their numeric prefix, so `08.x` selects `8.x` entries.
    /// Untracked versions never match a track filter.
    pub fn filter_compatible_versions(
        &self,
        versions: &[String],
        track: Option<&str>,
        major: Option<u64>,
    ) -> Vec<String> {
        let track_number = track.map(track_number_of);

        self.parse_all(versions)
            .filter(|version| {
                track_number.is_none_or(|wanted| {
                    wanted.is_some() && version.track_number() == wanted
                })
            })
            .filter(|version| major.is_none_or(|major| version.major == major))
            .map(|version| version.original)
            .collect()
    }

    /// Distance from `a` to `b`
    pub fn calculate_version_distance(
        &self,
        a: &str,
        b: &str,
    ) -> Result<VersionDistance, ParseError> {
        Ok(distance_between(&self.parse(a)?, &self.parse(b)?))
    }
}
