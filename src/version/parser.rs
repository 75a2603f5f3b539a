//! Version string parser
//!
//! Version strings are matched against a fixed, ordered list of grammars.
//! The first grammar whose pattern matches decides the result; later grammars
//! are never consulted once one matches.
//!
//! | Priority | Grammar                   | Example            |
//! |----------|---------------------------|--------------------|
//! | 1        | platform-contrib release  | `8.x-1.0-beta1`    |
//! | 2        | platform-contrib dev      | `8.x-1.x-dev`      |
//! | 3        | semantic release          | `3.0.0-rc2+abc`    |
//! | 4        | semantic dev branch       | `2.1.x-dev`        |
//! | 5        | bare two-component        | `1.4`              |

use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::trace;

use crate::version::error::ParseError;
use crate::version::types::{ParsedVersion, ReleaseType};

type Constructor = fn(&Captures<'_>, &str) -> Option<ParsedVersion>;

struct Grammar {
    name: &'static str,
    pattern: Regex,
    build: Constructor,
}

impl Grammar {
    fn new(name: &'static str, pattern: &str, build: Constructor) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).unwrap(),
            build,
        }
    }
}

static GRAMMARS: LazyLock<[Grammar; 5]> = LazyLock::new(|| {
    [
        Grammar::new(
            "platform_contrib_release",
            r"^(\d+)\.x-(\d+)\.(\d+)(?:-?((?i:alpha|beta|rc|dev|security))(\d+)?)?(?:\+(.+))?$",
            platform_contrib_release,
        ),
        Grammar::new(
            "platform_contrib_dev",
            r"^(\d+)\.x-(\d+)\.x-dev$",
            platform_contrib_dev,
        ),
        Grammar::new(
            "semantic_release",
            r"^(\d+)\.(\d+)\.(\d+)(?:-?((?i:alpha|beta|rc|dev|security))(\d+)?)?(?:\+(.+))?$",
            semantic_release,
        ),
        Grammar::new(
            "semantic_dev",
            r"^(\d+)(?:\.(\d+))?\.x-dev$",
            semantic_dev,
        ),
        Grammar::new("bare_numeric", r"^(\d+)\.(\d+)$", bare_numeric),
    ]
});

/// Parse a version string into its structured form.
///
/// Surrounding whitespace is ignored for matching; `original` keeps the input
/// exactly as given.
///
/// Examples:
/// - "8.x-1.0-beta1" -> track 8.x, 1.0.0, Beta, release number 1
/// - "8.x-1.x-dev" -> track 8.x, 1.0.0, Dev
/// - "2.3.4+build7" -> 2.3.4, Stable, extra "build7"
pub fn parse(input: &str) -> Result<ParsedVersion, ParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ParseError::EmptyInput);
    }

    let Some((grammar, captures)) = GRAMMARS.iter().find_map(|grammar| {
        grammar
            .pattern
            .captures(trimmed)
            .map(|captures| (grammar, captures))
    }) else {
        return Err(ParseError::UnrecognizedFormat(input.to_string()));
    };

    trace!("'{}' matched grammar {}", input, grammar.name);

    // A matching grammar whose numbers overflow is still a failed parse
    (grammar.build)(&captures, input)
        .ok_or_else(|| ParseError::UnrecognizedFormat(input.to_string()))
}

/// Re-render a version as `major.minor.patch[-type[number]][+extra]`.
///
/// The platform track is dropped. Unparsable input is returned unchanged.
pub fn normalize(input: &str) -> String {
    parse(input)
        .map(|parsed| parsed.to_string())
        .unwrap_or_else(|_| input.to_string())
}

/// Returns true if the input parses under any grammar
pub fn is_valid(input: &str) -> bool {
    parse(input).is_ok()
}

impl FromStr for ParsedVersion {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

fn number(captures: &Captures<'_>, index: usize) -> Option<u64> {
    captures.get(index)?.as_str().parse().ok()
}

/// `Some(None)` when the group did not participate, `None` on overflow
fn optional_number(captures: &Captures<'_>, index: usize) -> Option<Option<u64>> {
    match captures.get(index) {
        Some(m) => m.as_str().parse().ok().map(Some),
        None => Some(None),
    }
}

fn track(captures: &Captures<'_>, index: usize) -> Option<String> {
    number(captures, index)?;
    Some(format!("{}.x", &captures[index]))
}

fn release(
    captures: &Captures<'_>,
    type_index: usize,
    number_index: usize,
) -> Option<(ReleaseType, Option<u64>)> {
    match captures.get(type_index) {
        Some(token) => {
            let release_type = ReleaseType::from_token(token.as_str())?;
            Some((release_type, optional_number(captures, number_index)?))
        }
        None => Some((ReleaseType::Stable, None)),
    }
}

fn extra(captures: &Captures<'_>, index: usize) -> Option<String> {
    captures.get(index).map(|m| m.as_str().to_string())
}

fn platform_contrib_release(captures: &Captures<'_>, input: &str) -> Option<ParsedVersion> {
    let (release_type, release_number) = release(captures, 4, 5)?;
    Some(ParsedVersion {
        platform_track: Some(track(captures, 1)?),
        major: number(captures, 2)?,
        minor: number(captures, 3)?,
        patch: 0,
        release_type,
        release_number,
        extra: extra(captures, 6),
        original: input.to_string(),
    })
}

fn platform_contrib_dev(captures: &Captures<'_>, input: &str) -> Option<ParsedVersion> {
    Some(ParsedVersion {
        platform_track: Some(track(captures, 1)?),
        major: number(captures, 2)?,
        minor: 0,
        patch: 0,
        release_type: ReleaseType::Dev,
        release_number: None,
        extra: None,
        original: input.to_string(),
    })
}

fn semantic_release(captures: &Captures<'_>, input: &str) -> Option<ParsedVersion> {
    let (release_type, release_number) = release(captures, 4, 5)?;
    Some(ParsedVersion {
        platform_track: None,
        major: number(captures, 1)?,
        minor: number(captures, 2)?,
        patch: number(captures, 3)?,
        release_type,
        release_number,
        extra: extra(captures, 6),
        original: input.to_string(),
    })
}

fn semantic_dev(captures: &Captures<'_>, input: &str) -> Option<ParsedVersion> {
    Some(ParsedVersion {
        platform_track: None,
        major: number(captures, 1)?,
        minor: optional_number(captures, 2)?.unwrap_or(0),
        patch: 0,
        release_type: ReleaseType::Dev,
        release_number: None,
        extra: None,
        original: input.to_string(),
    })
}

fn bare_numeric(captures: &Captures<'_>, input: &str) -> Option<ParsedVersion> {
    Some(ParsedVersion {
        platform_track: None,
        major: number(captures, 1)?,
        minor: number(captures, 2)?,
        patch: 0,
        release_type: ReleaseType::Stable,
        release_number: None,
        extra: None,
        original: input.to_string(),
    })
}
