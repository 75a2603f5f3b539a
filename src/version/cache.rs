//! Caller-scoped memo of parse results
//!
//! Nothing in the engine creates one implicitly; a caller that wants repeated
//! catalog strings parsed once injects it with
//! [`VersionComparator::with_cache`](crate::version::comparator::VersionComparator::with_cache).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::version::error::ParseError;
use crate::version::parser::parse;
use crate::version::types::ParsedVersion;

/// Default number of entries kept before the cache is cleared
pub const DEFAULT_PARSE_CACHE_CAPACITY: usize = 4096;

pub struct ParseCache {
    entries: Mutex<HashMap<String, Result<ParsedVersion, ParseError>>>,
    capacity: usize,
}

impl Default for ParseCache {
    fn default() -> Self {
        Self::new(DEFAULT_PARSE_CACHE_CAPACITY)
    }
}

impl ParseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn lock_entries(
        &self,
    ) -> Option<MutexGuard<'_, HashMap<String, Result<ParsedVersion, ParseError>>>> {
        self.entries
            .lock()
            .inspect_err(|_| warn!("Parse cache lock poisoned, parsing without cache"))
            .ok()
    }

    /// Return the cached result for `input`, parsing and storing it on a miss
    pub fn get_or_parse(&self, input: &str) -> Result<ParsedVersion, ParseError> {
        let Some(mut entries) = self.lock_entries() else {
            return parse(input);
        };

        if let Some(result) = entries.get(input) {
            return result.clone();
        }

        if entries.len() >= self.capacity {
            debug!("Parse cache reached {} entries, clearing", self.capacity);
            entries.clear();
        }

        let result = parse(input);
        entries.insert(input.to_string(), result.clone());
        result
    }

    pub fn len(&self) -> usize {
        self.lock_entries().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Some(mut entries) = self.lock_entries() {
            entries.clear();
        }
    }
}
