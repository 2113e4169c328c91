//! Breakpoint registry.
//!
//! Breakpoints are keyed by normalized `(file, line)`. Normalization turns
//! backslashes into forward slashes, reduces the path to its basename (the
//! interpreter reports only basenames for source positions) and lowercases
//! it so lookups match on case-insensitive filesystems.
//!
//! Known limitation: because keys carry the basename only, two scripts with
//! the same name in different directories are indistinguishable. The
//! interpreter cannot report full paths, so no directory-aware resolution
//! is attempted.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

/// Normalize a source file reference into its breakpoint key form.
///
/// Idempotent: normalizing an already-normalized key returns it unchanged
/// (and without allocating).
pub fn normalize_key(file: &str) -> Cow<'_, str> {
    let needs_work = file.contains('\\')
        || file.contains('/')
        || file.chars().any(|c| c.is_uppercase());
    if !needs_work {
        return Cow::Borrowed(file);
    }

    let replaced = file.replace('\\', "/");
    let basename = replaced.rsplit('/').next().unwrap_or("");
    Cow::Owned(basename.to_lowercase())
}

/// Set of active breakpoints, grouped by normalized file name so the hot
/// `has` lookup is a pair of O(1) hash probes with no allocation when the
/// incoming file reference is already in key form.
#[derive(Debug, Default)]
pub struct BreakpointRegistry {
    by_file: HashMap<String, HashSet<u32>>,
    count: usize,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a breakpoint. Adding the same (file, line) twice is a no-op.
    pub fn add(&mut self, file: &str, line: u32) {
        let key = normalize_key(file).into_owned();
        if self.by_file.entry(key).or_default().insert(line) {
            self.count += 1;
        }
    }

    /// Remove a breakpoint. Absent entries are simply "no match".
    pub fn remove(&mut self, file: &str, line: u32) {
        let key = normalize_key(file);
        if let Some(lines) = self.by_file.get_mut(key.as_ref()) {
            if lines.remove(&line) {
                self.count -= 1;
            }
            if lines.is_empty() {
                self.by_file.remove(key.as_ref());
            }
        }
    }

    /// Hot-path membership test.
    pub fn has(&self, file: &str, line: u32) -> bool {
        let key = normalize_key(file);
        self.by_file
            .get(key.as_ref())
            .is_some_and(|lines| lines.contains(&line))
    }

    pub fn clear(&mut self) {
        self.by_file.clear();
        self.count = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn len(&self) -> usize {
        self.count
    }
}
