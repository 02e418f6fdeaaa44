// src/watch/filter.rs

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Ignore patterns a development loop needs out of the box: version control
/// metadata, build output, and editor droppings. Without these the loop would
/// re-trigger on its own artifacts.
const DEFAULT_IGNORES: &[&str] = &[
    ".git/**",
    ".git",
    "target/**",
    "target",
    "*.swp",
    "*.swx",
    "*~",
    ".#*",
];

/// Compiled ignore patterns for a watch session.
///
/// Patterns are matched against paths relative to the watched directory they
/// fall under, with forward slashes. A path that matches is neither forwarded
/// nor allowed to extend the debounce window.
#[derive(Debug, Clone)]
pub struct PathFilter {
    ignore_set: Option<GlobSet>,
}

impl PathFilter {
    /// Compile a filter from user patterns, optionally layered on top of the
    /// built-in defaults.
    pub fn new(user_patterns: &[String], with_defaults: bool) -> Result<Self> {
        let mut patterns: Vec<&str> = Vec::new();
        if with_defaults {
            patterns.extend(DEFAULT_IGNORES);
        }
        patterns.extend(user_patterns.iter().map(String::as_str));

        if patterns.is_empty() {
            return Ok(Self { ignore_set: None });
        }

        let mut builder = GlobSetBuilder::new();
        for pat in &patterns {
            let glob = Glob::new(pat)
                .with_context(|| format!("invalid ignore pattern: {pat}"))?;
            builder.add(glob);
        }
        let ignore_set = builder.build().context("building ignore globset")?;

        Ok(Self {
            ignore_set: Some(ignore_set),
        })
    }

    /// A filter that ignores nothing.
    pub fn empty() -> Self {
        Self { ignore_set: None }
    }

    /// Returns true if changes to `rel_path` (relative, forward slashes)
    /// should be dropped.
    pub fn is_ignored(&self, rel_path: &str) -> bool {
        match &self.ignore_set {
            Some(set) => set.is_match(rel_path),
            None => false,
        }
    }
}
