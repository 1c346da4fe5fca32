//! Ignore-pattern matching.
//!
//! Patterns use gitignore glob syntax and are evaluated against the path
//! relative to the watched root, case-sensitively:
//! - `*.tmp`, `node_modules`: no slash, matches a component at any depth
//! - `docs/drafts`: contains a slash, anchored to the root
//! - `build/`: trailing slash, matches directories only
//!
//! A path is ignored when it or any ancestor below the root matches, so an
//! ignored directory hides its whole subtree.

use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::error::ConfigError;

/// Compiled ignore patterns scoped to one watched root.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    root: PathBuf,
    patterns: Vec<String>,
    gitignore: Gitignore,
}

impl PathMatcher {
    /// Compile `patterns` for the directory `root`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPattern` for empty patterns, negations,
    /// comment lines and globs that fail to compile.
    pub fn new(root: impl Into<PathBuf>, patterns: &[String]) -> Result<Self, ConfigError> {
        let root = root.into();
        let mut builder = GitignoreBuilder::new(&root);

        for pattern in patterns {
            validate_pattern(pattern)?;
            builder
                .add_line(None, pattern)
                .map_err(|e| ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
        }

        let gitignore = builder.build().map_err(|e| ConfigError::InvalidPattern {
            pattern: patterns.join(", "),
            reason: e.to_string(),
        })?;

        Ok(Self {
            root,
            patterns: patterns.to_vec(),
            gitignore,
        })
    }

    /// The directory the patterns are relative to.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The source patterns, in configuration order.
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether `path` is ignored.
    ///
    /// The root itself is checked by its own name. Paths outside the root
    /// never match.
    #[must_use]
    pub fn matches(&self, path: &Path, is_dir: bool) -> bool {
        if self.gitignore.is_empty() {
            return false;
        }

        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };

        if relative.as_os_str().is_empty() {
            return self
                .root
                .file_name()
                .is_some_and(|name| self.gitignore.matched(Path::new(name), true).is_ignore());
        }

        self.gitignore
            .matched_path_or_any_parents(relative, is_dir)
            .is_ignore()
    }
}

fn validate_pattern(pattern: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    if pattern.trim().is_empty() {
        return Err(invalid("pattern is empty"));
    }
    if pattern.starts_with('!') {
        return Err(invalid("negated patterns are not supported"));
    }
    if pattern.starts_with('#') {
        return Err(invalid("pattern would be read as a comment"));
    }
    Ok(())
}
