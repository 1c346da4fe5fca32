//! Watched-directory configuration document.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::watcher::PathMatcher;

/// Raw document as written by the user.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigDocument {
    #[serde(default)]
    ignored: Vec<String>,
    #[serde(default)]
    directories: Vec<DirectoryDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DirectoryDocument {
    path: String,
    recurse: bool,
    #[serde(default)]
    ignored: Vec<String>,
}

/// One configured root.
#[derive(Debug, Clone)]
pub struct WatchedDirectory {
    /// Absolute root path.
    pub path: PathBuf,
    /// Whether subdirectories are indexed and watched transitively.
    pub recurse: bool,
    /// Patterns scoped to this root, in addition to the global ones.
    pub ignored: Vec<String>,
    matcher: PathMatcher,
}

impl WatchedDirectory {
    /// Build a root, compiling the global and scoped patterns together.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern is invalid.
    pub fn new(
        path: impl Into<PathBuf>,
        recurse: bool,
        ignored: Vec<String>,
        global: &[String],
    ) -> Result<Self, ConfigError> {
        let path = path.into();
        let effective: Vec<String> = global.iter().chain(ignored.iter()).cloned().collect();
        let matcher = PathMatcher::new(&path, &effective)?;

        Ok(Self {
            path,
            recurse,
            ignored,
            matcher,
        })
    }

    /// Matcher for global ∪ scoped patterns.
    #[must_use]
    pub const fn matcher(&self) -> &PathMatcher {
        &self.matcher
    }

    /// Whether two roots would be watched and indexed identically.
    #[must_use]
    pub fn same_watch(&self, other: &Self) -> bool {
        self.path == other.path
            && self.recurse == other.recurse
            && self.matcher.patterns() == other.matcher.patterns()
    }
}

/// Immutable configuration snapshot.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Global ignore patterns.
    pub ignored: Vec<String>,
    /// Watched roots in configuration order.
    pub directories: Vec<WatchedDirectory>,
}

impl Config {
    /// Read and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is malformed, names an
    /// unusable directory or contains an invalid pattern.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let document: ConfigDocument =
            toml::from_str(text).map_err(|e| ConfigError::Syntax(e.to_string()))?;

        let mut directories: Vec<WatchedDirectory> = Vec::with_capacity(document.directories.len());
        for dir in document.directories {
            let path = resolve_directory(&dir.path)?;

            if let Some(other) = directories
                .iter()
                .find(|d| d.path.starts_with(&path) || path.starts_with(&d.path))
            {
                return Err(ConfigError::InvalidDirectory {
                    path,
                    reason: format!("overlaps watched directory '{}'", other.path.display()),
                });
            }

            directories.push(WatchedDirectory::new(
                path,
                dir.recurse,
                dir.ignored,
                &document.ignored,
            )?);
        }

        Ok(Self {
            ignored: document.ignored,
            directories,
        })
    }

    /// The root owning `path`, if any.
    #[must_use]
    pub fn root_for(&self, path: &Path) -> Option<&WatchedDirectory> {
        self.directories.iter().find(|d| path.starts_with(&d.path))
    }

    /// Configured root paths.
    #[must_use]
    pub fn root_paths(&self) -> Vec<PathBuf> {
        self.directories.iter().map(|d| d.path.clone()).collect()
    }
}

/// Expand `~`, require an absolute path and check it is a readable directory.
fn resolve_directory(raw: &str) -> Result<PathBuf, ConfigError> {
    let invalid = |path: PathBuf, reason: String| ConfigError::InvalidDirectory { path, reason };

    let path = expand_home(raw).ok_or_else(|| {
        invalid(
            PathBuf::from(raw),
            "home directory could not be determined".to_string(),
        )
    })?;

    if !path.is_absolute() {
        return Err(invalid(path, "path must be absolute".to_string()));
    }

    match fs::metadata(&path) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(invalid(path, "not a directory".to_string())),
        Err(e) => return Err(invalid(path, e.to_string())),
    }

    if let Err(e) = fs::read_dir(&path) {
        return Err(invalid(path, e.to_string()));
    }

    // Normalise trailing slashes and `.` components so prefix checks line up.
    Ok(path.components().collect())
}

fn expand_home(raw: &str) -> Option<PathBuf> {
    if raw == "~" {
        return dirs::home_dir();
    }
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
        None => Some(PathBuf::from(raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc(dirs: &[(&Path, bool)], global: &str) -> String {
        let mut out = format!("ignored = [{global}]\n");
        for (path, recurse) in dirs {
            out.push_str(&format!(
                "\n[[directories]]\npath = \"{}\"\nrecurse = {recurse}\n",
                path.display()
            ));
        }
        out
    }

    #[test]
    fn test_parse_valid_document() {
        let tmp = TempDir::new().unwrap();
        let text = format!(
            "ignored = [\"*.tmp\"]\n\n[[directories]]\npath = \"{}\"\nrecurse = true\nignored = [\"node_modules\"]\n",
            tmp.path().display()
        );

        let config = Config::from_toml(&text).unwrap();

        assert_eq!(config.ignored, vec!["*.tmp"]);
        assert_eq!(config.directories.len(), 1);
        let root = &config.directories[0];
        assert!(root.recurse);
        assert_eq!(root.ignored, vec!["node_modules"]);
        assert_eq!(root.matcher().patterns(), ["*.tmp", "node_modules"]);
    }

    #[test]
    fn test_defaults_for_optional_fields() {
        let tmp = TempDir::new().unwrap();
        let text = format!(
            "[[directories]]\npath = \"{}\"\nrecurse = false\n",
            tmp.path().display()
        );

        let config = Config::from_toml(&text).unwrap();
        assert!(config.ignored.is_empty());
        assert!(config.directories[0].ignored.is_empty());
    }

    #[test]
    fn test_empty_document() {
        let config = Config::from_toml("").unwrap();
        assert!(config.directories.is_empty());
    }

    #[test]
    fn test_malformed_syntax() {
        let err = Config::from_toml("directories = [").unwrap_err();
        assert!(matches!(err, ConfigError::Syntax(_)));

        let err = Config::from_toml("[[directories]]\npath = \"/tmp\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Syntax(_)), "missing recurse");
    }

    #[test]
    fn test_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let text = doc(&[(&tmp.path().join("missing"), true)], "");

        let err = Config::from_toml(&text).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDirectory { .. }));
    }

    #[test]
    fn test_file_is_not_a_directory() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("file.txt");
        fs::write(&file, "x").unwrap();

        let err = Config::from_toml(&doc(&[(&file, true)], "")).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn test_relative_path_rejected() {
        let err = Config::from_toml("[[directories]]\npath = \"rel/dir\"\nrecurse = true\n")
            .unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn test_invalid_pattern() {
        let tmp = TempDir::new().unwrap();
        let err = Config::from_toml(&doc(&[(tmp.path(), true)], "\"a[b\"")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn test_overlapping_roots_rejected() {
        let tmp = TempDir::new().unwrap();
        let inner = tmp.path().join("inner");
        fs::create_dir(&inner).unwrap();

        let err = Config::from_toml(&doc(&[(tmp.path(), true), (&inner, false)], "")).unwrap_err();
        assert!(err.to_string().contains("overlaps"));

        let err =
            Config::from_toml(&doc(&[(tmp.path(), true), (tmp.path(), false)], "")).unwrap_err();
        assert!(err.to_string().contains("overlaps"));
    }

    #[test]
    fn test_trailing_slash_normalised() {
        let tmp = TempDir::new().unwrap();
        let text = format!(
            "[[directories]]\npath = \"{}/\"\nrecurse = true\n",
            tmp.path().display()
        );
        let config = Config::from_toml(&text).unwrap();
        assert_eq!(config.directories[0].path, tmp.path());
    }

    #[test]
    fn test_same_watch() {
        let a = WatchedDirectory::new("/a", true, vec![], &["*.tmp".to_string()]).unwrap();
        let b = WatchedDirectory::new("/a", true, vec!["*.tmp".to_string()], &[]).unwrap();
        let c = WatchedDirectory::new("/a", false, vec![], &["*.tmp".to_string()]).unwrap();

        assert!(a.same_watch(&b));
        assert!(!a.same_watch(&c));
    }

    #[test]
    fn test_root_for() {
        let tmp = TempDir::new().unwrap();
        let config = Config::from_toml(&doc(&[(tmp.path(), true)], "")).unwrap();

        assert!(config.root_for(&tmp.path().join("x/y")).is_some());
        assert!(config.root_for(Path::new("/definitely/not/here")).is_none());
    }
}
