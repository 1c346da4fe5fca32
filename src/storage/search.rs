//! Query evaluation over index snapshots.
//!
//! A query is a list of parameters parsed from short keyword terms:
//!
//! | term      | meaning                                      |
//! |-----------|----------------------------------------------|
//! | `word`    | `word` appears in the file name              |
//! | `word/`   | file name is exactly `word`                  |
//! | `/word`   | `word` appears in some ancestor directory    |
//! | `//word`  | `word` appears in the direct parent          |
//! | `/`       | directories only                             |
//! | `f/`      | files only                                   |
//!
//! Every keyword must match or the entry is eliminated. Surviving entries
//! get a score so callers can rank them.

use std::cmp::Reverse;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::index::IndexStore;
use super::models::IndexEntry;

/// Score for a keyword found at the start of the file name.
const PREFIX_SCORE: i64 = 50;
/// Score for a keyword found anywhere in the file name.
const CONTAINS_SCORE: i64 = 10;
/// Score for a path keyword matched by the deepest ancestor.
const PATH_DEPTH_SCORE: i64 = 20;
/// Score lost per level further away from the file.
const PATH_DEPTH_STEP: i64 = 4;

/// Restricts results by entry kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileType {
    #[default]
    All,
    Files,
    Dirs,
}

/// Case handling for keyword matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseOption {
    Match,
    Ignore,
    /// Case-sensitive only when the keyword contains an uppercase letter.
    #[default]
    Smart,
}

/// A single word to look for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    pub word: String,
    pub exact: bool,
}

impl Keyword {
    /// Create a keyword, trimming whitespace and slashes.
    pub fn new(word: &str, exact: bool) -> Self {
        Self {
            word: word.trim().trim_matches('/').to_string(),
            exact,
        }
    }

    fn case_sensitive(&self, case: CaseOption) -> bool {
        match case {
            CaseOption::Match => true,
            CaseOption::Ignore => false,
            CaseOption::Smart => self.word.chars().any(char::is_uppercase),
        }
    }

    /// Whether `candidate` starts with the keyword.
    #[must_use]
    pub fn is_at_beginning(&self, candidate: &str, case: CaseOption) -> bool {
        if self.case_sensitive(case) {
            candidate.starts_with(&self.word)
        } else {
            candidate
                .to_lowercase()
                .starts_with(&self.word.to_lowercase())
        }
    }

    /// Whether `candidate` contains (or, for exact keywords, equals) the keyword.
    #[must_use]
    pub fn is_in(&self, candidate: &str, case: CaseOption) -> bool {
        let (candidate, word) = if self.case_sensitive(case) {
            (candidate.to_string(), self.word.clone())
        } else {
            (candidate.to_lowercase(), self.word.to_lowercase())
        };

        if self.exact {
            candidate == word
        } else {
            candidate.contains(&word)
        }
    }
}

/// One parsed query term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryParameter {
    Type(FileType),
    /// Matches the file name.
    Keyword(Keyword),
    /// Matches any ancestor directory name.
    PathKeyword(Keyword),
    /// Matches the direct parent directory name.
    DirectParent(Keyword),
}

impl QueryParameter {
    /// Parse a term using the keyword syntax described in the module docs.
    #[must_use]
    pub fn parse(term: &str) -> Self {
        let keyword = Keyword::new(term, term.ends_with('/'));
        if term == "/" {
            Self::Type(FileType::Dirs)
        } else if term == "f/" {
            Self::Type(FileType::Files)
        } else if term.starts_with("//") {
            Self::DirectParent(keyword)
        } else if term.starts_with('/') {
            Self::PathKeyword(keyword)
        } else {
            Self::Keyword(keyword)
        }
    }
}

/// A compiled query.
#[derive(Debug, Clone, Default)]
pub struct Query {
    parameters: Vec<QueryParameter>,
    case: CaseOption,
}

impl Query {
    /// Create an empty query that matches everything.
    #[must_use]
    pub fn new(case: CaseOption) -> Self {
        Self {
            parameters: Vec::new(),
            case,
        }
    }

    /// Build a query from keyword terms.
    pub fn from_terms<I, S>(terms: I, case: CaseOption) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut query = Self::new(case);
        for term in terms {
            let term = term.as_ref();
            if !term.trim().is_empty() {
                query.add_parameter(QueryParameter::parse(term));
            }
        }
        query
    }

    /// Append a parameter. A type parameter replaces any earlier one.
    pub fn add_parameter(&mut self, param: QueryParameter) {
        if matches!(param, QueryParameter::Type(_)) {
            self.parameters
                .retain(|p| !matches!(p, QueryParameter::Type(_)));
        }
        self.parameters.push(param);
    }

    /// Whether any parameter contributes to ranking.
    #[must_use]
    pub fn is_ranked(&self) -> bool {
        self.parameters
            .iter()
            .any(|p| !matches!(p, QueryParameter::Type(_)))
    }

    /// Score a candidate. `None` means the candidate is eliminated.
    #[must_use]
    pub fn score(&self, path: &Path, is_dir: bool) -> Option<i64> {
        let basename = path.file_name().unwrap_or_default().to_string_lossy();
        let mut score = 0;

        for param in &self.parameters {
            match param {
                QueryParameter::Type(FileType::Files) if is_dir => return None,
                QueryParameter::Type(FileType::Dirs) if !is_dir => return None,
                QueryParameter::Type(_) => {}
                QueryParameter::Keyword(keyword) => {
                    if !keyword.exact && keyword.is_at_beginning(&basename, self.case) {
                        score += PREFIX_SCORE;
                    } else if keyword.is_in(&basename, self.case) {
                        score += CONTAINS_SCORE;
                    } else {
                        return None;
                    }
                }
                QueryParameter::PathKeyword(keyword) => {
                    let mut matched = false;
                    let mut weight = PATH_DEPTH_SCORE;
                    for component in path.components().rev().skip(1) {
                        let name = component.as_os_str().to_string_lossy();
                        if keyword.is_in(&name, self.case) {
                            matched = true;
                            score += weight.max(1);
                        }
                        weight -= PATH_DEPTH_STEP;
                    }
                    if !matched {
                        return None;
                    }
                }
                QueryParameter::DirectParent(keyword) => {
                    let parent = path
                        .parent()
                        .and_then(Path::file_name)
                        .map(|n| n.to_string_lossy())
                        .unwrap_or_default();
                    if keyword.is_in(&parent, self.case) {
                        score += 1;
                    } else {
                        return None;
                    }
                }
            }
        }

        Some(score)
    }
}

/// Options accepted by [`search`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Substring that must appear in the file name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// Keyword terms, see the module docs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub terms: Vec<String>,

    /// Restrict by entry kind.
    pub file_type: FileType,

    /// Case handling for `filter` and `terms`.
    pub case: CaseOption,

    /// Only return entries below this directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Maximum number of results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl SearchOptions {
    /// Options with only a file-name substring filter.
    #[must_use]
    pub fn with_filter(filter: impl Into<String>) -> Self {
        Self {
            filter: Some(filter.into()),
            ..Default::default()
        }
    }

    /// Compile the options into a [`Query`].
    #[must_use]
    pub fn to_query(&self) -> Query {
        let mut query = Query::from_terms(&self.terms, self.case);
        if let Some(filter) = self.filter.as_deref().filter(|f| !f.is_empty()) {
            query.add_parameter(QueryParameter::Keyword(Keyword {
                word: filter.to_string(),
                exact: false,
            }));
        }
        if self.file_type != FileType::All {
            query.add_parameter(QueryParameter::Type(self.file_type));
        }
        query
    }
}

/// Run a query against a consistent snapshot of the store.
///
/// Ranked queries return the best matches first, ties broken by path.
/// Unranked queries return entries in path order.
#[must_use]
pub fn search(store: &IndexStore, options: &SearchOptions) -> Vec<IndexEntry> {
    let query = options.to_query();
    let root = options.root.as_deref();
    let snapshot =
        store.snapshot_matching(|e| root.map_or(true, |r| e.path.starts_with(r) && e.path.as_path() != r));

    let mut scored: Vec<(i64, &IndexEntry)> = snapshot
        .iter()
        .filter_map(|e| query.score(&e.path, e.is_directory).map(|s| (s, e)))
        .collect();

    if query.is_ranked() {
        scored.sort_by_key(|(score, e)| (Reverse(*score), e.path.clone()));
    }
    if let Some(limit) = options.limit {
        scored.truncate(limit);
    }

    let results: Vec<IndexEntry> = scored.into_iter().map(|(_, e)| e.clone()).collect();
    tracing::debug!(results = results.len(), "Search complete");
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(entries: &[(&str, bool)]) -> IndexStore {
        let store = IndexStore::new();
        store.upsert_many(entries.iter().map(|(p, d)| IndexEntry::new(*p, *d)));
        store
    }

    fn result_paths(results: &[IndexEntry]) -> Vec<String> {
        results.iter().map(|e| e.path.display().to_string()).collect()
    }

    #[test]
    fn test_filter_matches_file_name() {
        let store = store_with(&[("/docs/report.pdf", false), ("/docs/readme.md", false)]);

        let results = search(&store, &SearchOptions::with_filter("report"));
        assert_eq!(result_paths(&results), vec!["/docs/report.pdf"]);
    }

    #[test]
    fn test_filter_ignores_directory_part() {
        let store = store_with(&[("/report/a.txt", false), ("/x/report.txt", false)]);

        let results = search(&store, &SearchOptions::with_filter("report"));
        assert_eq!(result_paths(&results), vec!["/x/report.txt"]);
    }

    #[test]
    fn test_empty_query_returns_everything_in_path_order() {
        let store = store_with(&[("/b", false), ("/a", true), ("/a/c", false)]);

        let results = search(&store, &SearchOptions::default());
        assert_eq!(result_paths(&results), vec!["/a", "/a/c", "/b"]);
    }

    #[test]
    fn test_smart_case() {
        let kw = Keyword::new("readme", false);
        assert!(kw.is_in("README.md", CaseOption::Smart));
        assert!(!kw.is_in("README.md", CaseOption::Match));

        let kw = Keyword::new("README", false);
        assert!(!kw.is_in("readme.md", CaseOption::Smart));
        assert!(kw.is_in("readme.md", CaseOption::Ignore));
    }

    #[test]
    fn test_parse_terms() {
        assert_eq!(QueryParameter::parse("/"), QueryParameter::Type(FileType::Dirs));
        assert_eq!(QueryParameter::parse("f/"), QueryParameter::Type(FileType::Files));
        assert_eq!(
            QueryParameter::parse("//src"),
            QueryParameter::DirectParent(Keyword::new("src", false))
        );
        assert_eq!(
            QueryParameter::parse("/src"),
            QueryParameter::PathKeyword(Keyword::new("src", false))
        );
        assert_eq!(
            QueryParameter::parse("main/"),
            QueryParameter::Keyword(Keyword::new("main", true))
        );
    }

    #[test]
    fn test_prefix_ranks_above_substring() {
        let store = store_with(&[("/x/my_notes.txt", false), ("/x/notes.txt", false)]);
        let options = SearchOptions {
            terms: vec!["notes".into()],
            ..Default::default()
        };

        let results = search(&store, &options);
        assert_eq!(result_paths(&results), vec!["/x/notes.txt", "/x/my_notes.txt"]);
    }

    #[test]
    fn test_path_keyword_prefers_deeper_match() {
        let query = Query::from_terms(["/proj"], CaseOption::Smart);
        let near = query.score(Path::new("/home/proj/file"), false).unwrap();
        let far = query.score(Path::new("/proj/a/b/file"), false).unwrap();
        assert!(near > far);
        assert!(query.score(Path::new("/home/other/file"), false).is_none());
    }

    #[test]
    fn test_direct_parent() {
        let query = Query::from_terms(["//src"], CaseOption::Smart);
        assert!(query.score(Path::new("/p/src/main.rs"), false).is_some());
        assert!(query.score(Path::new("/p/src/bin/main.rs"), false).is_none());
    }

    #[test]
    fn test_type_filter_and_limit() {
        let store = store_with(&[("/a", true), ("/a/b", true), ("/a/c.txt", false)]);

        let dirs = search(
            &store,
            &SearchOptions {
                file_type: FileType::Dirs,
                ..Default::default()
            },
        );
        assert_eq!(result_paths(&dirs), vec!["/a", "/a/b"]);

        let limited = search(
            &store,
            &SearchOptions {
                limit: Some(1),
                ..Default::default()
            },
        );
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_later_type_term_wins() {
        let query = Query::from_terms(["/", "f/"], CaseOption::Smart);
        assert!(query.score(Path::new("/a/file"), false).is_some());
        assert!(query.score(Path::new("/a/dir"), true).is_none());
    }

    #[test]
    fn test_root_restricts_to_subtree() {
        let store = store_with(&[("/a", true), ("/a/x", false), ("/ab/x", false)]);
        let options = SearchOptions {
            root: Some(PathBuf::from("/a")),
            ..Default::default()
        };

        assert_eq!(result_paths(&search(&store, &options)), vec!["/a/x"]);
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: SearchOptions = serde_json::from_str(r#"{"filter":"report"}"#).unwrap();
        assert_eq!(options, SearchOptions::with_filter("report"));

        let options: SearchOptions =
            serde_json::from_str(r#"{"file_type":"dirs","case":"match","limit":3}"#).unwrap();
        assert_eq!(options.file_type, FileType::Dirs);
        assert_eq!(options.case, CaseOption::Match);
        assert_eq!(options.limit, Some(3));
    }
}
