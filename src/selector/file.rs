//! File and directory selection shared by the live scan and the index engine.
//!
//! A [`FileSelector`] is a conjunction of independent rules. It is built once per
//! search or indexing call and never mutated afterwards, so workers can evaluate
//! it concurrently through a shared reference.

use regex::{Regex, RegexBuilder};
use std::collections::HashSet;
use std::path::{Path, MAIN_SEPARATOR};

use crate::error::{Result, SearchError};

/// Filter dimensions, each optional.
///
/// Regexes are matched case-insensitively against full paths. An empty or
/// whitespace-only entry is treated as "not specified".
#[derive(Debug, Clone, Default)]
pub struct FileSelectorConfig {
    /// Extensions to skip, compared case-insensitively including the leading dot (".exe").
    pub excluded_extensions: Vec<String>,
    /// Regexes matched against directory paths (with a trailing separator) to prune the walk.
    pub excluded_paths: Vec<String>,
    /// Files must match this regex.
    pub include_regex: Option<String>,
    /// Files must not match this regex.
    pub exclude_regex: Option<String>,
    /// Files larger than this many bytes are skipped (0 = unlimited).
    pub max_file_size: Option<u64>,
}

impl FileSelectorConfig {
    pub fn with_excluded_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_excluded_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_include_regex(mut self, regex: impl Into<String>) -> Self {
        self.include_regex = Some(regex.into());
        self
    }

    pub fn with_exclude_regex(mut self, regex: impl Into<String>) -> Self {
        self.exclude_regex = Some(regex.into());
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }
}

#[derive(Debug, Clone)]
enum FileRule {
    ExcludedExtensions(HashSet<String>),
    Include(Regex),
    Exclude(Regex),
    MaxSize(u64),
}

impl FileRule {
    fn accepts(&self, path: &Path, path_str: &str) -> bool {
        match self {
            FileRule::ExcludedExtensions(extensions) => {
                !extensions.contains(&dotted_extension(path))
            }
            FileRule::Include(regex) => regex.is_match(path_str),
            FileRule::Exclude(regex) => !regex.is_match(path_str),
            // A file we cannot stat is left to the caller (missing files must still
            // reach tombstoning).
            FileRule::MaxSize(max) => std::fs::metadata(path)
                .map(|m| m.len() <= *max)
                .unwrap_or(true),
        }
    }
}

/// Decides which files and directories are in scope.
#[derive(Debug, Clone, Default)]
pub struct FileSelector {
    file_rules: Vec<FileRule>,
    directory_rules: Vec<Regex>,
}

impl FileSelector {
    /// A selector that accepts every file and directory.
    pub fn any() -> Self {
        Self::default()
    }

    /// Compile a selector. Fails on the first malformed regex.
    pub fn new(config: &FileSelectorConfig) -> Result<Self> {
        let mut file_rules = Vec::new();

        let extensions: HashSet<String> = config
            .excluded_extensions
            .iter()
            .filter_map(|e| normalize_extension(e))
            .collect();
        if !extensions.is_empty() {
            file_rules.push(FileRule::ExcludedExtensions(extensions));
        }

        let directory_rules = config
            .excluded_paths
            .iter()
            .filter(|p| !p.trim().is_empty())
            .map(|p| compile_path_regex(p))
            .collect::<Result<Vec<_>>>()?;

        if let Some(pattern) = non_blank(&config.include_regex) {
            file_rules.push(FileRule::Include(compile_path_regex(pattern)?));
        }
        if let Some(pattern) = non_blank(&config.exclude_regex) {
            file_rules.push(FileRule::Exclude(compile_path_regex(pattern)?));
        }
        if let Some(max) = config.max_file_size.filter(|&m| m > 0) {
            file_rules.push(FileRule::MaxSize(max));
        }

        Ok(Self {
            file_rules,
            directory_rules,
        })
    }

    /// True when every file rule accepts the path. An empty rule set accepts everything.
    pub fn is_file_valid(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        self.file_rules
            .iter()
            .all(|rule| rule.accepts(path, &path_str))
    }

    /// True when no excluded-path regex matches the directory.
    ///
    /// The directory path gets a trailing separator so that `/build/` excludes the
    /// `build` directory but not a sibling named `build-tools`.
    pub fn is_directory_valid(&self, directory: &Path) -> bool {
        if self.directory_rules.is_empty() {
            return true;
        }
        let mut dir_str = directory.to_string_lossy().into_owned();
        if !dir_str.ends_with(MAIN_SEPARATOR) {
            dir_str.push(MAIN_SEPARATOR);
        }
        !self.directory_rules.iter().any(|r| r.is_match(&dir_str))
    }

    /// True when `path` lies under `root` and it, and every directory between it and
    /// `root` (inclusive), pass the selector.
    pub fn is_in_scope(&self, root: &Path, path: &Path) -> bool {
        if !path.starts_with(root) {
            return false;
        }
        let directories_valid = path
            .ancestors()
            .skip(1)
            .take_while(|dir| dir.starts_with(root))
            .all(|dir| self.is_directory_valid(dir));
        directories_valid && self.is_file_valid(path)
    }
}

fn compile_path_regex(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| SearchError::invalid_regex(pattern, e))
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn normalize_extension(extension: &str) -> Option<String> {
    let extension = extension.trim().to_lowercase();
    if extension.is_empty() {
        None
    } else if extension.starts_with('.') {
        Some(extension)
    } else {
        Some(format!(".{}", extension))
    }
}

/// Lower-cased extension including the dot, or "" when the file has none.
fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_empty_selector_accepts_everything() {
        let selector = FileSelector::new(&FileSelectorConfig::default()).unwrap();
        assert!(selector.is_file_valid(Path::new("/any/file.exe")));
        assert!(selector.is_directory_valid(Path::new("/any/dir")));
        assert!(FileSelector::any().is_file_valid(Path::new("README")));
    }

    #[test]
    fn test_excluded_extensions_case_insensitive() {
        let config = FileSelectorConfig::default().with_excluded_extensions([".EXE", "dll", " .Log "]);
        let selector = FileSelector::new(&config).unwrap();
        assert!(!selector.is_file_valid(Path::new("/bin/tool.exe")));
        assert!(!selector.is_file_valid(Path::new("/bin/Tool.EXE")));
        assert!(!selector.is_file_valid(Path::new("/bin/native.dll")));
        assert!(!selector.is_file_valid(Path::new("/var/b.log")));
        assert!(selector.is_file_valid(Path::new("/src/main.rs")));
        assert!(selector.is_file_valid(Path::new("/src/Makefile")));
    }

    #[test]
    fn test_include_and_exclude_regex() {
        let config = FileSelectorConfig::default()
            .with_include_regex(r"\.(c|cpp|h|hpp)$")
            .with_exclude_regex(r"generated");
        let selector = FileSelector::new(&config).unwrap();
        assert!(selector.is_file_valid(Path::new("/src/main.cpp")));
        assert!(selector.is_file_valid(Path::new("/src/MAIN.H")));
        assert!(!selector.is_file_valid(Path::new("/src/main.rs")));
        assert!(!selector.is_file_valid(Path::new("/src/generated/api.h")));
    }

    #[test]
    fn test_blank_entries_are_ignored() {
        let config = FileSelectorConfig {
            excluded_extensions: vec!["".to_string()],
            excluded_paths: vec![" ".to_string()],
            include_regex: Some(String::new()),
            exclude_regex: Some("  ".to_string()),
            max_file_size: Some(0),
        };
        let selector = FileSelector::new(&config).unwrap();
        assert!(selector.is_file_valid(Path::new("/x/y.txt")));
        assert!(selector.is_directory_valid(Path::new("/x")));
    }

    #[test]
    fn test_invalid_regex_fails_at_construction() {
        let config = FileSelectorConfig::default().with_include_regex("(unclosed");
        let err = FileSelector::new(&config).unwrap_err();
        assert!(matches!(err, SearchError::InvalidRegex { .. }));

        let config = FileSelectorConfig::default().with_excluded_paths(["[bad"]);
        assert!(FileSelector::new(&config).is_err());
    }

    #[test]
    fn test_directory_exclusion_respects_boundaries() {
        let sep = regex::escape(&MAIN_SEPARATOR.to_string());
        let pattern = format!("{sep}build{sep}");
        let config = FileSelectorConfig::default().with_excluded_paths([pattern]);
        let selector = FileSelector::new(&config).unwrap();

        let root = PathBuf::from(MAIN_SEPARATOR.to_string()).join("repo");
        assert!(!selector.is_directory_valid(&root.join("build")));
        assert!(!selector.is_directory_valid(&root.join("BUILD")));
        assert!(selector.is_directory_valid(&root.join("build-tools")));
        assert!(selector.is_directory_valid(&root.join("src")));
    }

    #[test]
    fn test_max_file_size() {
        let temp_dir = TempDir::new().unwrap();
        let small = temp_dir.path().join("small.txt");
        let large = temp_dir.path().join("large.txt");
        fs::write(&small, "tiny").unwrap();
        fs::write(&large, "x".repeat(2048)).unwrap();

        let selector =
            FileSelector::new(&FileSelectorConfig::default().with_max_file_size(1024)).unwrap();
        assert!(selector.is_file_valid(&small));
        assert!(!selector.is_file_valid(&large));
        // Missing files are not rejected by the size rule
        assert!(selector.is_file_valid(&temp_dir.path().join("gone.txt")));
    }

    #[test]
    fn test_is_in_scope() {
        let config = FileSelectorConfig::default()
            .with_excluded_paths(["vendor"])
            .with_excluded_extensions([".log"]);
        let selector = FileSelector::new(&config).unwrap();
        let root = Path::new("/repo");

        assert!(selector.is_in_scope(root, Path::new("/repo/src/main.rs")));
        assert!(!selector.is_in_scope(root, Path::new("/repo/vendor/lib/dep.rs")));
        assert!(!selector.is_in_scope(root, Path::new("/repo/out.log")));
        assert!(!selector.is_in_scope(root, Path::new("/elsewhere/main.rs")));
        assert!(!selector.is_in_scope(root, Path::new("/repository/main.rs")));
    }
}
