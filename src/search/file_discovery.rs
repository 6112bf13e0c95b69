//! Walk a directory tree and yield the files a [`FileSelector`] accepts.
//!
//! Rejected directories are pruned so their contents are never visited.
//! Symbolic links to files are yielded; symbolic links to directories are not
//! descended into. The live scan walks by the same rule.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::selector::FileSelector;

/// Iterator over selected files below a root.
pub struct FileDiscoveryIterator<'a> {
    walker: walkdir::IntoIter,
    selector: &'a FileSelector,
}

impl<'a> FileDiscoveryIterator<'a> {
    pub fn new(root: &Path, selector: &'a FileSelector) -> Self {
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        Self { walker, selector }
    }
}

impl Iterator for FileDiscoveryIterator<'_> {
    type Item = PathBuf;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.walker.next()? {
                Ok(entry) => {
                    let file_type = entry.file_type();
                    if file_type.is_dir() {
                        if !self.selector.is_directory_valid(entry.path()) {
                            tracing::debug!(path = %entry.path().display(), "Skipping excluded directory");
                            self.walker.skip_current_dir();
                        }
                        continue;
                    }
                    let is_file = file_type.is_file()
                        || (file_type.is_symlink() && entry.path().is_file());
                    if !is_file {
                        continue;
                    }
                    if self.selector.is_file_valid(entry.path()) {
                        return Some(entry.into_path());
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Error walking directory");
                }
            }
        }
    }
}

/// Convenience wrapper around [`FileDiscoveryIterator::new`].
pub fn discover_files<'a>(root: &Path, selector: &'a FileSelector) -> FileDiscoveryIterator<'a> {
    FileDiscoveryIterator::new(root, selector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::FileSelectorConfig;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_files(dir: &TempDir) {
        let files = [
            "src/main.rs",
            "src/lib.rs",
            "tests/test.rs",
            "node_modules/pkg/index.js",
            "target/debug/app.exe",
            "image.png",
            "README.md",
        ];
        for file in files {
            let path = dir.path().join(file);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, "test content").unwrap();
        }
    }

    fn names(files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_file_discovery_basic() {
        let temp_dir = TempDir::new().unwrap();
        create_test_files(&temp_dir);

        let config = FileSelectorConfig::default()
            .with_excluded_paths(["node_modules", "target"])
            .with_excluded_extensions([".png"]);
        let selector = FileSelector::new(&config).unwrap();
        let discovered: Vec<PathBuf> = discover_files(temp_dir.path(), &selector).collect();

        let mut names = names(&discovered);
        names.sort();
        assert_eq!(names, vec!["README.md", "lib.rs", "main.rs", "test.rs"]);
    }

    #[test]
    fn test_file_discovery_accepts_everything_by_default() {
        let temp_dir = TempDir::new().unwrap();
        create_test_files(&temp_dir);

        let selector = FileSelector::any();
        assert_eq!(discover_files(temp_dir.path(), &selector).count(), 7);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directories_are_not_descended() {
        let temp_dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.txt"), "needle").unwrap();
        fs::write(outside.path().join("x.txt"), "needle").unwrap();
        fs::write(outside.path().join("target.txt"), "needle").unwrap();
        std::os::unix::fs::symlink(outside.path(), temp_dir.path().join("linked")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("target.txt"),
            temp_dir.path().join("alias.txt"),
        )
        .unwrap();

        let selector = FileSelector::any();
        let discovered: Vec<PathBuf> = discover_files(temp_dir.path(), &selector).collect();
        assert_eq!(names(&discovered), vec!["a.txt", "alias.txt"]);
    }

    #[test]
    fn test_file_discovery_nonexistent_path() {
        let selector = FileSelector::any();
        let discovered: Vec<PathBuf> =
            discover_files(Path::new("/nonexistent/path/that/does/not/exist"), &selector).collect();
        assert!(discovered.is_empty());
    }
}
