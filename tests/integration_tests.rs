//! Integration tests for flash_search
//!
//! These tests build real directory trees, run live scans and index
//! reconciliations over them, and compare the two engines.

use flash_search::config::{Config, FileFilterConfig, ProjectConfig};
use flash_search::{
    search, FileSelector, FileSelectorConfig, Freshness, IndexEngine, IndexOptions,
    IndexQueryContentSelector, MatchPosition, RegexContentSelector, ResultState, ScanOutcome,
    SearchResult, SmartContentSelector,
};
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

const RUST_TEST_FILE: &str = r#"
/// A sample function for testing search
fn find_me_in_search() {
    println!("Hello from test!");
}

pub struct TestStruct {
    pub name: String,
    pub value: i32,
}

impl TestStruct {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: 42,
        }
    }
}
"#;

const PYTHON_TEST_FILE: &str = r#"
def search_target_function():
    """A Python function to find in search"""
    return "found me"

class SearchableClass:
    def __init__(self, name):
        self.name = name
"#;

const JS_TEST_FILE: &str = r#"
function javascriptSearchTarget() {
    console.log("JS function for testing");
    return 42;
}
"#;

fn write(root: &Path, name: &str, content: &str) -> PathBuf {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path.canonicalize().unwrap()
}

/// Rewrite a file and push its last-write time forward so the change is
/// visible regardless of file system timestamp granularity.
fn modify(path: &Path, content: &str) {
    let before = fs::metadata(path).unwrap().modified().unwrap();
    fs::write(path, content).unwrap();
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(before + Duration::from_secs(5)).unwrap();
}

fn create_test_project() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "src/main.rs", RUST_TEST_FILE);
    write(temp_dir.path(), "scripts/tool.py", PYTHON_TEST_FILE);
    write(temp_dir.path(), "web/app.js", JS_TEST_FILE);
    write(temp_dir.path(), "notes/readme.txt", "search target lives here\n");
    temp_dir
}

fn keys(results: &[SearchResult]) -> HashSet<(PathBuf, usize)> {
    results
        .iter()
        .map(|r| (r.path.clone(), r.line_number))
        .collect()
}

fn index(engine: &IndexEngine, root: &Path) -> flash_search::IndexRun {
    engine
        .index_content_in_folder(root, &FileSelector::any())
        .unwrap()
}

fn query(engine: &IndexEngine, root: &Path, text: &str) -> Vec<SearchResult> {
    engine
        .search_indexed(
            root,
            FileSelector::any(),
            IndexQueryContentSelector::new(text).unwrap(),
        )
        .unwrap()
        .collect()
}

#[test]
fn test_live_scan_example() {
    let temp_dir = TempDir::new().unwrap();
    let a = write(temp_dir.path(), "a.txt", "foo\nbar baz\n");
    write(temp_dir.path(), "b.log", "foo bar\n");

    let selector =
        FileSelector::new(&FileSelectorConfig::default().with_excluded_extensions([".log"]))
            .unwrap();
    let mut scan = search(
        temp_dir.path(),
        selector,
        RegexContentSelector::new("ba.").unwrap(),
    );
    let results: Vec<SearchResult> = scan.by_ref().collect();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].path, a);
    assert_eq!(results[0].line_number, 2);
    assert_eq!(
        results[0].matches,
        vec![MatchPosition::new(0, 3), MatchPosition::new(4, 3)]
    );
    assert_eq!(results[0].freshness(), Freshness::Live);
    assert_eq!(scan.wait(), ScanOutcome::Completed);
}

#[test]
fn test_live_scan_yields_each_matching_line_once() {
    let project = create_test_project();
    let results: Vec<SearchResult> = search(
        project.path(),
        FileSelector::any(),
        RegexContentSelector::new("search").unwrap(),
    )
    .collect();

    let unique = keys(&results);
    assert_eq!(unique.len(), results.len());
    // main.rs:2,3 tool.py:2,3,6 app.js:2 readme.txt:1
    assert_eq!(results.len(), 7);
    for result in &results {
        assert!(result
            .matches
            .windows(2)
            .all(|pair| pair[0].end() <= pair[1].begin));
    }
}

#[test]
fn test_missing_root() {
    let missing = Path::new("/nonexistent/flash_search/root");

    let mut scan = search(
        missing,
        FileSelector::any(),
        RegexContentSelector::new("x").unwrap(),
    );
    assert!(scan.next().is_none());
    assert_eq!(scan.wait(), ScanOutcome::Completed);

    let engine = IndexEngine::in_memory(IndexOptions::default()).unwrap();
    assert!(engine
        .index_content_in_folder(missing, &FileSelector::any())
        .is_err());
}

#[test]
fn test_index_empty_directory() {
    let temp_dir = TempDir::new().unwrap();
    let engine = IndexEngine::in_memory(IndexOptions::default()).unwrap();

    let run = index(&engine, temp_dir.path());
    assert_eq!(run.progress.files_indexed, 0);
    assert_eq!(run.progress.total_files_found, 0);
    assert!(query(&engine, temp_dir.path(), "anything").is_empty());
}

#[test]
fn test_reindex_is_idempotent() {
    let project = create_test_project();
    let engine = IndexEngine::in_memory(IndexOptions::default()).unwrap();

    let first = index(&engine, project.path());
    assert_eq!(first.progress.files_reindexed, 4);
    let before = query(&engine, project.path(), "search*");

    let second = index(&engine, project.path());
    assert_eq!(second.progress.files_reindexed, 0);
    assert_eq!(second.progress.files_indexed, 4);

    let after = query(&engine, project.path(), "search*");
    assert_eq!(keys(&before), keys(&after));
    let contents = |results: &[SearchResult]| -> BTreeMap<(PathBuf, usize), String> {
        results
            .iter()
            .map(|r| ((r.path.clone(), r.line_number), r.line_content.clone()))
            .collect()
    };
    assert_eq!(contents(&before), contents(&after));
}

#[test]
fn test_modified_file_is_replaced() {
    let project = create_test_project();
    let main = project.path().join("src/main.rs").canonicalize().unwrap();
    let tool = project.path().join("scripts/tool.py").canonicalize().unwrap();
    let engine = IndexEngine::open_or_create(
        &project.path().join(".index"),
        IndexOptions::default(),
    )
    .unwrap();
    let selector = FileSelector::new(
        &FileSelectorConfig::default().with_excluded_paths([r"[\\/]\.index[\\/]"]),
    )
    .unwrap();
    engine
        .index_content_in_folder(project.path(), &selector)
        .unwrap();
    let tool_lines = engine.indexed_lines(&tool).unwrap();

    modify(&main, "fn replaced_function() {}\n");

    // Before reconciling, the stale rows are still served and flagged
    let stale = query(&engine, project.path(), "find_me_in_search");
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].freshness(), Freshness::Stale);

    let run = engine
        .index_content_in_folder(project.path(), &selector)
        .unwrap();
    assert_eq!(run.progress.files_reindexed, 1);

    assert!(query(&engine, project.path(), "find_me_in_search").is_empty());
    let fresh = query(&engine, project.path(), "replaced_function");
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].freshness(), Freshness::Current);

    let main_lines = engine.indexed_lines(&main).unwrap();
    assert_eq!(main_lines.len(), 1);
    assert_eq!(engine.indexed_lines(&tool).unwrap(), tool_lines);
}

#[test]
fn test_deleted_file_is_removed() {
    let project = create_test_project();
    let readme = project.path().join("notes/readme.txt").canonicalize().unwrap();
    let engine = IndexEngine::in_memory(IndexOptions::default()).unwrap();
    index(&engine, project.path());
    assert_eq!(query(&engine, project.path(), "lives").len(), 1);

    fs::remove_file(&readme).unwrap();
    index(&engine, project.path());

    assert!(engine.indexed_lines(&readme).unwrap().is_empty());
    assert!(!engine.indexed_paths().unwrap().contains(&readme));
    assert!(query(&engine, project.path(), "lives").is_empty());
}

#[test]
fn test_smart_query_agrees_with_live_scan() {
    let project = create_test_project();
    let engine = IndexEngine::in_memory(IndexOptions {
        skip_trivial_lines: false,
        ..Default::default()
    })
    .unwrap();
    index(&engine, project.path());

    for pattern in [
        r"fn\s+\w+",
        "search_?target",
        "Test(Struct)?",
        r"value:\s*\d+",
        "(found|hello)",
        "42",
    ] {
        let live: Vec<SearchResult> = search(
            project.path(),
            FileSelector::any(),
            RegexContentSelector::new(pattern).unwrap(),
        )
        .collect();
        let indexed: Vec<SearchResult> = engine
            .search_indexed(
                project.path(),
                FileSelector::any(),
                SmartContentSelector::new(pattern).unwrap(),
            )
            .unwrap()
            .collect();

        assert!(!live.is_empty(), "pattern {pattern} should match");
        assert_eq!(keys(&live), keys(&indexed), "pattern {pattern}");
    }
}

#[cfg(unix)]
#[test]
fn test_smart_query_agrees_with_live_scan_across_symlinks() {
    let project = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    write(project.path(), "a.txt", "needle\n");
    write(outside.path(), "x.txt", "needle\n");
    write(outside.path(), "shared.txt", "needle too\n");
    std::os::unix::fs::symlink(outside.path(), project.path().join("linked")).unwrap();
    std::os::unix::fs::symlink(
        outside.path().join("shared.txt"),
        project.path().join("alias.txt"),
    )
    .unwrap();

    let engine = IndexEngine::in_memory(IndexOptions::default()).unwrap();
    index(&engine, project.path());

    let live: Vec<SearchResult> = search(
        project.path(),
        FileSelector::any(),
        RegexContentSelector::new("needle").unwrap(),
    )
    .collect();
    let indexed: Vec<SearchResult> = engine
        .search_indexed(
            project.path(),
            FileSelector::any(),
            SmartContentSelector::new("needle").unwrap(),
        )
        .unwrap()
        .collect();

    let file_names = |results: &[SearchResult]| -> Vec<String> {
        let mut names: Vec<String> = results
            .iter()
            .map(|r| r.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    };
    assert_eq!(file_names(&live), vec!["a.txt", "alias.txt"]);
    assert_eq!(file_names(&live), file_names(&indexed));
}

#[test]
fn test_diff_after_reconcile() {
    let project = create_test_project();
    let engine = IndexEngine::in_memory(IndexOptions::default()).unwrap();
    index(&engine, project.path());
    let before = query(&engine, project.path(), "target");

    write(project.path(), "notes/todo.txt", "new target\n");
    fs::remove_file(project.path().join("notes/readme.txt")).unwrap();
    index(&engine, project.path());
    let after = query(&engine, project.path(), "target");

    let states: Vec<(String, ResultState)> = flash_search::diff_results(&before, &after)
        .into_iter()
        .map(|(r, state)| {
            (
                r.path.file_name().unwrap().to_string_lossy().to_string(),
                state,
            )
        })
        .collect();
    assert!(states.contains(&("todo.txt".to_string(), ResultState::Added)));
    assert!(states.contains(&("readme.txt".to_string(), ResultState::Removed)));
}

#[test]
fn test_config_filter_drives_index() {
    let project = create_test_project();
    let storage = TempDir::new().unwrap();
    let toml = format!(
        r#"
[index]
directory = {storage:?}

[[projects]]
name = "demo"
path = {project:?}

[[file_filters]]
name = "Scripts"
regex = "\\.(py|js)$"
exclusion = "app\\.js$"
index = "scripts"
"#,
        storage = storage.path().to_string_lossy(),
        project = project.path().to_string_lossy(),
    );
    let config: Config = toml::from_str(&toml).unwrap();
    let project_config: &ProjectConfig = config.project("demo").unwrap();
    let filter: &FileFilterConfig = config.file_filter("scripts").unwrap();

    let directory = config.index_dir(project_config, filter);
    assert!(directory.starts_with(storage.path()));
    let engine = IndexEngine::open_or_create(&directory, config.index_options()).unwrap();
    let selector = config.file_selector(filter).unwrap();
    let run = engine
        .index_content_in_folder(&project_config.path, &selector)
        .unwrap();
    assert_eq!(run.progress.total_files_found, 1);

    let paths = engine.indexed_paths().unwrap();
    assert_eq!(paths.len(), 1);
    assert!(paths[0].ends_with("scripts/tool.py"));
}
