//! Configuration management for flash_search
//!
//! Projects, file filters and engine limits are loaded from a TOML file. Every
//! section is optional and falls back to the built-in defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::index::IndexOptions;
use crate::search::LiveScanOptions;
use crate::selector::{FileSelector, FileSelectorConfig};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "FLASH_SEARCH_CONFIG";

const LOCAL_CONFIG_FILE: &str = "flash_search.toml";
const APP_DIR: &str = "flash_search";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchSettings,

    #[serde(default)]
    pub index: IndexSettings,

    #[serde(default)]
    pub projects: Vec<ProjectConfig>,

    #[serde(default = "default_file_filters")]
    pub file_filters: Vec<FileFilterConfig>,
}

/// Settings shared by live scans and indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Extensions never searched, with the leading dot
    #[serde(default = "default_excluded_extensions")]
    pub excluded_extensions: Vec<String>,

    /// Regexes matched against directory paths; matching directories are pruned
    #[serde(default)]
    pub excluded_paths: Vec<String>,

    /// Maximum file size in bytes (0 = unlimited)
    #[serde(default)]
    pub max_file_size: u64,

    /// Case-sensitive regex matching
    #[serde(default)]
    pub match_case: bool,

    /// Detect and decode non-UTF-8 text files instead of skipping them
    #[serde(default = "default_true")]
    pub transcode_non_utf8: bool,
}

/// Index storage and reconciliation tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Root of all index storage (default: `<user config dir>/flash_search/indexes`)
    #[serde(default)]
    pub directory: Option<PathBuf>,

    #[serde(default = "default_max_results")]
    pub max_results: usize,

    #[serde(default = "default_writer_heap_bytes")]
    pub writer_heap_bytes: usize,

    #[serde(default = "default_initial_workers")]
    pub initial_workers: usize,

    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Queued files per worker above which the pool grows
    #[serde(default = "default_scale_threshold")]
    pub scale_threshold: usize,

    #[serde(default = "default_true")]
    pub skip_trivial_lines: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    pub name: String,
    pub path: PathBuf,
}

/// A named file type: which files belong to it and where its index lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileFilterConfig {
    pub name: String,

    /// Files must match this regex
    pub regex: String,

    /// Files matching this regex are left out
    #[serde(default)]
    pub exclusion: Option<String>,

    /// Index sub-directory name
    pub index: String,
}

fn default_excluded_extensions() -> Vec<String> {
    [
        ".exe", ".pdb", ".dll", ".db", ".idb", ".obj", ".uasset", ".ipch", ".cache", ".zip",
        ".rar", ".7z",
    ]
    .iter()
    .map(|e| e.to_string())
    .collect()
}

fn default_file_filters() -> Vec<FileFilterConfig> {
    let filter = |name: &str, regex: &str, index: &str| FileFilterConfig {
        name: name.to_string(),
        regex: regex.to_string(),
        exclusion: None,
        index: index.to_string(),
    };
    vec![
        filter("Rust", r"\.rs$", "rust"),
        filter("C++", r"\.(c|cpp|h|hpp)$", "cpp"),
        filter("C#", r"\.cs$", "cs"),
        filter("Data", r"\.(xml|json|toml|ya?ml)$", "data"),
    ]
}

fn default_max_results() -> usize {
    10_000
}

fn default_writer_heap_bytes() -> usize {
    50_000_000
}

fn default_initial_workers() -> usize {
    2
}

fn default_max_workers() -> usize {
    5
}

fn default_scale_threshold() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search: SearchSettings::default(),
            index: IndexSettings::default(),
            projects: Vec::new(),
            file_filters: default_file_filters(),
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            excluded_extensions: default_excluded_extensions(),
            excluded_paths: Vec::new(),
            max_file_size: 0,
            match_case: false,
            transcode_non_utf8: true,
        }
    }
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            directory: None,
            max_results: default_max_results(),
            writer_heap_bytes: default_writer_heap_bytes(),
            initial_workers: default_initial_workers(),
            max_workers: default_max_workers(),
            scale_threshold: default_scale_threshold(),
            skip_trivial_lines: true,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from default locations
    ///
    /// Search order:
    /// 1. FLASH_SEARCH_CONFIG environment variable
    /// 2. ./flash_search.toml (current directory)
    /// 3. ~/.config/flash_search/config.toml (user config)
    pub fn from_default_locations() -> Result<Option<(Self, PathBuf)>> {
        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                let config = Self::from_file(&path)?;
                return Ok(Some((config, path)));
            }
        }

        let local_path = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_path.exists() {
            let config = Self::from_file(&local_path)?;
            return Ok(Some((config, local_path)));
        }

        if let Some(user_path) = user_config_path() {
            if user_path.exists() {
                let config = Self::from_file(&user_path)?;
                return Ok(Some((config, user_path)));
            }
        }

        Ok(None)
    }

    /// Load `explicit` if given, otherwise the first default location, otherwise defaults.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::from_file(path)?, Some(path.to_path_buf())));
        }
        Ok(match Self::from_default_locations()? {
            Some((config, path)) => (config, Some(path)),
            None => (Self::default(), None),
        })
    }

    pub fn project(&self, name: &str) -> Option<&ProjectConfig> {
        self.projects
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn file_filter(&self, name: &str) -> Option<&FileFilterConfig> {
        self.file_filters
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Selector settings from `[search]`, without any file filter.
    pub fn selector_config(&self) -> FileSelectorConfig {
        let mut config = FileSelectorConfig::default()
            .with_excluded_extensions(self.search.excluded_extensions.iter().cloned())
            .with_excluded_paths(self.search.excluded_paths.iter().cloned());
        if self.search.max_file_size > 0 {
            config = config.with_max_file_size(self.search.max_file_size);
        }
        config
    }

    /// Global settings combined with one file filter.
    pub fn file_selector(&self, filter: &FileFilterConfig) -> crate::Result<FileSelector> {
        let mut config = self.selector_config().with_include_regex(filter.regex.as_str());
        if let Some(exclusion) = &filter.exclusion {
            config = config.with_exclude_regex(exclusion.as_str());
        }
        FileSelector::new(&config)
    }

    /// Root directory holding every project's indexes.
    pub fn index_root(&self) -> PathBuf {
        match &self.index.directory {
            Some(directory) => directory.clone(),
            None => dirs::config_dir()
                .map(|dir| dir.join(APP_DIR))
                .unwrap_or_else(|| PathBuf::from(format!(".{APP_DIR}")))
                .join("indexes"),
        }
    }

    /// Storage directory of one (project, file filter) index.
    pub fn index_dir(&self, project: &ProjectConfig, filter: &FileFilterConfig) -> PathBuf {
        self.index_root().join(&project.name).join(&filter.index)
    }

    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            max_results: self.index.max_results,
            writer_heap_bytes: self.index.writer_heap_bytes,
            initial_workers: self.index.initial_workers,
            max_workers: self.index.max_workers,
            scale_threshold: self.index.scale_threshold,
            skip_trivial_lines: self.index.skip_trivial_lines,
            transcode_non_utf8: self.search.transcode_non_utf8,
        }
    }

    pub fn live_scan_options(&self) -> LiveScanOptions {
        LiveScanOptions {
            transcode_non_utf8: self.search.transcode_non_utf8,
            ..Default::default()
        }
    }

    /// Generate a template configuration file
    pub fn generate_template() -> String {
        r#"# Flash Search Configuration
# Generated template - customize as needed

[search]
# Extensions that are never searched
excluded_extensions = [".exe", ".pdb", ".dll", ".db", ".idb", ".obj", ".uasset", ".ipch", ".cache", ".zip", ".rar", ".7z"]

# Regexes matched against directory paths; matching directories are skipped entirely
excluded_paths = [
    # "[\\/]\\.git[\\/]",
    # "[\\/]target[\\/]",
]

# Maximum file size in bytes (0 = unlimited)
max_file_size = 0

# Case-sensitive regex matching
match_case = false

# Detect and decode non-UTF-8 text files (Latin-1, Shift-JIS, UTF-16...)
transcode_non_utf8 = true

[index]
# Root of the index storage, one sub-directory per project and file filter
# directory = "/home/user/.config/flash_search/indexes"

# Maximum number of candidate lines an indexed query returns
max_results = 10000

# Worker pool used while reconciling an index
initial_workers = 2
max_workers = 5
# Queued files per worker above which another worker is started
scale_threshold = 1000

# Skip blank lines and lines holding a lone brace
skip_trivial_lines = true

# [[projects]]
# name = "my-project"
# path = "/home/user/code/my-project"

[[file_filters]]
name = "Rust"
regex = "\\.rs$"
index = "rust"

[[file_filters]]
name = "C++"
regex = "\\.(c|cpp|h|hpp)$"
index = "cpp"

[[file_filters]]
name = "C#"
regex = "\\.cs$"
index = "cs"

[[file_filters]]
name = "Data"
regex = "\\.(xml|json|toml|ya?ml)$"
# exclusion = "package-lock\\.json$"
index = "data"
"#
        .to_string()
    }

    /// Write template config to the specified path
    pub fn write_template(path: &Path) -> Result<()> {
        let template = Self::generate_template();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        std::fs::write(path, template)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

/// `<user config dir>/flash_search/config.toml`
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}
