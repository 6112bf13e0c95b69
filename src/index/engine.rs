//! The incremental line index: one tantivy index per storage directory.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tantivy::collector::{DocSetCollector, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::TermQuery;
use tantivy::schema::IndexRecordOption;
use tantivy::{Index, IndexReader, ReloadPolicy, Searcher, TantivyDocument, Term};
use tracing::info;

use super::indexed_search::IndexedResults;
use super::progress::{IndexingProgress, ProgressSnapshot};
use super::query::FreeTextQuery;
use super::reconcile::Reconciler;
use super::schema::{create_schema, register_tokenizers, IndexFields, StoredLine};
use crate::error::{Result, SearchError};
use crate::selector::{FileSelector, IndexQuerySelector};

/// Tuning knobs for reconciliation and queries.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Candidate cap for indexed queries
    pub max_results: usize,
    pub writer_heap_bytes: usize,
    pub initial_workers: usize,
    pub max_workers: usize,
    /// Queued files per active worker above which another worker is started
    pub scale_threshold: usize,
    /// Skip blank lines and lone braces
    pub skip_trivial_lines: bool,
    pub transcode_non_utf8: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            max_results: 10_000,
            writer_heap_bytes: 50_000_000,
            initial_workers: 2,
            max_workers: 5,
            scale_threshold: 1000,
            skip_trivial_lines: true,
            transcode_non_utf8: true,
        }
    }
}

/// Result of one reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRun {
    pub progress: ProgressSnapshot,
    /// The run was stopped by [`IndexEngine::cancel_indexing`]; whatever was
    /// reconciled before that point is committed.
    pub cancelled: bool,
}

/// Persistent per-line full-text index of a directory tree.
pub struct IndexEngine {
    index: Index,
    reader: IndexReader,
    fields: IndexFields,
    options: IndexOptions,
    progress: IndexingProgress,
    cancel: AtomicBool,
}

impl IndexEngine {
    /// Open the index stored in `directory`, creating it (and the directory) on first use.
    pub fn open_or_create(directory: &Path, options: IndexOptions) -> Result<Self> {
        fs::create_dir_all(directory)?;
        let mmap = MmapDirectory::open(directory)?;
        let index = Index::open_or_create(mmap, create_schema())?;
        info!(path = %directory.display(), "Opened line index");
        Self::with_index(index, options)
    }

    /// An index that lives in memory only.
    pub fn in_memory(options: IndexOptions) -> Result<Self> {
        Self::with_index(Index::create_in_ram(create_schema()), options)
    }

    fn with_index(index: Index, options: IndexOptions) -> Result<Self> {
        register_tokenizers(&index);
        let fields = IndexFields::new(&index.schema())?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            index,
            reader,
            fields,
            options,
            progress: IndexingProgress::default(),
            cancel: AtomicBool::new(false),
        })
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// Counters of the current (or last) reconciliation run. Safe to poll from
    /// another thread while indexing.
    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    /// Ask a running reconciliation to wind down. Work already written is kept.
    pub fn cancel_indexing(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Bring the index for `root` in sync with the file system.
    ///
    /// Blocks until the run completes or is cancelled. The selector is captured
    /// for the duration of the call.
    pub fn index_content_in_folder(&self, root: &Path, file_selector: &FileSelector) -> Result<IndexRun> {
        let root = canonical_root(root)?;
        self.cancel.store(false, Ordering::SeqCst);
        self.progress.reset();

        Reconciler::new(self, &root, file_selector).run()?;
        self.reader.reload()?;

        let run = IndexRun {
            progress: self.progress(),
            cancelled: self.cancel.load(Ordering::SeqCst),
        };
        info!(
            root = %root.display(),
            files_indexed = run.progress.files_indexed,
            files_found = run.progress.total_files_found,
            files_reindexed = run.progress.files_reindexed,
            cancelled = run.cancelled,
            "Reconciliation finished"
        );
        Ok(run)
    }

    /// Query the index for lines under `root`.
    ///
    /// Candidates are re-checked against the selectors and against the file
    /// system; see [`IndexedResults`].
    pub fn search_indexed<C>(
        &self,
        root: &Path,
        file_selector: FileSelector,
        content_selector: C,
    ) -> Result<IndexedResults<C>>
    where
        C: IndexQuerySelector,
    {
        let root = canonical_root(root)?;
        let query = FreeTextQuery::parse(content_selector.index_query())?
            .to_query(self.fields.line_content)?;

        self.reader.reload()?;
        let searcher = self.reader.searcher();
        let limit = self.options.max_results.max(1);
        let hits: Vec<_> = searcher
            .search(&query, &TopDocs::with_limit(limit))?
            .into_iter()
            .map(|(_, address)| address)
            .collect();
        let hit_limit = hits.len() >= limit;

        tracing::debug!(
            query = content_selector.index_query(),
            candidates = hits.len(),
            hit_limit,
            "Indexed query"
        );

        Ok(IndexedResults::new(
            self.index.clone(),
            self.fields,
            searcher,
            hits,
            hit_limit,
            root,
            file_selector,
            content_selector,
        ))
    }

    /// Number of live line documents.
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Every indexed line of `path`, ordered by line number.
    pub fn indexed_lines(&self, path: &Path) -> Result<Vec<StoredLine>> {
        let searcher = self.reader.searcher();
        let query = path_query(self.fields, path);
        let addresses = searcher.search(&query, &DocSetCollector)?;

        let mut lines = Vec::with_capacity(addresses.len());
        for address in addresses {
            let doc: TantivyDocument = searcher.doc(address)?;
            if let Some(line) = self.fields.stored_line(&doc).filter(|l| l.line_number > 0) {
                lines.push(line);
            }
        }
        lines.sort_by_key(|l| l.line_number);
        Ok(lines)
    }

    /// Distinct paths that still have live documents.
    pub fn indexed_paths(&self) -> Result<Vec<PathBuf>> {
        let searcher = self.reader.searcher();
        let mut paths = Vec::new();
        for path in distinct_paths(&searcher, self.fields)? {
            if indexed_timestamp(&searcher, self.fields, &path)?.is_some() {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    pub(crate) fn index(&self) -> &Index {
        &self.index
    }

    pub(crate) fn reader(&self) -> &IndexReader {
        &self.reader
    }

    pub(crate) fn fields(&self) -> IndexFields {
        self.fields
    }

    pub(crate) fn indexing_progress(&self) -> &IndexingProgress {
        &self.progress
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub(crate) fn cancel_flag(&self) -> &AtomicBool {
        &self.cancel
    }
}

fn canonical_root(root: &Path) -> Result<PathBuf> {
    match root.canonicalize() {
        Ok(root) if root.is_dir() => Ok(root),
        _ => Err(SearchError::DirectoryNotFound(root.to_path_buf())),
    }
}

pub(crate) fn path_term(fields: IndexFields, path: &Path) -> Term {
    Term::from_field_text(fields.path, &path.to_string_lossy())
}

fn path_query(fields: IndexFields, path: &Path) -> TermQuery {
    TermQuery::new(path_term(fields, path), IndexRecordOption::Basic)
}

/// Last-write ticks recorded for `path`, or `None` when it has no live documents.
pub(crate) fn indexed_timestamp(
    searcher: &Searcher,
    fields: IndexFields,
    path: &Path,
) -> Result<Option<i64>> {
    let top = searcher.search(&path_query(fields, path), &TopDocs::with_limit(1))?;
    let Some((_, address)) = top.into_iter().next() else {
        return Ok(None);
    };
    let doc: TantivyDocument = searcher.doc(address)?;
    Ok(fields.stored_line(&doc).map(|line| line.last_write))
}

/// Every path in the term dictionary, sorted. May include paths whose documents
/// are deleted but not yet merged away.
pub(crate) fn distinct_paths(searcher: &Searcher, fields: IndexFields) -> Result<Vec<PathBuf>> {
    let mut paths = HashSet::new();
    for segment_reader in searcher.segment_readers() {
        let inverted_index = segment_reader.inverted_index(fields.path)?;
        let mut stream = inverted_index.terms().stream()?;
        while stream.advance() {
            if let Ok(path) = std::str::from_utf8(stream.key()) {
                paths.insert(PathBuf::from(path));
            }
        }
    }
    let mut paths: Vec<PathBuf> = paths.into_iter().collect();
    paths.sort();
    Ok(paths)
}
