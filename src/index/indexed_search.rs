//! Lazy iteration over indexed query candidates.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tantivy::{DocAddress, Index, IndexWriter, Searcher, TantivyDocument};
use tracing::{debug, warn};

use super::engine::path_term;
use super::schema::IndexFields;
use crate::model::SearchResult;
use crate::selector::{FileSelector, IndexQuerySelector};

/// Smallest heap tantivy accepts for a single indexing thread.
const TOMBSTONE_WRITER_HEAP: usize = 15_000_000;

/// Results of an indexed query, resolved one candidate at a time.
///
/// Each candidate is checked against the root and the file selector, its file is
/// checked for existence, and the content selector re-matches the stored line.
/// Candidates whose file has disappeared are collected as tombstones and their
/// documents deleted when the iterator is exhausted or dropped. The deletion is
/// skipped if another writer (a reconciliation) holds the index.
pub struct IndexedResults<C> {
    index: Index,
    fields: IndexFields,
    searcher: Searcher,
    hits: std::vec::IntoIter<DocAddress>,
    hit_limit: bool,
    root: PathBuf,
    file_selector: FileSelector,
    content_selector: C,
    cancel: Arc<AtomicBool>,
    exists: HashMap<PathBuf, bool>,
    tombstones: HashSet<PathBuf>,
}

impl<C: IndexQuerySelector> IndexedResults<C> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        index: Index,
        fields: IndexFields,
        searcher: Searcher,
        hits: Vec<DocAddress>,
        hit_limit: bool,
        root: PathBuf,
        file_selector: FileSelector,
        content_selector: C,
    ) -> Self {
        Self {
            index,
            fields,
            searcher,
            hits: hits.into_iter(),
            hit_limit,
            root,
            file_selector,
            content_selector,
            cancel: Arc::new(AtomicBool::new(false)),
            exists: HashMap::new(),
            tombstones: HashSet::new(),
        }
    }

    /// True when the index returned as many candidates as the configured
    /// maximum, so matching lines may be missing from the results.
    pub fn hit_limit(&self) -> bool {
        self.hit_limit
    }

    /// Flag that stops the iteration at the next candidate when set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    fn file_exists(&mut self, path: &Path) -> bool {
        if let Some(&exists) = self.exists.get(path) {
            return exists;
        }
        let exists = path.is_file();
        self.exists.insert(path.to_path_buf(), exists);
        exists
    }

    fn next_candidate(&mut self) -> Option<SearchResult> {
        while let Some(address) = self.hits.next() {
            if self.cancel.load(Ordering::Relaxed) {
                debug!("Indexed query cancelled");
                return None;
            }

            let doc: TantivyDocument = match self.searcher.doc(address) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(error = %e, "Failed to load indexed line");
                    continue;
                }
            };
            // Line 0 only records the timestamp of a file without lines.
            let Some(line) = self.fields.stored_line(&doc).filter(|l| l.line_number > 0) else {
                continue;
            };
            if !self.file_selector.is_in_scope(&self.root, &line.path) {
                continue;
            }
            if !self.file_exists(&line.path) {
                self.tombstones.insert(line.path);
                continue;
            }

            let matches = self.content_selector.get_matches(&line.line_content);
            if matches.is_empty() {
                continue;
            }
            return Some(
                SearchResult::new(line.path, line.line_number, line.line_content, matches)
                    .with_last_indexed(line.last_write),
            );
        }
        None
    }
}

impl<C> IndexedResults<C> {
    fn flush_tombstones(&mut self) {
        if self.tombstones.is_empty() {
            return;
        }
        let tombstones: Vec<PathBuf> = self.tombstones.drain().collect();

        let mut writer: IndexWriter = match self.index.writer_with_num_threads(1, TOMBSTONE_WRITER_HEAP) {
            Ok(writer) => writer,
            Err(e) => {
                debug!(error = %e, count = tombstones.len(), "Index busy, leaving tombstones to the next reconciliation");
                return;
            }
        };
        for path in &tombstones {
            debug!(path = %path.display(), "Tombstoning deleted file");
            writer.delete_term(path_term(self.fields, path));
        }
        if let Err(e) = writer.commit() {
            warn!(error = %e, "Failed to commit tombstones");
        }
    }
}

impl<C: IndexQuerySelector> Iterator for IndexedResults<C> {
    type Item = SearchResult;

    fn next(&mut self) -> Option<SearchResult> {
        let next = self.next_candidate();
        if next.is_none() {
            self.flush_tombstones();
        }
        next
    }
}

impl<C> Drop for IndexedResults<C> {
    fn drop(&mut self) {
        self.flush_tombstones();
    }
}
