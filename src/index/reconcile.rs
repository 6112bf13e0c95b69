//! Reconciliation: bring the line index in sync with the file system.
//!
//! A run has three phases sharing one index writer:
//!
//! 1. A single-threaded sweep over the paths already in the index. Missing files
//!    lose their documents, files with a different last-write time are re-read,
//!    unchanged files are only marked as known.
//! 2. A producer thread walks the tree and queues every selected file.
//! 3. An elastic pool of workers drains the queue and indexes files the sweep did
//!    not already handle. The driving thread grows the pool while the backlog per
//!    worker stays above the scale threshold.
//!
//! Everything is committed once at the end, so readers see either the previous
//! generation of a file's lines or the new one.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use tantivy::{IndexWriter, Searcher};
use tracing::{debug, info, warn};

use super::engine::{distinct_paths, indexed_timestamp, path_term, IndexEngine};
use super::progress::IndexingProgress;
use super::schema::IndexFields;
use crate::error::{Result, SearchError};
use crate::search::file_discovery::discover_files;
use crate::selector::FileSelector;
use crate::utils::{file_timestamp, is_trivial_line, read_text_file};

/// How often the driving thread re-evaluates the pool size.
const SCALE_POLL_INTERVAL: Duration = Duration::from_millis(20);

pub(crate) struct Reconciler<'a> {
    engine: &'a IndexEngine,
    root: &'a Path,
    selector: &'a FileSelector,
    fields: IndexFields,
    progress: &'a IndexingProgress,
}

impl<'a> Reconciler<'a> {
    pub(crate) fn new(engine: &'a IndexEngine, root: &'a Path, selector: &'a FileSelector) -> Self {
        Self {
            engine,
            root,
            selector,
            fields: engine.fields(),
            progress: engine.indexing_progress(),
        }
    }

    pub(crate) fn run(&self) -> Result<()> {
        let options = self.engine.options();
        self.engine.reader().reload()?;
        // Staleness is judged against the index as it was before this run.
        let searcher = self.engine.reader().searcher();
        let writer: IndexWriter = self.engine.index().writer(options.writer_heap_bytes)?;
        let writer = Mutex::new(writer);
        let known = Mutex::new(HashSet::new());

        let outcome = self
            .sweep(&searcher, &writer, &known)
            .and_then(|()| self.walk_and_index(&searcher, &writer, &known));

        let mut writer = writer.into_inner().map_err(|_| SearchError::WorkerPanicked)?;
        // Commit whatever completed, including after cancellation or a failed file.
        writer.commit()?;
        writer.wait_merging_threads()?;
        outcome
    }

    fn sweep(
        &self,
        searcher: &Searcher,
        writer: &Mutex<IndexWriter>,
        known: &Mutex<HashSet<PathBuf>>,
    ) -> Result<()> {
        for path in distinct_paths(searcher, self.fields)? {
            if self.engine.is_cancelled() {
                debug!("Sweep cancelled");
                return Ok(());
            }
            if lock(known)?.contains(&path) {
                continue;
            }
            // Out of scope for this selector: another selector may still query it.
            if !self.selector.is_in_scope(self.root, &path) {
                continue;
            }
            let Some(indexed) = indexed_timestamp(searcher, self.fields, &path)? else {
                // Only deleted documents left in the term dictionary.
                continue;
            };

            match file_timestamp(&path) {
                Err(_) if !path.exists() => {
                    debug!(path = %path.display(), "Removing deleted file from index");
                    lock(writer)?.delete_term(path_term(self.fields, &path));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot read file timestamp, keeping indexed lines");
                }
                Ok(current) if current == indexed => {}
                Ok(current) => self.reindex_file(writer, &path, current)?,
            }
            lock(known)?.insert(path);
            self.progress.file_indexed();
        }
        Ok(())
    }

    fn walk_and_index(
        &self,
        searcher: &Searcher,
        writer: &Mutex<IndexWriter>,
        known: &Mutex<HashSet<PathBuf>>,
    ) -> Result<()> {
        let options = self.engine.options();
        let max_workers = options.max_workers.max(1);
        let initial_workers = options.initial_workers.clamp(1, max_workers);
        let queue = &WorkQueue::default();

        thread::scope(|scope| {
            let producer = scope.spawn(move || {
                for path in discover_files(self.root, self.selector) {
                    if self.engine.is_cancelled() {
                        debug!("File walk cancelled");
                        break;
                    }
                    self.progress.file_found();
                    queue.push(path);
                }
                queue.close();
            });

            let spawn_worker =
                move || scope.spawn(move || self.worker(searcher, writer, known, queue));
            let mut workers: Vec<_> = (0..initial_workers).map(|_| spawn_worker()).collect();

            while !queue.wait_drained(SCALE_POLL_INTERVAL) {
                if self.engine.is_cancelled() {
                    queue.close();
                    break;
                }
                let backlog = queue.backlog();
                if workers.len() < max_workers && backlog > options.scale_threshold * workers.len() {
                    workers.push(spawn_worker());
                    info!(backlog, workers = workers.len(), "Scaling up indexing workers");
                }
            }

            let producer_result = producer.join().map_err(|_| SearchError::WorkerPanicked);
            let mut outcome = Ok(());
            for worker in workers {
                let result = worker.join().map_err(|_| SearchError::WorkerPanicked).and_then(|r| r);
                if outcome.is_ok() {
                    outcome = result;
                }
            }
            producer_result.and(outcome)
        })
    }

    fn worker(
        &self,
        searcher: &Searcher,
        writer: &Mutex<IndexWriter>,
        known: &Mutex<HashSet<PathBuf>>,
        queue: &WorkQueue,
    ) -> Result<()> {
        self.progress.worker_started();
        let result = self.drain(searcher, writer, known, queue);
        self.progress.worker_stopped();
        if result.is_err() {
            // Stop the other threads; the driver commits what is done.
            self.engine.cancel_flag().store(true, Ordering::SeqCst);
            queue.close();
        }
        result
    }

    fn drain(
        &self,
        searcher: &Searcher,
        writer: &Mutex<IndexWriter>,
        known: &Mutex<HashSet<PathBuf>>,
        queue: &WorkQueue,
    ) -> Result<()> {
        while !self.engine.is_cancelled() {
            let Some(path) = queue.pop() else {
                break;
            };
            if !lock(known)?.insert(path.clone()) {
                continue;
            }

            let current = match file_timestamp(&path) {
                Ok(current) => current,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable file");
                    continue;
                }
            };
            if indexed_timestamp(searcher, self.fields, &path)? != Some(current) {
                self.reindex_file(writer, &path, current)?;
            }
            self.progress.file_indexed();
        }
        Ok(())
    }

    /// Replace the documents of `path` with its current lines.
    ///
    /// The file is read before the writer is locked; deletion and insertion
    /// happen under one lock so they land in the same commit.
    fn reindex_file(&self, writer: &Mutex<IndexWriter>, path: &Path, last_write: i64) -> Result<()> {
        let options = self.engine.options();
        let text = match read_text_file(path, options.transcode_non_utf8) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable file");
                return Ok(());
            }
        };
        self.progress.file_reindexed();

        let path_str = path.to_string_lossy();
        let mut documents = Vec::new();
        if let Some(text) = &text {
            for (index, line) in text.lines().enumerate() {
                if options.skip_trivial_lines && is_trivial_line(line) {
                    continue;
                }
                documents.push(self.fields.line_document(&path_str, index + 1, line, last_write));
            }
        } else {
            debug!(path = %path.display(), "Indexing binary or undecodable file without lines");
        }
        // Line 0 records the timestamp of files without indexable lines so they
        // are not re-read on every run.
        if documents.is_empty() {
            documents.push(self.fields.line_document(&path_str, 0, "", last_write));
        }

        let writer = lock(writer)?;
        writer.delete_term(path_term(self.fields, path));
        for document in documents {
            writer.add_document(document)?;
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| SearchError::WorkerPanicked)
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<PathBuf>,
    closed: bool,
}

/// FIFO of files waiting to be indexed. Closed by the producer when the walk ends.
#[derive(Default)]
struct WorkQueue {
    state: Mutex<QueueState>,
    changed: Condvar,
    backlog: AtomicUsize,
}

impl WorkQueue {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, path: PathBuf) {
        self.state().items.push_back(path);
        self.backlog.fetch_add(1, Ordering::SeqCst);
        self.changed.notify_all();
    }

    fn close(&self) {
        self.state().closed = true;
        self.changed.notify_all();
    }

    /// Next file, blocking while the queue is empty but still open.
    fn pop(&self) -> Option<PathBuf> {
        let mut state = self.state();
        loop {
            if let Some(path) = state.items.pop_front() {
                self.backlog.fetch_sub(1, Ordering::SeqCst);
                if state.items.is_empty() {
                    self.changed.notify_all();
                }
                return Some(path);
            }
            if state.closed {
                return None;
            }
            state = self.changed.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    fn backlog(&self) -> usize {
        self.backlog.load(Ordering::SeqCst)
    }

    /// Wait up to `timeout` for the queue to be closed and empty.
    fn wait_drained(&self, timeout: Duration) -> bool {
        let state = self.state();
        let (state, _) = self
            .changed
            .wait_timeout_while(state, timeout, |s| !(s.closed && s.items.is_empty()))
            .unwrap_or_else(|e| e.into_inner());
        state.closed && state.items.is_empty()
    }
}
