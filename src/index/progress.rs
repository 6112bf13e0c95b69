//! Counters shared between reconciliation threads and progress pollers.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct IndexingProgress {
    files_indexed: AtomicUsize,
    total_files_found: AtomicUsize,
    files_reindexed: AtomicUsize,
    active_workers: AtomicUsize,
    peak_workers: AtomicUsize,
}

/// Point-in-time copy of [`IndexingProgress`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Paths reconciled this run, re-read or not.
    pub files_indexed: usize,
    /// Files the producer walk found.
    pub total_files_found: usize,
    /// Files whose contents were actually read and written to the index.
    pub files_reindexed: usize,
    pub active_workers: usize,
    /// Largest pool size reached this run.
    pub peak_workers: usize,
}

impl IndexingProgress {
    pub(crate) fn reset(&self) {
        self.files_indexed.store(0, Ordering::SeqCst);
        self.total_files_found.store(0, Ordering::SeqCst);
        self.files_reindexed.store(0, Ordering::SeqCst);
        self.active_workers.store(0, Ordering::SeqCst);
        self.peak_workers.store(0, Ordering::SeqCst);
    }

    pub(crate) fn file_indexed(&self) {
        self.files_indexed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn file_found(&self) {
        self.total_files_found.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn file_reindexed(&self) {
        self.files_reindexed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn worker_started(&self) -> usize {
        let active = self.active_workers.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_workers.fetch_max(active, Ordering::SeqCst);
        active
    }

    pub(crate) fn worker_stopped(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            files_indexed: self.files_indexed.load(Ordering::Relaxed),
            total_files_found: self.total_files_found.load(Ordering::Relaxed),
            files_reindexed: self.files_reindexed.load(Ordering::Relaxed),
            active_workers: self.active_workers.load(Ordering::SeqCst),
            peak_workers: self.peak_workers.load(Ordering::SeqCst),
        }
    }
}
