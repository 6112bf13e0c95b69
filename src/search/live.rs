//! Live scan engine: a parallel, cancellable regex scan of a directory tree.
//!
//! A driver thread fans the walk out over the rayon pool, one task per
//! directory, and streams matching lines through a channel. The caller pulls
//! results from [`LiveSearch`], an iterator that polls the channel with a short
//! timeout so it can notice cancellation while the walk is still busy.
//!
//! Cancellation has two tiers. [`LiveSearch::cancel`] sets a soft flag that
//! every task checks before each directory, file and line. If the walk has not
//! unwound within the grace period, a watchdog aborts the scan: it sets the
//! hard flag, marks the outcome [`ScanOutcome::Aborted`] and releases every
//! waiter. The driver thread is left detached to unwind on its own. File reads
//! check the hard flag between chunks, so a slow file is abandoned mid-read.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::model::SearchResult;
use crate::selector::{ContentSelector, FileSelector};
use crate::utils::decode_text;

/// Bytes read from a file between checks of the hard flag.
const READ_CHUNK: usize = 64 * 1024;

/// How long the iterator blocks on the channel before re-checking cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Time the walk gets to unwind after a soft cancel before it is aborted.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// How a live scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Running,
    /// Every selected file was scanned.
    Completed,
    /// Soft-cancelled and unwound within the grace period.
    Cancelled,
    /// Still running when the grace period expired. The walk was abandoned.
    Aborted,
}

#[derive(Debug, Clone)]
pub struct LiveScanOptions {
    pub grace_period: Duration,
    pub transcode_non_utf8: bool,
}

impl Default for LiveScanOptions {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            transcode_non_utf8: true,
        }
    }
}

/// Entry point for live scans.
#[derive(Debug, Clone, Default)]
pub struct LiveScanner {
    options: LiveScanOptions,
}

impl LiveScanner {
    pub fn new(options: LiveScanOptions) -> Self {
        Self { options }
    }

    /// Start scanning `root`. Returns immediately; results stream through the
    /// returned iterator. A missing root yields an empty sequence.
    pub fn search<C>(&self, root: &Path, file_selector: FileSelector, content_selector: C) -> LiveSearch
    where
        C: ContentSelector + 'static,
    {
        let state = Arc::new(ScanState::new(self.options.grace_period));
        let (sender, receiver) = mpsc::channel();

        let root = match root.canonicalize() {
            Ok(root) => root,
            Err(e) => {
                debug!(path = %root.display(), error = %e, "Live scan root not found");
                state.finish();
                return LiveSearch::new(receiver, state);
            }
        };

        let context = ScanContext {
            file_selector,
            content_selector,
            sender,
            state: Arc::clone(&state),
            transcode_non_utf8: self.options.transcode_non_utf8,
        };

        let spawned = thread::Builder::new()
            .name("live-scan".to_string())
            .spawn(move || {
                rayon::scope(|scope| scan_directory(scope, &context, root));
                context.state.finish();
                let outcome = context.state.outcome();
                debug!(?outcome, "Live scan finished");
            });

        if let Err(e) = spawned {
            warn!(error = %e, "Failed to start live scan");
            state.abort(state.lock_outcome());
        }

        LiveSearch::new(receiver, state)
    }
}

/// Scan with default options.
pub fn search<C>(root: &Path, file_selector: FileSelector, content_selector: C) -> LiveSearch
where
    C: ContentSelector + 'static,
{
    LiveScanner::default().search(root, file_selector, content_selector)
}

struct ScanState {
    soft: AtomicBool,
    hard: AtomicBool,
    outcome: Mutex<ScanOutcome>,
    finished: Condvar,
    grace_period: Duration,
}

impl ScanState {
    fn new(grace_period: Duration) -> Self {
        Self {
            soft: AtomicBool::new(false),
            hard: AtomicBool::new(false),
            outcome: Mutex::new(ScanOutcome::Running),
            finished: Condvar::new(),
            grace_period,
        }
    }

    fn should_stop(&self) -> bool {
        self.soft.load(Ordering::Relaxed) || self.hard.load(Ordering::Relaxed)
    }

    fn lock_outcome(&self) -> MutexGuard<'_, ScanOutcome> {
        self.outcome.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn outcome(&self) -> ScanOutcome {
        *self.lock_outcome()
    }

    fn is_aborted(&self) -> bool {
        self.hard.load(Ordering::Relaxed)
    }

    /// Record how the walk ended. An abort already reported by the watchdog
    /// is never overwritten.
    fn finish(&self) {
        let mut outcome = self.lock_outcome();
        if *outcome != ScanOutcome::Running {
            return;
        }
        *outcome = if self.hard.load(Ordering::SeqCst) {
            ScanOutcome::Aborted
        } else if self.soft.load(Ordering::SeqCst) {
            ScanOutcome::Cancelled
        } else {
            ScanOutcome::Completed
        };
        self.finished.notify_all();
    }

    fn wait(&self) -> ScanOutcome {
        let guard = self.lock_outcome();
        let guard = self
            .finished
            .wait_while(guard, |o| *o == ScanOutcome::Running)
            .unwrap_or_else(|e| e.into_inner());
        *guard
    }

    fn cancel(self: &Arc<Self>) {
        if self.soft.swap(true, Ordering::SeqCst) || self.outcome() != ScanOutcome::Running {
            return;
        }
        let state = Arc::clone(self);
        let watchdog = thread::Builder::new()
            .name("live-scan-watchdog".to_string())
            .spawn(move || state.watch_grace_period());
        if let Err(e) = watchdog {
            warn!(error = %e, "Failed to start cancellation watchdog, aborting scan");
            self.abort(self.lock_outcome());
        }
    }

    fn watch_grace_period(&self) {
        let guard = self.lock_outcome();
        let (guard, timeout) = self
            .finished
            .wait_timeout_while(guard, self.grace_period, |o| *o == ScanOutcome::Running)
            .unwrap_or_else(|e| e.into_inner());
        if timeout.timed_out() && *guard == ScanOutcome::Running {
            warn!(grace_period = ?self.grace_period, "Live scan ignored cancellation, aborting");
            self.abort(guard);
        }
    }

    fn abort(&self, mut outcome: MutexGuard<'_, ScanOutcome>) {
        self.hard.store(true, Ordering::SeqCst);
        if *outcome == ScanOutcome::Running {
            *outcome = ScanOutcome::Aborted;
        }
        self.finished.notify_all();
    }
}

struct ScanContext<C> {
    file_selector: FileSelector,
    content_selector: C,
    sender: Sender<SearchResult>,
    state: Arc<ScanState>,
    transcode_non_utf8: bool,
}

fn scan_directory<'s, C>(scope: &rayon::Scope<'s>, ctx: &'s ScanContext<C>, dir: PathBuf)
where
    C: ContentSelector,
{
    if ctx.state.should_stop() || !ctx.file_selector.is_directory_valid(&dir) {
        return;
    }

    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "Skipping unreadable directory");
            return;
        }
    };

    let mut files = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        // Symlinked directories are not descended into, as in the index walk.
        if file_type.is_dir() {
            scope.spawn(move |scope| scan_directory(scope, ctx, path));
        } else if file_type.is_file() || (file_type.is_symlink() && path.is_file()) {
            files.push(path);
        }
    }
    files.sort();

    for file in files {
        if ctx.state.should_stop() {
            return;
        }
        if ctx.file_selector.is_file_valid(&file) {
            scan_file(ctx, &file);
        }
    }
}

/// Read a whole file in chunks, giving up as soon as the scan is aborted.
fn read_until_aborted(path: &Path, state: &ScanState) -> std::io::Result<Option<Vec<u8>>> {
    let mut reader = BufReader::with_capacity(READ_CHUNK, File::open(path)?);
    let mut bytes = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        if state.is_aborted() {
            return Ok(None);
        }
        match reader.read(&mut chunk) {
            Ok(0) => return Ok(Some(bytes)),
            Ok(n) => bytes.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

fn scan_file<C: ContentSelector>(ctx: &ScanContext<C>, path: &Path) {
    let bytes = match read_until_aborted(path, &ctx.state) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            debug!(path = %path.display(), "Abandoned read of aborted scan");
            return;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Skipping unreadable file");
            return;
        }
    };
    let text = match decode_text(bytes, ctx.transcode_non_utf8) {
        Some(text) => text,
        None => {
            debug!(path = %path.display(), "Skipping binary or undecodable file");
            return;
        }
    };

    for (index, line) in text.lines().enumerate() {
        if ctx.state.should_stop() {
            return;
        }
        let matches = ctx.content_selector.get_matches(line);
        if matches.is_empty() {
            continue;
        }
        let result = SearchResult::new(path, index + 1, line, matches);
        if ctx.sender.send(result).is_err() {
            // Receiver gone: nobody is consuming any more.
            ctx.state.soft.store(true, Ordering::SeqCst);
            return;
        }
    }
}

/// Pull-based sequence of live scan results.
///
/// Results from one file arrive in line order; results from different files
/// interleave arbitrarily. Dropping the iterator cancels the scan.
pub struct LiveSearch {
    receiver: Receiver<SearchResult>,
    state: Arc<ScanState>,
}

impl LiveSearch {
    fn new(receiver: Receiver<SearchResult>, state: Arc<ScanState>) -> Self {
        Self { receiver, state }
    }

    /// Request soft cancellation. The iterator ends at its next call.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    /// A handle that can cancel the scan from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Current outcome; `Running` until the walk has unwound.
    pub fn outcome(&self) -> ScanOutcome {
        self.state.outcome()
    }

    /// Block until the walk has unwound, or until the grace period after a
    /// cancel has run out, and return how it ended.
    pub fn wait(&self) -> ScanOutcome {
        self.state.wait()
    }
}

impl Iterator for LiveSearch {
    type Item = SearchResult;

    fn next(&mut self) -> Option<SearchResult> {
        loop {
            if self.state.should_stop() {
                return None;
            }
            match self.receiver.recv_timeout(POLL_INTERVAL) {
                Ok(result) => return Some(result),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

impl Drop for LiveSearch {
    fn drop(&mut self) {
        if self.state.outcome() == ScanOutcome::Running {
            self.state.cancel();
        }
    }
}

/// Cancels a live scan from any thread.
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<ScanState>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.state.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.should_stop()
    }

    pub fn wait(&self) -> ScanOutcome {
        self.state.wait()
    }
}
