//! File watch facility with batching and native/polling fallback.
//!
//! The watcher turns raw `notify` events into an ordered stream of
//! [`WatchEvent`]s (file added, file unlinked) and publishes them in batches
//! over a tokio broadcast channel. Directory events are dropped; renames are
//! split into an unlink of the old path and an add of the new one.

use globwalk::{FileType, GlobWalkerBuilder};
use notify::{
    event::{CreateKind, ModifyKind, RemoveKind, RenameMode},
    Config, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors that can occur in the file watcher system.
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Failed to create watcher: {0}")]
    WatcherCreation(#[from] notify::Error),

    #[error("Failed to watch path {path}: {source}")]
    WatchPath {
        path: PathBuf,
        source: notify::Error,
    },
}

/// What happened to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    Add,
    Unlink,
}

/// A single file notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchEventKind,
}

impl WatchEvent {
    pub fn add(path: PathBuf) -> Self {
        Self {
            path,
            kind: WatchEventKind::Add,
        }
    }

    pub fn unlink(path: PathBuf) -> Self {
        Self {
            path,
            kind: WatchEventKind::Unlink,
        }
    }

    /// Translate a raw `notify` event into file add/unlink notifications.
    ///
    /// `dirs` tracks the directories seen under the watched roots. Some
    /// backends (the poll watcher among them) report a deleted directory as a
    /// plain removal, and the path can no longer be inspected by then.
    pub fn from_notify(event: Event, dirs: &mut DirIndex) -> Vec<WatchEvent> {
        let Event { kind, paths, .. } = event;

        match kind {
            EventKind::Create(CreateKind::Folder) => {
                paths.into_iter().for_each(|path| dirs.insert(path));
                Vec::new()
            }
            EventKind::Create(_) => paths
                .into_iter()
                .filter_map(|path| Self::created(path, dirs))
                .collect(),
            EventKind::Remove(RemoveKind::Folder) => {
                paths.iter().for_each(|path| {
                    dirs.forget(path);
                });
                Vec::new()
            }
            EventKind::Remove(_) => paths
                .into_iter()
                .filter_map(|path| Self::removed(path, dirs))
                .collect(),
            EventKind::Modify(ModifyKind::Name(mode)) => Self::from_rename(mode, paths, dirs),
            _ => Vec::new(),
        }
    }

    fn created(path: PathBuf, dirs: &mut DirIndex) -> Option<WatchEvent> {
        if path.is_dir() {
            dirs.insert(path);
            None
        } else {
            Some(WatchEvent::add(path))
        }
    }

    fn removed(path: PathBuf, dirs: &mut DirIndex) -> Option<WatchEvent> {
        if dirs.forget(&path) {
            None
        } else {
            Some(WatchEvent::unlink(path))
        }
    }

    fn from_rename(mode: RenameMode, paths: Vec<PathBuf>, dirs: &mut DirIndex) -> Vec<WatchEvent> {
        match mode {
            RenameMode::From => paths
                .into_iter()
                .filter_map(|path| Self::removed(path, dirs))
                .collect(),
            RenameMode::To => paths
                .into_iter()
                .filter_map(|path| Self::created(path, dirs))
                .collect(),
            RenameMode::Both => {
                let mut paths = paths.into_iter();
                let from = paths.next().and_then(|from| Self::removed(from, dirs));
                let to = paths.next().and_then(|to| Self::created(to, dirs));
                from.into_iter().chain(to).collect()
            }
            // Backends that cannot tell the two sides apart.
            _ => paths
                .into_iter()
                .filter_map(|path| {
                    if path.exists() {
                        Self::created(path, dirs)
                    } else {
                        Self::removed(path, dirs)
                    }
                })
                .collect(),
        }
    }
}

/// Directories known to exist under the watched roots.
#[derive(Debug, Default)]
pub struct DirIndex {
    dirs: HashSet<PathBuf>,
}

impl DirIndex {
    /// Record `root` and every directory below it.
    pub fn seed(&mut self, root: &Path) {
        if !root.is_dir() {
            return;
        }
        self.dirs.insert(root.to_path_buf());

        match GlobWalkerBuilder::from_patterns(root, &["**/*"])
            .file_type(FileType::DIR)
            .follow_links(true)
            .build()
        {
            Ok(walker) => self
                .dirs
                .extend(walker.filter_map(Result::ok).map(|entry| entry.into_path())),
            Err(e) => tracing::warn!("Failed to index directories under {}: {}", root.display(), e),
        }
    }

    pub fn insert(&mut self, path: PathBuf) {
        self.dirs.insert(path);
    }

    /// Drop `path` and everything below it. Returns whether `path` was a
    /// known directory.
    pub fn forget(&mut self, path: &Path) -> bool {
        let known = self.dirs.remove(path);
        if known {
            self.dirs.retain(|dir| !dir.starts_with(path));
        }
        known
    }

    #[cfg(test)]
    fn contains(&self, path: &Path) -> bool {
        self.dirs.contains(path)
    }
}

/// The shared file-watch facility handed over by the host dev server.
pub trait WatchFacility {
    /// Start observing a directory recursively.
    fn add(&mut self, path: &Path) -> Result<(), WatcherError>;

    /// Receive batches of add/unlink notifications, in emission order.
    fn subscribe(&self) -> broadcast::Receiver<Vec<WatchEvent>>;
}

/// A file watcher that batches events and falls back to polling.
///
/// Native watching is tried first; paths where it fails (NFS, WSL, network
/// drives) are handed to a [`PollWatcher`]. Events are collected by
/// [`poll_events`](Self::poll_events) and published by
/// [`flush_if_ready`](Self::flush_if_ready) once the debounce period has
/// elapsed. Batching never reorders events.
pub struct DebouncedFileWatcher {
    native_watcher: Option<RecommendedWatcher>,
    poll_watcher: PollWatcher,
    event_rx: Receiver<Result<Event, notify::Error>>,
    dirs: DirIndex,
    pending_events: Vec<WatchEvent>,
    debounce_duration: Duration,
    last_flush: Instant,
    event_sender: broadcast::Sender<Vec<WatchEvent>>,
}

impl DebouncedFileWatcher {
    /// Creates a new file watcher.
    ///
    /// # Arguments
    /// * `debounce_ms` - Minimum time between event batches
    /// * `poll_interval_ms` - Interval for the polling fallback (recommended: 1000-2000ms)
    /// * `buffer_size` - Size of the broadcast channel buffer
    pub fn new(
        debounce_ms: u64,
        poll_interval_ms: u64,
        buffer_size: usize,
    ) -> Result<(Self, broadcast::Receiver<Vec<WatchEvent>>), WatcherError> {
        let (tx, rx) = channel();
        let tx_clone = tx.clone();

        let native_config = Config::default()
            .with_poll_interval(Duration::from_millis(100))
            .with_compare_contents(false);

        let native_watcher = match RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                let _ = tx.send(res);
            },
            native_config,
        ) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!("Native watcher unavailable, using polling only: {}", e);
                None
            }
        };

        let poll_config = Config::default()
            .with_poll_interval(Duration::from_millis(poll_interval_ms))
            .with_compare_contents(false);

        let poll_watcher = PollWatcher::new(
            move |res: Result<Event, notify::Error>| {
                let _ = tx_clone.send(res);
            },
            poll_config,
        )?;

        let (event_sender, event_receiver) = broadcast::channel(buffer_size.max(1));

        Ok((
            Self {
                native_watcher,
                poll_watcher,
                event_rx: rx,
                dirs: DirIndex::default(),
                pending_events: Vec::new(),
                debounce_duration: Duration::from_millis(debounce_ms),
                last_flush: Instant::now(),
                event_sender,
            },
            event_receiver,
        ))
    }

    /// Watch a path, using native watching if possible, polling otherwise.
    pub fn watch(&mut self, path: &Path) -> Result<(), WatcherError> {
        self.dirs.seed(path);

        if let Some(ref mut native) = self.native_watcher {
            match native.watch(path, RecursiveMode::Recursive) {
                Ok(()) => {
                    tracing::debug!("Using native watcher for {}", path.display());
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        "Native watcher failed for {}: {}, falling back to polling",
                        path.display(),
                        e
                    );
                }
            }
        }

        tracing::debug!("Using poll watcher for {}", path.display());
        self.poll_watcher
            .watch(path, RecursiveMode::Recursive)
            .map_err(|e| WatcherError::WatchPath {
                path: path.to_path_buf(),
                source: e,
            })
    }

    /// Drain raw events from the backends into the pending batch.
    ///
    /// Call this periodically (e.g., in an event loop).
    pub fn poll_events(&mut self) {
        while let Ok(result) = self.event_rx.try_recv() {
            match result {
                Ok(event) => self
                    .pending_events
                    .extend(WatchEvent::from_notify(event, &mut self.dirs)),
                Err(e) => tracing::warn!("Watcher backend error: {}", e),
            }
        }
    }

    /// Publish the pending batch if the debounce period has elapsed.
    ///
    /// Returns the number of events flushed, or 0 if still in debounce period.
    pub fn flush_if_ready(&mut self) -> usize {
        let now = Instant::now();

        if self.pending_events.is_empty() {
            return 0;
        }

        if now.duration_since(self.last_flush) < self.debounce_duration {
            return 0;
        }

        self.last_flush = now;

        let batch = std::mem::take(&mut self.pending_events);
        let count = batch.len();

        // No receivers is not an error: nobody is listening yet.
        let _ = self.event_sender.send(batch);

        count
    }
}

impl WatchFacility for DebouncedFileWatcher {
    fn add(&mut self, path: &Path) -> Result<(), WatcherError> {
        self.watch(path)
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<WatchEvent>> {
        self.event_sender.subscribe()
    }
}
