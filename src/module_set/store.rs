//! Module name set shared between the watch listener and resolver callers.
//!
//! `ModuleSet` owns the tracked names and the policy that decides which
//! watcher events may change them: creations must pass the
//! [`FilterPredicate`], deletions never touch names from the include list.

use crate::module_set::watcher::{WatchEvent, WatchEventKind};
use dashmap::DashSet;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Derive the module name of a file: its basename without the final extension.
///
/// Paths without a file name map to the empty string.
pub fn module_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Eligibility rule for names discovered by live creation events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPredicate {
    pub prefix: String,
    pub suffix: String,
    pub exclude: HashSet<String>,
}

impl FilterPredicate {
    pub fn new(
        prefix: impl Into<String>,
        suffix: impl Into<String>,
        exclude: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
            exclude: exclude.into_iter().collect(),
        }
    }

    /// Whether a newly created module may be added automatically.
    pub fn accepts(&self, name: &str) -> bool {
        name.starts_with(&self.prefix)
            && name.ends_with(&self.suffix)
            && !self.exclude.contains(name)
    }
}

/// Snapshot of the counters kept by a [`ModuleSet`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ModuleSetStats {
    /// Names inserted by creation events.
    pub total_adds: u64,
    /// Names removed by deletion events.
    pub total_removes: u64,
    /// Creation events rejected by the filter.
    pub total_filtered: u64,
    /// Deletion events ignored because the name is sticky.
    pub total_protected: u64,
}

#[derive(Debug, Default)]
struct StatCounters {
    adds: AtomicU64,
    removes: AtomicU64,
    filtered: AtomicU64,
    protected: AtomicU64,
}

/// The set of importable module names.
///
/// Every operation takes `&self`; the underlying [`DashSet`] makes each
/// insert, remove and lookup atomic on its own, so the listener task and any
/// number of resolver callers can share one instance through an `Arc`.
#[derive(Debug)]
pub struct ModuleSet {
    names: DashSet<String>,
    include: HashSet<String>,
    filter: FilterPredicate,
    stats: StatCounters,
}

impl ModuleSet {
    /// Create a set holding the include list.
    pub fn new(include: impl IntoIterator<Item = String>, filter: FilterPredicate) -> Self {
        let include: HashSet<String> = include.into_iter().collect();
        let names = DashSet::new();
        for name in &include {
            names.insert(name.clone());
        }

        Self {
            names,
            include,
            filter,
            stats: StatCounters::default(),
        }
    }

    /// Add names found by the initial scan. No filtering is applied.
    pub fn seed(&self, names: impl IntoIterator<Item = String>) {
        for name in names {
            self.names.insert(name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Whether a name is protected from deletion events.
    pub fn is_sticky(&self, name: &str) -> bool {
        self.include.contains(name)
    }

    /// All tracked names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.iter().map(|name| name.key().clone()).collect();
        names.sort();
        names
    }

    pub fn stats(&self) -> ModuleSetStats {
        ModuleSetStats {
            total_adds: self.stats.adds.load(Ordering::Relaxed),
            total_removes: self.stats.removes.load(Ordering::Relaxed),
            total_filtered: self.stats.filtered.load(Ordering::Relaxed),
            total_protected: self.stats.protected.load(Ordering::Relaxed),
        }
    }

    /// Handle a file creation. Returns `true` if the set changed.
    pub fn handle_add(&self, path: &Path) -> bool {
        let name = module_name(path);

        if !self.filter.accepts(&name) {
            self.stats.filtered.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("Ignoring {} ({} is not eligible)", path.display(), name);
            return false;
        }

        let inserted = self.names.insert(name);
        if inserted {
            self.stats.adds.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Module added from {}", path.display());
        }
        inserted
    }

    /// Handle a file deletion. Returns `true` if the set changed.
    pub fn handle_unlink(&self, path: &Path) -> bool {
        let name = module_name(path);

        if self.is_sticky(&name) {
            self.stats.protected.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("Keeping included module {} after unlink", name);
            return false;
        }

        let removed = self.names.remove(&name).is_some();
        if removed {
            self.stats.removes.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Module removed after unlink of {}", path.display());
        }
        removed
    }

    /// Apply a single watcher event.
    pub fn apply(&self, event: &WatchEvent) -> bool {
        match event.kind {
            WatchEventKind::Add => self.handle_add(&event.path),
            WatchEventKind::Unlink => self.handle_unlink(&event.path),
        }
    }

    /// Reconcile the set with a fresh scan after events were missed.
    ///
    /// Applies the same rules as live events: names gone from disk are
    /// dropped unless sticky, and new names on disk are only added when they
    /// pass the filter.
    pub fn resync(&self, on_disk: &HashSet<String>) {
        let include = &self.include;
        self.names
            .retain(|name| include.contains(name) || on_disk.contains(name));

        for name in on_disk {
            if !self.names.contains(name) && self.filter.accepts(name) {
                self.names.insert(name.clone());
            }
        }
    }

    /// Get a summary of the set for debugging.
    pub fn debug_summary(&self) -> String {
        format!(
            "ModuleSet: {} names ({} sticky), stats: {:?}",
            self.names.len(),
            self.include.len(),
            self.stats()
        )
    }
}
