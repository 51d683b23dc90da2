//! Module set maintenance.
//!
//! This module provides:
//! - `store`: the shared module name set and its add/unlink policy
//! - `scan`: the initial directory scan
//! - `watcher`: the batched file watch facility

pub mod scan;
pub mod store;
pub mod watcher;

pub use scan::scan_module_names;
pub use store::{module_name, FilterPredicate, ModuleSet, ModuleSetStats};
pub use watcher::{
    DebouncedFileWatcher, DirIndex, WatchEvent, WatchEventKind, WatchFacility, WatcherError,
};
