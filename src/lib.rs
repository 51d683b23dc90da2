//! Dir Resolver
//!
//! Resolves bare identifiers to import paths for auto-import build plugins.
//! Every file in `src/<target>` becomes an importable module named after its
//! basename; during a dev session the set follows files as they are created
//! and deleted.
//!
//! ## Rules
//!
//! - The initial scan takes every file, whatever its name.
//! - While serving, a created file is added only if its name starts with
//!   `prefix`, ends with `suffix` and is not in `exclude`.
//! - Names in `include` always resolve, even after their file is deleted.
//!
//! ## Flow
//!
//! ```text
//! Filesystem Change
//!        ↓
//! DebouncedFileWatcher (ordered add/unlink batches)
//!        ↓
//! broadcast::send(Vec<WatchEvent>)
//!        ↓
//! DirResolver listener task → ModuleSet.apply() [in place]
//!        ↓
//! DirResolver::resolve() sees the change on the next call
//! ```
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use dir_resolver::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut helper: DirResolverHelper<DebouncedFileWatcher> = DirResolverHelper::new();
//!     helper.config(Command::Serve);
//!
//!     let (watcher, _rx) = DebouncedFileWatcher::new(200, 1000, 256)?;
//!     helper.configure_server(watcher);
//!
//!     let resolver = DirResolverBuilder::new()
//!         .prefix("use")
//!         .include(["useGlobal"])
//!         .build(helper.session());
//!
//!     let chain = ResolverChain::new().with(resolver);
//!     assert!(chain.resolve("useGlobal").is_some());
//!
//!     if let Some(mut watcher) = helper.into_watcher() {
//!         dir_resolver::run_watcher_loop(&mut watcher, 50).await;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Structure
//!
//! - [`module_set`]: module name set, initial scan and file watching
//! - [`resolver`]: the resolver, resolver chain and host lifecycle hooks
//! - [`config`]: resolver options

#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod module_set;
pub mod resolver;

/// Re-exports for convenience.
pub mod prelude {
    pub use crate::config::{ConfigError, ResolverOptions};
    pub use crate::module_set::{
        module_name, DebouncedFileWatcher, FilterPredicate, ModuleSet, ModuleSetStats,
        WatchEvent, WatchEventKind, WatchFacility, WatcherError,
    };
    pub use crate::resolver::{
        Command, DirResolver, DirResolverBuilder, DirResolverHelper, Resolver, ResolverChain,
        Session,
    };
}

/// Run the file watcher event loop.
///
/// Polls the watcher for raw events and publishes batches once the debounce
/// period has elapsed. Never returns; run it on its own task or select it
/// against a shutdown signal.
pub async fn run_watcher_loop(
    watcher: &mut module_set::DebouncedFileWatcher,
    poll_interval_ms: u64,
) {
    let poll_interval = std::time::Duration::from_millis(poll_interval_ms);

    loop {
        watcher.poll_events();
        watcher.flush_if_ready();
        tokio::time::sleep(poll_interval).await;
    }
}
