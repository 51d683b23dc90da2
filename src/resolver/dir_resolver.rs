//! Directory-backed resolver.
//!
//! `DirResolver` scans `<root>/src/<target>` once, then in a live session
//! listens to the watch facility on a background task and applies add/unlink
//! events to the shared [`ModuleSet`]. Resolution is a synchronous lookup in
//! that set, so it always reflects the last event the listener applied.

use crate::config::ResolverOptions;
use crate::module_set::{scan_module_names, ModuleSet, WatchEvent};
use crate::resolver::chain::{join_import_path, Resolver};
use crate::resolver::helper::Session;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Resolves bare module names found in a source directory.
pub struct DirResolver {
    src_alias: String,
    target: String,
    /// Normalized absolute module directory.
    dir: PathBuf,
    modules: Arc<ModuleSet>,
    /// Task handle for the listener loop, present in live sessions.
    listener_handle: Option<JoinHandle<()>>,
}

impl DirResolver {
    /// Scan the module directory and, in a live session, subscribe to changes.
    ///
    /// Live sessions spawn the listener on the current tokio runtime; without
    /// one the resolver keeps the scanned set and logs a warning.
    pub fn new(options: ResolverOptions, session: Session<'_>) -> Self {
        let dir = normalize_dir(&options.target_dir());
        let modules = Arc::new(ModuleSet::new(options.include.iter().cloned(), options.filter()));
        modules.seed(scan_module_names(&dir));

        tracing::debug!(
            "Initialized resolver for {}: {}",
            dir.display(),
            modules.debug_summary()
        );

        let mut resolver = Self {
            src_alias: options.src_alias,
            target: options.target,
            dir,
            modules,
            listener_handle: None,
        };

        if let Session::Serve(watcher) = session {
            let watch_root = nearest_existing(&resolver.dir);
            if let Err(e) = watcher.add(&watch_root) {
                tracing::warn!("Failed to watch {}: {}", watch_root.display(), e);
            }
            resolver.setup_listener(watcher.subscribe());
        }

        resolver
    }

    /// Resolve a module name to its import path.
    pub fn resolve(&self, name: &str) -> Option<String> {
        self.modules
            .contains(name)
            .then(|| join_import_path(&[&self.src_alias, &self.target, name]))
    }

    /// The directory being tracked.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get a handle to the shared module set.
    pub fn modules(&self) -> Arc<ModuleSet> {
        Arc::clone(&self.modules)
    }

    /// Check if the listener is running.
    pub fn is_listening(&self) -> bool {
        self.listener_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    fn setup_listener(&mut self, rx: broadcast::Receiver<Vec<WatchEvent>>) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::warn!("No async runtime, {} will not be watched: {}", self.dir.display(), e);
                return;
            }
        };

        let modules = Arc::clone(&self.modules);
        let dir = self.dir.clone();
        self.listener_handle = Some(runtime.spawn(async move {
            Self::listener_loop(modules, dir, rx).await;
        }));
    }

    /// Apply watcher batches to the module set, in delivery order.
    ///
    /// Every event on the shared stream is applied, wherever its path lies.
    async fn listener_loop(
        modules: Arc<ModuleSet>,
        dir: PathBuf,
        mut rx: broadcast::Receiver<Vec<WatchEvent>>,
    ) {
        loop {
            match rx.recv().await {
                Ok(batch) => {
                    let changed = batch
                        .iter()
                        .fold(0usize, |changed, event| changed + usize::from(modules.apply(event)));

                    if changed > 0 {
                        tracing::debug!(
                            "Applied {} of {} events to {}",
                            changed,
                            batch.len(),
                            modules.debug_summary()
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    tracing::warn!(
                        "Module listener lagged behind by {} batches, rescanning {}",
                        count,
                        dir.display()
                    );
                    modules.resync(&scan_module_names(&dir));
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Watch channel closed, stopping module listener");
                    break;
                }
            }
        }
    }
}

impl Resolver for DirResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        DirResolver::resolve(self, name)
    }
}

/// Builder for DirResolver with sensible defaults.
#[derive(Debug, Clone, Default)]
pub struct DirResolverBuilder {
    options: ResolverOptions,
}

impl DirResolverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_options(options: ResolverOptions) -> Self {
        Self { options }
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.options.root = root.into();
        self
    }

    pub fn src_alias(mut self, alias: impl Into<String>) -> Self {
        self.options.src_alias = alias.into();
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.options.target = target.into();
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.options.prefix = prefix.into();
        self
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.options.suffix = suffix.into();
        self
    }

    pub fn include<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.include = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.exclude = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self, session: Session<'_>) -> DirResolver {
        DirResolver::new(self.options, session)
    }
}

/// Absolute, symlink-free form of `dir`, even if it does not exist yet.
fn normalize_dir(dir: &Path) -> PathBuf {
    let absolute = std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf());
    let existing = nearest_existing(&absolute);

    match (existing.canonicalize(), absolute.strip_prefix(&existing)) {
        (Ok(canonical), Ok(rest)) => canonical.join(rest),
        _ => absolute,
    }
}

/// The closest ancestor of `dir` (itself included) that exists on disk.
fn nearest_existing(dir: &Path) -> PathBuf {
    dir.ancestors()
        .find(|ancestor| ancestor.exists())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module_set::{DebouncedFileWatcher, WatchFacility, WatcherError};
    use std::fs;
    use tempfile::{tempdir, TempDir};

    struct FakeFacility {
        watched: Vec<PathBuf>,
        sender: broadcast::Sender<Vec<WatchEvent>>,
    }

    impl FakeFacility {
        fn new(buffer_size: usize) -> Self {
            let (sender, _) = broadcast::channel(buffer_size);
            Self {
                watched: Vec::new(),
                sender,
            }
        }

        fn emit(&self, events: Vec<WatchEvent>) {
            self.sender.send(events).unwrap();
        }
    }

    impl WatchFacility for FakeFacility {
        fn add(&mut self, path: &Path) -> Result<(), WatcherError> {
            self.watched.push(path.to_path_buf());
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<Vec<WatchEvent>> {
            self.sender.subscribe()
        }
    }

    /// Project with `src/composables/useFoo.ts` on disk.
    fn project() -> TempDir {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("src/composables");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("useFoo.ts"), "export const useFoo = () => {}").unwrap();
        temp
    }

    fn builder(root: &Path) -> DirResolverBuilder {
        DirResolverBuilder::new()
            .root(root)
            .prefix("use")
            .include(["useGlobal"])
    }

    async fn settle() {
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    }

    /// Drive the watcher until `done` holds, for up to five seconds.
    async fn pump_until(watcher: &mut DebouncedFileWatcher, done: impl Fn() -> bool) -> bool {
        for _ in 0..100 {
            watcher.poll_events();
            watcher.flush_if_ready();
            settle().await;
            if done() {
                return true;
            }
        }
        false
    }

    #[test]
    fn test_initial_resolution() {
        let temp = project();
        let resolver = builder(temp.path()).build(Session::Build);

        assert_eq!(
            resolver.resolve("useFoo").as_deref(),
            Some("/src/composables/useFoo")
        );
        assert_eq!(
            resolver.resolve("useGlobal").as_deref(),
            Some("/src/composables/useGlobal")
        );
        assert_eq!(resolver.resolve("bar"), None);
        assert!(!resolver.is_listening());
    }

    #[test]
    fn test_initial_scan_ignores_filter() {
        let temp = project();
        let dir = temp.path().join("src/composables");
        fs::write(dir.join("helper.ts"), "").unwrap();
        fs::write(dir.join("useSkipped.ts"), "").unwrap();

        let resolver = builder(temp.path())
            .suffix("Store")
            .exclude(["useSkipped"])
            .build(Session::Build);

        assert!(resolver.resolve("helper").is_some());
        assert!(resolver.resolve("useSkipped").is_some());
        assert!(resolver.resolve("useFoo").is_some());
    }

    #[test]
    fn test_missing_directory_starts_with_include_only() {
        let temp = tempdir().unwrap();
        let resolver = builder(temp.path()).build(Session::Build);

        assert_eq!(resolver.modules().names(), vec!["useGlobal"]);
        assert!(resolver.resolve("useGlobal").is_some());
    }

    #[test]
    fn test_custom_alias_and_target() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("src/stores");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("cartStore.ts"), "").unwrap();

        let resolver = DirResolverBuilder::new()
            .root(temp.path())
            .src_alias("@/")
            .target("stores")
            .build(Session::Build);

        assert_eq!(resolver.resolve("cartStore").as_deref(), Some("@/stores/cartStore"));
    }

    #[tokio::test]
    async fn test_build_session_never_changes() {
        let temp = project();
        let resolver = builder(temp.path()).build(Session::Build);

        fs::write(temp.path().join("src/composables/useLate.ts"), "").unwrap();
        settle().await;

        assert_eq!(resolver.resolve("useLate"), None);
        assert!(!resolver.is_listening());
    }

    #[tokio::test]
    async fn test_live_session_registers_directory() {
        let temp = project();
        let mut facility = FakeFacility::new(16);
        let resolver = builder(temp.path()).build(Session::Serve(&mut facility));

        assert_eq!(facility.watched, vec![resolver.dir().to_path_buf()]);
        assert!(resolver.is_listening());
    }

    #[tokio::test]
    async fn test_live_session_watches_ancestor_of_missing_directory() {
        let temp = tempdir().unwrap();
        let mut facility = FakeFacility::new(16);
        let resolver = builder(temp.path()).build(Session::Serve(&mut facility));

        let canonical_root = temp.path().canonicalize().unwrap();
        assert_eq!(facility.watched, vec![canonical_root]);

        facility.emit(vec![WatchEvent::add(resolver.dir().join("useLater.ts"))]);
        settle().await;

        assert!(resolver.resolve("useLater").is_some());
    }

    #[tokio::test]
    async fn test_live_add_and_unlink() {
        let temp = project();
        let mut facility = FakeFacility::new(16);
        let resolver = builder(temp.path()).build(Session::Serve(&mut facility));
        let dir = resolver.dir().to_path_buf();

        facility.emit(vec![
            WatchEvent::add(dir.join("useBar.ts")),
            WatchEvent::add(dir.join("helper.ts")),
            WatchEvent::unlink(dir.join("useFoo.ts")),
            WatchEvent::unlink(dir.join("useGlobal.ts")),
        ]);
        settle().await;

        assert_eq!(
            resolver.resolve("useBar").as_deref(),
            Some("/src/composables/useBar")
        );
        assert_eq!(resolver.resolve("helper"), None);
        assert_eq!(resolver.resolve("useFoo"), None);
        assert!(resolver.resolve("useGlobal").is_some());
    }

    #[tokio::test]
    async fn test_live_events_apply_in_order() {
        let temp = project();
        let mut facility = FakeFacility::new(16);
        let resolver = builder(temp.path()).build(Session::Serve(&mut facility));
        let path = resolver.dir().join("useFlip.ts");

        facility.emit(vec![WatchEvent::add(path.clone()), WatchEvent::unlink(path.clone())]);
        facility.emit(vec![WatchEvent::add(path.clone())]);
        settle().await;

        assert!(resolver.resolve("useFlip").is_some());

        facility.emit(vec![WatchEvent::unlink(path)]);
        settle().await;

        assert_eq!(resolver.resolve("useFlip"), None);
    }

    #[tokio::test]
    async fn test_live_duplicates_and_unknown_unlinks() {
        let temp = project();
        let mut facility = FakeFacility::new(16);
        let resolver = builder(temp.path()).build(Session::Serve(&mut facility));
        let dir = resolver.dir().to_path_buf();
        let before = resolver.modules().names();

        facility.emit(vec![
            WatchEvent::add(dir.join("useFoo.ts")),
            WatchEvent::add(dir.join("useFoo.js")),
            WatchEvent::unlink(dir.join("useNever.ts")),
        ]);
        settle().await;

        assert_eq!(resolver.modules().names(), before);
    }

    #[tokio::test]
    async fn test_live_excluded_names_are_not_added() {
        let temp = project();
        let mut facility = FakeFacility::new(16);
        let resolver = builder(temp.path())
            .exclude(["useInternal"])
            .build(Session::Serve(&mut facility));

        facility.emit(vec![WatchEvent::add(resolver.dir().join("useInternal.ts"))]);
        settle().await;

        assert_eq!(resolver.resolve("useInternal"), None);
    }

    #[tokio::test]
    async fn test_events_from_other_watched_directories_apply() {
        let temp = project();
        let mut facility = FakeFacility::new(16);
        let resolver = builder(temp.path()).build(Session::Serve(&mut facility));
        let hooks = temp.path().join("src/hooks");

        facility.emit(vec![
            WatchEvent::add(hooks.join("useShared.ts")),
            WatchEvent::add(hooks.join("widget.ts")),
        ]);
        settle().await;

        assert_eq!(
            resolver.resolve("useShared").as_deref(),
            Some("/src/composables/useShared")
        );
        assert_eq!(resolver.resolve("widget"), None);

        facility.emit(vec![WatchEvent::unlink(hooks.join("useFoo.ts"))]);
        settle().await;

        assert_eq!(resolver.resolve("useFoo"), None);
    }

    #[tokio::test]
    async fn test_real_watcher_tracks_files_on_disk() {
        let temp = project();
        let dir_on_disk = temp.path().join("src/composables");
        let (mut watcher, _rx) = DebouncedFileWatcher::new(0, 100, 64).unwrap();
        let resolver = builder(temp.path()).build(Session::Serve(&mut watcher));

        let created = dir_on_disk.join("useDisk.ts");
        fs::write(&created, "export const useDisk = () => {}").unwrap();
        assert!(pump_until(&mut watcher, || resolver.resolve("useDisk").is_some()).await);

        fs::remove_file(&created).unwrap();
        assert!(pump_until(&mut watcher, || resolver.resolve("useDisk").is_none()).await);

        fs::remove_file(dir_on_disk.join("useFoo.ts")).unwrap();
        assert!(pump_until(&mut watcher, || resolver.resolve("useFoo").is_none()).await);
        assert!(resolver.resolve("useGlobal").is_some());
    }

    #[tokio::test]
    async fn test_lagged_listener_resyncs_from_disk() {
        let temp = project();
        let dir_on_disk = temp.path().join("src/composables");
        let mut facility = FakeFacility::new(1);
        let resolver = builder(temp.path()).build(Session::Serve(&mut facility));

        fs::remove_file(dir_on_disk.join("useFoo.ts")).unwrap();
        fs::write(dir_on_disk.join("useNew.ts"), "").unwrap();
        fs::write(dir_on_disk.join("helper.ts"), "").unwrap();

        // Overflow the single-slot channel before the listener runs.
        facility.emit(vec![]);
        facility.emit(vec![]);
        facility.emit(vec![]);
        settle().await;

        assert_eq!(resolver.resolve("useFoo"), None);
        assert!(resolver.resolve("useNew").is_some());
        assert_eq!(resolver.resolve("helper"), None);
        assert!(resolver.resolve("useGlobal").is_some());
    }

    #[tokio::test]
    async fn test_listener_stops_when_channel_closes() {
        let temp = project();
        let mut facility = FakeFacility::new(16);
        let resolver = builder(temp.path()).build(Session::Serve(&mut facility));

        drop(facility);
        settle().await;

        assert!(!resolver.is_listening());
        assert!(resolver.resolve("useFoo").is_some());
    }

    #[test]
    fn test_serve_without_runtime_keeps_scan() {
        let temp = project();
        let mut facility = FakeFacility::new(16);
        let resolver = builder(temp.path()).build(Session::Serve(&mut facility));

        assert!(!resolver.is_listening());
        assert_eq!(facility.watched.len(), 1);
        assert!(resolver.resolve("useFoo").is_some());
    }

    #[test]
    fn test_registers_as_resolver() {
        let temp = project();
        let chain = crate::resolver::ResolverChain::new()
            .with(builder(temp.path()).build(Session::Build))
            .with(|name: &str| Some(format!("/fallback/{}", name)));

        assert_eq!(chain.resolve("useFoo").as_deref(), Some("/src/composables/useFoo"));
        assert_eq!(chain.resolve("bar").as_deref(), Some("/fallback/bar"));
    }
}
