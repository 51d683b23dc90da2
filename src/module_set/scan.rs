//! Initial directory scan.

use crate::module_set::store::module_name;
use globwalk::{FileType, GlobWalkerBuilder};
use std::collections::HashSet;
use std::path::{Component, Path};

/// Collect the module names of every file below `dir`.
///
/// Symlinks are followed, so a linked file counts as a module. Hidden files
/// and anything inside hidden directories are skipped. A missing or
/// unreadable directory yields an empty set.
pub fn scan_module_names(dir: &Path) -> HashSet<String> {
    if !dir.is_dir() {
        tracing::debug!("Module directory {} does not exist", dir.display());
        return HashSet::new();
    }

    let walker = match GlobWalkerBuilder::from_patterns(dir, &["**/*"])
        .file_type(FileType::FILE)
        .follow_links(true)
        .build()
    {
        Ok(walker) => walker,
        Err(e) => {
            tracing::warn!("Failed to build glob walker for {}: {}", dir.display(), e);
            return HashSet::new();
        }
    };

    let names: HashSet<String> = walker
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry under {}: {}", dir.display(), e);
                None
            }
        })
        .filter(|entry| !is_hidden(dir, entry.path()))
        .map(|entry| module_name(entry.path()))
        .collect();

    tracing::debug!("Scanned {} modules in {}", names.len(), dir.display());
    names
}

fn is_hidden(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|component| match component {
            Component::Normal(part) => part.to_string_lossy().starts_with('.'),
            _ => false,
        })
}
