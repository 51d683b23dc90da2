//! Resolver configuration.
//!
//! Options mirror the plugin options a host passes in, and can also be loaded
//! from a JSON file:
//!
//! ```json
//! { "srcAlias": "/src/", "target": "composables", "prefix": "use", "include": ["useGlobal"] }
//! ```

use crate::module_set::FilterPredicate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Unknown command `{0}`, expected `serve` or `build`")]
    UnknownCommand(String),
}

/// Options for a directory resolver. Every field is optional in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResolverOptions {
    /// Project root; modules live in `<root>/src/<target>`.
    pub root: PathBuf,
    /// Root prefix of resolved import paths.
    pub src_alias: String,
    /// Subdirectory of `src` to scan and resolve into.
    pub target: String,
    /// Required prefix for modules added while watching.
    pub prefix: String,
    /// Required suffix for modules added while watching.
    pub suffix: String,
    /// Names that always resolve and survive deletion.
    pub include: Vec<String>,
    /// Names never added while watching.
    pub exclude: Vec<String>,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            src_alias: "/src/".to_string(),
            target: "composables".to_string(),
            prefix: String::new(),
            suffix: String::new(),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl ResolverOptions {
    /// Load options from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The directory holding the modules.
    pub fn target_dir(&self) -> PathBuf {
        self.root.join("src").join(&self.target)
    }

    pub(crate) fn filter(&self) -> FilterPredicate {
        FilterPredicate::new(
            self.prefix.clone(),
            self.suffix.clone(),
            self.exclude.iter().cloned(),
        )
    }
}
