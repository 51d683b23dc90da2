//! Name resolution.
//!
//! This module provides:
//! - `dir_resolver`: the directory-backed resolver and its builder
//! - `chain`: the `Resolver` trait and the host's ordered resolver list
//! - `helper`: host lifecycle hooks that decide the session mode

pub mod chain;
pub mod dir_resolver;
pub mod helper;

pub use chain::{join_import_path, Resolver, ResolverChain};
pub use dir_resolver::{DirResolver, DirResolverBuilder};
pub use helper::{Command, DirResolverHelper, Session};
