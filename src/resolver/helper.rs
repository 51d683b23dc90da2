//! Host lifecycle wiring.
//!
//! The host calls `config` once with the command it is running and, for dev
//! servers, `configure_server` with its watch facility. `session` then hands
//! the resolver an explicit [`Session`] instead of process-wide state.

use crate::config::ConfigError;
use crate::module_set::WatchFacility;
use std::fmt;
use std::str::FromStr;

/// The command the host was started with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Long-running dev server that watches files.
    Serve,
    /// One-shot build.
    Build,
}

impl FromStr for Command {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "serve" => Ok(Command::Serve),
            "build" => Ok(Command::Build),
            other => Err(ConfigError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Serve => f.write_str("serve"),
            Command::Build => f.write_str("build"),
        }
    }
}

/// How a resolver should maintain its module set.
pub enum Session<'a> {
    /// One-shot build: the set is fixed after the initial scan.
    Build,
    /// Live dev session: keep the set in sync through the watch facility.
    Serve(&'a mut dyn WatchFacility),
}

impl Session<'_> {
    pub fn is_live(&self) -> bool {
        matches!(self, Session::Serve(_))
    }
}

impl fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Session::Build => f.write_str("Session::Build"),
            Session::Serve(_) => f.write_str("Session::Serve(..)"),
        }
    }
}

/// Helper plugin that captures the host's command and watch facility.
pub struct DirResolverHelper<W> {
    command: Option<Command>,
    watcher: Option<W>,
}

impl<W: WatchFacility> DirResolverHelper<W> {
    pub const NAME: &'static str = "vite-auto-import-resolvers:dir-resolver-helper";

    pub fn new() -> Self {
        Self {
            command: None,
            watcher: None,
        }
    }

    /// Config hook: record whether the host is serving or building.
    pub fn config(&mut self, command: Command) {
        tracing::debug!("{} running under `{}`", Self::NAME, command);
        self.command = Some(command);
    }

    /// Server hook: take the dev server's watch facility.
    pub fn configure_server(&mut self, watcher: W) {
        self.watcher = Some(watcher);
    }

    /// The session to hand to resolvers.
    pub fn session(&mut self) -> Session<'_> {
        match (self.command, self.watcher.as_mut()) {
            (Some(Command::Serve), Some(watcher)) => Session::Serve(watcher),
            (Some(Command::Serve), None) => {
                tracing::warn!("Serving without a configured watcher, modules will not update");
                Session::Build
            }
            _ => Session::Build,
        }
    }

    /// Hand the watch facility back so the host can drive it.
    pub fn into_watcher(self) -> Option<W> {
        self.watcher
    }
}

impl<W: WatchFacility> Default for DirResolverHelper<W> {
    fn default() -> Self {
        Self::new()
    }
}
