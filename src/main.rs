//! Command-line front end for the directory resolver.
//!
//! Usage: `dir-resolver [serve|build] [options.json]`
//!
//! Reads candidate module names from stdin, one per line, and prints the
//! resolved import path for each. In `serve` mode the module directory is
//! watched while names are being read.

use anyhow::Result;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use dir_resolver::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("dir_resolver=debug".parse()?))
        .init();

    let mut args = std::env::args().skip(1);
    let command: Command = args.next().as_deref().unwrap_or("serve").parse()?;
    let options = match args.next() {
        Some(path) => ResolverOptions::from_file(Path::new(&path))?,
        None => ResolverOptions::default(),
    };

    let mut helper: DirResolverHelper<DebouncedFileWatcher> = DirResolverHelper::new();
    helper.config(command);

    if command == Command::Serve {
        // 200ms debounce, 1s polling fallback, 256 pending batches
        let (watcher, _rx) = DebouncedFileWatcher::new(200, 1000, 256)?;
        helper.configure_server(watcher);
    }

    let resolver = DirResolver::new(options, helper.session());
    eprintln!(
        "Resolving {} modules from {} ({})",
        resolver.modules().len(),
        resolver.dir().display(),
        command
    );

    let chain = ResolverChain::new().with(resolver);

    // Drive the watcher on its own task; the resolver's listener picks up
    // every batch it publishes.
    let watcher_task = helper.into_watcher().map(|mut watcher| {
        tokio::spawn(async move {
            dir_resolver::run_watcher_loop(&mut watcher, 50).await;
        })
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let name = line.trim();
                if name.is_empty() {
                    continue;
                }
                match chain.resolve(name) {
                    Some(path) => println!("{} -> {}", name, path),
                    None => println!("{} -> <no match>", name),
                }
            }
        }
    }

    if let Some(task) = watcher_task {
        task.abort();
        let _ = task.await;
    }

    Ok(())
}
