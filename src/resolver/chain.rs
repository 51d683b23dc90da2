//! Resolver trait and the host's ordered resolver list.

/// Maps a bare identifier to an import path, or `None` when it does not know
/// the name so the caller can try the next resolver.
pub trait Resolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<String>;
}

impl<F> Resolver for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn resolve(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Ordered list of resolvers; the first match wins.
#[derive(Default)]
pub struct ResolverChain {
    resolvers: Vec<Box<dyn Resolver>>,
}

impl ResolverChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, resolver: impl Resolver + 'static) {
        self.resolvers.push(Box::new(resolver));
    }

    pub fn with(mut self, resolver: impl Resolver + 'static) -> Self {
        self.push(resolver);
        self
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    pub fn resolve(&self, name: &str) -> Option<String> {
        self.resolvers
            .iter()
            .find_map(|resolver| resolver.resolve(name))
    }
}

/// Join import path segments with `/`, normalizing `.`, `..` and repeated
/// separators. A segment starting with `/` restarts the path from the root.
pub fn join_import_path(segments: &[&str]) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let mut absolute = false;

    for segment in segments {
        if segment.starts_with('/') {
            parts.clear();
            absolute = true;
        }

        for part in segment.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    if parts.last().is_some_and(|last| *last != "..") {
                        parts.pop();
                    } else if !absolute {
                        parts.push("..");
                    }
                }
                part => parts.push(part),
            }
        }
    }

    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}
