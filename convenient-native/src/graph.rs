//! Current-run include graph
//!
//! Built breadth-first in waves: every newly discovered path of a wave is
//! read, fingerprinted, parsed and resolved on the rayon pool, then published
//! into the arena before the next wave starts. Each path is scanned at most
//! once per run no matter how many files include it.

use crate::directive::DirectiveParser;
use crate::resolver::IncludeResolver;
use crate::types::{ContentHash, IncludeDirective};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A file that was read and scanned this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Content fingerprint of the current bytes
    pub fingerprint: ContentHash,
    /// Include directives, in line order
    pub directives: Vec<IncludeDirective>,
    /// Files the directives resolved to
    pub resolved_includes: BTreeSet<PathBuf>,
    /// Some macro include in this file could not be narrowed to one file
    pub macro_unresolved: bool,
}

/// What is known about one file this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileGraph {
    /// Read and scanned
    Known(ScannedFile),
    /// Could not be read; its dependencies are unknown
    Unknown(String),
}

impl FileGraph {
    /// Scan result, if the file could be read
    #[must_use]
    pub fn scanned(&self) -> Option<&ScannedFile> {
        match self {
            Self::Known(scanned) => Some(scanned),
            Self::Unknown(_) => None,
        }
    }
}

/// Arena of per-file results for one run, keyed by path
#[derive(Debug, Default)]
pub struct IncludeGraph {
    nodes: HashMap<PathBuf, FileGraph>,
}

impl IncludeGraph {
    /// Scan `sources` and everything they transitively include.
    ///
    /// Runs on the current rayon pool; wrap in `ThreadPool::install` to bound it.
    #[must_use]
    pub fn build(sources: &[PathBuf], parser: &DirectiveParser, resolver: &IncludeResolver) -> Self {
        let mut nodes: HashMap<PathBuf, FileGraph> = HashMap::new();
        let mut frontier: Vec<PathBuf> = sources.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
        let mut wave = 0;

        while !frontier.is_empty() {
            wave += 1;
            debug!("Include scan wave {}: {} files", wave, frontier.len());

            let scanned: Vec<(PathBuf, FileGraph)> = frontier
                .into_par_iter()
                .map(|path| {
                    let graph = scan_file(&path, parser, resolver);
                    (path, graph)
                })
                .collect();

            let mut discovered = BTreeSet::new();
            for (path, graph) in scanned {
                if let FileGraph::Known(file) = &graph {
                    discovered.extend(file.resolved_includes.iter().cloned());
                }
                let _ = nodes.insert(path, graph);
            }

            frontier = discovered
                .into_iter()
                .filter(|path| !nodes.contains_key(path))
                .collect();
        }

        Self { nodes }
    }

    /// Result for `path`, if it was reached
    #[must_use]
    pub fn node(&self, path: &Path) -> Option<&FileGraph> {
        self.nodes.get(path)
    }

    /// All reached files
    pub fn nodes(&self) -> impl Iterator<Item = (&PathBuf, &FileGraph)> {
        self.nodes.iter()
    }

    /// Number of reached files
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Nothing was reached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Some reached file could not be read
    #[must_use]
    pub fn has_unknown(&self) -> bool {
        self.nodes.values().any(|g| matches!(g, FileGraph::Unknown(_)))
    }

    /// Some reached file has an unresolvable macro include
    #[must_use]
    pub fn uses_unresolved_macro_include(&self) -> bool {
        self.nodes
            .values()
            .filter_map(FileGraph::scanned)
            .any(|file| file.macro_unresolved)
    }

    /// Every file reachable from `root` through resolved includes, excluding `root`.
    ///
    /// Include cycles are fine; unknown files contribute no edges.
    #[must_use]
    pub fn reachable(&self, root: &Path) -> BTreeSet<PathBuf> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&Path> = vec![root];

        while let Some(current) = stack.pop() {
            let Some(file) = self.nodes.get(current).and_then(FileGraph::scanned) else {
                continue;
            };
            for include in &file.resolved_includes {
                if include.as_path() != root && seen.insert(include.clone()) {
                    stack.push(include);
                }
            }
        }

        seen
    }
}

fn scan_file(path: &Path, parser: &DirectiveParser, resolver: &IncludeResolver) -> FileGraph {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Cannot read {}: {}; treating its dependencies as unknown", path.display(), e);
            return FileGraph::Unknown(e.to_string());
        }
    };

    let fingerprint = ContentHash::from_bytes(&bytes);
    let directives = parser.parse_bytes(&bytes);
    let resolved = resolver.resolve_all(&directives, path);

    let macro_unresolved = resolved.iter().any(|r| r.macro_unresolved);
    let resolved_includes = resolved.into_iter().flat_map(|r| r.candidates).collect();

    debug!(
        "Scanned {} [{}]: {} directives",
        path.display(),
        fingerprint,
        directives.includes.len()
    );

    FileGraph::Known(ScannedFile {
        fingerprint,
        directives: directives.includes,
        resolved_includes,
        macro_unresolved,
    })
}

/// Every regular file under the given roots; missing roots are skipped.
#[must_use]
pub fn files_under(roots: &[PathBuf]) -> BTreeSet<PathBuf> {
    roots
        .iter()
        .flat_map(|root| {
            WalkDir::new(root)
                .follow_links(true)
                .into_iter()
                .filter_map(std::result::Result::ok)
                .filter(|entry| entry.file_type().is_file())
                .map(walkdir::DirEntry::into_path)
        })
        .collect()
}
