//! Incremental compile processor
//!
//! Diffs the current include graph against the previous compilation state:
//! 1. Scan every declared source and its transitive includes
//! 2. Mark files dirty: new, fingerprint changed, includes re-resolved
//!    differently, or unreadable
//! 3. Recompile every source that is new or reaches a dirty file
//! 4. Report previously declared sources that are gone as removed
//! 5. Under an unresolvable macro include, declare every file under every
//!    search root as a discovered input
//!
//! The previous state is only read; the state for the next run is returned
//! in the verdict and replaces the old one wholesale.

use crate::config::CompileConfig;
use crate::directive::DirectiveParser;
use crate::error::{NativeError, Result};
use crate::graph::{FileGraph, IncludeGraph, files_under};
use crate::resolver::IncludeResolver;
use crate::state::{CompilationState, FileState, IncrementalCompilation};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Why a source ended up in the recompile set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecompileReason {
    /// No usable previous state for the unit
    NoPreviousState,
    /// Not a declared source last time
    NewSource,
    /// The source itself could not be read
    Unreadable,
    /// The source itself changed
    Changed,
    /// A file it includes, directly or transitively, changed
    DependencyChanged(PathBuf),
}

/// Orchestrates parsing, resolution and diffing for one build unit
#[derive(Debug)]
pub struct IncrementalCompileProcessor {
    parser: DirectiveParser,
    resolver: IncludeResolver,
    discover_inputs: bool,
    pool: Option<rayon::ThreadPool>,
}

impl IncrementalCompileProcessor {
    /// Processor for a normalized configuration
    ///
    /// # Errors
    ///
    /// Fails if a dedicated worker pool was requested and cannot be started.
    pub fn new(config: &CompileConfig) -> Result<Self> {
        let pool = match config.max_parallel {
            Some(workers) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .thread_name(|i| format!("include-scan-{i}"))
                    .build()
                    .map_err(|e| NativeError::InvalidConfig(format!("cannot start worker pool: {e}")))?,
            ),
            None => None,
        };

        Ok(Self {
            parser: DirectiveParser::new(config.imports_are_includes),
            resolver: IncludeResolver::new(config.include_roots.iter().cloned())
                .with_macros(config.macros.clone()),
            discover_inputs: config.discover_inputs,
            pool,
        })
    }

    /// Compute the verdict for `sources` against `previous`.
    ///
    /// `previous` of `None` means first run or lost state: every source is
    /// recompiled and nothing is removed.
    #[must_use]
    pub fn process(&self, sources: &[PathBuf], previous: Option<&CompilationState>) -> IncrementalCompilation {
        match &self.pool {
            Some(pool) => pool.install(|| self.process_inner(sources, previous)),
            None => self.process_inner(sources, previous),
        }
    }

    fn process_inner(&self, sources: &[PathBuf], previous: Option<&CompilationState>) -> IncrementalCompilation {
        let declared: BTreeSet<PathBuf> = sources.iter().cloned().collect();
        let graph = IncludeGraph::build(sources, &self.parser, &self.resolver);

        let closures: BTreeMap<PathBuf, BTreeSet<PathBuf>> = declared
            .par_iter()
            .map(|source| (source.clone(), graph.reachable(source)))
            .collect();

        let dirty = previous.map(|prev| dirty_files(&graph, prev)).unwrap_or_default();

        let mut to_recompile = BTreeSet::new();
        for (source, closure) in &closures {
            if let Some(reason) = recompile_reason(source, closure, &graph, previous, &dirty) {
                debug!("Recompiling {}: {:?}", source.display(), reason);
                let _ = to_recompile.insert(source.clone());
            }
        }

        let removed: BTreeSet<PathBuf> = previous
            .map(|prev| prev.sources.difference(&declared).cloned().collect())
            .unwrap_or_default();

        let used_macro_include = graph.uses_unresolved_macro_include()
            || (previous.is_some_and(|prev| prev.used_macro_include) && graph.has_unknown());

        let mut discovered_inputs: BTreeSet<PathBuf> = closures.values().flatten().cloned().collect();
        if used_macro_include && self.discover_inputs {
            info!(
                "Cannot calculate the exact set of include files; every file in the include search path is considered an input"
            );
            for root in self.resolver.search_roots() {
                info!("Adding files in {} to discovered inputs", root.display());
            }
            discovered_inputs.extend(files_under(self.resolver.search_roots()));
        }

        let source_includes = declared
            .iter()
            .map(|source| {
                let directives = graph
                    .node(source)
                    .and_then(FileGraph::scanned)
                    .map(|file| file.directives.clone())
                    .unwrap_or_default();
                (source.clone(), directives)
            })
            .collect();

        let final_state = CompilationState {
            sources: declared,
            files: graph
                .nodes()
                .filter_map(|(path, node)| {
                    node.scanned().map(|file| {
                        (
                            path.clone(),
                            FileState {
                                fingerprint: file.fingerprint.clone(),
                                resolved_includes: file.resolved_includes.clone(),
                            },
                        )
                    })
                })
                .collect(),
            used_macro_include,
        };

        info!(
            "Processed {} sources ({} files): {} to recompile, {} removed, {} discovered inputs",
            closures.len(),
            graph.len(),
            to_recompile.len(),
            removed.len(),
            discovered_inputs.len()
        );

        IncrementalCompilation {
            to_recompile,
            removed,
            discovered_inputs,
            source_includes,
            used_macro_include,
            final_state,
        }
    }
}

/// Files whose current scan differs from what `previous` recorded.
fn dirty_files(graph: &IncludeGraph, previous: &CompilationState) -> BTreeSet<PathBuf> {
    graph
        .nodes()
        .filter(|(path, node)| match (node, previous.file(path)) {
            (FileGraph::Unknown(_), _) | (FileGraph::Known(_), None) => true,
            (FileGraph::Known(current), Some(before)) => {
                current.fingerprint != before.fingerprint || current.resolved_includes != before.resolved_includes
            }
        })
        .map(|(path, _)| path.clone())
        .collect()
}

fn recompile_reason(
    source: &Path,
    closure: &BTreeSet<PathBuf>,
    graph: &IncludeGraph,
    previous: Option<&CompilationState>,
    dirty: &BTreeSet<PathBuf>,
) -> Option<RecompileReason> {
    let Some(previous) = previous else {
        return Some(RecompileReason::NoPreviousState);
    };
    if matches!(graph.node(source), Some(FileGraph::Unknown(_)) | None) {
        return Some(RecompileReason::Unreadable);
    }
    if !previous.is_source(source) {
        return Some(RecompileReason::NewSource);
    }
    if dirty.contains(source) {
        return Some(RecompileReason::Changed);
    }
    closure
        .iter()
        .find(|file| dirty.contains(*file))
        .map(|file| RecompileReason::DependencyChanged(file.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn processor(roots: &[PathBuf]) -> IncrementalCompileProcessor {
        let config = CompileConfig::new("test").include_roots(roots.iter().cloned());
        IncrementalCompileProcessor::new(&config).unwrap()
    }

    #[test]
    fn test_first_run_recompiles_everything() {
        let temp = TempDir::new().unwrap();
        let a = write(temp.path(), "a.c", "#include \"x.h\"\n");
        let b = write(temp.path(), "b.c", "");
        let x = write(temp.path(), "x.h", "");

        let result = processor(&[]).process(&[a.clone(), b.clone()], None);

        assert_eq!(result.to_recompile, BTreeSet::from([a.clone(), b]));
        assert!(result.removed.is_empty());
        assert_eq!(result.discovered_inputs, BTreeSet::from([x.clone()]));
        assert_eq!(result.final_state.files.len(), 3);
        assert_eq!(
            result.final_state.file(&a).map(|f| f.resolved_includes.clone()),
            Some(BTreeSet::from([x]))
        );
    }

    #[test]
    fn test_unchanged_second_run_is_up_to_date() {
        let temp = TempDir::new().unwrap();
        let main = write(temp.path(), "main.c", "#include \"util.h\"\n");
        let _ = write(temp.path(), "util.h", "int util(void);\n");
        let processor = processor(&[]);

        let first = processor.process(&[main.clone()], None);
        let second = processor.process(&[main], Some(&first.final_state));

        assert!(second.is_up_to_date());
        assert_eq!(second.final_state, first.final_state);
    }

    #[test]
    fn test_reason_reports_changed_dependency() {
        let temp = TempDir::new().unwrap();
        let main = write(temp.path(), "main.c", "#include \"util.h\"\n");
        let util = write(temp.path(), "util.h", "int util(void);\n");
        let processor = processor(&[]);
        let first = processor.process(&[main.clone()], None);

        fs::write(&util, "long util(void);\n").unwrap();
        let graph = IncludeGraph::build(&[main.clone()], &processor.parser, &processor.resolver);
        let dirty = dirty_files(&graph, &first.final_state);
        let closure = graph.reachable(&main);

        assert_eq!(dirty, BTreeSet::from([util.clone()]));
        assert_eq!(
            recompile_reason(&main, &closure, &graph, Some(&first.final_state), &dirty),
            Some(RecompileReason::DependencyChanged(util))
        );
    }

    #[test]
    fn test_new_source_is_recompiled_alone() {
        let temp = TempDir::new().unwrap();
        let a = write(temp.path(), "a.c", "");
        let b = write(temp.path(), "b.c", "");
        let processor = processor(&[]);

        let first = processor.process(&[a.clone()], None);
        let second = processor.process(&[a, b.clone()], Some(&first.final_state));

        assert_eq!(second.to_recompile, BTreeSet::from([b]));
        assert!(second.removed.is_empty());
    }

    #[test]
    fn test_header_promoted_to_source_is_new() {
        let temp = TempDir::new().unwrap();
        let main = write(temp.path(), "main.c", "#include \"inline.c\"\n");
        let inline = write(temp.path(), "inline.c", "");
        let processor = processor(&[]);

        let first = processor.process(&[main.clone()], None);
        let second = processor.process(&[main, inline.clone()], Some(&first.final_state));

        assert_eq!(second.to_recompile, BTreeSet::from([inline]));
    }

    #[test]
    fn test_reresolution_without_content_change_is_dirty() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let first_root = temp.path().join("first");
        let second_root = temp.path().join("second");
        let main = write(&src, "main.c", "#include <api.h>\n");
        let _ = write(&second_root, "api.h", "int v1;\n");
        let processor = processor(&[first_root.clone(), second_root]);

        let first = processor.process(&[main.clone()], None);

        // Same bytes, but now shadowed by an earlier search root
        let _ = write(&first_root, "api.h", "int v1;\n");
        let second = processor.process(&[main.clone()], Some(&first.final_state));

        assert_eq!(second.to_recompile, BTreeSet::from([main]));
        assert!(second.discovered_inputs.contains(&first_root.join("api.h")));
    }

    #[test]
    fn test_unreadable_source_is_always_recompiled() {
        let temp = TempDir::new().unwrap();
        let main = write(temp.path(), "main.c", "");
        let processor = processor(&[]);
        let first = processor.process(&[main.clone()], None);

        fs::remove_file(&main).unwrap();
        let second = processor.process(&[main.clone()], Some(&first.final_state));

        assert_eq!(second.to_recompile, BTreeSet::from([main.clone()]));
        assert!(second.final_state.file(&main).is_none());
        assert!(second.final_state.is_source(&main));
    }

    #[test]
    fn test_macro_flag_sticks_while_graph_is_unknown() {
        let temp = TempDir::new().unwrap();
        let main = write(temp.path(), "main.c", "");
        let processor = processor(&[]);

        let previous = CompilationState {
            used_macro_include: true,
            ..CompilationState::default()
        };
        let known = processor.process(&[main.clone()], Some(&previous));
        assert!(!known.used_macro_include);

        let missing = temp.path().join("missing.c");
        let unknown = processor.process(&[main, missing], Some(&previous));
        assert!(unknown.used_macro_include);
    }

    #[test]
    fn test_dedicated_pool() {
        let temp = TempDir::new().unwrap();
        let main = write(temp.path(), "main.c", "#include \"a.h\"\n");
        let _ = write(temp.path(), "a.h", "");
        let config = CompileConfig::new("test").max_parallel(2);
        let processor = IncrementalCompileProcessor::new(&config).unwrap();

        let result = processor.process(&[main.clone()], None);
        assert_eq!(result.to_recompile, BTreeSet::from([main]));
        assert_eq!(result.discovered_inputs.len(), 1);
    }

    #[traced_test]
    #[test]
    fn test_macro_fallback_declares_search_roots() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("include");
        let main = write(temp.path(), "main.c", "#include PLATFORM_HEADER\n");
        let other = write(temp.path(), "other.c", "#include \"used.h\"\n");
        let used = write(&root, "used.h", "");
        let unrelated = write(&root, "deep/unrelated.h", "");

        let result = processor(&[root]).process(&[main, other], None);

        assert!(result.used_macro_include);
        assert!(result.final_state.used_macro_include);
        assert!(result.discovered_inputs.contains(&used));
        assert!(result.discovered_inputs.contains(&unrelated));
        assert!(logs_contain("Cannot calculate the exact set of include files"));
    }

    #[test]
    fn test_macro_fallback_can_be_disabled() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("include");
        let main = write(temp.path(), "main.c", "#include PLATFORM_HEADER\n");
        let _ = write(&root, "unrelated.h", "");
        let config = CompileConfig::new("test").include_root(&root).discover_inputs(false);

        let result = IncrementalCompileProcessor::new(&config).unwrap().process(&[main], None);

        assert!(result.used_macro_include);
        assert!(result.discovered_inputs.is_empty());
    }
}
