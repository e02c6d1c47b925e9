//! Persistent compilation state and the per-run verdict

use crate::types::{ContentHash, IncludeDirective};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Last known state of one source or header file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    /// Content fingerprint
    pub fingerprint: ContentHash,
    /// Files the includes of this file resolved to
    #[serde(default)]
    pub resolved_includes: BTreeSet<PathBuf>,
}

/// Everything remembered about one build unit between runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationState {
    /// Declared sources of the run that produced this state
    #[serde(default)]
    pub sources: BTreeSet<PathBuf>,
    /// Every source and header touched by that run
    #[serde(default)]
    pub files: BTreeMap<PathBuf, FileState>,
    /// Some file used an include macro that could not be narrowed to one file
    #[serde(default)]
    pub used_macro_include: bool,
}

impl CompilationState {
    /// Recorded state of `path`, if any
    #[must_use]
    pub fn file(&self, path: &Path) -> Option<&FileState> {
        self.files.get(path)
    }

    /// Whether `path` was a declared source
    #[must_use]
    pub fn is_source(&self, path: &Path) -> bool {
        self.sources.contains(path)
    }
}

/// Outcome of one processing run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncrementalCompilation {
    /// Sources to hand to the compiler this run
    pub to_recompile: BTreeSet<PathBuf>,
    /// Sources whose outputs should be deleted
    pub removed: BTreeSet<PathBuf>,
    /// Files the surrounding build must track as inputs of this unit
    pub discovered_inputs: BTreeSet<PathBuf>,
    /// Include directives parsed from each declared source this run
    pub source_includes: BTreeMap<PathBuf, Vec<IncludeDirective>>,
    /// A macro include could not be narrowed to one file
    pub used_macro_include: bool,
    /// State to persist for the next run
    pub final_state: CompilationState,
}

impl IncrementalCompilation {
    /// Nothing to compile and nothing to delete
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.to_recompile.is_empty() && self.removed.is_empty()
    }
}
