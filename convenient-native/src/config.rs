//! Explicit configuration for one processing run

use crate::error::{NativeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Whether previous state may be used
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompileMode {
    /// Diff against the stored state of the unit
    #[default]
    Incremental,
    /// Ignore stored state and recompile every declared source
    Clean,
}

/// Inputs supplied by the surrounding build task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Build unit identity, used as the store key
    pub unit_id: String,

    /// Header search roots, in compiler search order
    #[serde(default)]
    pub include_roots: Vec<PathBuf>,

    /// Declared source files
    #[serde(default)]
    pub sources: Vec<PathBuf>,

    /// Macros defined on the compiler command line
    #[serde(default)]
    pub macros: BTreeMap<String, String>,

    /// Toolchain treats `#import` as `#include`
    #[serde(default)]
    pub imports_are_includes: bool,

    /// Incremental or clean run
    #[serde(default)]
    pub mode: CompileMode,

    /// Expand search roots into discovered inputs when a macro include is used
    #[serde(default = "default_true")]
    pub discover_inputs: bool,

    /// Worker threads for parsing; `None` uses the global pool
    #[serde(default)]
    pub max_parallel: Option<usize>,
}

fn default_true() -> bool {
    true
}

impl CompileConfig {
    /// Configuration for `unit_id` with nothing declared yet
    pub fn new(unit_id: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            discover_inputs: true,
            ..Self::default()
        }
    }

    /// Append a search root
    #[must_use]
    pub fn include_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.include_roots.push(root.into());
        self
    }

    /// Append several search roots
    #[must_use]
    pub fn include_roots<I, P>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.include_roots.extend(roots.into_iter().map(Into::into));
        self
    }

    /// Declare a source file
    #[must_use]
    pub fn source(mut self, source: impl Into<PathBuf>) -> Self {
        self.sources.push(source.into());
        self
    }

    /// Declare several source files
    #[must_use]
    pub fn sources<I, P>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.sources.extend(sources.into_iter().map(Into::into));
        self
    }

    /// Define a macro
    #[must_use]
    pub fn macro_def(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.macros.insert(name.into(), value.into());
        self
    }

    /// Set `#import` handling
    #[must_use]
    pub fn imports_are_includes(mut self, enabled: bool) -> Self {
        self.imports_are_includes = enabled;
        self
    }

    /// Set the run mode
    #[must_use]
    pub fn mode(mut self, mode: CompileMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set search-root expansion under the macro fallback
    #[must_use]
    pub fn discover_inputs(mut self, enabled: bool) -> Self {
        self.discover_inputs = enabled;
        self
    }

    /// Bound the parser worker pool
    #[must_use]
    pub fn max_parallel(mut self, workers: usize) -> Self {
        self.max_parallel = Some(workers);
        self
    }

    /// Check the configuration and make every path absolute.
    ///
    /// Sources are deduplicated and sorted; search roots keep their order
    /// with later duplicates dropped.
    ///
    /// # Errors
    ///
    /// Fails on an empty unit identity, a zero worker count, or when the
    /// working directory is needed and unavailable.
    pub fn normalized(&self) -> Result<Self> {
        if self.unit_id.trim().is_empty() {
            return Err(NativeError::InvalidConfig("unit id must not be empty".to_string()));
        }
        if self.max_parallel == Some(0) {
            return Err(NativeError::InvalidConfig("max_parallel must be at least 1".to_string()));
        }

        let mut include_roots: Vec<PathBuf> = Vec::with_capacity(self.include_roots.len());
        for root in &self.include_roots {
            let root = absolute(root)?;
            if !include_roots.contains(&root) {
                include_roots.push(root);
            }
        }

        let mut sources = self
            .sources
            .iter()
            .map(|s| absolute(s))
            .collect::<Result<Vec<_>>>()?;
        sources.sort();
        sources.dedup();

        Ok(Self {
            include_roots,
            sources,
            ..self.clone()
        })
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| NativeError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = CompileConfig::new(":app:compileCpp")
            .include_root("/inc")
            .include_roots(["/sys", "/usr/include"])
            .source("/src/a.c")
            .sources(["/src/b.c"])
            .macro_def("HDR", "\"a.h\"")
            .imports_are_includes(true)
            .mode(CompileMode::Clean)
            .max_parallel(4);

        assert_eq!(config.include_roots.len(), 3);
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.macros.get("HDR").map(String::as_str), Some("\"a.h\""));
        assert!(config.imports_are_includes);
        assert!(config.discover_inputs);
        assert_eq!(config.mode, CompileMode::Clean);
        assert_eq!(config.max_parallel, Some(4));
    }

    #[test]
    fn test_normalized_paths() {
        let config = CompileConfig::new("unit")
            .include_roots(["/b", "/a", "/b"])
            .sources(["/src/z.c", "/src/a.c", "/src/z.c", "rel.c"])
            .normalized()
            .unwrap();

        assert_eq!(config.include_roots, vec![PathBuf::from("/b"), PathBuf::from("/a")]);
        assert_eq!(config.sources.len(), 3);
        assert!(config.sources.iter().all(|s| s.is_absolute()));
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(CompileConfig::new("  ").normalized().is_err());
        assert!(CompileConfig::new("unit").max_parallel(0).normalized().is_err());
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: CompileConfig = serde_json::from_str(r#"{ "unit_id": "unit" }"#).unwrap();
        assert!(config.discover_inputs);
        assert_eq!(config.mode, CompileMode::Incremental);
        assert!(config.sources.is_empty());
    }
}
