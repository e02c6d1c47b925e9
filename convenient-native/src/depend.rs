//! Header dependency report
//!
//! The sorted list of headers a build unit depends on, one absolute path per
//! line. When a macro include made the set imprecise, every file under every
//! include root is listed.

use crate::error::{NativeError, Result};
use crate::graph::files_under;
use crate::state::IncrementalCompilation;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Headers a build unit depends on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderDependencies {
    headers: BTreeSet<PathBuf>,
}

impl HeaderDependencies {
    /// Collect from a finished run.
    #[must_use]
    pub fn from_compilation(compilation: &IncrementalCompilation, include_roots: &[PathBuf]) -> Self {
        let mut headers = compilation.discovered_inputs.clone();
        if compilation.used_macro_include {
            for root in include_roots {
                info!("Adding files in {} to header dependencies", root.display());
            }
            headers.extend(files_under(include_roots));
        }
        Self { headers }
    }

    /// Headers in path order
    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.headers.iter()
    }

    /// Number of headers
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// No headers
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Text form: one path per line
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for header in &self.headers {
            let _ = writeln!(out, "{}", header.display());
        }
        out
    }

    /// Write the text form to `path`, replacing it atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written; any existing file is
    /// left untouched in that case.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| NativeError::io(&dir, e))?;

        let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| NativeError::io(&dir, e))?;
        temp.write_all(self.render().as_bytes())
            .map_err(|e| NativeError::io(temp.path(), e))?;
        temp.as_file().sync_all().map_err(|e| NativeError::io(temp.path(), e))?;
        let _ = temp.persist(path).map_err(|e| NativeError::io(path, e.error))?;

        Ok(())
    }
}
