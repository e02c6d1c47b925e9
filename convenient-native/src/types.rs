//! Core types shared by the parser, resolver and processor

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

/// Content fingerprint (SHA-256 of the file bytes)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash(String);

impl ContentHash {
    /// Create from raw bytes
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Get hex string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form, like git
        write!(f, "{}", self.0.get(..8).unwrap_or(&self.0))
    }
}

/// How an include directive names its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncludeKind {
    /// `#include "foo.h"`
    Quoted,
    /// `#include <foo.h>`
    System,
    /// `#include FOO_HEADER`
    MacroReference,
}

/// A single include (or import) directive found in a file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncludeDirective {
    /// Directive kind
    pub kind: IncludeKind,
    /// Literal path for quoted/system directives, macro name otherwise
    pub target: String,
    /// Whether this came from `#import`
    pub import: bool,
    /// 1-based line the directive starts on
    pub line: usize,
}

impl IncludeDirective {
    /// Quoted include on `line`.
    pub fn quoted(target: impl Into<String>, line: usize) -> Self {
        Self {
            kind: IncludeKind::Quoted,
            target: target.into(),
            import: false,
            line,
        }
    }

    /// System include on `line`.
    pub fn system(target: impl Into<String>, line: usize) -> Self {
        Self {
            kind: IncludeKind::System,
            target: target.into(),
            import: false,
            line,
        }
    }

    /// Macro-referenced include on `line`.
    pub fn macro_reference(name: impl Into<String>, line: usize) -> Self {
        Self {
            kind: IncludeKind::MacroReference,
            target: name.into(),
            import: false,
            line,
        }
    }
}

impl fmt::Display for IncludeDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = if self.import { "#import" } else { "#include" };
        match self.kind {
            IncludeKind::Quoted => write!(f, "{keyword} \"{}\"", self.target),
            IncludeKind::System => write!(f, "{keyword} <{}>", self.target),
            IncludeKind::MacroReference => write!(f, "{keyword} {}", self.target),
        }
    }
}

/// A preprocessor macro event recorded while scanning a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacroDirective {
    /// `#define NAME value` (object-like)
    Define {
        /// Macro name
        name: String,
        /// Replacement text, trimmed
        value: String,
        /// 1-based line
        line: usize,
    },
    /// `#define NAME(args) ...`; never usable as an include target
    DefineFunction {
        /// Macro name
        name: String,
        /// 1-based line
        line: usize,
    },
    /// `#undef NAME`
    Undef {
        /// Macro name
        name: String,
        /// Sits inside an `#if`/`#ifdef`/`#ifndef` block
        conditional: bool,
        /// 1-based line
        line: usize,
    },
}

impl MacroDirective {
    /// Line this event is on
    #[must_use]
    pub fn line(&self) -> usize {
        match self {
            Self::Define { line, .. } | Self::DefineFunction { line, .. } | Self::Undef { line, .. } => {
                *line
            }
        }
    }
}

/// Everything the parser extracts from one file, in line order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDirectives {
    /// Include and import directives
    pub includes: Vec<IncludeDirective>,
    /// Macro definitions and removals
    pub macros: Vec<MacroDirective>,
}

/// An include directive together with the files it resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInclude {
    /// The directive as written
    pub directive: IncludeDirective,
    /// Candidate files; empty when unresolvable or missing
    pub candidates: Vec<PathBuf>,
    /// Set when a macro reference could not be narrowed to one literal target
    pub macro_unresolved: bool,
}
