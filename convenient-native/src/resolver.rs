// Include resolver for C/C++ sources
// Maps include directives to files using compiler-style search order

use crate::types::{IncludeDirective, IncludeKind, MacroDirective, ResolvedInclude, SourceDirectives};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Maximum number of macro-to-macro hops followed for one directive
const MAX_MACRO_DEPTH: usize = 16;

/// A macro as seen from one point in one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct MacroBinding {
    /// Distinct replacement texts that may be in effect
    values: Vec<String>,
    /// Defined with a parameter list somewhere along the way
    function_like: bool,
    /// A conditional `#undef` may have removed it
    maybe_undefined: bool,
}

/// Macros visible at a given line of a given file.
///
/// Built from the external table plus the file's own `#define`/`#undef`
/// lines that precede the point of use. Never shared across files.
///
/// Conditional blocks are not evaluated, so every definition that may be in
/// effect is kept: a local `#define` adds to an external value rather than
/// replacing it, and an `#undef` inside a conditional block leaves the macro
/// possibly undefined. Either way the macro stops expanding to one target.
#[derive(Debug, Clone, Default)]
pub struct MacroScope {
    bindings: HashMap<String, MacroBinding>,
}

impl MacroScope {
    /// Scope holding only externally supplied macros
    #[must_use]
    pub fn from_external(macros: &BTreeMap<String, String>) -> Self {
        let bindings = macros
            .iter()
            .map(|(name, value)| {
                (
                    name.clone(),
                    MacroBinding {
                        values: vec![value.trim().to_string()],
                        ..MacroBinding::default()
                    },
                )
            })
            .collect();
        Self { bindings }
    }

    /// Apply one macro event from the file being scanned.
    pub fn apply(&mut self, event: &MacroDirective) {
        match event {
            MacroDirective::Define { name, value, .. } => {
                let binding = self.bindings.entry(name.clone()).or_default();
                if !binding.values.contains(value) {
                    binding.values.push(value.clone());
                }
            }
            MacroDirective::DefineFunction { name, .. } => {
                self.bindings.entry(name.clone()).or_default().function_like = true;
            }
            MacroDirective::Undef { name, conditional: false, .. } => {
                let _ = self.bindings.remove(name);
            }
            MacroDirective::Undef { name, conditional: true, .. } => {
                self.bindings.entry(name.clone()).or_default().maybe_undefined = true;
            }
        }
    }

    /// Reduce a macro name to one literal include target.
    ///
    /// Returns `None` when the macro is undefined or possibly undefined,
    /// function-like, defined with more than one distinct value, or expands to
    /// something that is not a quoted/bracketed path or another macro name.
    #[must_use]
    pub fn expand(&self, name: &str) -> Option<(IncludeKind, String)> {
        let mut current = name.to_string();
        let mut seen = HashSet::new();

        for _ in 0..MAX_MACRO_DEPTH {
            if !is_identifier(&current) || !seen.insert(current.clone()) {
                return None;
            }
            let binding = self.bindings.get(&current)?;
            if binding.function_like || binding.maybe_undefined || binding.values.len() != 1 {
                return None;
            }
            let value = binding.values[0].as_str();
            if let Some(target) = strip_delimiters(value, '"', '"') {
                return Some((IncludeKind::Quoted, target.to_string()));
            }
            if let Some(target) = strip_delimiters(value, '<', '>') {
                return Some((IncludeKind::System, target.to_string()));
            }
            current = value.to_string();
        }

        None
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn strip_delimiters(value: &str, open: char, close: char) -> Option<&str> {
    let inner = value.strip_prefix(open)?.strip_suffix(close)?;
    (!inner.is_empty() && !inner.contains(close)).then_some(inner)
}

/// Resolves include directives against an ordered list of search roots
#[derive(Debug, Clone, Default)]
pub struct IncludeResolver {
    /// Search roots (in priority order)
    search_roots: Vec<PathBuf>,
    /// Macros supplied by the build configuration
    external_macros: BTreeMap<String, String>,
}

impl IncludeResolver {
    /// Create a resolver over `search_roots`, searched in the given order
    pub fn new<I, P>(search_roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut resolver = Self::default();
        for root in search_roots {
            let root = root.into();
            if !resolver.search_roots.contains(&root) {
                resolver.search_roots.push(root);
            }
        }
        resolver
    }

    /// Add externally defined macros (`-D NAME=VALUE` equivalents)
    #[must_use]
    pub fn with_macros(mut self, macros: BTreeMap<String, String>) -> Self {
        self.external_macros = macros;
        self
    }

    /// Search roots in priority order
    #[must_use]
    pub fn search_roots(&self) -> &[PathBuf] {
        &self.search_roots
    }

    /// Resolve one directive.
    ///
    /// Quoted targets are looked up next to the requesting file first, then in
    /// each search root; system targets only in the search roots. The first
    /// existing file wins. Missing files yield no candidates; macro references
    /// that cannot be narrowed to one literal target are flagged.
    #[must_use]
    pub fn resolve(
        &self,
        directive: &IncludeDirective,
        scope: &MacroScope,
        requesting_dir: &Path,
    ) -> ResolvedInclude {
        let literal = match directive.kind {
            IncludeKind::Quoted | IncludeKind::System => Some((directive.kind, directive.target.clone())),
            IncludeKind::MacroReference => scope.expand(&directive.target),
        };

        let Some((kind, target)) = literal else {
            debug!("Unresolvable macro include {} at line {}", directive, directive.line);
            return ResolvedInclude {
                directive: directive.clone(),
                candidates: Vec::new(),
                macro_unresolved: true,
            };
        };

        let found = match kind {
            IncludeKind::Quoted => self.find(&target, Some(requesting_dir)),
            _ => self.find(&target, None),
        };
        if found.is_none() {
            debug!("Include target not found: {}", target);
        }

        ResolvedInclude {
            directive: directive.clone(),
            candidates: found.into_iter().collect(),
            macro_unresolved: false,
        }
    }

    /// Resolve every include of a file, tracking the macros it defines as it goes.
    #[must_use]
    pub fn resolve_all(&self, directives: &SourceDirectives, requesting_file: &Path) -> Vec<ResolvedInclude> {
        let requesting_dir = requesting_file.parent().unwrap_or_else(|| Path::new("."));
        let mut scope = MacroScope::from_external(&self.external_macros);
        let mut events = directives.macros.iter().peekable();

        directives
            .includes
            .iter()
            .map(|include| {
                while let Some(event) = events.next_if(|e| e.line() < include.line) {
                    scope.apply(event);
                }
                self.resolve(include, &scope, requesting_dir)
            })
            .collect()
    }

    /// First existing file for `target`, optionally trying `local_dir` first.
    fn find(&self, target: &str, local_dir: Option<&Path>) -> Option<PathBuf> {
        let target_path = Path::new(target);
        if target_path.is_absolute() {
            return target_path.is_file().then(|| clean_path(target_path));
        }

        local_dir
            .into_iter()
            .chain(self.search_roots.iter().map(PathBuf::as_path))
            .map(|dir| dir.join(target_path))
            .find(|candidate| candidate.is_file())
            .map(|candidate| clean_path(&candidate))
    }
}

/// Drop `.` components so equivalent spellings share one memo key.
fn clean_path(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
