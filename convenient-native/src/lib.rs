//! Include discovery and incremental recompilation for C/C++ family builds.
//!
//! Decides, for one build unit, which sources must be recompiled given the
//! state recorded by the previous run and the current source tree:
//!
//! - **directive**: permissive scan for `#include`/`#import`/`#define` lines
//! - **resolver**: compiler-style include search, with per-file macro scopes
//! - **graph**: parallel, memoized walk of the transitive include graph
//! - **processor**: diff against the previous state, transitive invalidation
//! - **store**: persisted state per build unit, published atomically
//! - **compiler**: load, process and persist for one build unit
//!
//! # Example
//!
//! ```no_run
//! use convenient_native::{CompileConfig, FileStateStore, IncrementalCompiler};
//!
//! # fn example() -> convenient_native::Result<()> {
//! let compiler = IncrementalCompiler::new(FileStateStore::new("build/native-state"));
//! let config = CompileConfig::new(":app:compileCpp")
//!     .include_root("src/include")
//!     .source("src/main.cpp");
//!
//! let compilation = compiler.execute(&config)?;
//! for source in &compilation.to_recompile {
//!     println!("compile {}", source.display());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(unused_results)]

pub mod compiler;
pub mod config;
pub mod depend;
pub mod directive;
pub mod error;
pub mod graph;
pub mod processor;
pub mod resolver;
pub mod state;
pub mod store;
pub mod types;

pub use compiler::IncrementalCompiler;
pub use config::{CompileConfig, CompileMode};
pub use depend::HeaderDependencies;
pub use directive::DirectiveParser;
pub use error::{NativeError, Result};
pub use graph::{FileGraph, IncludeGraph, ScannedFile};
pub use processor::{IncrementalCompileProcessor, RecompileReason};
pub use resolver::{IncludeResolver, MacroScope};
pub use state::{CompilationState, FileState, IncrementalCompilation};
pub use store::{FileStateStore, InMemoryStateStore, StateStore};
pub use types::{ContentHash, IncludeDirective, IncludeKind, MacroDirective, ResolvedInclude, SourceDirectives};
