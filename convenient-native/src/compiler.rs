//! Build-unit entry point: load state, process, persist

use crate::config::{CompileConfig, CompileMode};
use crate::error::Result;
use crate::processor::IncrementalCompileProcessor;
use crate::state::{CompilationState, IncrementalCompilation};
use crate::store::StateStore;
use tracing::{info, warn};

/// Runs the processor for one build unit against a state store.
///
/// The store is loaded once, before any scanning, and written once, after the
/// verdict is complete. Callers that only want to persist after their own
/// compiler invocation succeeded use [`Self::process`] then [`Self::commit`];
/// [`Self::execute`] does both.
#[derive(Debug)]
pub struct IncrementalCompiler<S> {
    store: S,
}

impl<S: StateStore> IncrementalCompiler<S> {
    /// Compiler over `store`
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Compute the verdict without persisting anything.
    ///
    /// # Errors
    ///
    /// Only for invalid configuration; unreadable files and unreadable state
    /// degrade the verdict instead.
    pub fn process(&self, config: &CompileConfig) -> Result<IncrementalCompilation> {
        let config = config.normalized()?;

        let previous = match config.mode {
            CompileMode::Incremental => self.store.load(&config.unit_id),
            CompileMode::Clean => {
                info!("Clean compile requested for {}; ignoring previous state", config.unit_id);
                None
            }
        };

        let processor = IncrementalCompileProcessor::new(&config)?;
        let compilation = processor.process(&config.sources, previous.as_ref());

        if compilation.used_macro_include {
            info!(
                "Macro include used in {}; include search paths are treated as inputs",
                config.unit_id
            );
        }

        Ok(compilation)
    }

    /// Persist the state of a finished compilation.
    ///
    /// A failed write invalidates the unit's old record as well, so the next
    /// run starts clean rather than trusting state that predates this run.
    pub fn commit(&self, unit_id: &str, compilation: &IncrementalCompilation) {
        self.commit_state(unit_id, &compilation.final_state);
    }

    /// Persist a final state computed by an earlier [`Self::process`] call,
    /// e.g. one handed over from a separate process.
    pub fn commit_state(&self, unit_id: &str, state: &CompilationState) {
        if let Err(e) = self.store.store(unit_id, state) {
            warn!("Failed to store compilation state for {}: {}", unit_id, e);
            if let Err(e) = self.store.invalidate(unit_id) {
                warn!("Failed to invalidate compilation state for {}: {}", unit_id, e);
            }
        }
    }

    /// Process and persist in one step.
    ///
    /// # Errors
    ///
    /// Only for invalid configuration.
    pub fn execute(&self, config: &CompileConfig) -> Result<IncrementalCompilation> {
        let compilation = self.process(config)?;
        self.commit(&config.unit_id, &compilation);
        Ok(compilation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NativeError;
    use crate::store::InMemoryStateStore;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    /// Store whose writes always fail
    #[derive(Default)]
    struct FailingStore {
        invalidated: AtomicBool,
    }

    impl StateStore for FailingStore {
        fn load(&self, _unit_id: &str) -> Option<CompilationState> {
            Some(CompilationState::default())
        }

        fn store(&self, _unit_id: &str, _state: &CompilationState) -> Result<()> {
            Err(NativeError::StateStore("disk full".to_string()))
        }

        fn invalidate(&self, _unit_id: &str) -> Result<()> {
            self.invalidated.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn source(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("main.c");
        fs::write(&path, "int main(void) { return 0; }\n").unwrap();
        path
    }

    #[test]
    fn test_execute_persists_state() {
        let temp = TempDir::new().unwrap();
        let main = source(&temp);
        let compiler = IncrementalCompiler::new(InMemoryStateStore::new());
        let config = CompileConfig::new(":app:compileC").source(&main);

        let first = compiler.execute(&config).unwrap();
        assert_eq!(first.to_recompile.len(), 1);
        assert_eq!(compiler.store().load(":app:compileC"), Some(first.final_state));

        let second = compiler.execute(&config).unwrap();
        assert!(second.is_up_to_date());
    }

    #[test]
    fn test_process_does_not_persist() {
        let temp = TempDir::new().unwrap();
        let main = source(&temp);
        let compiler = IncrementalCompiler::new(InMemoryStateStore::new());
        let config = CompileConfig::new("unit").source(&main);

        let _ = compiler.process(&config).unwrap();
        assert!(compiler.store().is_empty());

        let again = compiler.process(&config).unwrap();
        assert_eq!(again.to_recompile.len(), 1);
    }

    #[test]
    fn test_deferred_commit_of_handed_over_state() {
        let temp = TempDir::new().unwrap();
        let main = source(&temp);
        let compiler = IncrementalCompiler::new(InMemoryStateStore::new());
        let config = CompileConfig::new("unit").source(&main);

        let pending = compiler.process(&config).unwrap();
        let json = serde_json::to_string(&pending.final_state).unwrap();
        assert!(compiler.store().is_empty());

        let handed_over: CompilationState = serde_json::from_str(&json).unwrap();
        compiler.commit_state("unit", &handed_over);

        assert!(compiler.process(&config).unwrap().is_up_to_date());
    }

    #[test]
    fn test_clean_mode_ignores_previous_state() {
        let temp = TempDir::new().unwrap();
        let main = source(&temp);
        let compiler = IncrementalCompiler::new(InMemoryStateStore::new());
        let config = CompileConfig::new("unit").source(&main);

        let _ = compiler.execute(&config).unwrap();
        let clean = compiler.execute(&config.clone().mode(CompileMode::Clean)).unwrap();
        assert_eq!(clean.to_recompile.len(), 1);
        assert!(clean.removed.is_empty());

        // Clean runs still leave state behind
        let after = compiler.execute(&config).unwrap();
        assert!(after.is_up_to_date());
    }

    #[test]
    fn test_failed_store_invalidates_record() {
        let temp = TempDir::new().unwrap();
        let main = source(&temp);
        let compiler = IncrementalCompiler::new(FailingStore::default());

        let result = compiler.execute(&CompileConfig::new("unit").source(&main)).unwrap();
        assert_eq!(result.to_recompile.len(), 1);
        assert!(compiler.store().invalidated.load(Ordering::SeqCst));
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let compiler = IncrementalCompiler::new(InMemoryStateStore::new());
        assert!(matches!(
            compiler.execute(&CompileConfig::new("")),
            Err(NativeError::InvalidConfig(_))
        ));
    }
}
