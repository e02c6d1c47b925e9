//! native-depend - report which C/C++ sources need recompiling
//!
//! Runs the convenient-native engine for one build unit and prints the
//! verdict: sources to compile, sources removed since the last run, and the
//! headers the build must track as inputs.
//!
//! By default the new state is persisted right away. To persist only once
//! the compile succeeded, run with `--pending FILE`, compile, then run
//! `native-depend --unit U --commit-pending FILE`.

use clap::Parser;
use convenient_native::{
    CompilationState, CompileConfig, CompileMode, FileStateStore, HeaderDependencies, IncrementalCompilation,
    IncrementalCompiler,
};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "native-depend")]
#[command(about = "Incremental include discovery for C/C++ builds", long_about = None)]
#[command(version)]
struct Cli {
    /// Build unit identity (state is kept per unit)
    #[arg(short, long)]
    unit: String,

    /// Header search root, in search order (repeatable)
    #[arg(short = 'I', long = "include", value_name = "DIR")]
    include_roots: Vec<PathBuf>,

    /// Macro definition NAME or NAME=VALUE (repeatable)
    #[arg(short = 'D', long = "define", value_name = "NAME[=VALUE]")]
    defines: Vec<String>,

    /// Treat #import like #include
    #[arg(long)]
    imports_are_includes: bool,

    /// Directory holding persisted compilation state
    #[arg(long, default_value = ".native-state")]
    state_dir: PathBuf,

    /// Ignore previous state and recompile everything
    #[arg(long)]
    clean: bool,

    /// Do not expand search roots into inputs when a macro include is used
    #[arg(long)]
    no_discover_inputs: bool,

    /// Parser worker threads
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Write the sorted header dependency list to this file
    #[arg(long, value_name = "FILE")]
    header_deps: Option<PathBuf>,

    /// Compute the verdict without persisting state
    #[arg(long)]
    dry_run: bool,

    /// Do not persist state now; write it to FILE for a later --commit-pending
    #[arg(long, value_name = "FILE", conflicts_with = "dry_run")]
    pending: Option<PathBuf>,

    /// Persist the state written by an earlier --pending run, then delete FILE
    #[arg(long, value_name = "FILE", conflicts_with_all = ["pending", "dry_run"])]
    commit_pending: Option<PathBuf>,

    /// Print the verdict as JSON
    #[arg(long)]
    json: bool,

    /// Source files to compile
    #[arg(required_unless_present = "commit_pending")]
    sources: Vec<PathBuf>,
}

impl Cli {
    fn config(&self) -> CompileConfig {
        let mut config = CompileConfig::new(self.unit.clone())
            .include_roots(self.include_roots.iter().cloned())
            .sources(self.sources.iter().cloned())
            .imports_are_includes(self.imports_are_includes)
            .discover_inputs(!self.no_discover_inputs)
            .mode(if self.clean { CompileMode::Clean } else { CompileMode::Incremental });

        for define in &self.defines {
            let (name, value) = define.split_once('=').unwrap_or((define.as_str(), "1"));
            config = config.macro_def(name.trim(), value);
        }
        if let Some(jobs) = self.jobs {
            config = config.max_parallel(jobs);
        }
        config
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "native_depend=info,convenient_native=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(&cli)? {
        Some(compilation) if cli.json => {
            println!("{}", serde_json::to_string_pretty(&verdict_json(&compilation))?);
        }
        Some(compilation) => print_verdict(&compilation),
        None => {}
    }

    Ok(())
}

/// Run one invocation; `None` when only a pending state was committed.
fn run(cli: &Cli) -> Result<Option<IncrementalCompilation>, Box<dyn std::error::Error>> {
    let compiler = IncrementalCompiler::new(FileStateStore::new(&cli.state_dir));

    if let Some(path) = &cli.commit_pending {
        let state: CompilationState = serde_json::from_slice(&fs::read(path)?)?;
        compiler.commit_state(&cli.unit, &state);
        fs::remove_file(path)?;
        tracing::info!("Committed pending state for {} from {}", cli.unit, path.display());
        return Ok(None);
    }

    let config = cli.config();
    let compilation = if cli.dry_run || cli.pending.is_some() {
        compiler.process(&config)?
    } else {
        compiler.execute(&config)?
    };

    if let Some(path) = &cli.pending {
        fs::write(path, serde_json::to_vec(&compilation.final_state)?)?;
        tracing::info!("Wrote pending state for {} to {}", cli.unit, path.display());
    }

    if let Some(path) = &cli.header_deps {
        let normalized = config.normalized()?;
        let deps = HeaderDependencies::from_compilation(&compilation, &normalized.include_roots);
        deps.write_to(path)?;
        tracing::info!("Wrote {} header dependencies to {}", deps.len(), path.display());
    }

    Ok(Some(compilation))
}

fn verdict_json(compilation: &IncrementalCompilation) -> serde_json::Value {
    serde_json::json!({
        "to_recompile": compilation.to_recompile,
        "removed": compilation.removed,
        "discovered_inputs": compilation.discovered_inputs,
        "used_macro_include": compilation.used_macro_include,
    })
}

fn print_verdict(compilation: &IncrementalCompilation) {
    for source in &compilation.to_recompile {
        println!("compile {}", source.display());
    }
    for source in &compilation.removed {
        println!("remove  {}", source.display());
    }
    for input in &compilation.discovered_inputs {
        println!("input   {}", input.display());
    }
    if compilation.used_macro_include {
        println!("note    macro include used; include search paths are inputs");
    }
}
