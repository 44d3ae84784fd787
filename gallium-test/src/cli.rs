use crate::config::{BuildType, OptLevel, OutputFormat, Overrides};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "gct",
    about = "Test runner for the Gallium compiler",
    long_about = "gct - Gallium Compiler Test runner\n\nDiscovers directive-annotated test files, compiles each one with the Gallium compiler and checks the result, in parallel.",
    version
)]
pub struct Cli {
    /// Only run tests whose path (relative to the test root) matches one of
    /// these globs or contains one of these strings
    #[arg(value_name = "FILTER")]
    pub filters: Vec<String>,

    /// Path to the gallium compiler
    #[arg(long, global = true)]
    pub compiler: Option<PathBuf>,

    /// Compiler build to use when --compiler is not given
    #[arg(long, value_enum, global = true)]
    pub build_type: Option<BuildType>,

    /// Optimization level to test with; repeat to run every test at several
    #[arg(short = 'O', long = "opt", value_enum, global = true)]
    pub opt_levels: Vec<OptLevel>,

    /// Per-process timeout in seconds (0 disables)
    #[arg(short, long, global = true)]
    pub timeout: Option<u64>,

    /// Number of worker threads (defaults to the number of CPUs)
    #[arg(short, long, global = true)]
    pub jobs: Option<usize>,

    /// Directory holding the test corpus, relative to the project root
    #[arg(long, global = true)]
    pub test_root: Option<PathBuf>,

    /// Project root directory (defaults to the current directory)
    #[arg(long, global = true)]
    pub project_root: Option<PathBuf>,

    /// Configuration file (defaults to gallium-test.json in the project root)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Write artifacts here and keep them instead of using a temporary directory
    #[arg(long, value_name = "DIR", global = true)]
    pub keep_workspace: Option<PathBuf>,

    /// Accept `should-fail-compile` tests and check their diagnostic codes
    #[arg(long, global = true)]
    pub fail_compile: bool,

    /// Report format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Show full failure details and debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Don't draw a progress bar
    #[arg(long, global = true)]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the test suite (default if no command specified)
    Run {
        /// Same as the top-level filters
        #[arg(value_name = "FILTER")]
        filters: Vec<String>,
    },

    /// List discovered tests and their directive types
    List {
        /// Show only test paths
        #[arg(short, long)]
        names_only: bool,
    },

    /// Parse every test directive without compiling anything
    Check,
}

impl Cli {
    /// Filters given before or after `run`
    pub fn filters(&self) -> Vec<String> {
        let mut filters = self.filters.clone();
        if let Some(Command::Run { filters: run }) = &self.command {
            filters.extend(run.iter().cloned());
        }
        filters
    }

    /// Command line values that take part in configuration merging
    pub fn overrides(&self) -> Overrides {
        Overrides {
            test_root: self.test_root.clone(),
            compiler: self.compiler.clone(),
            build_type: self.build_type,
            opt_levels: self.opt_levels.clone(),
            timeout_secs: self.timeout,
            jobs: self.jobs,
            keep_workspace: self.keep_workspace.clone(),
            fail_compile: self.fail_compile,
            filters: self.filters(),
            verbose: self.verbose,
            progress: !self.no_progress,
            format: self.format,
        }
    }
}
