use crate::command::run_command_sync;
use anyhow::Result;
use log::{debug, trace};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The external compiler binary
#[derive(Debug, Clone)]
pub struct Compiler {
    pub path: PathBuf,
    pub timeout: Option<Duration>,
}

/// Compilation result
#[derive(Debug, Clone)]
pub struct CompilationResult {
    /// Everything the compiler printed, stdout then stderr
    pub output: String,
    pub artifact: PathBuf,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl CompilationResult {
    /// The compiler reports success by printing nothing
    pub fn success(&self) -> bool {
        !self.timed_out && self.output.trim().is_empty()
    }
}

impl Compiler {
    pub fn new(path: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    /// Arguments for one invocation: `--emit exe --out <dest> <source> [flags...]`
    pub fn arguments(source: &Path, dest: &Path, flags: &[String]) -> Vec<String> {
        let mut args = vec![
            "--emit".to_string(),
            "exe".to_string(),
            "--out".to_string(),
            dest.display().to_string(),
            source.display().to_string(),
        ];
        args.extend(flags.iter().cloned());
        args
    }

    /// Compile `source` into an executable at `dest`.
    ///
    /// An `Err` means the compiler could not be run at all; a compile error is
    /// an `Ok` whose `success()` is false.
    pub fn compile(&self, source: &Path, dest: &Path, flags: &[String]) -> Result<CompilationResult> {
        let args = Self::arguments(source, dest, flags);
        debug!("compiling {} -> {}", source.display(), dest.display());
        trace!("{} {}", self.path.display(), args.join(" "));

        let result = run_command_sync(&self.path, &args, self.timeout)?;

        Ok(CompilationResult {
            output: result.combined_output(),
            artifact: dest.to_path_buf(),
            exit_code: result.exit_code,
            timed_out: result.timed_out,
        })
    }
}
