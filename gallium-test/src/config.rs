use crate::error::HarnessError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the optional configuration file looked up in the project root
pub const CONFIG_FILE_NAME: &str = "gallium-test.json";

/// Default location of the test corpus, relative to the project root
pub const DEFAULT_TEST_ROOT: &str = "tests/compiler";

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Optimization level handed to the compiler as `--opt <level>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OptLevel {
    None,
    Some,
    Small,
    Fast,
}

impl OptLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Some => "some",
            OptLevel::Small => "small",
            OptLevel::Fast => "fast",
        }
    }

    /// Extra compiler arguments for this level
    pub fn flags(&self) -> Vec<String> {
        vec!["--opt".to_string(), self.as_str().to_string()]
    }
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which compiler build directory to look in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BuildType {
    #[default]
    Debug,
    Release,
}

impl BuildType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildType::Debug => "debug",
            BuildType::Release => "release",
        }
    }
}

/// How the final report is written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

/// Contents of `gallium-test.json`. Every field is optional; the command
/// line wins over the file, the file wins over the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub test_root: Option<PathBuf>,
    pub compiler: Option<PathBuf>,
    pub build_type: Option<BuildType>,
    pub opt_levels: Option<Vec<OptLevel>>,
    pub timeout_secs: Option<u64>,
    pub jobs: Option<usize>,
    pub fail_compile: Option<bool>,
}

/// Load a configuration file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: ConfigFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Fully resolved, immutable settings for one harness run
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub project_root: PathBuf,
    pub test_root: PathBuf,
    pub compiler: PathBuf,
    pub opt_levels: Vec<OptLevel>,
    pub timeout: Option<Duration>,
    pub jobs: usize,
    pub keep_workspace: Option<PathBuf>,
    pub fail_compile: bool,
    pub filters: Vec<String>,
    pub verbose: bool,
    pub progress: bool,
    pub format: OutputFormat,
}

impl HarnessConfig {
    /// Absolute (or project-relative) directory that discovery walks
    pub fn test_dir(&self) -> PathBuf {
        self.project_root.join(&self.test_root)
    }
}

/// Values coming from the command line, before merging with the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub test_root: Option<PathBuf>,
    pub compiler: Option<PathBuf>,
    pub build_type: Option<BuildType>,
    pub opt_levels: Vec<OptLevel>,
    pub timeout_secs: Option<u64>,
    pub jobs: Option<usize>,
    pub keep_workspace: Option<PathBuf>,
    pub fail_compile: bool,
    pub filters: Vec<String>,
    pub verbose: bool,
    pub progress: bool,
    pub format: OutputFormat,
}

/// Merge command line, config file and defaults into a `HarnessConfig`.
///
/// `locate` is consulted only when neither layer names a compiler and the
/// build directory does not contain one.
pub fn resolve(
    project_root: PathBuf,
    file: ConfigFile,
    cli: Overrides,
    locate: impl FnOnce(&str) -> Option<PathBuf>,
) -> Result<HarnessConfig, HarnessError> {
    let build_type = cli.build_type.or(file.build_type).unwrap_or_default();

    let compiler = match cli.compiler.or(file.compiler) {
        Some(path) => path,
        None => {
            let built = default_compiler_path(&project_root, build_type);
            if built.exists() {
                built
            } else {
                locate("gallium").ok_or_else(|| {
                    HarnessError::CompilerNotFound(format!(
                        "not found at {} nor on PATH; pass --compiler",
                        built.display()
                    ))
                })?
            }
        }
    };

    let opt_levels = if !cli.opt_levels.is_empty() {
        dedup(cli.opt_levels)
    } else {
        dedup(file.opt_levels.unwrap_or_else(|| vec![OptLevel::None]))
    };
    if opt_levels.is_empty() {
        return Err(HarnessError::Config(
            "at least one optimization level is required".to_string(),
        ));
    }

    let jobs = cli.jobs.or(file.jobs).unwrap_or_else(num_cpus::get);
    if jobs == 0 {
        return Err(HarnessError::Config("jobs must be at least 1".to_string()));
    }

    let timeout_secs = cli
        .timeout_secs
        .or(file.timeout_secs)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));

    Ok(HarnessConfig {
        test_root: cli
            .test_root
            .or(file.test_root)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TEST_ROOT)),
        project_root,
        compiler,
        opt_levels,
        timeout,
        jobs,
        keep_workspace: cli.keep_workspace,
        fail_compile: cli.fail_compile || file.fail_compile.unwrap_or(false),
        filters: cli.filters,
        verbose: cli.verbose,
        progress: cli.progress,
        format: cli.format,
    })
}

/// `build/<type>/compiler/src/gallium` under the project root
pub fn default_compiler_path(project_root: &Path, build_type: BuildType) -> PathBuf {
    project_root
        .join("build")
        .join(build_type.as_str())
        .join("compiler/src")
        .join(format!("gallium{}", std::env::consts::EXE_SUFFIX))
}

fn dedup(levels: Vec<OptLevel>) -> Vec<OptLevel> {
    let mut out: Vec<OptLevel> = Vec::with_capacity(levels.len());
    for level in levels {
        if !out.contains(&level) {
            out.push(level);
        }
    }
    out
}
