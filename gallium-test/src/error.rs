//! Error types for the test harness
//!
//! Directive problems are per-file and never abort a run. Workspace and
//! discovery problems are fatal to the whole run.

use crate::directive::TestKind;
use std::path::PathBuf;
use thiserror::Error;

/// A test file whose directive header could not be turned into a `TestSpec`
#[derive(Error, Debug)]
#[error("{}: {kind}", .path.display())]
pub struct DirectiveError {
    pub path: PathBuf,
    pub kind: DirectiveErrorKind,
}

impl DirectiveError {
    pub fn new(path: impl Into<PathBuf>, kind: DirectiveErrorKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

#[derive(Error, Debug)]
pub enum DirectiveErrorKind {
    #[error("could not read test file: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing `// test: <type>` header on line 1")]
    MissingHeader,

    #[error("unknown test type '{0}'")]
    UnknownType(String),

    #[error("test type '{0}' is reserved and not supported by this run")]
    Reserved(TestKind),

    #[error("expected `{prefix}` on line {line}")]
    MissingLine { line: usize, prefix: &'static str },

    #[error("invalid return code '{0}'")]
    InvalidReturnCode(String),

    #[error("invalid diagnostic code '{0}'")]
    InvalidDiagnosticCode(String),
}

impl DirectiveErrorKind {
    /// The test type the header names, when it is a known one
    pub fn declared_kind(&self) -> Option<TestKind> {
        match self {
            DirectiveErrorKind::Reserved(kind) => Some(*kind),
            _ => None,
        }
    }
}

/// Failures of the run-scoped artifact directory
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("failed to create workspace in {}: {source}", .parent.display())]
    Create {
        parent: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove workspace {}: {source}", .path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that end the whole run
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("test root {} does not exist", .0.display())]
    MissingTestRoot(PathBuf),

    #[error("failed to scan {}: {source}", .path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not locate the gallium compiler: {0}")]
    CompilerNotFound(String),

    #[error("invalid test filter '{pattern}': {source}")]
    Filter {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("invalid configuration: {0}")]
    Config(String),
}
