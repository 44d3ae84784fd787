pub mod cli;
pub mod command;
pub mod compiler;
pub mod config;
pub mod directive;
pub mod discovery;
pub mod error;
pub mod pool;
pub mod reporter;
pub mod runner;
pub mod verify;
pub mod workspace;

// Re-export commonly used types
pub use config::{HarnessConfig, OptLevel};
pub use directive::{DirectiveParser, Expectation, TestKind, TestSpec};
pub use error::{DirectiveError, HarnessError, WorkspaceError};
pub use reporter::TestReport;
pub use runner::TestRunner;
pub use verify::Outcome;
