//! Judging compiled tests
//!
//! One verifier per test kind. Each takes what the compiler and the artifact
//! did and turns it into an `Outcome`. The `judge_*` functions are pure so
//! they can be exercised without spawning anything.

use crate::command::{run_command_sync, CommandResult};
use crate::compiler::CompilationResult;
use crate::directive::{ExpectedOutput, Expectation, TestSpec};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use std::path::Path;
use std::time::Duration;

/// Printed by the runtime before a panic's details
pub const PANIC_MARKER: &str = "gallium: panicked!";

/// Printed by the runtime before a failed assertion's details
pub const ASSERT_MARKER: &str = "gallium: assertion failure!";

const MESSAGE_MARKER: &str = "  message: '";

static DIAGNOSTIC_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"E#\d{4}").unwrap());

/// Broad category of a failure, for grouping in the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The directive header could not be parsed
    Load,
    /// The compiler printed diagnostics
    Compile,
    /// The compiler or the artifact was killed for running too long
    Timeout,
    /// The artifact ran but did not behave as expected
    Mismatch,
    /// The compiler or the artifact could not be started
    Execution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub reason: String,
    /// Captured compiler output, listed in verbose mode
    pub detail: Option<String>,
    /// Expected vs. observed stdout, always listed
    pub diff: Option<String>,
}

impl Failure {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            detail: None,
            diff: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        if !detail.trim().is_empty() {
            self.detail = Some(detail);
        }
        self
    }

    pub fn with_diff(mut self, diff: String) -> Self {
        self.diff = Some(diff);
        self
    }
}

/// Terminal result of one test task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed(Failure),
}

impl Outcome {
    pub fn fail(kind: FailureKind, reason: impl Into<String>) -> Self {
        Outcome::Failed(Failure::new(kind, reason))
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Passed)
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Outcome::Passed => None,
            Outcome::Failed(failure) => Some(failure),
        }
    }
}

/// Runs artifacts and dispatches to the judge for the test's kind
#[derive(Debug, Clone, Copy)]
pub struct Verifier {
    pub timeout: Option<Duration>,
}

impl Verifier {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn verify(&self, spec: &TestSpec, compilation: &CompilationResult) -> Outcome {
        if let Expectation::ShouldFailCompile { codes } = &spec.expectation {
            return judge_fail_compile(codes, compilation);
        }

        if compilation.timed_out {
            return Outcome::fail(FailureKind::Timeout, self.timeout_reason("compiler"));
        }
        if !compilation.success() {
            return Outcome::Failed(
                Failure::new(FailureKind::Compile, "error from compiler!")
                    .with_detail(compilation.output.clone()),
            );
        }

        let observed = match self.execute(&compilation.artifact) {
            Ok(observed) => observed,
            Err(outcome) => return outcome,
        };

        match &spec.expectation {
            Expectation::ShouldRun {
                return_code,
                output,
            } => judge_run(*return_code, output, &observed),
            Expectation::ShouldPanic { reason } => judge_panic(PANIC_MARKER, reason, &observed),
            Expectation::ShouldAssert { reason } => judge_panic(ASSERT_MARKER, reason, &observed),
            Expectation::ShouldFailCompile { .. } => unreachable!("handled above"),
        }
    }

    fn execute(&self, artifact: &Path) -> Result<CommandResult, Outcome> {
        debug!("running {}", artifact.display());
        let observed = run_command_sync(artifact, Vec::<String>::new(), self.timeout).map_err(|e| {
            Outcome::fail(FailureKind::Execution, format!("failed to run artifact: {e:#}"))
        })?;
        if observed.timed_out {
            return Err(Outcome::fail(
                FailureKind::Timeout,
                self.timeout_reason("test program"),
            ));
        }
        Ok(observed)
    }

    fn timeout_reason(&self, what: &str) -> String {
        match self.timeout {
            Some(limit) => format!("{what} timed out after {}s", limit.as_secs_f64()),
            None => format!("{what} timed out"),
        }
    }
}

/// `should-run`: exit code must match, stdout must match byte for byte unless
/// the expected output is `none`
pub fn judge_run(return_code: i32, output: &ExpectedOutput, observed: &CommandResult) -> Outcome {
    if observed.exit_code != Some(return_code) {
        return Outcome::fail(
            FailureKind::Mismatch,
            format!(
                "return code did not match! expected `{}` but got `{}`",
                return_code,
                observed.status_text()
            ),
        );
    }

    match output {
        ExpectedOutput::Exact(expected) if *expected != observed.stdout => Outcome::Failed(
            Failure::new(
                FailureKind::Mismatch,
                format!(
                    "output did not match! expected `{}` but got `{}`",
                    expected, observed.stdout
                ),
            )
            .with_diff(output_diff(expected, &observed.stdout)),
        ),
        _ => Outcome::Passed,
    }
}

/// `should-panic` / `should-assert`: stderr must carry `marker` and a message
/// equal to `expected`
pub fn judge_panic(marker: &str, expected: &str, observed: &CommandResult) -> Outcome {
    match find_reason(&observed.stderr, marker) {
        None if marker == ASSERT_MARKER => Outcome::fail(
            FailureKind::Mismatch,
            "expected an assertion failure, but did not get one!",
        ),
        None => Outcome::fail(
            FailureKind::Mismatch,
            "expected a panic, but did not get one!",
        ),
        Some(reason) if reason != expected => Outcome::fail(
            FailureKind::Mismatch,
            format!("expected reason `{expected}`, but got reason `{reason}`"),
        ),
        Some(_) => Outcome::Passed,
    }
}

/// `should-fail-compile`: the compiler must fail and mention every code
pub fn judge_fail_compile(codes: &[u16], compilation: &CompilationResult) -> Outcome {
    if compilation.timed_out {
        return Outcome::fail(FailureKind::Timeout, "compiler timed out");
    }
    if compilation.success() {
        return Outcome::fail(
            FailureKind::Mismatch,
            "expected compilation to fail, but it succeeded",
        );
    }

    let missing: Vec<String> = codes
        .iter()
        .map(|code| diagnostic_token(*code))
        .filter(|token| !compilation.output.contains(token.as_str()))
        .collect();
    if missing.is_empty() {
        return Outcome::Passed;
    }

    let reported = reported_codes(&compilation.output);
    Outcome::Failed(
        Failure::new(
            FailureKind::Mismatch,
            format!(
                "missing diagnostic(s) {}; compiler reported {}",
                missing.join(", "),
                if reported.is_empty() {
                    "none".to_string()
                } else {
                    reported.join(", ")
                }
            ),
        )
        .with_detail(compilation.output.clone()),
    )
}

/// `E#` followed by the zero-padded four digit code
pub fn diagnostic_token(code: u16) -> String {
    format!("E#{code:04}")
}

/// Distinct diagnostic codes in compiler output, in order of appearance
pub fn reported_codes(output: &str) -> Vec<String> {
    let mut codes: Vec<String> = Vec::new();
    for found in DIAGNOSTIC_CODE.find_iter(output) {
        if !codes.iter().any(|c| c == found.as_str()) {
            codes.push(found.as_str().to_string());
        }
    }
    codes
}

/// Text between the first pair of single quotes after `  message: '`, which
/// itself must come after `marker`
pub fn find_reason<'a>(stderr: &'a str, marker: &str) -> Option<&'a str> {
    let after_marker = stderr.find(marker)? + marker.len();
    let message = after_marker + stderr[after_marker..].find(MESSAGE_MARKER)?;
    let begin = message + MESSAGE_MARKER.len();
    let end = begin + stderr[begin..].find('\'')?;
    Some(&stderr[begin..end])
}

/// Unified-style line diff, at most 40 changed lines
pub fn output_diff(expected: &str, actual: &str) -> String {
    let diff = TextDiff::from_lines(expected, actual);
    let mut out = String::new();
    for change in diff.iter_all_changes().take(40) {
        let sign = match change.tag() {
            ChangeTag::Delete => '-',
            ChangeTag::Insert => '+',
            ChangeTag::Equal => ' ',
        };
        out.push(sign);
        out.push_str(change.value());
        if change.missing_newline() {
            out.push('\n');
        }
    }
    out
}
