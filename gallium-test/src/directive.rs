//! Test directive parsing
//!
//! Every test file starts with a fixed comment header that declares what the
//! test expects. Only the header lines are looked at here; the rest of the file
//! is compiler input.
//!
//! ```text
//! // test: should-run
//! // returns: 0
//! // outputs: 3
//! ```

use crate::error::{DirectiveError, DirectiveErrorKind};
use serde::Serialize;
use std::fmt;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

const TEST_PREFIX: &str = "// test: ";
const RETURNS_PREFIX: &str = "// returns: ";
const OUTPUTS_PREFIX: &str = "// outputs: ";
const REASON_PREFIX: &str = "// reason: ";
const ERRORS_PREFIX: &str = "// errors: ";

/// Sentinel for `// outputs:` meaning stdout is not checked
pub const ANY_OUTPUT: &str = "none";

/// The kind of test, as named on the first directive line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestKind {
    ShouldRun,
    ShouldPanic,
    ShouldAssert,
    ShouldFailCompile,
}

impl TestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestKind::ShouldRun => "should-run",
            TestKind::ShouldPanic => "should-panic",
            TestKind::ShouldAssert => "should-assert",
            TestKind::ShouldFailCompile => "should-fail-compile",
        }
    }

    /// Directive lines in this kind's header, `// test:` included
    pub fn header_lines(&self) -> usize {
        match self {
            TestKind::ShouldRun => 3,
            TestKind::ShouldPanic | TestKind::ShouldAssert | TestKind::ShouldFailCompile => 2,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "should-run" => Some(TestKind::ShouldRun),
            "should-panic" => Some(TestKind::ShouldPanic),
            "should-assert" => Some(TestKind::ShouldAssert),
            "should-fail-compile" => Some(TestKind::ShouldFailCompile),
            _ => None,
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected stdout of a `should-run` test
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedOutput {
    /// `// outputs: none`
    Any,
    Exact(String),
}

/// What a test expects, with the parameters of its kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Expectation {
    ShouldRun {
        return_code: i32,
        output: ExpectedOutput,
    },
    ShouldPanic {
        reason: String,
    },
    ShouldAssert {
        reason: String,
    },
    ShouldFailCompile {
        codes: Vec<u16>,
    },
}

impl Expectation {
    pub fn kind(&self) -> TestKind {
        match self {
            Expectation::ShouldRun { .. } => TestKind::ShouldRun,
            Expectation::ShouldPanic { .. } => TestKind::ShouldPanic,
            Expectation::ShouldAssert { .. } => TestKind::ShouldAssert,
            Expectation::ShouldFailCompile { .. } => TestKind::ShouldFailCompile,
        }
    }
}

/// A parsed test file. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestSpec {
    pub source: PathBuf,
    pub expectation: Expectation,
}

impl TestSpec {
    pub fn kind(&self) -> TestKind {
        self.expectation.kind()
    }
}

/// Turns test file headers into `TestSpec`s
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectiveParser {
    /// Accept `should-fail-compile`; otherwise it is a reserved type
    pub allow_fail_compile: bool,
}

impl DirectiveParser {
    pub fn new(allow_fail_compile: bool) -> Self {
        Self { allow_fail_compile }
    }

    /// Read the header of `path` and parse it
    pub fn parse_file(&self, path: &Path) -> Result<TestSpec, DirectiveError> {
        let header = read_header(path).map_err(|e| DirectiveError::new(path, e.into()))?;
        self.parse_header(path, &header)
    }

    /// Parse already-read header lines belonging to `path`
    pub fn parse_header(&self, path: &Path, lines: &[String]) -> Result<TestSpec, DirectiveError> {
        self.parse_lines(lines)
            .map(|expectation| TestSpec {
                source: path.to_path_buf(),
                expectation,
            })
            .map_err(|kind| DirectiveError::new(path, kind))
    }

    fn parse_lines(&self, lines: &[String]) -> Result<Expectation, DirectiveErrorKind> {
        let name = lines
            .first()
            .and_then(|line| declared_type(line))
            .ok_or(DirectiveErrorKind::MissingHeader)?;

        let kind = TestKind::from_name(name)
            .ok_or_else(|| DirectiveErrorKind::UnknownType(name.to_string()))?;

        match kind {
            TestKind::ShouldRun => {
                let returns = field(lines, 2, RETURNS_PREFIX)?;
                let return_code = returns
                    .trim()
                    .parse::<i32>()
                    .map_err(|_| DirectiveErrorKind::InvalidReturnCode(returns.to_string()))?;
                let output = match field(lines, 3, OUTPUTS_PREFIX)? {
                    ANY_OUTPUT => ExpectedOutput::Any,
                    text => ExpectedOutput::Exact(text.to_string()),
                };
                Ok(Expectation::ShouldRun {
                    return_code,
                    output,
                })
            }
            TestKind::ShouldPanic => Ok(Expectation::ShouldPanic {
                reason: field(lines, 2, REASON_PREFIX)?.to_string(),
            }),
            TestKind::ShouldAssert => Ok(Expectation::ShouldAssert {
                reason: field(lines, 2, REASON_PREFIX)?.to_string(),
            }),
            TestKind::ShouldFailCompile if !self.allow_fail_compile => {
                Err(DirectiveErrorKind::Reserved(kind))
            }
            TestKind::ShouldFailCompile => {
                let codes = field(lines, 2, ERRORS_PREFIX)?
                    .split(',')
                    .map(str::trim)
                    .filter(|code| !code.is_empty())
                    .map(parse_diagnostic_code)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Expectation::ShouldFailCompile { codes })
            }
        }
    }
}

/// Value of directive line `line` (1-based) after `prefix`
fn field<'a>(
    lines: &'a [String],
    line: usize,
    prefix: &'static str,
) -> Result<&'a str, DirectiveErrorKind> {
    lines
        .get(line - 1)
        .and_then(|text| text.trim().strip_prefix(prefix))
        .ok_or(DirectiveErrorKind::MissingLine { line, prefix })
}

/// Accepts `42`, `0042` or `E#0042`
fn parse_diagnostic_code(text: &str) -> Result<u16, DirectiveErrorKind> {
    let digits = text.strip_prefix("E#").unwrap_or(text);
    match digits.parse::<u16>() {
        Ok(code) if code <= 9999 => Ok(code),
        _ => Err(DirectiveErrorKind::InvalidDiagnosticCode(text.to_string())),
    }
}

/// The type name on a `// test: <type>` line
fn declared_type(line: &str) -> Option<&str> {
    line.trim().strip_prefix(TEST_PREFIX).map(str::trim)
}

/// Read the header lines of a file and nothing past them. The body can be
/// arbitrarily large, need not be UTF-8, and is none of our business.
fn read_header(path: &Path) -> std::io::Result<Vec<String>> {
    let mut reader = BufReader::new(std::fs::File::open(path)?);
    let mut lines = Vec::new();
    let mut wanted = 1;

    while lines.len() < wanted {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        if lines.is_empty() {
            wanted = declared_type(&line)
                .and_then(TestKind::from_name)
                .map_or(1, |kind| kind.header_lines());
        }
        lines.push(line);
    }

    Ok(lines)
}
