use crate::config::OptLevel;
use crate::directive::TestKind;
use crate::discovery::TestFile;
use crate::verify::{Failure, FailureKind, Outcome};
use colored::*;
use serde::Serialize;
use std::fmt::Write as _;

/// Detail lines shown per failure unless running verbose
const DETAIL_LINES: usize = 20;

/// Result of one test task, in discovery order
#[derive(Debug, Clone, Serialize)]
pub struct TestRecord {
    pub file: TestFile,
    pub opt: OptLevel,
    /// `None` when the header names no known test type
    pub kind: Option<TestKind>,
    pub outcome: Outcome,
    pub duration_ms: u64,
}

impl TestRecord {
    fn label(&self, show_opt: bool) -> String {
        if show_opt {
            format!("{} (opt {})", self.file.relative.display(), self.opt)
        } else {
            self.file.relative.display().to_string()
        }
    }
}

/// Everything one run produced, index-aligned with discovery order
#[derive(Debug, Clone, Default, Serialize)]
pub struct TestReport {
    pub records: Vec<TestRecord>,
    /// More than one optimization level was exercised
    pub multi_opt: bool,
    pub duration_ms: u64,
}

impl TestReport {
    pub fn total(&self) -> usize {
        self.records.len()
    }

    pub fn passed(&self) -> usize {
        self.records.iter().filter(|r| r.outcome.is_pass()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    /// Tests whose directive header could not be loaded
    pub fn load_errors(&self) -> usize {
        self.failures()
            .filter(|(_, failure)| failure.kind == FailureKind::Load)
            .count()
    }

    /// Failed records with their failure, in report order
    pub fn failures(&self) -> impl Iterator<Item = (&TestRecord, &Failure)> {
        self.records
            .iter()
            .filter_map(|record| record.outcome.failure().map(|failure| (record, failure)))
    }

    pub fn success(&self) -> bool {
        self.failed() == 0
    }

    /// Return exit code based on results
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }

    /// One line per test, in order
    pub fn render_results(&self) -> String {
        let mut out = String::new();
        for record in &self.records {
            let status = match record.outcome {
                Outcome::Passed => "[passed!]".green(),
                Outcome::Failed(_) => "[failed!]".red(),
            };
            let _ = writeln!(out, "{} test {}", status, record.label(self.multi_opt));
        }
        out
    }

    /// Detailed listing of every failure, empty when everything passed
    pub fn render_failures(&self, verbose: bool) -> String {
        let mut out = String::new();
        for (record, failure) in self.failures() {
            let kind = record.kind.map(|k| k.as_str()).unwrap_or("unknown");
            let _ = writeln!(out, "{}: {}", "failure".red(), record.label(self.multi_opt));
            let _ = writeln!(out, "    {}: '{}'", "test type".blue(), kind);
            let _ = writeln!(out, "    {}: {}", "reason".blue(), failure.reason);

            if let Some(diff) = &failure.diff {
                let _ = writeln!(out, "    {}:", "diff".blue());
                out.push_str(&render_detail(diff, verbose));
            }
            match &failure.detail {
                Some(detail) if verbose => {
                    let _ = writeln!(out, "    {}:", "detail".blue());
                    out.push_str(&render_detail(detail, verbose));
                }
                Some(detail) => {
                    let _ = writeln!(
                        out,
                        "    {}: {}",
                        "detail".blue(),
                        format!("{} lines hidden (use --verbose)", detail.lines().count()).dimmed()
                    );
                }
                None => {}
            }
        }
        out
    }

    /// Summary block
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", "=".repeat(60));
        let _ = writeln!(out, "{:^60}", "Test Results");
        let _ = writeln!(out, "{}", "=".repeat(60));
        let _ = writeln!(out, "Total:          {}", self.total());
        let _ = writeln!(out, "Passed:         {}", self.passed().to_string().green());

        if self.failed() > 0 {
            let _ = writeln!(out, "Failed:         {}", self.failed().to_string().red());
        }
        if self.load_errors() > 0 {
            let _ = writeln!(
                out,
                "Load errors:    {}",
                self.load_errors().to_string().yellow()
            );
        }

        let _ = writeln!(out, "Duration:       {:.2}s", self.duration_ms as f64 / 1000.0);
        let _ = writeln!(out, "{}", "=".repeat(60));

        if self.success() {
            if self.total() == 0 {
                let _ = writeln!(out, "\n{}", "No tests were run!".yellow().bold());
            } else {
                let _ = writeln!(out, "\n{}", "All tests passed!".green().bold());
            }
        } else {
            let _ = writeln!(
                out,
                "\n{}",
                format!("{} of {} tests failed", self.failed(), self.total())
                    .red()
                    .bold()
            );
        }
        out
    }

    /// Print the whole human readable report
    pub fn print(&self, verbose: bool) {
        print!("{}", self.render_results());

        let failures = self.render_failures(verbose);
        if !failures.is_empty() {
            println!();
            print!("{failures}");
        }

        println!();
        print!("{}", self.render_summary());
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Indent a failure detail, colouring diff lines and truncating long output
fn render_detail(detail: &str, verbose: bool) -> String {
    let lines: Vec<&str> = detail.lines().collect();
    let shown = if verbose {
        lines.len()
    } else {
        lines.len().min(DETAIL_LINES)
    };

    let mut out = String::new();
    for line in &lines[..shown] {
        let line = if line.starts_with('+') {
            line.green()
        } else if line.starts_with('-') {
            line.red()
        } else {
            line.normal()
        };
        let _ = writeln!(out, "        {line}");
    }
    if shown < lines.len() {
        let _ = writeln!(
            out,
            "        {}",
            format!("... {} more lines (use --verbose)", lines.len() - shown).dimmed()
        );
    }
    out
}

/// Progress reporter for parallel execution
pub struct ProgressReporter {
    progress_bar: indicatif::ProgressBar,
}

impl ProgressReporter {
    pub fn new(total: usize) -> Self {
        let progress_bar = indicatif::ProgressBar::new(total as u64);
        if let Ok(style) = indicatif::ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            progress_bar.set_style(style.progress_chars("#>-"));
        }
        Self { progress_bar }
    }

    /// A reporter that draws nothing
    pub fn hidden() -> Self {
        Self {
            progress_bar: indicatif::ProgressBar::hidden(),
        }
    }

    pub fn update(&self, message: &str) {
        self.progress_bar.set_message(message.to_string());
        self.progress_bar.inc(1);
    }

    pub fn finish(&self) {
        self.progress_bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn record(name: &str, opt: OptLevel, outcome: Outcome) -> TestRecord {
        TestRecord {
            file: TestFile {
                path: PathBuf::from("tests/compiler").join(name),
                relative: PathBuf::from(name),
            },
            opt,
            kind: Some(TestKind::ShouldRun),
            outcome,
            duration_ms: 3,
        }
    }

    fn sample() -> TestReport {
        TestReport {
            records: vec![
                record("a.gal", OptLevel::None, Outcome::Passed),
                record(
                    "b.gal",
                    OptLevel::None,
                    Outcome::fail(
                        FailureKind::Mismatch,
                        "return code did not match! expected `0` but got `1`",
                    ),
                ),
                TestRecord {
                    kind: Some(TestKind::ShouldFailCompile),
                    ..record(
                        "c.gal",
                        OptLevel::None,
                        Outcome::fail(FailureKind::Load, "test type 'should-fail-compile' is reserved"),
                    )
                },
                record("d.gal", OptLevel::None, Outcome::Passed),
            ],
            multi_opt: false,
            duration_ms: 1500,
        }
    }

    #[test]
    fn test_counts() {
        let report = sample();
        assert_eq!(report.total(), 4);
        assert_eq!(report.passed(), 2);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.load_errors(), 1);
        assert_eq!(report.exit_code(), 1);
        assert!(!report.success());
    }

    #[test]
    fn test_empty_report_succeeds() {
        let report = TestReport::default();
        assert!(report.success());
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_results_in_record_order() {
        colored::control::set_override(false);
        let rendered = sample().render_results();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(
            lines,
            [
                "[passed!] test a.gal",
                "[failed!] test b.gal",
                "[failed!] test c.gal",
                "[passed!] test d.gal",
            ]
        );
    }

    #[test]
    fn test_failure_listing() {
        colored::control::set_override(false);
        let rendered = sample().render_failures(false);
        assert!(rendered.contains("failure: b.gal\n    test type: 'should-run'\n"));
        assert!(rendered.contains("reason: return code did not match! expected `0` but got `1`"));
        assert!(rendered.contains("failure: c.gal\n    test type: 'should-fail-compile'\n"));
        assert!(!rendered.contains("a.gal"));
    }

    #[test]
    fn test_unknown_type_is_listed_as_unknown() {
        colored::control::set_override(false);
        let mut report = sample();
        report.records[2].kind = None;
        let rendered = report.render_failures(false);
        assert!(rendered.contains("failure: c.gal\n    test type: 'unknown'\n"));
    }

    #[test]
    fn test_detail_only_when_verbose_but_diff_always() {
        colored::control::set_override(false);
        let report = TestReport {
            records: vec![
                record(
                    "compile.gal",
                    OptLevel::None,
                    Outcome::Failed(
                        Failure::new(FailureKind::Compile, "error from compiler!")
                            .with_detail("error E#0042: unknown name `x`\n"),
                    ),
                ),
                record(
                    "output.gal",
                    OptLevel::None,
                    Outcome::Failed(
                        Failure::new(FailureKind::Mismatch, "output did not match!")
                            .with_diff("-3\n+4\n".to_string()),
                    ),
                ),
            ],
            ..TestReport::default()
        };

        let quiet = report.render_failures(false);
        assert!(!quiet.contains("unknown name"));
        assert!(quiet.contains("    detail: 1 lines hidden (use --verbose)\n"));
        assert!(quiet.contains("    diff:\n        -3\n        +4\n"));

        let verbose = report.render_failures(true);
        assert!(verbose.contains("    detail:\n        error E#0042: unknown name `x`\n"));
        assert!(verbose.contains("        +4\n"));
    }

    #[test]
    fn test_opt_level_shown_when_several() {
        colored::control::set_override(false);
        let mut report = sample();
        report.multi_opt = true;
        report.records[0].opt = OptLevel::Fast;
        assert!(report.render_results().starts_with("[passed!] test a.gal (opt fast)\n"));
    }

    #[test]
    fn test_detail_is_truncated() {
        colored::control::set_override(false);
        let detail: String = (0..30).map(|i| format!("line {i}\n")).collect();
        let short = render_detail(&detail, false);
        assert_eq!(short.lines().count(), DETAIL_LINES + 1);
        assert!(short.contains("10 more lines"));
        assert_eq!(render_detail(&detail, true).lines().count(), 30);
    }

    #[test]
    fn test_json_report() {
        let json = sample().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let records = value["records"].as_array().unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0]["outcome"]["status"], "passed");
        assert_eq!(records[1]["outcome"]["status"], "failed");
        assert_eq!(records[1]["outcome"]["kind"], "mismatch");
        assert_eq!(records[1]["kind"], "should-run");
        assert_eq!(records[2]["kind"], "should-fail-compile");
        assert_eq!(records[0]["opt"], "none");
    }
}
