use crate::compiler::Compiler;
use crate::config::{HarnessConfig, OptLevel, OutputFormat};
use crate::directive::{DirectiveParser, TestSpec};
use crate::discovery::{discover, TestFile, TestFilter};
use crate::error::{DirectiveError, HarnessError};
use crate::pool::WorkerPool;
use crate::reporter::{ProgressReporter, TestRecord, TestReport};
use crate::verify::{Failure, FailureKind, Outcome, Verifier};
use crate::workspace::Workspace;
use log::{debug, info, warn};
use std::time::Instant;

/// One unit of work: a test file compiled at one optimization level
#[derive(Debug, Clone)]
pub struct Task {
    /// Position in the run, also used to name the artifact
    pub ordinal: usize,
    pub file: TestFile,
    pub opt: OptLevel,
}

/// Drives discovery, the worker pool and the per-test pipeline
pub struct TestRunner {
    config: HarnessConfig,
    parser: DirectiveParser,
    compiler: Compiler,
    verifier: Verifier,
}

impl TestRunner {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            parser: DirectiveParser::new(config.fail_compile),
            compiler: Compiler::new(&config.compiler, config.timeout),
            verifier: Verifier::new(config.timeout),
            config,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Discovered test files, after filtering
    pub fn discover(&self) -> Result<Vec<TestFile>, HarnessError> {
        let files = discover(&self.config.test_dir())?;
        let filter = TestFilter::new(&self.config.filters)?;
        let files = filter.apply(files);
        debug!("discovered {} test files", files.len());
        Ok(files)
    }

    /// Parse every discovered file's directive without compiling anything
    pub fn load_all(&self) -> Result<Vec<(TestFile, Result<TestSpec, DirectiveError>)>, HarnessError> {
        Ok(self
            .discover()?
            .into_iter()
            .map(|file| {
                let spec = self.parser.parse_file(&file.path);
                (file, spec)
            })
            .collect())
    }

    /// Expand files into tasks, one per configured optimization level, keeping
    /// discovery order
    pub fn tasks(&self, files: Vec<TestFile>) -> Vec<Task> {
        let mut tasks = Vec::with_capacity(files.len() * self.config.opt_levels.len());
        for file in files {
            for opt in &self.config.opt_levels {
                tasks.push(Task {
                    ordinal: tasks.len(),
                    file: file.clone(),
                    opt: *opt,
                });
            }
        }
        tasks
    }

    /// Run the whole suite inside a fresh workspace
    pub fn run(&self) -> Result<TestReport, HarnessError> {
        let workspace = match &self.config.keep_workspace {
            Some(dir) => Workspace::persistent(dir)?,
            None => Workspace::create()?,
        };
        self.run_with(workspace)
    }

    /// Run the suite in `workspace`, then remove it.
    ///
    /// The workspace is removed whether the run succeeds or not, and also when
    /// the process is interrupted. When both the run and the removal fail, the
    /// run's error wins.
    pub fn run_with(&self, workspace: Workspace) -> Result<TestReport, HarnessError> {
        #[cfg(unix)]
        let interrupted = workspace.remove_on_signal();

        let result = self.run_in(&workspace);

        #[cfg(unix)]
        drop(interrupted);
        let closed = workspace.close();

        match (result, closed) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close)) => {
                warn!("{close}");
                Err(e)
            }
        }
    }

    /// Run the suite using an existing workspace
    pub fn run_in(&self, workspace: &Workspace) -> Result<TestReport, HarnessError> {
        let start = Instant::now();
        let tasks = self.tasks(self.discover()?);
        let pool = WorkerPool::new(self.config.jobs)?;
        info!(
            "running {} tasks on {} workers in {}",
            tasks.len(),
            pool.workers(),
            workspace.path().display()
        );

        let progress = if self.config.progress && self.config.format == OutputFormat::Human {
            ProgressReporter::new(tasks.len())
        } else {
            ProgressReporter::hidden()
        };

        let records = pool.map(
            &tasks,
            |_, task| self.run_task(task, workspace),
            |task, _| progress.update(&task.file.relative.display().to_string()),
        );
        progress.finish();

        Ok(TestReport {
            records,
            multi_opt: self.config.opt_levels.len() > 1,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Parse, compile and verify one task. Never fails: every problem becomes
    /// the task's outcome.
    pub fn run_task(&self, task: &Task, workspace: &Workspace) -> TestRecord {
        let start = Instant::now();

        let (kind, outcome) = match self.parser.parse_file(&task.file.path) {
            Err(e) => {
                debug!("{e}");
                (
                    e.kind.declared_kind(),
                    Outcome::Failed(Failure::new(FailureKind::Load, e.kind.to_string())),
                )
            }
            Ok(spec) => {
                let artifact = workspace.artifact_path(&task.file.relative, task.ordinal);
                let outcome = match self.compiler.compile(&spec.source, &artifact, &task.opt.flags()) {
                    Ok(compilation) => self.verifier.verify(&spec, &compilation),
                    Err(e) => Outcome::fail(
                        FailureKind::Execution,
                        format!("failed to run compiler: {e:#}"),
                    ),
                };
                (Some(spec.kind()), outcome)
            }
        };

        debug!(
            "{} (opt {}): {}",
            task.file.relative.display(),
            task.opt,
            if outcome.is_pass() { "passed" } else { "failed" }
        );

        TestRecord {
            file: task.file.clone(),
            opt: task.opt,
            kind,
            outcome,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::TestKind;
    use std::path::{Path, PathBuf};

    fn config(root: &Path, opt_levels: Vec<OptLevel>) -> HarnessConfig {
        HarnessConfig {
            project_root: root.to_path_buf(),
            test_root: PathBuf::from("tests"),
            compiler: PathBuf::from("/definitely/not/gallium"),
            opt_levels,
            timeout: None,
            jobs: 2,
            keep_workspace: None,
            fail_compile: false,
            filters: Vec::new(),
            verbose: false,
            progress: false,
            format: OutputFormat::Human,
        }
    }

    fn corpus() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let tests = dir.path().join("tests");
        std::fs::create_dir_all(&tests).unwrap();
        std::fs::write(tests.join("a.gal"), "// test: should-run\n// returns: 0\n// outputs: none\n").unwrap();
        std::fs::write(tests.join("b.gal"), "// test: should-fail-compile\n// errors: 1\n").unwrap();
        std::fs::write(tests.join("c.gal"), "// test: should-panic\n// reason: boom\n").unwrap();
        dir
    }

    #[test]
    fn test_tasks_expand_per_opt_level_in_order() {
        let dir = corpus();
        let runner = TestRunner::new(config(dir.path(), vec![OptLevel::None, OptLevel::Fast]));
        let tasks = runner.tasks(runner.discover().unwrap());

        let summary: Vec<(usize, String, OptLevel)> = tasks
            .iter()
            .map(|t| (t.ordinal, t.file.relative.display().to_string(), t.opt))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, "a.gal".to_string(), OptLevel::None),
                (1, "a.gal".to_string(), OptLevel::Fast),
                (2, "b.gal".to_string(), OptLevel::None),
                (3, "b.gal".to_string(), OptLevel::Fast),
                (4, "c.gal".to_string(), OptLevel::None),
                (5, "c.gal".to_string(), OptLevel::Fast),
            ]
        );
    }

    #[test]
    fn test_load_all_isolates_directive_errors() {
        let dir = corpus();
        let runner = TestRunner::new(config(dir.path(), vec![OptLevel::None]));
        let loaded = runner.load_all().unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(loaded[0].1.is_ok());
        assert!(loaded[1].1.is_err());
        assert!(loaded[2].1.is_ok());
    }

    #[test]
    fn test_unrunnable_compiler_fails_each_task_not_the_run() {
        let dir = corpus();
        let runner = TestRunner::new(config(dir.path(), vec![OptLevel::None]));
        let report = runner.run().unwrap();

        assert_eq!(report.total(), 3);
        let kinds: Vec<Option<FailureKind>> = report
            .records
            .iter()
            .map(|r| r.outcome.failure().map(|f| f.kind))
            .collect();
        assert_eq!(
            kinds,
            [
                Some(FailureKind::Execution),
                Some(FailureKind::Load),
                Some(FailureKind::Execution),
            ]
        );
        assert_eq!(report.records[1].kind, Some(TestKind::ShouldFailCompile));
    }

    #[test]
    fn test_missing_test_root_is_fatal_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let workspace_parent = tempfile::tempdir().unwrap();
        let runner = TestRunner::new(config(dir.path(), vec![OptLevel::None]));

        let workspace = Workspace::create_in(workspace_parent.path()).unwrap();
        let err = runner.run_with(workspace).unwrap_err();
        assert!(matches!(err, HarnessError::MissingTestRoot(_)));
        assert_eq!(std::fs::read_dir(workspace_parent.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_bad_filter_is_fatal_and_cleans_up() {
        let dir = corpus();
        let workspace_parent = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), vec![OptLevel::None]);
        config.filters = vec!["[".to_string()];

        let workspace = Workspace::create_in(workspace_parent.path()).unwrap();
        let err = TestRunner::new(config).run_with(workspace).unwrap_err();
        assert!(matches!(err, HarnessError::Filter { .. }));
        assert_eq!(std::fs::read_dir(workspace_parent.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_keep_workspace_leaves_directory() {
        let dir = corpus();
        let keep = dir.path().join("artifacts");
        let mut config = config(dir.path(), vec![OptLevel::None]);
        config.keep_workspace = Some(keep.clone());

        TestRunner::new(config).run().unwrap();
        assert!(keep.is_dir());
    }
}
