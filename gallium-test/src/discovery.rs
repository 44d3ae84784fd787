use crate::error::HarnessError;
use glob::{MatchOptions, Pattern};
use log::trace;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A test file found under the test root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestFile {
    pub path: PathBuf,
    /// `path` relative to the test root, used for display and filtering
    pub relative: PathBuf,
}

/// Every regular file under `root`, sorted by path. Dotfiles and dot
/// directories are skipped, and symlinks to directories are not followed.
pub fn discover(root: &Path) -> Result<Vec<TestFile>, HarnessError> {
    if !root.is_dir() {
        return Err(HarnessError::MissingTestRoot(root.to_path_buf()));
    }

    let mut paths = Vec::new();
    walk(root, &mut paths)?;
    paths.sort();

    Ok(paths
        .into_iter()
        .map(|path| {
            let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
            TestFile { path, relative }
        })
        .collect())
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), HarnessError> {
    let entries = std::fs::read_dir(dir).map_err(|source| HarnessError::Discovery {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| HarnessError::Discovery {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();

        if entry.file_name().to_string_lossy().starts_with('.') {
            trace!("skipping hidden {}", path.display());
            continue;
        }

        let file_type = entry.file_type().map_err(|source| HarnessError::Discovery {
            path: path.clone(),
            source,
        })?;

        if file_type.is_dir() {
            walk(&path, out)?;
        } else if file_type.is_file() || (file_type.is_symlink() && path.is_file()) {
            out.push(path);
        } else if file_type.is_symlink() {
            // linked directories are not descended into, so cycles can't form
            trace!("skipping symlink {}", path.display());
        }
    }

    Ok(())
}

/// `*` stops at `/`, so `math/*` does not reach into subdirectories
const PATH_MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Test selection by glob or substring over the root-relative path
#[derive(Debug, Clone, Default)]
pub struct TestFilter {
    patterns: Vec<(String, Pattern)>,
}

impl TestFilter {
    pub fn new(patterns: &[String]) -> Result<Self, HarnessError> {
        let patterns = patterns
            .iter()
            .map(|raw| {
                Pattern::new(raw)
                    .map(|pattern| (raw.clone(), pattern))
                    .map_err(|source| HarnessError::Filter {
                        pattern: raw.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// No patterns selects everything
    pub fn matches(&self, file: &TestFile) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        let relative = file.relative.to_string_lossy().replace('\\', "/");
        self.patterns
            .iter()
            .any(|(raw, pattern)| {
                pattern.matches_with(&relative, PATH_MATCH) || relative.contains(raw.as_str())
            })
    }

    pub fn apply(&self, files: Vec<TestFile>) -> Vec<TestFile> {
        files.into_iter().filter(|f| self.matches(f)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("math/nested")).unwrap();
        std::fs::create_dir_all(root.join(".cache")).unwrap();
        for file in [
            "zeta.gal",
            "alpha.gal",
            "math/div.gal",
            "math/nested/mod.gal",
            ".hidden.gal",
            ".cache/stale.gal",
        ] {
            std::fs::write(root.join(file), "// test: should-run\n").unwrap();
        }
        dir
    }

    fn relative(files: &[TestFile]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.relative.to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_discovery_is_sorted_and_recursive() {
        let dir = tree();
        let files = discover(dir.path()).unwrap();
        assert_eq!(
            relative(&files),
            ["alpha.gal", "math/div.gal", "math/nested/mod.gal", "zeta.gal"]
        );
        assert!(files.iter().all(|f| f.path.starts_with(dir.path())));
    }

    #[test]
    fn test_discovery_is_repeatable() {
        let dir = tree();
        assert_eq!(discover(dir.path()).unwrap(), discover(dir.path()).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_symlinks_are_not_followed() {
        use std::os::unix::fs::symlink;

        let dir = tree();
        let root = dir.path();
        symlink(root, root.join("loop")).unwrap();
        symlink(root.join("math"), root.join("mirror")).unwrap();
        symlink(root.join("alpha.gal"), root.join("linked.gal")).unwrap();

        let files = discover(root).unwrap();
        assert_eq!(
            relative(&files),
            [
                "alpha.gal",
                "linked.gal",
                "math/div.gal",
                "math/nested/mod.gal",
                "zeta.gal"
            ]
        );
    }

    #[test]
    fn test_missing_root() {
        let err = discover(Path::new("/definitely/not/a/test/root")).unwrap_err();
        assert!(matches!(err, HarnessError::MissingTestRoot(_)));
    }

    #[test]
    fn test_filter_glob_and_substring() {
        let dir = tree();
        let files = discover(dir.path()).unwrap();

        let filter = TestFilter::new(&["math/*.gal".to_string()]).unwrap();
        assert_eq!(relative(&filter.apply(files.clone())), ["math/div.gal"]);

        let filter = TestFilter::new(&["nested".to_string(), "zeta".to_string()]).unwrap();
        assert_eq!(
            relative(&filter.apply(files.clone())),
            ["math/nested/mod.gal", "zeta.gal"]
        );

        assert_eq!(TestFilter::default().apply(files.clone()).len(), files.len());
    }

    #[test]
    fn test_invalid_filter() {
        let err = TestFilter::new(&["[".to_string()]).unwrap_err();
        assert!(matches!(err, HarnessError::Filter { .. }));
    }
}
