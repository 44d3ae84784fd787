//! Run-scoped artifact directory
//!
//! A `Workspace` is created once before any test runs and removed once after
//! the last one finishes. Removal also happens on drop, so an error or panic
//! that unwinds through the coordinator still leaves nothing behind. Drop never
//! runs when the process is killed by SIGINT or SIGTERM, so on unix a
//! [`SignalCleanup`] guard removes the directory before exiting.

use crate::error::WorkspaceError;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const TEMP_PREFIX: &str = "gallium-test-";

enum Storage {
    /// Deleted on close or drop
    Temporary(TempDir),
    /// User-requested directory that outlives the run
    Persistent(PathBuf),
}

pub struct Workspace {
    storage: Storage,
}

impl Workspace {
    /// Create a fresh temporary directory under the system temp dir
    pub fn create() -> Result<Self, WorkspaceError> {
        Self::create_in(&std::env::temp_dir())
    }

    /// Create a fresh temporary directory under `parent`
    pub fn create_in(parent: &Path) -> Result<Self, WorkspaceError> {
        let dir = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempdir_in(parent)
            .map_err(|source| WorkspaceError::Create {
                parent: parent.to_path_buf(),
                source,
            })?;
        debug!("created workspace {}", dir.path().display());
        Ok(Self {
            storage: Storage::Temporary(dir),
        })
    }

    /// Use `dir` as-is and leave its contents behind after the run
    pub fn persistent(dir: &Path) -> Result<Self, WorkspaceError> {
        std::fs::create_dir_all(dir).map_err(|source| WorkspaceError::Create {
            parent: dir.to_path_buf(),
            source,
        })?;
        debug!("using persistent workspace {}", dir.display());
        Ok(Self {
            storage: Storage::Persistent(dir.to_path_buf()),
        })
    }

    pub fn path(&self) -> &Path {
        match &self.storage {
            Storage::Temporary(dir) => dir.path(),
            Storage::Persistent(dir) => dir,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self.storage, Storage::Temporary(_))
    }

    /// Where the artifact for task `ordinal` compiled from `source` goes.
    ///
    /// Distinct ordinals always give distinct paths, so concurrent tasks never
    /// need to coordinate.
    pub fn artifact_path(&self, source: &Path, ordinal: usize) -> PathBuf {
        self.path().join(artifact_name(source, ordinal))
    }

    /// Remove the directory and exit if SIGINT or SIGTERM arrives while the
    /// returned guard is alive. Persistent workspaces are left alone.
    #[cfg(unix)]
    pub fn remove_on_signal(&self) -> Option<SignalCleanup> {
        match &self.storage {
            Storage::Temporary(dir) => SignalCleanup::install(dir.path()),
            Storage::Persistent(_) => None,
        }
    }

    /// Remove the directory, reporting failure instead of swallowing it
    pub fn close(self) -> Result<(), WorkspaceError> {
        match self.storage {
            Storage::Temporary(dir) => {
                let path = dir.path().to_path_buf();
                dir.close()
                    .map_err(|source| WorkspaceError::Remove { path: path.clone(), source })?;
                debug!("removed workspace {}", path.display());
                Ok(())
            }
            Storage::Persistent(dir) => {
                warn!("leaving artifacts in {}", dir.display());
                Ok(())
            }
        }
    }
}

/// Listens for SIGINT and SIGTERM until dropped
#[cfg(unix)]
pub struct SignalCleanup {
    handle: signal_hook::iterator::Handle,
    listener: Option<std::thread::JoinHandle<()>>,
}

#[cfg(unix)]
impl SignalCleanup {
    fn install(dir: &Path) -> Option<Self> {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        // Not fatal: the run still works, it just can't clean up after a kill
        let mut signals = match Signals::new([SIGINT, SIGTERM]) {
            Ok(signals) => signals,
            Err(e) => {
                warn!("could not install signal handlers: {e}");
                return None;
            }
        };
        let handle = signals.handle();
        let dir = dir.to_path_buf();

        let listener = std::thread::spawn(move || {
            if let Some(signal) = signals.forever().next() {
                if let Err(e) = std::fs::remove_dir_all(&dir) {
                    eprintln!("failed to remove workspace {}: {e}", dir.display());
                }
                std::process::exit(128 + signal);
            }
        });

        Some(Self {
            handle,
            listener: Some(listener),
        })
    }
}

#[cfg(unix)]
impl Drop for SignalCleanup {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(listener) = self.listener.take() {
            let _ = listener.join();
        }
    }
}

/// `<sanitized source path>.<ordinal>` plus the platform executable suffix
pub fn artifact_name(source: &Path, ordinal: usize) -> String {
    format!(
        "{}.{}{}",
        sanitize(&source.to_string_lossy()),
        ordinal,
        std::env::consts::EXE_SUFFIX
    )
}

fn sanitize(path: &str) -> String {
    path.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}
