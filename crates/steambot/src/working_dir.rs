//! Working-directory setup (spec.md §6 "Process interface"): the process
//! runs out of a per-OS data directory, created with owner-only permissions
//! if missing, and `chdir`s there so every relative path the rest of the
//! workspace touches (`Account-<name>.json`, `AppInfo.json`, ...) resolves
//! inside it.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkingDirError {
    #[error("{0} is not set; cannot determine the data directory")]
    MissingEnvVar(&'static str),
    #[error("failed to create data directory {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to enter data directory {path}: {source}")]
    Chdir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The default data directory per spec.md §6: `~/.Christians-Steam-Framework/`
/// on POSIX, `%LOCALAPPDATA%\Christian-Stieber\Steam-Framework\` on Windows.
pub fn default_data_dir() -> Result<PathBuf, WorkingDirError> {
    #[cfg(windows)]
    {
        let base = std::env::var_os("LOCALAPPDATA").ok_or(WorkingDirError::MissingEnvVar("LOCALAPPDATA"))?;
        Ok(PathBuf::from(base).join("Christian-Stieber").join("Steam-Framework"))
    }
    #[cfg(not(windows))]
    {
        let home = std::env::var_os("HOME").ok_or(WorkingDirError::MissingEnvVar("HOME"))?;
        Ok(PathBuf::from(home).join(".Christians-Steam-Framework"))
    }
}

/// Creates `dir` (owner-only permissions on Unix) if it doesn't exist yet,
/// then changes the process's working directory to it.
pub fn enter(dir: &Path) -> Result<(), WorkingDirError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|source| WorkingDirError::Create {
            path: dir.to_path_buf(),
            source,
        })?;
        set_owner_only_permissions(dir);
    }
    std::env::set_current_dir(dir).map_err(|source| WorkingDirError::Chdir {
        path: dir.to_path_buf(),
        source,
    })
}

#[cfg(unix)]
fn set_owner_only_permissions(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700));
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_dir: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    // `enter` mutates the process-wide current directory, so both
    // assertions run in one test to avoid racing other `#[test]` threads.
    #[test]
    fn enter_creates_missing_directory_with_owner_only_permissions() {
        let parent = tempfile::tempdir().unwrap();
        let target = parent.path().join("fresh-data-dir");
        assert!(!target.exists());
        enter(&target).unwrap();
        assert!(target.exists());
        assert_eq!(std::env::current_dir().unwrap(), target.canonicalize().unwrap());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&target).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o700);
        }
    }
}
