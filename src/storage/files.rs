//! Local side-resource files
//!
//! Downloaded thumbnails and images live next to the database. When a row
//! goes away its files go with it, on a best-effort basis.

use std::io;
use std::path::{Component, Path, PathBuf};

/// Deletes files owned by removed rows
#[cfg_attr(test, mockall::automock)]
pub trait SideResources: Send + Sync {
    /// Remove one file. A file that is already gone is not an error.
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// Files kept under a single root directory
///
/// Relative paths are resolved against the root; absolute paths outside it
/// are refused so a corrupt row can never delete arbitrary files.
#[derive(Debug, Clone)]
pub struct LocalFiles {
    /// Absolute whenever the working directory could be read
    root: PathBuf,
}

impl LocalFiles {
    /// A relative `root` is anchored at the current working directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = match std::path::absolute(&root) {
            Ok(absolute) => absolute,
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "Cannot make file root absolute");
                root
            }
        };
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> io::Result<PathBuf> {
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("refusing path with '..': {}", path.display()),
            ));
        }

        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        if !resolved.starts_with(&self.root) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!(
                    "{} is outside {}",
                    resolved.display(),
                    self.root.display()
                ),
            ));
        }

        Ok(resolved)
    }
}

impl SideResources for LocalFiles {
    fn remove(&self, path: &Path) -> io::Result<()> {
        let resolved = self.resolve(path)?;
        match std::fs::remove_file(&resolved) {
            Ok(()) => {
                tracing::debug!(path = %resolved.display(), "Removed cached file");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// For tables that own no files
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSideResources;

impl SideResources for NoSideResources {
    fn remove(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn removes_relative_and_absolute_paths_under_root() {
        let dir = TempDir::new().unwrap();
        let files = LocalFiles::new(dir.path());

        std::fs::write(dir.path().join("thumb.jpg"), b"t").unwrap();
        std::fs::write(dir.path().join("full.jpg"), b"f").unwrap();

        files.remove(Path::new("thumb.jpg")).unwrap();
        files.remove(&dir.path().join("full.jpg")).unwrap();

        assert!(!dir.path().join("thumb.jpg").exists());
        assert!(!dir.path().join("full.jpg").exists());
    }

    #[test]
    fn relative_root_accepts_absolute_paths_under_it() {
        let cwd = std::env::current_dir().unwrap();
        let dir = TempDir::new_in(&cwd).unwrap();
        let relative = dir.path().strip_prefix(&cwd).unwrap();
        assert!(relative.is_relative());

        let files = LocalFiles::new(relative);
        assert!(files.root().is_absolute());

        let thumb = dir.path().join("thumb.jpg");
        std::fs::write(&thumb, b"t").unwrap();
        std::fs::write(dir.path().join("full.jpg"), b"f").unwrap();

        files.remove(&thumb).unwrap();
        files.remove(Path::new("full.jpg")).unwrap();
        assert!(!thumb.exists());
        assert!(!dir.path().join("full.jpg").exists());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let files = LocalFiles::new(dir.path());
        assert!(files.remove(Path::new("never-downloaded.jpg")).is_ok());
    }

    #[test]
    fn refuses_paths_outside_root() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let victim = outside.path().join("keep.txt");
        std::fs::write(&victim, b"k").unwrap();

        let files = LocalFiles::new(dir.path());
        let error = files.remove(&victim).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::PermissionDenied);
        assert!(files.remove(Path::new("../keep.txt")).is_err());
        assert!(victim.exists());
    }
}
