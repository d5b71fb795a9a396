use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Keeps layer paths inside the directory a [`crate::layer::DirLayer`] is rooted at.
///
/// Layer paths are relative, slash separated and never contain `..`; on
/// top of that, the deepest existing ancestor of a resolved path must
/// canonicalize to somewhere under the root, which rejects symlink escapes.
#[derive(Debug, Clone)]
pub struct RootGuard {
    /// Canonical root directory
    root: PathBuf,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("path is outside layer root: {path} (root: {root})")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("invalid layer path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("failed to canonicalize path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

/// Check the shape of a layer-relative path.
///
/// The empty path and `.` name the layer root.
pub fn validate_relative(path: &str) -> Result<(), SafetyError> {
    let invalid = |reason| SafetyError::InvalidPath {
        path: path.to_string(),
        reason,
    };

    if path.contains('\\') {
        return Err(invalid("use '/' as separator"));
    }
    if path.contains('\0') {
        return Err(invalid("contains NUL byte"));
    }
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => return Err(invalid("contains '..'")),
            Component::RootDir | Component::Prefix(_) => return Err(invalid("must be relative")),
        }
    }
    Ok(())
}

/// Join two layer paths with `/`, treating `""` and `"."` as the root.
pub fn join(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() || dir == "." {
        name.to_string()
    } else if name.is_empty() || name == "." {
        dir.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

impl RootGuard {
    /// Create a guard for an existing root directory.
    ///
    /// The root is canonicalized to handle symlinks correctly.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let root = root.as_ref().canonicalize()?;
        Ok(Self { root })
    }

    /// Resolve a layer path to an absolute path under the root.
    ///
    /// The target itself need not exist yet.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, SafetyError> {
        validate_relative(path)?;
        let absolute = self.root.join(path);
        self.check(&absolute)?;
        Ok(absolute)
    }

    fn check(&self, absolute: &Path) -> Result<(), SafetyError> {
        let existing = absolute
            .ancestors()
            .find(|ancestor| ancestor.exists())
            .unwrap_or(self.root.as_path());
        let canonical = existing.canonicalize()?;

        if !canonical.starts_with(&self.root) {
            return Err(SafetyError::OutsideRoot {
                path: absolute.to_path_buf(),
                root: self.root.clone(),
            });
        }
        Ok(())
    }

    /// Get the root.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_relative_paths() {
        assert!(validate_relative("a.go").is_ok());
        assert!(validate_relative("internal/store/a.go").is_ok());
        assert!(validate_relative("").is_ok());
        assert!(validate_relative(".").is_ok());
        assert!(matches!(
            validate_relative("../a.go"),
            Err(SafetyError::InvalidPath { .. })
        ));
        assert!(matches!(
            validate_relative("/etc/passwd"),
            Err(SafetyError::InvalidPath { .. })
        ));
        assert!(matches!(
            validate_relative("a\\b.go"),
            Err(SafetyError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_join() {
        assert_eq!(join("", "a.go"), "a.go");
        assert_eq!(join(".", "a.go"), "a.go");
        assert_eq!(join("pkg/", "a.go"), "pkg/a.go");
        assert_eq!(join("pkg", ""), "pkg");
    }

    #[test]
    fn test_resolve_inside_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let guard = RootGuard::new(temp_dir.path()).unwrap();

        let resolved = guard.resolve("pkg/not-yet.go").unwrap();
        assert!(resolved.starts_with(guard.root()));
    }

    #[test]
    #[cfg(unix)]
    fn test_symlink_escape() {
        use std::os::unix::fs::symlink;

        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("root");
        let outside = temp_dir.path().join("outside");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&outside).unwrap();
        symlink(&outside, root.join("escape")).unwrap();

        let guard = RootGuard::new(&root).unwrap();
        let result = guard.resolve("escape/a.go");

        assert!(matches!(result, Err(SafetyError::OutsideRoot { .. })));
    }
}
