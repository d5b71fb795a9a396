//! Filesystem layers a package is read from and written to.
//!
//! A [`Layer`] is a read view addressed by relative, slash separated paths.
//! A layer that can also be written hands out a [`LayerWriter`]; the
//! package orchestrator refuses to start on an output layer without one.

use crate::safety::{validate_relative, RootGuard, SafetyError};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

/// Permission bits used when neither layer knows the file.
pub const DEFAULT_MODE: u32 = 0o644;

#[derive(Error, Debug)]
pub enum LayerError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Safety(#[from] SafetyError),

    #[error("in-memory layer lock poisoned")]
    Poisoned,
}

impl LayerError {
    fn io(path: &str, source: std::io::Error) -> Self {
        LayerError::Io {
            path: path.to_string(),
            source,
        }
    }
}

/// One directory entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Read access to a tree of files.
pub trait Layer: fmt::Debug + Send + Sync {
    /// Read a whole file; `Ok(None)` when it does not exist.
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, LayerError>;

    /// List a directory; a missing directory is empty.
    fn read_dir(&self, dir: &str) -> Result<Vec<DirEntry>, LayerError>;

    /// Permission bits of a file, when the layer tracks them.
    fn mode(&self, path: &str) -> Result<Option<u32>, LayerError>;

    /// Write capability, if this layer has one.
    fn writer(&self) -> Option<&dyn LayerWriter> {
        None
    }
}

/// Create-file and create-directory capability of an output layer.
pub trait LayerWriter {
    /// Create or replace a file with the given contents and permission bits.
    fn write_file(&self, path: &str, data: &[u8], mode: u32) -> Result<(), LayerError>;

    /// Create a directory and all missing parents.
    fn create_dir_all(&self, path: &str) -> Result<(), LayerError>;
}

/// A layer rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct DirLayer {
    guard: RootGuard,
}

impl DirLayer {
    /// Open an existing directory as a layer.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, LayerError> {
        Ok(Self {
            guard: RootGuard::new(root)?,
        })
    }

    pub fn root(&self) -> &Path {
        self.guard.root()
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, LayerError> {
        Ok(self.guard.resolve(path)?)
    }
}

impl Layer for DirLayer {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, LayerError> {
        let full = self.resolve(path)?;
        match fs::read(&full) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LayerError::io(path, e)),
        }
    }

    fn read_dir(&self, dir: &str) -> Result<Vec<DirEntry>, LayerError> {
        let full = self.resolve(dir)?;
        let entries = match fs::read_dir(&full) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LayerError::io(dir, e)),
        };

        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| LayerError::io(dir, e))?;
            let file_type = entry.file_type().map_err(|e| LayerError::io(dir, e))?;
            out.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: file_type.is_dir(),
            });
        }
        out.sort();
        Ok(out)
    }

    fn mode(&self, path: &str) -> Result<Option<u32>, LayerError> {
        let full = self.resolve(path)?;
        match fs::metadata(&full) {
            Ok(meta) => Ok(permission_bits(&meta)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LayerError::io(path, e)),
        }
    }

    fn writer(&self) -> Option<&dyn LayerWriter> {
        Some(self)
    }
}

impl LayerWriter for DirLayer {
    fn write_file(&self, path: &str, data: &[u8], mode: u32) -> Result<(), LayerError> {
        let full = self.resolve(path)?;
        atomic_write(&full, data, mode).map_err(|e| LayerError::io(path, e))?;

        // Bump mtime so build tools notice the change
        let now = filetime::FileTime::now();
        filetime::set_file_mtime(&full, now).map_err(|e| LayerError::io(path, e))?;
        Ok(())
    }

    fn create_dir_all(&self, path: &str) -> Result<(), LayerError> {
        let full = self.resolve(path)?;
        fs::create_dir_all(&full).map_err(|e| LayerError::io(path, e))
    }
}

#[cfg(unix)]
fn permission_bits(meta: &fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn permission_bits(_meta: &fs::Metadata) -> Option<u32> {
    None
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or the old file stays in place.
fn atomic_write(path: &Path, content: &[u8], mode: u32) -> std::io::Result<()> {
    // Tempfile in the same directory to stay on one filesystem
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        )
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    set_permission_bits(temp.as_file(), mode)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(unix)]
fn set_permission_bits(file: &fs::File, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_permission_bits(_file: &fs::File, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MemFile {
    data: Vec<u8>,
    mode: u32,
}

#[derive(Debug, Default)]
struct MemTree {
    files: BTreeMap<String, MemFile>,
    dirs: BTreeSet<String>,
}

/// An in-memory layer, used as scratch output for dry runs and in tests.
#[derive(Debug, Default)]
pub struct MemLayer {
    tree: RwLock<MemTree>,
}

impl MemLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert with the default mode.
    pub fn with_file(self, path: &str, data: impl Into<Vec<u8>>) -> Self {
        if let Ok(mut tree) = self.tree.write() {
            tree.files.insert(
                normalize(path),
                MemFile {
                    data: data.into(),
                    mode: DEFAULT_MODE,
                },
            );
        }
        self
    }

    /// Snapshot of every file as (path, contents), sorted by path.
    pub fn files(&self) -> Result<Vec<(String, Vec<u8>)>, LayerError> {
        let tree = self.tree.read().map_err(|_| LayerError::Poisoned)?;
        Ok(tree
            .files
            .iter()
            .map(|(path, file)| (path.clone(), file.data.clone()))
            .collect())
    }

    /// Contents of one file as UTF-8, for assertions and previews.
    pub fn get_string(&self, path: &str) -> Option<String> {
        let tree = self.tree.read().ok()?;
        let file = tree.files.get(&normalize(path))?;
        Some(String::from_utf8_lossy(&file.data).into_owned())
    }
}

fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect::<Vec<_>>()
        .join("/")
}

impl Layer for MemLayer {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, LayerError> {
        validate_relative(path)?;
        let tree = self.tree.read().map_err(|_| LayerError::Poisoned)?;
        Ok(tree.files.get(&normalize(path)).map(|f| f.data.clone()))
    }

    fn read_dir(&self, dir: &str) -> Result<Vec<DirEntry>, LayerError> {
        validate_relative(dir)?;
        let dir = normalize(dir);
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };

        let tree = self.tree.read().map_err(|_| LayerError::Poisoned)?;
        let mut entries = BTreeSet::new();
        let paths = tree
            .files
            .keys()
            .map(|p| (p, false))
            .chain(tree.dirs.iter().map(|p| (p, true)));
        for (path, is_dir) in paths {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            match rest.split_once('/') {
                Some((first, _)) => entries.insert(DirEntry {
                    name: first.to_string(),
                    is_dir: true,
                }),
                None => entries.insert(DirEntry {
                    name: rest.to_string(),
                    is_dir,
                }),
            };
        }
        Ok(entries.into_iter().collect())
    }

    fn mode(&self, path: &str) -> Result<Option<u32>, LayerError> {
        validate_relative(path)?;
        let tree = self.tree.read().map_err(|_| LayerError::Poisoned)?;
        Ok(tree.files.get(&normalize(path)).map(|f| f.mode))
    }

    fn writer(&self) -> Option<&dyn LayerWriter> {
        Some(self)
    }
}

impl LayerWriter for MemLayer {
    fn write_file(&self, path: &str, data: &[u8], mode: u32) -> Result<(), LayerError> {
        validate_relative(path)?;
        let mut tree = self.tree.write().map_err(|_| LayerError::Poisoned)?;
        tree.files.insert(
            normalize(path),
            MemFile {
                data: data.to_vec(),
                mode,
            },
        );
        Ok(())
    }

    fn create_dir_all(&self, path: &str) -> Result<(), LayerError> {
        validate_relative(path)?;
        let path = normalize(path);
        if path.is_empty() {
            return Ok(());
        }
        let mut tree = self.tree.write().map_err(|_| LayerError::Poisoned)?;
        tree.dirs.insert(path);
        Ok(())
    }
}

/// Wraps a layer and hides its write capability.
#[derive(Debug)]
pub struct ReadOnly<L>(pub L);

impl<L: Layer> Layer for ReadOnly<L> {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, LayerError> {
        self.0.read(path)
    }

    fn read_dir(&self, dir: &str) -> Result<Vec<DirEntry>, LayerError> {
        self.0.read_dir(dir)
    }

    fn mode(&self, path: &str) -> Result<Option<u32>, LayerError> {
        self.0.mode(path)
    }
}
