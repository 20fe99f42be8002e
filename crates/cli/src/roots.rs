//! Startup checks for the source and replica roots

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// The roots cannot be used as a sync pair
#[derive(Debug, Error)]
pub enum RootError {
    #[error("source directory {} does not exist", .0.display())]
    SourceMissing(PathBuf),

    #[error("source {} is not a directory", .0.display())]
    SourceNotDirectory(PathBuf),

    #[error("cannot read source directory {}: {source}", .path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("replica {} and source {} overlap", .replica_root.display(), .source_root.display())]
    Overlap {
        source_root: PathBuf,
        replica_root: PathBuf,
    },

    #[error("replica {} exists but is not a directory", .0.display())]
    ReplicaNotDirectory(PathBuf),

    #[error("cannot create replica directory {}: {source}", .path.display())]
    ReplicaCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Resolve both roots to absolute paths and create the replica if needed
///
/// The replica may not equal the source, and neither may contain the other.
/// The overlap check runs before anything is created, so a bad replica path
/// never leaves a stray directory inside the source.
pub fn prepare(source: &Path, replica: &Path) -> Result<(PathBuf, PathBuf), RootError> {
    let source = match fs::canonicalize(source) {
        Ok(path) => path,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(RootError::SourceMissing(source.to_path_buf()))
        }
        Err(e) => {
            return Err(RootError::SourceUnreadable {
                path: source.to_path_buf(),
                source: e,
            })
        }
    };
    if !source.is_dir() {
        return Err(RootError::SourceNotDirectory(source));
    }
    fs::read_dir(&source).map_err(|e| RootError::SourceUnreadable {
        path: source.clone(),
        source: e,
    })?;

    let replica = resolve(replica).map_err(|e| RootError::ReplicaCreate {
        path: replica.to_path_buf(),
        source: e,
    })?;
    if replica.starts_with(&source) || source.starts_with(&replica) {
        return Err(RootError::Overlap {
            source_root: source,
            replica_root: replica,
        });
    }

    match fs::metadata(&replica) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(RootError::ReplicaNotDirectory(replica)),
        Err(_) => {
            tracing::info!(path = %replica.display(), "Creating replica directory");
            fs::create_dir_all(&replica).map_err(|e| RootError::ReplicaCreate {
                path: replica.clone(),
                source: e,
            })?;
        }
    }

    Ok((source, replica))
}

/// Absolute form of a path that may not exist yet
///
/// `..` is folded lexically first, then the longest existing ancestor is
/// canonicalized and the rest appended.
fn resolve(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&std::env::current_dir()?.join(path))
    };

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    let base = loop {
        match fs::canonicalize(existing) {
            Ok(base) => break base,
            Err(e) => match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    missing.push(name.to_os_string());
                    existing = parent;
                }
                _ => return Err(e),
            },
        }
    };

    let mut resolved = base;
    for name in missing.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

/// Drop `.` and fold `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
