//! Source module - uniform traversal over files, directory trees and
//! compressed tar archives.
//!
//! - **Strategies**: [`Source::File`], [`Source::Directory`], [`Source::TarXz`]
//! - **Entries**: [`SourceEntry`] triples of relative path, [`EntryMeta`] and reader
//! - **Admission**: [`DateWindow`] filtering of consensus snapshots by file name

mod archive;
pub mod traits;
mod walk;
pub mod window;

use std::path::{Path, PathBuf};

use crate::traits::DiagnosticReporter;

pub use traits::{EntryKind, EntryMeta, SourceEntry, SourceError};
pub use window::{snapshot_time, DateWindow, SNAPSHOT_NAME_FORMAT};

/// Reserved suffix that selects streaming archive traversal.
pub const ARCHIVE_SUFFIX: &str = ".tar.xz";

/// A traversal root and the strategy used to visit it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    Directory(PathBuf),
    TarXz(PathBuf),
}

impl Source {
    /// Picks a strategy for `path`. Archives are recognised by
    /// [`ARCHIVE_SUFFIX`] alone; other paths must exist.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        if path.to_string_lossy().ends_with(ARCHIVE_SUFFIX) {
            return Ok(Source::TarXz(path.to_path_buf()));
        }

        let metadata = std::fs::metadata(path).map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        if metadata.is_dir() {
            Ok(Source::Directory(path.to_path_buf()))
        } else {
            Ok(Source::File(path.to_path_buf()))
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Source::File(p) | Source::Directory(p) | Source::TarXz(p) => p,
        }
    }

    /// Calls `handler` once per file entry. Directories are never passed to
    /// the handler.
    pub fn walk<F>(&self, reporter: &dyn DiagnosticReporter, handler: F) -> Result<(), SourceError>
    where
        F: FnMut(SourceEntry<'_>),
    {
        match self {
            Source::File(path) | Source::Directory(path) => walk::walk_tree(path, reporter, handler),
            Source::TarXz(path) => archive::walk_tar_xz(path, handler),
        }
    }
}
