//! Entry types and errors shared by every traversal strategy.

use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// What kind of filesystem object an entry was before it was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    /// A symbolic link that resolved to a regular file.
    Symlink,
}

/// Size and type of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMeta {
    pub size: u64,
    pub kind: EntryKind,
}

/// One entry handed to a traversal handler.
///
/// `path` is relative to the traversal root (or the archive root). The
/// reader is only valid for the duration of the handler call.
pub struct SourceEntry<'a> {
    pub path: &'a Path,
    pub meta: EntryMeta,
    pub reader: &'a mut dyn Read,
}

/// Errors that end a traversal.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The root path is missing or cannot be inspected
    #[error("Cannot open source '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The archive stream is corrupt or cannot be decompressed
    #[error("Archive '{path}' unreadable: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
