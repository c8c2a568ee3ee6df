//! Streaming traversal of `.tar.xz` archives.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use xz2::read::XzDecoder;

use super::traits::{EntryKind, EntryMeta, SourceEntry, SourceError};

/// Decompresses and iterates the archive in one pass, handing each regular
/// file to `handler` in archive order. Any open, decompression or header
/// error ends the traversal.
pub(crate) fn walk_tar_xz<F>(archive_path: &Path, mut handler: F) -> Result<(), SourceError>
where
    F: FnMut(SourceEntry<'_>),
{
    let archive_error = |source: std::io::Error| SourceError::Archive {
        path: archive_path.to_path_buf(),
        source,
    };

    let file = File::open(archive_path).map_err(|source| SourceError::Open {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let mut archive = tar::Archive::new(XzDecoder::new(BufReader::new(file)));

    for item in archive.entries().map_err(archive_error)? {
        let mut entry = item.map_err(archive_error)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry.path().map_err(archive_error)?.into_owned();
        let meta = EntryMeta {
            size: entry.size(),
            kind: EntryKind::File,
        };

        handler(SourceEntry {
            path: &path,
            meta,
            reader: &mut entry,
        });
    }

    // Read past the end-of-archive marker so the xz index, footer and
    // integrity check are verified too.
    let mut rest = archive.into_inner();
    io::copy(&mut rest, &mut io::sink()).map_err(archive_error)?;

    Ok(())
}
