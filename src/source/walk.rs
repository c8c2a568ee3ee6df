//! Plain file and directory traversal.

use std::fs::File;
use std::path::Path;
use walkdir::WalkDir;

use super::traits::{EntryKind, EntryMeta, SourceEntry, SourceError};
use crate::diagnostics::Diagnostic;
use crate::traits::DiagnosticReporter;

/// Visits `root` and, if it is a directory, every file below it in
/// lexicographic path order. Entries that cannot be listed or opened are
/// reported and skipped.
pub(crate) fn walk_tree<F>(
    root: &Path,
    reporter: &dyn DiagnosticReporter,
    mut handler: F,
) -> Result<(), SourceError>
where
    F: FnMut(SourceEntry<'_>),
{
    let walker = WalkDir::new(root).follow_links(true).sort_by_file_name();

    for item in walker {
        let entry = match item {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                reporter.report(Diagnostic::EntryUnreadable {
                    path,
                    error: e.to_string(),
                });
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let relative = relative_path(root, entry.path());
        let mut file = match File::open(entry.path()) {
            Ok(file) => file,
            Err(e) => {
                reporter.report(Diagnostic::EntryUnreadable {
                    path: relative.to_path_buf(),
                    error: e.to_string(),
                });
                continue;
            }
        };

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let kind = if entry.path_is_symlink() {
            EntryKind::Symlink
        } else {
            EntryKind::File
        };

        handler(SourceEntry {
            path: relative,
            meta: EntryMeta { size, kind },
            reader: &mut file,
        });
    }

    Ok(())
}

/// Path below `root`; a single-file root yields its file name.
fn relative_path<'a>(root: &Path, path: &'a Path) -> &'a Path {
    match path.strip_prefix(root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel,
        _ => path.file_name().map(Path::new).unwrap_or(path),
    }
}
