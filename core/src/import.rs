//! Sequential log ingestion: mapped file → framer → session builder.

use std::fs::File;
use std::path::Path;

use memchr::memchr_iter;
use memmap2::Mmap;

use crate::cancel::CancelToken;
use crate::error::ImportError;
use crate::session::{CompletedSession, IngestOptions, SessionBuilder};

/// Parse one log file into completed sessions.
///
/// The pipeline is strictly sequential; the state machines need total
/// order over the records. Cancellation is checked between records.
pub fn ingest_file(
    path: &Path,
    options: IngestOptions,
    cancel: &CancelToken,
) -> Result<Vec<CompletedSession>, ImportError> {
    let file = File::open(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mmap = unsafe { Mmap::map(&file) }.map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let bytes = mmap.as_ref();

    let mut builder = SessionBuilder::new(options);
    let mut start = 0;
    let mut lines: u64 = 0;
    for end in memchr_iter(b'\n', bytes).chain(std::iter::once(bytes.len())) {
        if end > start {
            if cancel.is_cancelled() {
                return Err(ImportError::Cancelled);
            }
            // Log files are ASCII with rare UTF-8 names; invalid bytes in
            // a line just fail that line's frame and it is skipped.
            if let Ok(line) = std::str::from_utf8(&bytes[start..end]) {
                builder.process_line(line);
            }
            lines += 1;
        }
        start = end + 1;
        if start > bytes.len() {
            break;
        }
    }

    let sessions = builder.finish();
    tracing::info!(
        "[IMPORT] {}: {} lines, {} sessions",
        path.display(),
        lines,
        sessions.len()
    );
    Ok(sessions)
}
