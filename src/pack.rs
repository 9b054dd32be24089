//! Result packaging: successes into an in-memory ZIP.
//!
//! Entries are written in the map's order with a fixed timestamp and fixed
//! compression so identical input produces byte-identical archives.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::error::PackError;
use crate::models::OutputArchiveEntry;

/// Builds a ZIP holding one entry per [`OutputArchiveEntry`], in order.
///
/// No entries yield a valid archive with no entries.
pub fn pack<'a>(
    entries: impl IntoIterator<Item = OutputArchiveEntry<'a>>,
) -> Result<Vec<u8>, PackError> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut count = 0usize;
    for entry in entries {
        zip.start_file(entry.path, options)?;
        zip.write_all(entry.bytes)?;
        count += 1;
    }
    let cursor = zip.finish()?;
    tracing::debug!(entries = count, "packed result archive");
    Ok(cursor.into_inner())
}

/// Name of the result archive for a container called `source_name`.
pub fn archive_name(source_name: &str) -> String {
    let base = source_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(source_name);
    let stem = match base.rfind('.') {
        Some(i) if i > 0 => &base[..i],
        _ => base,
    };
    format!("{}_markdown_results.zip", stem)
}
