//! Core data models used throughout docmark.
//!
//! These types represent the uploads, enumerated files, per-file outcomes and
//! batch summaries that flow through the conversion pipeline.

use indexmap::IndexMap;
use std::path::PathBuf;

/// A named byte blob supplied by the caller.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// A file enumerated under an expanded tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    /// Relative path with `/` separators, independent of host platform.
    pub relative_path: String,
    /// Location of the materialized file on disk.
    pub path: PathBuf,
}

/// Result of converting one leaf file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    Success(String),
    Failure(String),
}

/// Accumulated results of one walk.
///
/// `successes` is keyed by the output path (extension swapped), `failures`
/// by the original relative path, suffixed with ` (N)` when that key is
/// already used; the two key sets never overlap. Both preserve enumeration order. When the
/// walk ran to completion, `successes.len() + failures.len() + skipped_count
/// == total_count`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub successes: IndexMap<String, String>,
    pub failures: IndexMap<String, String>,
    pub processed_count: usize,
    pub skipped_count: usize,
    pub total_count: usize,
    /// Relative paths that were enumerated but not converted.
    pub skipped: Vec<String>,
    /// Set when the walk stopped early on request.
    pub cancelled: bool,
}

impl BatchResult {
    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    /// Output archive entries, one per success, in enumeration order.
    pub fn entries(&self) -> impl Iterator<Item = OutputArchiveEntry<'_>> {
        self.successes
            .iter()
            .map(|(path, text)| OutputArchiveEntry {
                path,
                bytes: text.as_bytes(),
            })
    }
}

/// One entry of the result archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputArchiveEntry<'a> {
    pub path: &'a str,
    pub bytes: &'a [u8],
}

/// Converted text for a single uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleOutput {
    pub source_name: String,
    pub output_name: String,
    pub text: String,
}

/// Output of a container submission.
#[derive(Debug, Clone)]
pub struct BatchOutput {
    pub source_name: String,
    pub archive_name: String,
    pub archive: Vec<u8>,
    pub result: BatchResult,
    /// Entries that were refused during expansion (path traversal).
    pub rejected_entries: Vec<String>,
}

/// What happened to one uploaded blob.
#[derive(Debug)]
pub enum SubmissionOutcome {
    Single(SingleOutput),
    SingleFailed {
        source_name: String,
        message: String,
    },
    Batch(BatchOutput),
    Skipped {
        source_name: String,
        reason: String,
    },
    Aborted {
        source_name: String,
        error: crate::error::BatchError,
    },
}

impl SubmissionOutcome {
    pub fn source_name(&self) -> &str {
        match self {
            SubmissionOutcome::Single(out) => &out.source_name,
            SubmissionOutcome::SingleFailed { source_name, .. }
            | SubmissionOutcome::Skipped { source_name, .. }
            | SubmissionOutcome::Aborted { source_name, .. } => source_name,
            SubmissionOutcome::Batch(out) => &out.source_name,
        }
    }

    /// Whether this submission failed as a whole.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SubmissionOutcome::SingleFailed { .. } | SubmissionOutcome::Aborted { .. }
        )
    }
}
