//! Error taxonomy for the conversion pipeline.
//!
//! Per-item faults ([`ConvertError`]) are folded into outcomes by the
//! conversion adapter and never abort a batch. The remaining types describe
//! faults that abort one submission as a whole; they surface to the caller
//! as a single [`BatchError`].

use std::io;

/// A converter could not produce text for one file.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("no converter available for '.{0}' files")]
    Unsupported(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("CSV parsing failed: {0}")]
    Csv(String),
    #[error("JSON parsing failed: {0}")]
    Json(String),
    #[error("file is not valid UTF-8 text")]
    NotUtf8,
    #[error("external converter failed: {0}")]
    Command(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The archive expander could not materialize a container.
#[derive(Debug, thiserror::Error)]
pub enum ExpandError {
    /// The input is not a well-formed archive.
    #[error("not a valid ZIP archive or the archive is corrupt: {0}")]
    BadContainer(String),
    /// The archive exceeds the configured entry or size limits.
    #[error("archive exceeds extraction limits: {0}")]
    LimitExceeded(String),
    /// The scoped extraction area could not be created or written.
    #[error("extraction failed: {0}")]
    Io(#[from] io::Error),
}

/// Enumerating the expanded tree failed.
#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error("failed to enumerate extracted files: {0}")]
    Enumerate(#[from] walkdir::Error),
}

/// Building the output archive failed.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("failed to build result archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("failed to build result archive: {0}")]
    Io(#[from] io::Error),
}

/// Single top-level failure for one submission.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error(transparent)]
    Expand(#[from] ExpandError),
    #[error(transparent)]
    Walk(#[from] WalkError),
    #[error(transparent)]
    Pack(#[from] PackError),
    #[error("failed to create temporary area: {0}")]
    TempArea(io::Error),
    #[error("failed to read input: {0}")]
    Input(io::Error),
}

impl BatchError {
    /// Whether the submission was rejected as a malformed container.
    pub fn is_bad_container(&self) -> bool {
        matches!(self, BatchError::Expand(ExpandError::BadContainer(_)))
    }
}
