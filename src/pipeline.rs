//! Submission dispatch.
//!
//! Each uploaded blob is handled on its own: containers are expanded, walked
//! and packed; leaf files are converted directly; anything else is skipped.
//! A failure in one submission never affects its siblings.

use std::fs;
use std::path::Path;

use globset::GlobSet;

use crate::classify::{AllowList, TypeVerdict};
use crate::config::Config;
use crate::convert::{convert_file, Converter};
use crate::error::BatchError;
use crate::expand::{expand, scoped_area, ExpandLimits};
use crate::models::{BatchOutput, ConversionOutcome, SingleOutput, SubmissionOutcome, Upload};
use crate::pack::{archive_name, pack};
use crate::progress::{notify, ProgressEvent, ProgressReporter};
use crate::walk::{build_globset, swap_extension, CancelFlag, Walker};

/// Immutable per-run settings plus the collaborators a submission needs.
pub struct Pipeline<'a> {
    allow: AllowList,
    excludes: GlobSet,
    limits: ExpandLimits,
    output_extension: String,
    converter: &'a dyn Converter,
    reporter: &'a dyn ProgressReporter,
    cancel: Option<&'a CancelFlag>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        allow: AllowList,
        converter: &'a dyn Converter,
        reporter: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            allow,
            excludes: GlobSet::empty(),
            limits: ExpandLimits::default(),
            output_extension: "md".to_string(),
            converter,
            reporter,
            cancel: None,
        }
    }

    pub fn from_config(
        config: &Config,
        converter: &'a dyn Converter,
        reporter: &'a dyn ProgressReporter,
    ) -> Result<Self, globset::Error> {
        Ok(Self {
            allow: AllowList::from_config(&config.formats),
            excludes: build_globset(&config.batch.exclude_globs)?,
            limits: ExpandLimits::from_config(&config.batch),
            output_extension: config.formats.output_extension.clone(),
            converter,
            reporter,
            cancel: None,
        })
    }

    pub fn with_limits(mut self, limits: ExpandLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_excludes(mut self, excludes: GlobSet) -> Self {
        self.excludes = excludes;
        self
    }

    pub fn with_cancel_flag(mut self, flag: &'a CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Processes every upload in order.
    pub fn process_all(&self, uploads: &[Upload]) -> Vec<SubmissionOutcome> {
        uploads.iter().map(|u| self.process(u)).collect()
    }

    pub fn process(&self, upload: &Upload) -> SubmissionOutcome {
        match self.allow.classify(&upload.name) {
            TypeVerdict::Container => match self.process_container(upload) {
                Ok(out) => SubmissionOutcome::Batch(out),
                Err(error) => {
                    tracing::warn!(submission = %upload.name, %error, "submission aborted");
                    SubmissionOutcome::Aborted {
                        source_name: upload.name.clone(),
                        error,
                    }
                }
            },
            TypeVerdict::Leaf(_) => self.process_single(upload),
            TypeVerdict::Unsupported => SubmissionOutcome::Skipped {
                source_name: upload.name.clone(),
                reason: "file type is not supported; upload a supported file or a ZIP archive"
                    .to_string(),
            },
        }
    }

    fn process_container(&self, upload: &Upload) -> Result<BatchOutput, BatchError> {
        notify(
            self.reporter,
            ProgressEvent::Expanding {
                submission: upload.name.clone(),
            },
        );
        let tree = expand(&upload.bytes, &self.limits)?;

        let mut walker = Walker::new(&self.allow, self.converter)
            .excludes(self.excludes.clone())
            .output_extension(&self.output_extension)
            .label(&upload.name);
        if let Some(flag) = self.cancel {
            walker = walker.cancel_flag(flag);
        }
        let result = walker.walk(tree.root(), self.reporter)?;
        let rejected_entries = tree.rejected().to_vec();
        // Release the extraction area before packing.
        drop(tree);

        let archive = pack(result.entries())?;
        tracing::info!(
            submission = %upload.name,
            converted = result.processed_count,
            failed = result.failed_count(),
            skipped = result.skipped_count,
            "batch complete"
        );
        Ok(BatchOutput {
            source_name: upload.name.clone(),
            archive_name: archive_name(&upload.name),
            archive,
            result,
            rejected_entries,
        })
    }

    fn process_single(&self, upload: &Upload) -> SubmissionOutcome {
        let area = match scoped_area(self.limits.temp_parent.as_deref()) {
            Ok(area) => area,
            Err(e) => {
                return SubmissionOutcome::Aborted {
                    source_name: upload.name.clone(),
                    error: BatchError::TempArea(e),
                }
            }
        };
        let base = base_name(&upload.name);
        let path = area.path().join(base);
        if let Err(e) = fs::write(&path, &upload.bytes) {
            return SubmissionOutcome::Aborted {
                source_name: upload.name.clone(),
                error: BatchError::TempArea(e),
            };
        }

        let outcome = convert_file(self.converter, &path);
        notify(
            self.reporter,
            ProgressEvent::Converting {
                submission: upload.name.clone(),
                current: 1,
                total: 1,
                path: base.to_string(),
            },
        );
        match outcome {
            ConversionOutcome::Success(text) => SubmissionOutcome::Single(SingleOutput {
                source_name: upload.name.clone(),
                output_name: swap_extension(base, &self.output_extension),
                text,
            }),
            ConversionOutcome::Failure(message) => {
                tracing::warn!(submission = %upload.name, error = %message, "conversion failed");
                SubmissionOutcome::SingleFailed {
                    source_name: upload.name.clone(),
                    message,
                }
            }
        }
    }
}

/// Last path segment of an upload name; never empty and never `..`.
fn base_name(name: &str) -> &str {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    base.rsplit('\\').next().filter(|s| !s.is_empty()).unwrap_or("upload")
}
