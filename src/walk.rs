//! Batch walker: enumerate, classify, convert, accumulate.
//!
//! Two passes over the tree: the first enumerates every regular file and
//! sorts by relative path so totals are known and results reproducible; the
//! second dispatches each file in that order. Files are converted strictly
//! one at a time.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::classify::{AllowList, TypeVerdict};
use crate::convert::{convert_file, Converter};
use crate::error::WalkError;
use crate::models::{BatchResult, ConversionOutcome, SourceItem};
use crate::progress::{notify, ProgressEvent, ProgressReporter};

/// Cooperative cancellation, checked after each file completes.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Walker<'a> {
    allow: &'a AllowList,
    converter: &'a dyn Converter,
    excludes: GlobSet,
    output_extension: &'a str,
    label: &'a str,
    cancel: Option<&'a CancelFlag>,
}

impl<'a> Walker<'a> {
    pub fn new(allow: &'a AllowList, converter: &'a dyn Converter) -> Self {
        Self {
            allow,
            converter,
            excludes: GlobSet::empty(),
            output_extension: "md",
            label: "",
            cancel: None,
        }
    }

    /// Files matching any of these globs are skipped without conversion.
    pub fn excludes(mut self, excludes: GlobSet) -> Self {
        self.excludes = excludes;
        self
    }

    pub fn output_extension(mut self, ext: &'a str) -> Self {
        self.output_extension = ext;
        self
    }

    /// Submission name attached to progress events.
    pub fn label(mut self, label: &'a str) -> Self {
        self.label = label;
        self
    }

    pub fn cancel_flag(mut self, flag: &'a CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn walk(
        &self,
        root: &Path,
        reporter: &dyn ProgressReporter,
    ) -> Result<BatchResult, WalkError> {
        let items = enumerate(root)?;
        let total = items.len() as u64;
        let mut result = BatchResult {
            total_count: items.len(),
            ..BatchResult::default()
        };

        for (idx, item) in items.iter().enumerate() {
            match self.verdict(&item.relative_path) {
                TypeVerdict::Leaf(_) => self.convert_one(item, &mut result),
                _ => {
                    tracing::debug!(path = %item.relative_path, "skipping unsupported file");
                    result.skipped_count += 1;
                    result.skipped.push(item.relative_path.clone());
                }
            }

            let current = idx as u64 + 1;
            notify(
                reporter,
                ProgressEvent::Converting {
                    submission: self.label.to_string(),
                    current,
                    total,
                    path: item.relative_path.clone(),
                },
            );

            if current < total && self.cancel.is_some_and(CancelFlag::is_cancelled) {
                tracing::info!(done = current, total, "walk cancelled");
                result.cancelled = true;
                break;
            }
        }

        notify(
            reporter,
            ProgressEvent::Finished {
                submission: self.label.to_string(),
                total,
            },
        );
        Ok(result)
    }

    fn verdict(&self, relative_path: &str) -> TypeVerdict {
        if self.excludes.is_match(relative_path) {
            return TypeVerdict::Unsupported;
        }
        match self.allow.classify(relative_path) {
            // Nested archives are not expanded.
            TypeVerdict::Container => TypeVerdict::Unsupported,
            other => other,
        }
    }

    fn convert_one(&self, item: &SourceItem, result: &mut BatchResult) {
        match convert_file(self.converter, &item.path) {
            ConversionOutcome::Success(text) => {
                let key = swap_extension(&item.relative_path, self.output_extension);
                if key_taken(result, &key) {
                    let message = format!("output path {} was already produced by another file", key);
                    tracing::warn!(path = %item.relative_path, "{}", message);
                    record_failure(result, &item.relative_path, message);
                } else {
                    result.successes.insert(key, text);
                    result.processed_count += 1;
                }
            }
            ConversionOutcome::Failure(message) => {
                tracing::warn!(path = %item.relative_path, error = %message, "conversion failed");
                record_failure(result, &item.relative_path, message);
            }
        }
    }
}

/// Whether `key` is already used by either result map.
fn key_taken(result: &BatchResult, key: &str) -> bool {
    result.successes.contains_key(key) || result.failures.contains_key(key)
}

/// Records a failure under the source path, or under `"<path> (N)"` when
/// that key already belongs to another entry, so the two maps stay disjoint.
fn record_failure(result: &mut BatchResult, relative_path: &str, message: String) {
    let mut key = relative_path.to_string();
    let mut n = 2;
    while key_taken(result, &key) {
        key = format!("{} ({})", relative_path, n);
        n += 1;
    }
    result.failures.insert(key, message);
}

/// Lists every regular file under `root`, sorted by `/`-joined relative path.
pub fn enumerate(root: &Path) -> Result<Vec<SourceItem>, WalkError> {
    let mut items = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let relative_path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        items.push(SourceItem {
            relative_path,
            path: path.to_path_buf(),
        });
    }

    // Sort for deterministic ordering
    items.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(items)
}

/// Replaces the extension of the last segment of `path` with `ext`.
///
/// A name without an extension (or a dotfile) gets `ext` appended.
pub fn swap_extension(path: &str, ext: &str) -> String {
    let (dir, name) = match path.rfind('/') {
        Some(i) => path.split_at(i + 1),
        None => ("", path),
    };
    let stem = match name.rfind('.') {
        Some(i) if i > 0 => &name[..i],
        _ => name,
    };
    format!("{}{}.{}", dir, stem, ext)
}

pub fn build_globset(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    builder.build()
}
