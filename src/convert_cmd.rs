//! Command bodies for `docmark convert` and `docmark formats`.
//!
//! Results go to stdout (human summary or one JSON object per submission);
//! progress and logs go to stderr.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use crate::classify::AllowList;
use crate::config::Config;
use crate::convert::converter_from_config;
use crate::error::BatchError;
use crate::models::{BatchOutput, SubmissionOutcome, Upload};
use crate::pipeline::Pipeline;
use crate::progress::ProgressMode;

pub struct ConvertOptions {
    pub out_dir: PathBuf,
    pub json: bool,
    pub progress: ProgressMode,
}

/// Converts every input and writes the artifacts into `opts.out_dir`.
///
/// Inputs are read one at a time; an unreadable input aborts only its own
/// submission. Returns `false` when at least one submission failed as a whole
/// (unreadable input, aborted container or failed single file). Per-file
/// failures inside a container do not count.
pub fn run_convert(config: &Config, inputs: &[PathBuf], opts: &ConvertOptions) -> Result<bool> {
    std::fs::create_dir_all(&opts.out_dir).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            opts.out_dir.display()
        )
    })?;

    let converter = converter_from_config(&config.converter);
    let reporter = opts.progress.reporter();
    let pipeline = Pipeline::from_config(config, converter.as_ref(), reporter.as_ref())
        .context("Invalid batch.exclude_globs")?;

    let mut claimed = HashSet::new();
    let mut all_ok = true;
    for path in inputs {
        let outcome = match read_upload(path) {
            Ok(upload) => pipeline.process(&upload),
            Err(e) => {
                tracing::warn!(input = %path.display(), error = %e, "cannot read input");
                SubmissionOutcome::Aborted {
                    source_name: upload_name(path),
                    error: BatchError::Input(e),
                }
            }
        };
        all_ok &= !outcome.is_fatal();
        let artifact = write_artifact(&outcome, &opts.out_dir, &mut claimed)?;
        if opts.json {
            print_json(&outcome, artifact.as_ref())?;
        } else {
            print_human(&outcome, artifact.as_ref());
        }
    }
    Ok(all_ok)
}

fn read_upload(path: &Path) -> io::Result<Upload> {
    let bytes = std::fs::read(path)?;
    Ok(Upload::new(upload_name(path), bytes))
}

fn upload_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Reserves `name` for this run, or `<stem>-N.<ext>` when an earlier input
/// already wrote it.
fn claim_name(name: &str, claimed: &mut HashSet<String>) -> String {
    if claimed.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(i) if i > 0 => name.split_at(i),
        _ => (name, ""),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}{}", stem, n, ext);
        if claimed.insert(candidate.clone()) {
            tracing::warn!(output = %name, renamed = %candidate, "output name already used in this run");
            return candidate;
        }
        n += 1;
    }
}

/// A file written to the output directory.
struct Artifact {
    path: PathBuf,
    sha256: String,
}

fn write_artifact(
    outcome: &SubmissionOutcome,
    out_dir: &Path,
    claimed: &mut HashSet<String>,
) -> Result<Option<Artifact>> {
    let (name, bytes): (&str, &[u8]) = match outcome {
        SubmissionOutcome::Single(out) => (out.output_name.as_str(), out.text.as_bytes()),
        // Nothing to download: no archive for a batch without successes.
        SubmissionOutcome::Batch(out) if !out.result.successes.is_empty() => {
            (out.archive_name.as_str(), out.archive.as_slice())
        }
        _ => return Ok(None),
    };
    let path = out_dir.join(claim_name(name, claimed));
    std::fs::write(&path, bytes)
        .with_context(|| format!("Failed to write output file: {}", path.display()))?;
    Ok(Some(Artifact {
        path,
        sha256: format!("{:x}", Sha256::digest(bytes)),
    }))
}

fn print_human(outcome: &SubmissionOutcome, artifact: Option<&Artifact>) {
    println!("convert {}", outcome.source_name());
    match outcome {
        SubmissionOutcome::Single(_) => {
            if let Some(a) = artifact {
                println!("  output: {}", a.path.display());
            }
            println!("ok");
        }
        SubmissionOutcome::SingleFailed { message, .. } => {
            println!("  conversion failed: {}", message);
            println!("failed");
        }
        SubmissionOutcome::Batch(out) => print_batch_summary(out, artifact),
        SubmissionOutcome::Skipped { reason, .. } => {
            println!("  skipped: {}", reason);
        }
        SubmissionOutcome::Aborted { error, .. } => {
            println!("  error: {}", error);
            println!("failed");
        }
    }
}

fn print_batch_summary(out: &BatchOutput, artifact: Option<&Artifact>) {
    let r = &out.result;
    println!("  files found: {}", r.total_count);
    println!("  converted: {}", r.processed_count);
    println!("  failed: {}", r.failed_count());
    println!("  skipped: {}", r.skipped_count);
    if !out.rejected_entries.is_empty() {
        println!("  rejected entries: {}", out.rejected_entries.len());
    }
    if r.cancelled {
        println!("  cancelled before completion");
    }
    if !r.failures.is_empty() {
        println!("  errors:");
        for (path, message) in &r.failures {
            println!("  - {}: {}", path, message);
        }
    }
    match artifact {
        Some(a) => println!("  output: {}", a.path.display()),
        None => println!("  nothing to download: no file was converted"),
    }
    println!("ok");
}

fn print_json(outcome: &SubmissionOutcome, artifact: Option<&Artifact>) -> Result<()> {
    let output = artifact.map(|a| {
        serde_json::json!({
            "path": a.path.display().to_string(),
            "sha256": a.sha256,
        })
    });
    let mut obj = serde_json::json!({
        "submission": outcome.source_name(),
        "finished_at": chrono::Utc::now().to_rfc3339(),
        "output": output,
    });
    let details = match outcome {
        SubmissionOutcome::Single(_) => serde_json::json!({ "status": "converted" }),
        SubmissionOutcome::SingleFailed { message, .. } => serde_json::json!({
            "status": "failed",
            "error": message,
        }),
        SubmissionOutcome::Batch(out) => serde_json::json!({
            "status": batch_status(out),
            "total": out.result.total_count,
            "converted": out.result.processed_count,
            "failed": out.result.failed_count(),
            "skipped": out.result.skipped_count,
            "failures": out.result.failures,
            "skipped_paths": out.result.skipped,
            "rejected_entries": out.rejected_entries,
        }),
        SubmissionOutcome::Skipped { reason, .. } => serde_json::json!({
            "status": "skipped",
            "reason": reason,
        }),
        SubmissionOutcome::Aborted { error, .. } => serde_json::json!({
            "status": "aborted",
            "error": error.to_string(),
            "bad_container": error.is_bad_container(),
        }),
    };
    if let (Some(map), serde_json::Value::Object(extra)) = (obj.as_object_mut(), details) {
        map.extend(extra);
    }
    println!("{}", serde_json::to_string(&obj)?);
    Ok(())
}

fn batch_status(out: &BatchOutput) -> &'static str {
    if out.result.cancelled {
        "cancelled"
    } else {
        "completed"
    }
}

/// Prints the container and leaf extensions with the backend for each.
pub fn list_formats(config: &Config) -> Result<()> {
    let allow = AllowList::from_config(&config.formats);
    let converter = converter_from_config(&config.converter);

    println!("{:<12} {:<10} BACKEND", "EXTENSION", "KIND");
    for ext in allow.container_extensions() {
        println!("{:<12} {:<10} {}", ext, "container", "expand");
    }
    for ext in allow.leaf_extensions() {
        let backend = if converter.handles(ext) {
            converter.name().to_string()
        } else {
            "none (configure converter.kind = \"command\")".to_string()
        };
        println!("{:<12} {:<10} {}", ext, "leaf", backend);
    }
    println!(
        "output: .{}",
        config.formats.output_extension.trim_start_matches('.')
    );
    Ok(())
}
