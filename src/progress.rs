//! Conversion progress reporting.
//!
//! The batch walker pushes events into a [`ProgressReporter`]; rendering is
//! the reporter's concern. Progress is emitted on **stderr** so stdout
//! remains parseable for scripts. Reporters are fire-and-forget: they return
//! nothing and swallow their own write errors, and the walker additionally
//! contains panics so a broken sink cannot abort a batch.

use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// A single progress event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A container is being expanded (total unknown yet).
    Expanding { submission: String },
    /// `current` of `total` enumerated files are done; `path` is the latest.
    Converting {
        submission: String,
        current: u64,
        total: u64,
        path: String,
    },
    /// The walk over `total` files has ended.
    Finished { submission: String, total: u64 },
}

/// Sink for progress events.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Delivers `event` to `reporter`, discarding any panic raised by the sink.
pub fn notify(reporter: &dyn ProgressReporter, event: ProgressEvent) {
    if catch_unwind(AssertUnwindSafe(|| reporter.report(event))).is_err() {
        tracing::debug!("progress reporter panicked; ignoring");
    }
}

/// Completed fraction in `[0.0, 1.0]`. An empty batch is complete.
pub fn fraction(current: u64, total: u64) -> f64 {
    if total == 0 {
        1.0
    } else {
        (current as f64 / total as f64).min(1.0)
    }
}

/// Human-friendly progress on stderr: "convert data.zip  3 / 10 files (30%)  a/b.pdf".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Expanding { submission } => {
                format!("convert {}  expanding...\n", submission)
            }
            ProgressEvent::Converting {
                submission,
                current,
                total,
                path,
            } => format!(
                "convert {}  {} / {} files ({:.0}%)  {}\n",
                submission,
                format_number(*current),
                format_number(*total),
                fraction(*current, *total) * 100.0,
                path
            ),
            ProgressEvent::Finished { submission, total } => {
                format!(
                    "convert {}  done, {} files\n",
                    submission,
                    format_number(*total)
                )
            }
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Expanding { submission } => serde_json::json!({
                "event": "progress",
                "submission": submission,
                "phase": "expanding"
            }),
            ProgressEvent::Converting {
                submission,
                current,
                total,
                path,
            } => serde_json::json!({
                "event": "progress",
                "submission": submission,
                "phase": "converting",
                "n": current,
                "total": total,
                "fraction": fraction(*current, *total),
                "path": path
            }),
            ProgressEvent::Finished { submission, total } => serde_json::json!({
                "event": "progress",
                "submission": submission,
                "phase": "finished",
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    Auto,
    Off,
    Human,
    Json,
}

impl ProgressMode {
    pub fn resolve(self) -> Self {
        match self {
            ProgressMode::Auto if atty::is(atty::Stream::Stderr) => ProgressMode::Human,
            ProgressMode::Auto => ProgressMode::Off,
            other => other,
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self.resolve() {
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
            _ => Box::new(NoProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn fraction_of_empty_batch_is_complete() {
        assert_eq!(fraction(0, 0), 1.0);
        assert_eq!(fraction(1, 4), 0.25);
        assert_eq!(fraction(4, 4), 1.0);
    }

    struct Exploding;

    impl ProgressReporter for Exploding {
        fn report(&self, _event: ProgressEvent) {
            panic!("sink closed");
        }
    }

    #[test]
    fn notify_swallows_reporter_panics() {
        notify(
            &Exploding,
            ProgressEvent::Finished {
                submission: "x.zip".into(),
                total: 0,
            },
        );
    }

    #[test]
    fn explicit_modes_resolve_to_themselves() {
        assert_eq!(ProgressMode::Json.resolve(), ProgressMode::Json);
        assert_eq!(ProgressMode::Off.resolve(), ProgressMode::Off);
    }
}
