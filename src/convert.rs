//! Conversion adapter.
//!
//! A [`Converter`] turns one file on disk into Markdown. The rest of the
//! pipeline never calls a converter directly; it goes through
//! [`convert_file`], which folds every error and panic into a
//! [`ConversionOutcome`] so a single bad file cannot take down a batch.
//! Calls are made once: retries are the caller's business.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::process::Command;

use crate::config::{ConverterConfig, ConverterKind};
use crate::error::ConvertError;
use crate::extract::BuiltinConverter;
use crate::models::ConversionOutcome;

/// Placeholder in command arguments replaced by the input path.
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// Black-box conversion capability: one file in, Markdown text out.
///
/// Implementations must be synchronous. They may be called from several
/// threads when independent batches run in parallel, but never concurrently
/// within one batch.
pub trait Converter: Send + Sync {
    /// Short identifier used in logs and `docmark formats`.
    fn name(&self) -> &str;

    /// Whether this converter has a backend for `extension` (lowercase, no dot).
    fn handles(&self, extension: &str) -> bool;

    fn convert(&self, path: &Path) -> Result<String, ConvertError>;
}

/// Invokes `converter` on `path` and never lets a fault escape.
pub fn convert_file(converter: &dyn Converter, path: &Path) -> ConversionOutcome {
    match catch_unwind(AssertUnwindSafe(|| converter.convert(path))) {
        Ok(Ok(text)) => ConversionOutcome::Success(text),
        Ok(Err(e)) => {
            tracing::debug!(converter = converter.name(), path = %path.display(), error = %e, "conversion failed");
            ConversionOutcome::Failure(e.to_string())
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::warn!(converter = converter.name(), path = %path.display(), "converter panicked: {}", message);
            ConversionOutcome::Failure(format!("converter panicked: {}", message))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs an external program and takes its stdout as the Markdown output.
///
/// Arguments equal to `{input}` (or containing it) are substituted with the
/// file path, e.g. `markitdown {input}`.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: String,
    args: Vec<String>,
}

impl CommandConverter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Converter for CommandConverter {
    fn name(&self) -> &str {
        &self.program
    }

    fn handles(&self, _extension: &str) -> bool {
        true
    }

    fn convert(&self, path: &Path) -> Result<String, ConvertError> {
        let input = path.to_string_lossy();
        let mut cmd = Command::new(&self.program);
        for arg in &self.args {
            cmd.arg(arg.replace(INPUT_PLACEHOLDER, &input));
        }

        let output = cmd.output().map_err(|e| {
            ConvertError::Command(format!("failed to execute '{}': {}", self.program, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConvertError::Command(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout).map_err(|_| {
            ConvertError::Command(format!("'{}' produced non-UTF-8 output", self.program))
        })
    }
}

/// Builds the converter selected in configuration.
pub fn converter_from_config(config: &ConverterConfig) -> Box<dyn Converter> {
    match (config.kind, config.command.as_deref()) {
        (ConverterKind::Command, Some(program)) => {
            Box::new(CommandConverter::new(program, config.args.clone()))
        }
        _ => Box::new(BuiltinConverter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Result<&'static str, &'static str>);

    impl Converter for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn handles(&self, _extension: &str) -> bool {
            true
        }
        fn convert(&self, _path: &Path) -> Result<String, ConvertError> {
            self.0
                .map(str::to_string)
                .map_err(|m| ConvertError::Command(m.to_string()))
        }
    }

    struct Panics;

    impl Converter for Panics {
        fn name(&self) -> &str {
            "panics"
        }
        fn handles(&self, _extension: &str) -> bool {
            true
        }
        fn convert(&self, _path: &Path) -> Result<String, ConvertError> {
            panic!("malformed cross-reference table")
        }
    }

    #[test]
    fn success_passes_text_through() {
        let out = convert_file(&Fixed(Ok("# Title")), Path::new("report.docx"));
        assert_eq!(out, ConversionOutcome::Success("# Title".into()));
    }

    #[test]
    fn error_becomes_failure_message() {
        let out = convert_file(&Fixed(Err("bad xref")), Path::new("broken.pdf"));
        match out {
            ConversionOutcome::Failure(msg) => assert!(msg.contains("bad xref")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn panic_becomes_failure() {
        let out = convert_file(&Panics, Path::new("broken.pdf"));
        match out {
            ConversionOutcome::Failure(msg) => {
                assert!(msg.contains("malformed cross-reference table"))
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn missing_program_is_a_failure() {
        let conv = CommandConverter::new(
            "docmark-no-such-program-xyz",
            vec![INPUT_PLACEHOLDER.to_string()],
        );
        let out = convert_file(&conv, Path::new("a.pdf"));
        assert!(matches!(out, ConversionOutcome::Failure(_)));
    }

    #[cfg(unix)]
    #[test]
    fn command_stdout_is_the_text() {
        let tmp = tempfile::TempDir::new().unwrap();
        let input = tmp.path().join("note.html");
        std::fs::write(&input, "hello from file").unwrap();
        let conv = CommandConverter::new("cat", vec![INPUT_PLACEHOLDER.to_string()]);
        assert_eq!(
            convert_file(&conv, &input),
            ConversionOutcome::Success("hello from file".into())
        );
    }

    #[cfg(unix)]
    #[test]
    fn command_nonzero_exit_is_a_failure() {
        let conv = CommandConverter::new("false", vec![]);
        match convert_file(&conv, Path::new("x.pdf")) {
            ConversionOutcome::Failure(msg) => assert!(msg.contains("exited with")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn config_selects_converter() {
        let builtin = converter_from_config(&ConverterConfig::default());
        assert_eq!(builtin.name(), "builtin");

        let cfg = ConverterConfig {
            kind: ConverterKind::Command,
            command: Some("markitdown".into()),
            args: vec![INPUT_PLACEHOLDER.into()],
        };
        assert_eq!(converter_from_config(&cfg).name(), "markitdown");
    }
}
