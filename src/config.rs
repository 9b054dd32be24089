use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub formats: FormatsConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FormatsConfig {
    #[serde(default = "default_leaf_extensions")]
    pub leaf_extensions: Vec<String>,
    #[serde(default = "default_container_extensions")]
    pub container_extensions: Vec<String>,
    #[serde(default = "default_output_extension")]
    pub output_extension: String,
}

impl Default for FormatsConfig {
    fn default() -> Self {
        Self {
            leaf_extensions: default_leaf_extensions(),
            container_extensions: default_container_extensions(),
            output_extension: default_output_extension(),
        }
    }
}

fn default_leaf_extensions() -> Vec<String> {
    [
        "pdf", "doc", "docx", "ppt", "pptx", "xls", "xlsx", "png", "jpg", "jpeg", "gif", "bmp",
        "tiff", "tif", "mp3", "wav", "ogg", "flac", "html", "htm", "csv", "json", "xml",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_container_extensions() -> Vec<String> {
    vec!["zip".to_string()]
}

fn default_output_extension() -> String {
    "md".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConverterKind {
    #[default]
    Builtin,
    Command,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConverterConfig {
    #[serde(default)]
    pub kind: ConverterKind,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default = "default_command_args")]
    pub args: Vec<String>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            kind: ConverterKind::Builtin,
            command: None,
            args: default_command_args(),
        }
    }
}

fn default_command_args() -> Vec<String> {
    vec!["{input}".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    #[serde(default = "default_exclude_globs")]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: u64,
    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: u64,
    /// Parent directory for scoped extraction areas. System temp dir if unset.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            exclude_globs: default_exclude_globs(),
            max_entries: default_max_entries(),
            max_entry_bytes: default_max_entry_bytes(),
            max_total_bytes: default_max_total_bytes(),
            temp_dir: None,
        }
    }
}

fn default_exclude_globs() -> Vec<String> {
    vec!["__MACOSX/**".to_string(), "**/.DS_Store".to_string()]
}
fn default_max_entries() -> usize {
    10_000
}
fn default_max_entry_bytes() -> u64 {
    256 * 1024 * 1024
}
fn default_max_total_bytes() -> u64 {
    1024 * 1024 * 1024
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Loads `path` when given, otherwise returns the built-in defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => Ok(Config::default()),
    }
}

fn validate(config: &Config) -> Result<()> {
    let out_ext = &config.formats.output_extension;
    if out_ext.is_empty() || out_ext.contains('.') || out_ext.contains('/') {
        anyhow::bail!(
            "formats.output_extension must be a bare extension like \"md\", got '{}'",
            out_ext
        );
    }

    if config.formats.container_extensions.is_empty() && config.formats.leaf_extensions.is_empty()
    {
        anyhow::bail!("formats: at least one leaf or container extension is required");
    }

    for ext in &config.formats.container_extensions {
        if !ext.trim_start_matches('.').eq_ignore_ascii_case("zip") {
            anyhow::bail!(
                "formats.container_extensions: only ZIP containers are supported, got '{}'",
                ext
            );
        }
    }

    // Validate batch limits
    if config.batch.max_entries == 0 {
        anyhow::bail!("batch.max_entries must be > 0");
    }
    if config.batch.max_entry_bytes == 0 || config.batch.max_total_bytes == 0 {
        anyhow::bail!("batch.max_entry_bytes and batch.max_total_bytes must be > 0");
    }

    // Validate converter
    if config.converter.kind == ConverterKind::Command {
        match config.converter.command.as_deref() {
            Some(cmd) if !cmd.trim().is_empty() => {}
            _ => anyhow::bail!("converter.command must be set when converter.kind is 'command'"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.formats.output_extension, "md");
        assert_eq!(cfg.formats.container_extensions, vec!["zip"]);
        assert!(cfg.formats.leaf_extensions.contains(&"docx".to_string()));
        assert_eq!(cfg.converter.kind, ConverterKind::Builtin);
        assert_eq!(cfg.batch.max_entries, 10_000);
    }

    #[test]
    fn command_converter_requires_command() {
        let err = parse("[converter]\nkind = \"command\"\n").unwrap_err();
        assert!(err.to_string().contains("converter.command"));

        let cfg = parse("[converter]\nkind = \"command\"\ncommand = \"markitdown\"\n").unwrap();
        assert_eq!(cfg.converter.args, vec!["{input}"]);
    }

    #[test]
    fn dotted_output_extension_rejected() {
        assert!(parse("[formats]\noutput_extension = \".md\"\n").is_err());
    }

    #[test]
    fn non_zip_container_rejected() {
        assert!(parse("[formats]\ncontainer_extensions = [\"tar\"]\n").is_err());
    }

    #[test]
    fn zero_limits_rejected() {
        assert!(parse("[batch]\nmax_entries = 0\n").is_err());
        assert!(parse("[batch]\nmax_total_bytes = 0\n").is_err());
    }

    #[test]
    fn load_config_reports_missing_file() {
        let err = load_config(Path::new("/nonexistent/docmark.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
