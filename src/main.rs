//! # docmark CLI
//!
//! ## Usage
//!
//! ```bash
//! docmark [--config docmark.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docmark convert <files>...` | Convert files and ZIP archives to Markdown |
//! | `docmark formats` | List supported extensions and their backends |
//!
//! ## Examples
//!
//! ```bash
//! # Convert one document next to the current directory
//! docmark convert report.docx
//!
//! # Convert a zipped folder, JSON summary on stdout
//! docmark convert project.zip --out-dir ./converted --json
//!
//! # Use an external converter for everything
//! docmark --config ./docmark.toml convert slides.pptx
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use docmark::config;
use docmark::convert_cmd::{self, ConvertOptions};
use docmark::progress::ProgressMode;

/// docmark: batch-convert documents and zipped folders into Markdown.
#[derive(Parser)]
#[command(
    name = "docmark",
    about = "docmark: batch-convert documents and zipped folders into Markdown",
    version,
    long_about = "docmark converts office documents, markup and tabular files into Markdown. \
    Upload a single file to get a .md next to it, or a ZIP archive of a folder to get a ZIP \
    of Markdown files with the same directory layout."
)]
struct Cli {
    /// Path to a configuration file (TOML).
    ///
    /// Optional. Without it the built-in defaults apply: the standard
    /// extension allow-list, the builtin converter and default archive limits.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr (overrides RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert files and ZIP archives to Markdown.
    ///
    /// Each input is handled independently. A failure in one input never
    /// stops the others; per-file failures inside an archive are listed in
    /// the summary.
    Convert {
        /// Input files (documents or `.zip` archives).
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Directory for `.md` files and result archives.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        /// Progress output on stderr.
        #[arg(long, value_enum, default_value = "auto")]
        progress: ProgressMode,

        /// Print one JSON summary object per input instead of text.
        #[arg(long)]
        json: bool,
    },

    /// List supported extensions and which backend converts each.
    Formats,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Convert {
            inputs,
            out_dir,
            progress,
            json,
        } => {
            let opts = ConvertOptions {
                out_dir,
                json,
                progress,
            };
            if !convert_cmd::run_convert(&cfg, &inputs, &opts)? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Formats => {
            convert_cmd::list_formats(&cfg)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
