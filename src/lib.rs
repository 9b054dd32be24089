//! # docmark
//!
//! Batch conversion of documents into Markdown.
//!
//! docmark accepts named byte blobs. A single supported file is converted
//! directly; a ZIP archive is expanded into a scoped temporary directory,
//! every file in it is classified and converted one by one, and the
//! successes are repackaged into a new ZIP that mirrors the input tree with
//! `.md` extensions. Per-file failures are collected, never fatal.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │  Upload  │──▶│  Expand  │──▶│     Walk     │──▶│   Pack   │
//! │ name+bytes│  │ ZIP→temp │   │ classify +   │   │ md → ZIP │
//! └──────────┘   └──────────┘   │ convert each │   └──────────┘
//!                               └──────┬───────┘
//!                                      ▼
//!                              ┌──────────────┐
//!                              │  Converter   │
//!                              │builtin / cmd │
//!                              └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docmark convert report.docx             # writes report.md
//! docmark convert data.zip --out-dir out  # writes out/data_markdown_results.zip
//! docmark formats                         # list supported extensions
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`classify`] | Extension allow-list and type verdicts |
//! | [`convert`] | Converter trait and fault-containing adapter |
//! | [`extract`] | Built-in format extraction |
//! | [`expand`] | ZIP expansion into a scoped temp directory |
//! | [`walk`] | Deterministic batch walk |
//! | [`pack`] | Result archive construction |
//! | [`progress`] | Progress reporting |
//! | [`pipeline`] | Per-upload dispatch |
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error types |

pub mod classify;
pub mod config;
pub mod convert;
pub mod convert_cmd;
pub mod error;
pub mod expand;
pub mod extract;
pub mod models;
pub mod pack;
pub mod pipeline;
pub mod progress;
pub mod walk;
