//! Extension-based type classification.
//!
//! The allow-list is an immutable value built once from configuration and
//! shared by reference, so independently configured batches can run side by
//! side.

use std::collections::BTreeSet;
use std::path::Path;

use crate::config::FormatsConfig;

/// Verdict for one filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeVerdict {
    /// A convertible file; carries the lowercased extension without the dot.
    Leaf(String),
    /// An archive to expand.
    Container,
    Unsupported,
}

/// Fixed sets of leaf and container extensions, stored lowercased without dots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    leaves: BTreeSet<String>,
    containers: BTreeSet<String>,
}

impl AllowList {
    pub fn new<L, C>(leaves: L, containers: C) -> Self
    where
        L: IntoIterator,
        L::Item: AsRef<str>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        Self {
            leaves: leaves.into_iter().map(|e| normalize(e.as_ref())).collect(),
            containers: containers
                .into_iter()
                .map(|e| normalize(e.as_ref()))
                .collect(),
        }
    }

    pub fn from_config(formats: &FormatsConfig) -> Self {
        Self::new(&formats.leaf_extensions, &formats.container_extensions)
    }

    pub fn leaf_extensions(&self) -> impl Iterator<Item = &str> {
        self.leaves.iter().map(String::as_str)
    }

    pub fn container_extensions(&self) -> impl Iterator<Item = &str> {
        self.containers.iter().map(String::as_str)
    }

    /// Classifies `filename` by its lowercased final extension.
    ///
    /// Only the last path segment is considered. Names without an extension
    /// and dotfiles such as `.bashrc` are `Unsupported`.
    pub fn classify(&self, filename: &str) -> TypeVerdict {
        let ext = match extension_of(filename) {
            Some(ext) => ext,
            None => return TypeVerdict::Unsupported,
        };
        if self.containers.contains(&ext) {
            TypeVerdict::Container
        } else if self.leaves.contains(&ext) {
            TypeVerdict::Leaf(ext)
        } else {
            TypeVerdict::Unsupported
        }
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::from_config(&FormatsConfig::default())
    }
}

fn normalize(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn extension_of(filename: &str) -> Option<String> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    Path::new(base)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .filter(|e| !e.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow() -> AllowList {
        AllowList::new(["pdf", ".DOCX", "csv"], ["zip"])
    }

    #[test]
    fn leaf_container_and_unsupported() {
        let a = allow();
        assert_eq!(a.classify("report.pdf"), TypeVerdict::Leaf("pdf".into()));
        assert_eq!(a.classify("data.zip"), TypeVerdict::Container);
        assert_eq!(a.classify("setup.exe"), TypeVerdict::Unsupported);
    }

    #[test]
    fn case_insensitive() {
        let a = allow();
        assert_eq!(a.classify("REPORT.PDF"), TypeVerdict::Leaf("pdf".into()));
        assert_eq!(a.classify("Report.Docx"), TypeVerdict::Leaf("docx".into()));
        assert_eq!(a.classify("DATA.ZIP"), TypeVerdict::Container);
    }

    #[test]
    fn missing_extension_is_unsupported() {
        let a = allow();
        assert_eq!(a.classify("Makefile"), TypeVerdict::Unsupported);
        assert_eq!(a.classify(".pdf"), TypeVerdict::Unsupported);
        assert_eq!(a.classify("trailing."), TypeVerdict::Unsupported);
        assert_eq!(a.classify(""), TypeVerdict::Unsupported);
    }

    #[test]
    fn only_last_segment_counts() {
        let a = allow();
        assert_eq!(a.classify("dir.pdf/readme"), TypeVerdict::Unsupported);
        assert_eq!(
            a.classify("a\\b\\table.CSV"),
            TypeVerdict::Leaf("csv".into())
        );
        assert_eq!(a.classify("archive.pdf.zip"), TypeVerdict::Container);
    }

    #[test]
    fn classify_is_pure() {
        let a = allow();
        for name in ["x.pdf", "y.ZIP", "z", "w.exe"] {
            assert_eq!(AllowList::classify(&a, name), AllowList::classify(&a, name));
        }
    }

    #[test]
    fn default_allow_list_matches_config_defaults() {
        let a = AllowList::default();
        assert_eq!(a.classify("slides.pptx"), TypeVerdict::Leaf("pptx".into()));
        assert_eq!(a.classify("song.flac"), TypeVerdict::Leaf("flac".into()));
        assert_eq!(a.classify("notes.txt"), TypeVerdict::Unsupported);
    }
}
