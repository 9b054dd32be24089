//! ZIP expansion into a scoped temporary directory.
//!
//! The archive is validated (central directory parsed) before anything is
//! written. Entries are extracted under a fresh [`tempfile::TempDir`] owned
//! by the returned [`ExpandedTree`]; dropping the tree removes the directory
//! on every exit path, including early returns and unwinding.
//!
//! Entry names that would resolve outside the extraction root (`..`
//! segments escaping the root, absolute paths, drive prefixes) are never
//! written. They are reported in [`ExpandedTree::rejected`], as are later
//! entries that normalize to a path already written. A path used both as a
//! file and as a directory makes the archive a bad container.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::config::BatchConfig;
use crate::error::ExpandError;

/// Bounds applied while extracting.
#[derive(Debug, Clone)]
pub struct ExpandLimits {
    pub max_entries: usize,
    pub max_entry_bytes: u64,
    pub max_total_bytes: u64,
    /// Parent directory for the scoped area. System temp dir when `None`.
    pub temp_parent: Option<PathBuf>,
}

impl ExpandLimits {
    pub fn from_config(batch: &BatchConfig) -> Self {
        Self {
            max_entries: batch.max_entries,
            max_entry_bytes: batch.max_entry_bytes,
            max_total_bytes: batch.max_total_bytes,
            temp_parent: batch.temp_dir.clone(),
        }
    }
}

impl Default for ExpandLimits {
    fn default() -> Self {
        Self::from_config(&BatchConfig::default())
    }
}

/// An extracted archive. The directory lives exactly as long as this value.
#[derive(Debug)]
pub struct ExpandedTree {
    dir: TempDir,
    files_written: usize,
    rejected: Vec<String>,
}

impl ExpandedTree {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn files_written(&self) -> usize {
        self.files_written
    }

    /// Raw names of entries refused because they escape the root.
    pub fn rejected(&self) -> &[String] {
        &self.rejected
    }
}

/// Creates a fresh, exclusively owned temporary directory.
pub fn scoped_area(parent: Option<&Path>) -> io::Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("docmark-");
    match parent {
        Some(dir) => builder.tempdir_in(dir),
        None => builder.tempdir(),
    }
}

/// Validates `bytes` as a ZIP archive and extracts it into a scoped area.
pub fn expand(bytes: &[u8], limits: &ExpandLimits) -> Result<ExpandedTree, ExpandError> {
    let mut archive = ZipArchive::new(io::Cursor::new(bytes)).map_err(bad_container)?;

    if archive.len() > limits.max_entries {
        return Err(ExpandError::LimitExceeded(format!(
            "{} entries (limit {})",
            archive.len(),
            limits.max_entries
        )));
    }

    let dir = scoped_area(limits.temp_parent.as_deref())?;
    let mut tree = ExpandedTree {
        dir,
        files_written: 0,
        rejected: Vec::new(),
    };
    tracing::debug!(root = %tree.root().display(), entries = archive.len(), "expanding archive");

    let mut layout = Layout::default();
    let mut total_bytes = 0u64;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(bad_container)?;
        let raw_name = entry.name().to_string();

        let relative = match contained_path(&raw_name) {
            Some(p) => p,
            None => {
                tracing::warn!(entry = %raw_name, "rejecting archive entry outside extraction root");
                tree.rejected.push(raw_name);
                continue;
            }
        };
        let out_path = tree.root().join(&relative);
        if !out_path.starts_with(tree.root()) {
            tree.rejected.push(raw_name);
            continue;
        }

        if entry.is_dir() {
            layout.claim_dir(&relative, &raw_name)?;
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if !layout.claim_file(&relative, &raw_name)? {
            tracing::warn!(entry = %raw_name, "rejecting duplicate archive entry");
            tree.rejected.push(raw_name);
            continue;
        }

        if entry.size() > limits.max_entry_bytes {
            return Err(ExpandError::LimitExceeded(format!(
                "entry {} is {} bytes (limit {})",
                raw_name,
                entry.size(),
                limits.max_entry_bytes
            )));
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = fs::File::create(&out_path)?;

        // Declared sizes can lie; bound the actual copy as well.
        let budget = limits
            .max_entry_bytes
            .min(limits.max_total_bytes.saturating_sub(total_bytes));
        let written = io::copy(&mut (&mut entry).take(budget.saturating_add(1)), &mut outfile)
            .map_err(|e| read_error(&raw_name, e))?;
        if written > budget {
            return Err(ExpandError::LimitExceeded(format!(
                "decompressed size exceeds limit while extracting {}",
                raw_name
            )));
        }
        total_bytes += written;
        tree.files_written += 1;
    }

    tracing::debug!(
        files = tree.files_written,
        rejected = tree.rejected.len(),
        bytes = total_bytes,
        "archive expanded"
    );
    Ok(tree)
}

/// Normalized paths already claimed as files or directories.
///
/// Lets structural conflicts surface as a bad container before anything on
/// disk collides with them.
#[derive(Default)]
struct Layout {
    files: HashSet<PathBuf>,
    dirs: HashSet<PathBuf>,
}

impl Layout {
    fn claim_dir(&mut self, relative: &Path, raw_name: &str) -> Result<(), ExpandError> {
        for dir in relative.ancestors().filter(|p| !p.as_os_str().is_empty()) {
            if self.files.contains(dir) {
                return Err(conflict(raw_name, dir));
            }
            self.dirs.insert(dir.to_path_buf());
        }
        Ok(())
    }

    /// Returns `false` when `relative` was already written as a file.
    fn claim_file(&mut self, relative: &Path, raw_name: &str) -> Result<bool, ExpandError> {
        if self.dirs.contains(relative) {
            return Err(conflict(raw_name, relative));
        }
        if self.files.contains(relative) {
            return Ok(false);
        }
        if let Some(parent) = relative.parent() {
            self.claim_dir(parent, raw_name)?;
        }
        self.files.insert(relative.to_path_buf());
        Ok(true)
    }
}

fn conflict(raw_name: &str, path: &Path) -> ExpandError {
    ExpandError::BadContainer(format!(
        "entry {} conflicts with {} as both file and directory",
        raw_name,
        path.display()
    ))
}

/// Resolves an entry name to a relative path that stays inside the root.
///
/// `.` segments are dropped and `..` pops the previous segment; a `..` with
/// nothing to pop, an absolute path or a drive prefix rejects the entry.
/// Backslashes are treated as separators.
fn contained_path(name: &str) -> Option<PathBuf> {
    if name.contains('\0') {
        return None;
    }
    let normalized = name.replace('\\', "/");
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.into_iter().collect())
}

fn bad_container(e: ZipError) -> ExpandError {
    ExpandError::BadContainer(e.to_string())
}

/// Data errors while inflating mean a corrupt archive; anything else is I/O.
fn read_error(name: &str, e: io::Error) -> ExpandError {
    match e.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            ExpandError::BadContainer(format!("{}: {}", name, e))
        }
        _ => ExpandError::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(io::Cursor::new(&mut buf));
            for (name, body) in entries {
                if name.ends_with('/') {
                    zip.add_directory(*name, zip::write::SimpleFileOptions::default())
                        .unwrap();
                } else {
                    zip.start_file(*name, zip::write::SimpleFileOptions::default())
                        .unwrap();
                    zip.write_all(body).unwrap();
                }
            }
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn preserves_relative_structure() {
        let bytes = zip_of(&[("a/", b""), ("a/b.pdf", b"pdf"), ("a/c/d.csv", b"x,y")]);
        let tree = expand(&bytes, &ExpandLimits::default()).unwrap();
        assert_eq!(fs::read(tree.root().join("a/b.pdf")).unwrap(), b"pdf");
        assert_eq!(fs::read(tree.root().join("a/c/d.csv")).unwrap(), b"x,y");
        assert_eq!(tree.files_written(), 2);
        assert!(tree.rejected().is_empty());
    }

    #[test]
    fn file_and_directory_conflict_is_bad_container() {
        let bytes = zip_of(&[("a", b"x"), ("a/b.pdf", b"y")]);
        let err = expand(&bytes, &ExpandLimits::default()).unwrap_err();
        assert!(matches!(err, ExpandError::BadContainer(_)), "{:?}", err);

        let bytes = zip_of(&[("a/", b""), ("a", b"x")]);
        let err = expand(&bytes, &ExpandLimits::default()).unwrap_err();
        assert!(matches!(err, ExpandError::BadContainer(_)), "{:?}", err);
    }

    #[test]
    fn duplicate_paths_are_rejected_not_overwritten() {
        let bytes = zip_of(&[("a/b.pdf", b"first"), ("a/./b.pdf", b"second")]);
        let tree = expand(&bytes, &ExpandLimits::default()).unwrap();
        assert_eq!(fs::read(tree.root().join("a/b.pdf")).unwrap(), b"first");
        assert_eq!(tree.files_written(), 1);
        assert_eq!(tree.rejected(), ["a/./b.pdf".to_string()]);
    }

    #[test]
    fn garbage_is_bad_container() {
        let err = expand(b"definitely not a zip", &ExpandLimits::default()).unwrap_err();
        assert!(matches!(err, ExpandError::BadContainer(_)));
    }

    #[test]
    fn truncated_archive_is_bad_container() {
        let bytes = zip_of(&[("a.txt", b"hello")]);
        let err = expand(&bytes[..bytes.len() / 2], &ExpandLimits::default()).unwrap_err();
        assert!(matches!(err, ExpandError::BadContainer(_)));
    }

    #[test]
    fn traversal_entries_never_leave_the_root() {
        let outer = tempfile::TempDir::new().unwrap();
        let limits = ExpandLimits {
            temp_parent: Some(outer.path().to_path_buf()),
            ..ExpandLimits::default()
        };
        let bytes = zip_of(&[
            ("evil/../../secret.txt", b"boom"),
            ("../up.txt", b"boom"),
            ("/abs.txt", b"boom"),
            ("ok/fine.txt", b"fine"),
        ]);
        let tree = expand(&bytes, &limits).unwrap();

        assert!(!outer.path().join("secret.txt").exists());
        assert!(!outer.path().join("up.txt").exists());
        assert_eq!(tree.files_written(), 1);
        assert_eq!(tree.rejected().len(), 3);
        assert!(tree.root().join("ok/fine.txt").exists());
    }

    #[test]
    fn contained_path_rules() {
        assert_eq!(contained_path("a/./b.pdf"), Some(PathBuf::from("a/b.pdf")));
        assert_eq!(contained_path("a/x/../b.pdf"), Some(PathBuf::from("a/b.pdf")));
        assert_eq!(contained_path("a\\b.pdf"), Some(PathBuf::from("a/b.pdf")));
        assert_eq!(contained_path("evil/../../secret.txt"), None);
        assert_eq!(contained_path("/etc/passwd"), None);
        assert_eq!(contained_path(".."), None);
        assert_eq!(contained_path("./"), None);
    }

    #[test]
    fn entry_count_limit() {
        let bytes = zip_of(&[("a.txt", b"1"), ("b.txt", b"2")]);
        let limits = ExpandLimits {
            max_entries: 1,
            ..ExpandLimits::default()
        };
        assert!(matches!(
            expand(&bytes, &limits),
            Err(ExpandError::LimitExceeded(_))
        ));
    }

    #[test]
    fn total_size_limit() {
        let bytes = zip_of(&[("a.txt", &[b'a'; 600]), ("b.txt", &[b'b'; 600])]);
        let limits = ExpandLimits {
            max_total_bytes: 1000,
            ..ExpandLimits::default()
        };
        assert!(matches!(
            expand(&bytes, &limits),
            Err(ExpandError::LimitExceeded(_))
        ));
    }

    #[test]
    fn area_removed_on_drop() {
        let bytes = zip_of(&[("a.txt", b"1")]);
        let tree = expand(&bytes, &ExpandLimits::default()).unwrap();
        let root = tree.root().to_path_buf();
        assert!(root.exists());
        drop(tree);
        assert!(!root.exists());
    }

    #[test]
    fn empty_archive_expands_to_empty_tree() {
        let bytes = zip_of(&[]);
        let tree = expand(&bytes, &ExpandLimits::default()).unwrap();
        assert_eq!(tree.files_written(), 0);
        assert_eq!(fs::read_dir(tree.root()).unwrap().count(), 0);
    }
}
