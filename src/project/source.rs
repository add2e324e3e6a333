//! Locating macro source files on disk.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use smol_str::SmolStr;
use tracing::warn;
use walkdir::WalkDir;

/// One file selected for macro extraction, with enough identity to rebuild
/// both its absolute location and its project-relative name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFile {
    project_name: SmolStr,
    project_root: PathBuf,
    searched_path: PathBuf,
    relative_path: PathBuf,
    modified: Option<SystemTime>,
}

impl SourceFile {
    /// The package this file's macros will be attributed to.
    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// The configured search directory the file was found under.
    pub fn searched_path(&self) -> &Path {
        &self.searched_path
    }

    /// Path below the search directory.
    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    /// Last modification time, if the filesystem reported one.
    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Path for reading the file: project root, search directory, and
    /// relative path joined.
    pub fn full_path(&self) -> PathBuf {
        self.project_root
            .join(&self.searched_path)
            .join(&self.relative_path)
    }

    /// [`full_path`](Self::full_path) resolved against the current working
    /// directory, without touching the filesystem.
    pub fn absolute_path(&self) -> io::Result<PathBuf> {
        std::path::absolute(self.full_path())
    }

    /// Project-relative path used in diagnostics and origins.
    pub fn original_file_path(&self) -> PathBuf {
        self.searched_path.join(&self.relative_path)
    }
}

/// Collect the macro source files of one project, in deterministic order.
///
/// Each entry of `search_paths` is scanned recursively; entries that do not
/// exist are skipped with a warning, never an error. A file is selected when
/// its name has the `sql` extension and does not start with `.`, `#`, or
/// `~` (editor droppings and hidden files).
pub fn find_source_files(
    project_root: &Path,
    project_name: &str,
    search_paths: &[String],
) -> Vec<SourceFile> {
    let mut files = Vec::new();
    for search in search_paths {
        let dir = project_root.join(search);
        if !dir.is_dir() {
            warn!(path = %dir.display(), "macro path does not exist, skipping");
            continue;
        }
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(path = %dir.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if !is_source_file_name(&entry.file_name().to_string_lossy()) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&dir) else {
                continue;
            };
            let modified = entry.metadata().ok().and_then(|meta| meta.modified().ok());
            files.push(SourceFile {
                project_name: SmolStr::new(project_name),
                project_root: project_root.to_path_buf(),
                searched_path: PathBuf::from(search),
                relative_path: relative.to_path_buf(),
                modified,
            });
        }
    }
    files
}

fn is_source_file_name(name: &str) -> bool {
    if matches!(name.chars().next(), Some('.' | '#' | '~') | None) {
        return false;
    }
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("sql"))
}
