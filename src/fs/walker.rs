//! Deterministic directory traversal.
//!
//! Entries come out sorted by file name at each level, parents before their
//! children, so a copy driven by the walker can create directories before
//! writing into them.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

/// One file or directory found under the walk root
#[derive(Debug, Clone)]
pub struct WalkEntry {
    /// Full path to the entry
    pub path: PathBuf,

    /// Path relative to the walk root
    pub relative_path: PathBuf,

    pub is_dir: bool,

    /// File size in bytes (zero for directories)
    pub size: u64,

    pub modified: SystemTime,
}

type ExcludeFn = Box<dyn Fn(&Path) -> bool>;

/// Lazy recursive walk of a source tree
///
/// The root itself is never yielded. Symbolic links are skipped rather than
/// followed. The sequence is finite and cannot be restarted.
pub struct DirectoryWalker {
    root: PathBuf,
    inner: walkdir::IntoIter,
    exclude: Option<ExcludeFn>,
}

impl DirectoryWalker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let inner = WalkDir::new(&root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        Self {
            root,
            inner,
            exclude: None,
        }
    }

    /// Skip entries whose path relative to the root matches `predicate`
    ///
    /// An excluded directory is skipped together with everything below it.
    pub fn exclude<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Path) -> bool + 'static,
    {
        self.exclude = Some(Box::new(predicate));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Iterator for DirectoryWalker {
    type Item = io::Result<WalkEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(io::Error::from(e))),
            };

            let path = entry.path().to_path_buf();
            let relative_path = path
                .strip_prefix(&self.root)
                .unwrap_or(&path)
                .to_path_buf();
            let file_type = entry.file_type();

            if let Some(exclude) = &self.exclude {
                if exclude(&relative_path) {
                    if file_type.is_dir() {
                        self.inner.skip_current_dir();
                    }
                    continue;
                }
            }

            if file_type.is_symlink() {
                tracing::debug!(path = %path.display(), "Skipping symbolic link");
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => return Some(Err(io::Error::from(e))),
            };
            let modified = match metadata.modified() {
                Ok(t) => t,
                Err(e) => return Some(Err(e)),
            };
            let is_dir = file_type.is_dir();

            return Some(Ok(WalkEntry {
                path,
                relative_path,
                is_dir,
                size: if is_dir { 0 } else { metadata.len() },
                modified,
            }));
        }
    }
}
