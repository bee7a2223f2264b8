//! Atomic file replacement
//!
//! `AtomicFile` writes into a uniquely named temporary sibling and renames it
//! over the destination only on `commit`. If it is dropped before a
//! successful commit the temporary file is removed, so the destination is
//! always either fully old or fully new.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Extension used by every in-flight atomic write
pub const TEMP_EXTENSION: &str = "sbx-tmp";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A pending atomic replacement of `dest`
pub struct AtomicFile {
    dest: PathBuf,
    temp: PathBuf,
    writer: Option<BufWriter<File>>,
    committed: bool,
}

impl AtomicFile {
    /// Start an atomic write to `dest`, creating parent directories
    pub fn create(dest: &Path) -> io::Result<Self> {
        Self::open(dest, false)
    }

    /// Like [`AtomicFile::create`], but the file is readable by its owner only
    pub fn create_private(dest: &Path) -> io::Result<Self> {
        Self::open(dest, true)
    }

    fn open(dest: &Path, private: bool) -> io::Result<Self> {
        let file_name = dest.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a file path: {}", dest.display()),
            )
        })?;

        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        // Same directory as the destination so the rename never crosses filesystems
        let temp = parent.join(format!(
            ".{}.{}-{}.{}",
            file_name.to_string_lossy(),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed),
            TEMP_EXTENSION
        ));

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        if private {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        #[cfg(not(unix))]
        let _ = private;

        let file = options.open(&temp)?;

        Ok(Self {
            dest: dest.to_path_buf(),
            temp,
            writer: Some(BufWriter::new(file)),
            committed: false,
        })
    }

    /// Path of the temporary file receiving the content
    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    /// Flush, sync and rename the temporary file over the destination
    pub fn commit(mut self) -> io::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        fs::rename(&self.temp, &self.dest)?;
        self.committed = true;

        sync_parent(&self.dest);
        Ok(())
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::other("atomic file already closed"))
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }
}

impl Drop for AtomicFile {
    fn drop(&mut self) {
        if !self.committed {
            self.writer.take();
            let _ = fs::remove_file(&self.temp);
        }
    }
}

/// Write `content` to `dest` atomically
pub fn write_atomic(dest: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = AtomicFile::create(dest)?;
    file.write_all(content)?;
    file.commit()
}

/// Make the rename durable by syncing the containing directory
#[cfg(unix)]
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}
