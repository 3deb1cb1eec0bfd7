//! Raw byte-storage backends.
//!
//! A [`BlobBackend`] is a flat key/value store keyed by slash-separated
//! relative paths. It knows nothing about checksums, owners or encryption.
//!
//! - [`DiskBackend`]: files under a root directory, written atomically
//! - [`MemoryBackend`]: shared in-process map, for tests and embedding
//! - [`NilBackend`]: always empty, refuses writes

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

/// A writer whose contents become visible only once [`BlobWriter::finish`]
/// succeeds. Dropping an unfinished writer discards what was written.
pub trait BlobWriter: Write + Send {
    /// Flush and commit the blob, surfacing any backend error.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// Byte storage keyed by opaque relative paths.
pub trait BlobBackend: Send + Sync {
    /// Open a blob for reading. Fails with [`io::ErrorKind::NotFound`] if
    /// absent.
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>>;

    /// Open a blob for writing, creating any parent structure.
    fn write(&self, path: &str) -> io::Result<Box<dyn BlobWriter>>;

    /// Returns true if a blob exists at `path`.
    fn exists(&self, path: &str) -> bool;
}

impl<T: BlobBackend + ?Sized> BlobBackend for Arc<T> {
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        (**self).open(path)
    }

    fn write(&self, path: &str) -> io::Result<Box<dyn BlobWriter>> {
        (**self).write(path)
    }

    fn exists(&self, path: &str) -> bool {
        (**self).exists(path)
    }
}

// ============================================================================
// Disk
// ============================================================================

/// Stores blobs as files below a root directory.
#[derive(Debug, Clone)]
pub struct DiskBackend {
    root: PathBuf,
}

impl DiskBackend {
    /// Open a backend rooted at `root`.
    ///
    /// Fails with [`io::ErrorKind::NotFound`] if `root` does not exist or is
    /// not a directory.
    pub fn new<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("blob root is not a directory: {}", root.display()),
            ));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl BlobBackend for DiskBackend {
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        let file = File::open(self.full_path(path))?;
        Ok(Box::new(file))
    }

    fn write(&self, path: &str) -> io::Result<Box<dyn BlobWriter>> {
        let final_path = self.full_path(path);
        if let Some(parent) = final_path.parent() {
            create_private_dir_all(parent)?;
        }

        // Unique temp name so parallel writers of the same blob never share a file
        let file_name = final_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_name = format!(
            "{}.{}.{:?}.tmp",
            file_name,
            std::process::id(),
            std::thread::current().id()
        );
        let temp_path = final_path.with_file_name(temp_name);
        let file = File::create(&temp_path)?;

        Ok(Box::new(DiskWriter {
            file,
            temp_path,
            final_path,
            committed: false,
        }))
    }

    fn exists(&self, path: &str) -> bool {
        fs::metadata(self.full_path(path)).is_ok_and(|m| m.is_file())
    }
}

#[cfg(unix)]
fn create_private_dir_all(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir_all(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

struct DiskWriter {
    file: File,
    temp_path: PathBuf,
    final_path: PathBuf,
    committed: bool,
}

impl Write for DiskWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl BlobWriter for DiskWriter {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;

        // Atomic rename - if another writer beat us, that's fine (same content)
        if let Err(e) = fs::rename(&self.temp_path, &self.final_path) {
            if self.final_path.is_file() {
                return Ok(());
            }
            return Err(e);
        }
        self.committed = true;
        debug!(path = %self.final_path.display(), "Blob committed");
        Ok(())
    }
}

impl Drop for DiskWriter {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

// ============================================================================
// Memory
// ============================================================================

type BlobMap = HashMap<String, Arc<[u8]>>;

/// In-memory backend. Clones share the same blobs, so one instance can be
/// handed to several stores and inspected afterwards.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    blobs: Arc<RwLock<BlobMap>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw stored bytes at `path`, bypassing any decryption.
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .map(|blob| blob.to_vec())
    }
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no blob at {}", path))
}

impl BlobBackend for MemoryBackend {
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        let blobs = self.blobs.read().unwrap_or_else(PoisonError::into_inner);
        let blob = blobs.get(path).ok_or_else(|| not_found(path))?;
        Ok(Box::new(Cursor::new(Arc::clone(blob))))
    }

    fn write(&self, path: &str) -> io::Result<Box<dyn BlobWriter>> {
        Ok(Box::new(MemoryWriter {
            buffer: Vec::new(),
            path: path.to_string(),
            blobs: Arc::clone(&self.blobs),
        }))
    }

    fn exists(&self, path: &str) -> bool {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }
}

struct MemoryWriter {
    buffer: Vec<u8>,
    path: String,
    blobs: Arc<RwLock<BlobMap>>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BlobWriter for MemoryWriter {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let MemoryWriter { buffer, path, blobs } = *self;
        blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path, Arc::from(buffer));
        Ok(())
    }
}

// ============================================================================
// Nil
// ============================================================================

/// An empty backend that cannot be written to.
#[derive(Debug, Clone, Copy, Default)]
pub struct NilBackend;

impl BlobBackend for NilBackend {
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        Err(not_found(path))
    }

    fn write(&self, path: &str) -> io::Result<Box<dyn BlobWriter>> {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("read-only backend: {}", path),
        ))
    }

    fn exists(&self, _path: &str) -> bool {
        false
    }
}
