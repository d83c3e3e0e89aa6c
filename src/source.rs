//! # source: where upload bytes come from
//!
//! A `ByteSource` is the minimal capability the encoder needs: read the next
//! chunk of bytes, and (when knowable up front) report the total size.
//! Implementations cover the three CLI inputs: a regular file, the stdout
//! pipe of an external `tar` subprocess, and stdin.
//!
//! The size invariant: if `known_size` returns `Some(n)`, the source yields
//! exactly `n` bytes before end-of-stream. Pipes and stdin never report a
//! size; it is not approximated.

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Sequential, single-pass byte producer with an optional exact size.
#[async_trait]
pub trait ByteSource: Send {
    /// Read up to `buf.len()` bytes into `buf`, returning the number of
    /// bytes read. `Ok(0)` signals end-of-stream.
    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Exact number of bytes this source will yield, when known in advance.
    fn known_size(&self) -> Option<u64> {
        None
    }
}

#[async_trait]
impl<T: ByteSource + ?Sized> ByteSource for Box<T> {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_chunk(buf).await
    }

    fn known_size(&self) -> Option<u64> {
        (**self).known_size()
    }
}

/// A regular file on disk; size comes from metadata at open time.
pub struct FileSource {
    file: tokio::fs::File,
    size: u64,
}

impl FileSource {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        let size = file
            .metadata()
            .await
            .with_context(|| format!("failed to stat {}", path.display()))?
            .len();
        debug!(path = %path.display(), size, "opened file source");
        Ok(Self { file, size })
    }
}

#[async_trait]
impl ByteSource for FileSource {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf).await
    }

    fn known_size(&self) -> Option<u64> {
        Some(self.size)
    }
}

/// The stdout pipe of an external `tar` subprocess archiving a path.
///
/// The child is reaped by a background task whose lifetime is tied to the
/// process, so the read side observes end-of-stream exactly when the
/// archiver closes its output. Total size is unknowable.
pub struct ArchiveSource {
    stdout: ChildStdout,
}

impl ArchiveSource {
    pub fn spawn(path: &Path, gzip: bool) -> Result<Self> {
        let flags = if gzip { "-czf-" } else { "-cf-" };
        let mut child = Command::new("tar")
            .arg(flags)
            .arg(path)
            .stdout(std::process::Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn tar for {}", path.display()))?;
        let stdout = child
            .stdout
            .take()
            .context("tar child did not expose a stdout pipe")?;
        info!(path = %path.display(), gzip, "spawned tar archiver");
        tokio::spawn(reap(child));
        Ok(Self { stdout })
    }
}

async fn reap(mut child: Child) {
    match child.wait().await {
        Ok(status) if status.success() => {
            debug!(?status, "tar archiver exited");
        }
        Ok(status) => {
            error!(?status, "tar archiver exited with failure");
        }
        Err(e) => {
            error!(error = ?e, "failed to await tar archiver");
        }
    }
}

#[async_trait]
impl ByteSource for ArchiveSource {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdout.read(buf).await
    }
}

/// Standard input. Size unknown, never approximated.
pub struct StdinSource {
    stdin: tokio::io::Stdin,
}

impl StdinSource {
    pub fn new() -> Self {
        Self {
            stdin: tokio::io::stdin(),
        }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ByteSource for StdinSource {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdin.read(buf).await
    }
}

/// In-memory source with an exact size. Used by tests and small payloads.
pub struct MemorySource {
    data: Vec<u8>,
    pos: usize,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.data[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }

    fn known_size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}

/// Adapter that lets N concurrent upload attempts read from the same
/// already-opened handle, locking per read.
///
/// This mirrors the collaborator contract of the multi-upload path: all
/// attempts share one handle, so concurrent readers interleave and jointly
/// drain the stream. Whether that yields sensible payloads is up to the
/// underlying source; no independent re-reading is provided here.
#[derive(Clone)]
pub struct SharedSource {
    inner: Arc<Mutex<Box<dyn ByteSource>>>,
    size: Option<u64>,
}

impl SharedSource {
    pub fn new(source: Box<dyn ByteSource>) -> Self {
        let size = source.known_size();
        Self {
            inner: Arc::new(Mutex::new(source)),
            size,
        }
    }
}

#[async_trait]
impl ByteSource for SharedSource {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.lock().await.read_chunk(buf).await
    }

    fn known_size(&self) -> Option<u64> {
        self.size
    }
}

/// Resolve the upload source from the CLI inputs, exactly once per
/// invocation. Precedence matches the CLI contract: tar archive, then an
/// explicit file, then stdin.
pub async fn resolve(
    file: Option<&Path>,
    tar: Option<&Path>,
    gzip: bool,
) -> Result<Box<dyn ByteSource>> {
    if let Some(path) = tar {
        return Ok(Box::new(ArchiveSource::spawn(path, gzip)?));
    }
    if let Some(path) = file {
        return Ok(Box::new(FileSource::open(path).await?));
    }
    info!("no file or archive path given, reading from stdin");
    Ok(Box::new(StdinSource::new()))
}
