//! The staging area behind a single attachment.

use std::{
    io,
    path::{Path, PathBuf},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use ferry_common::AttachmentContent;
use tokio::io::AsyncWrite;

use crate::{AcquireRequest, PlacementError};

/// Lifecycle of a staged buffer.
///
/// A buffer handed out by a strategy starts `Acquired`, moves to `Writing`
/// once its writer is taken, then `Finalized` once sealed. `Released` is
/// terminal and may follow any other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Acquired,
    Writing,
    Finalized,
    Released,
}

#[derive(Debug)]
enum Storage {
    Memory(Vec<u8>),
    Sealed(Arc<[u8]>),
    File(PathBuf),
    Discarded,
}

/// Storage for one attachment, handed out by a
/// [`PlacementStrategy`](crate::PlacementStrategy).
#[derive(Debug)]
pub struct StagedBuffer {
    message_id: String,
    attachment_id: String,
    ordinal: usize,
    total: usize,
    storage: Storage,
    state: BufferState,
    length: u64,
}

impl StagedBuffer {
    #[must_use]
    pub fn in_memory(request: &AcquireRequest<'_>) -> Self {
        Self::with_storage(request, Storage::Memory(Vec::new()))
    }

    /// Stage into `path`. The file is created when the writer is taken.
    #[must_use]
    pub fn on_disk(request: &AcquireRequest<'_>, path: PathBuf) -> Self {
        Self::with_storage(request, Storage::File(path))
    }

    fn with_storage(request: &AcquireRequest<'_>, storage: Storage) -> Self {
        Self {
            message_id: request.message_id.to_string(),
            attachment_id: request.attachment_id.to_string(),
            ordinal: request.ordinal,
            total: request.total,
            storage,
            state: BufferState::Acquired,
            length: 0,
        }
    }

    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    #[must_use]
    pub fn attachment_id(&self) -> &str {
        &self.attachment_id
    }

    #[must_use]
    pub const fn ordinal(&self) -> usize {
        self.ordinal
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    #[must_use]
    pub const fn state(&self) -> BufferState {
        self.state
    }

    #[must_use]
    pub const fn is_released(&self) -> bool {
        matches!(self.state, BufferState::Released)
    }

    /// Bytes staged, known once the buffer is sealed.
    #[must_use]
    pub const fn length(&self) -> u64 {
        self.length
    }

    /// The staging file, for disk-backed buffers.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.storage {
            Storage::File(path) => Some(path),
            Storage::Memory(_) | Storage::Sealed(_) | Storage::Discarded => None,
        }
    }

    /// Take the write side. Only one writer is ever handed out.
    ///
    /// Callers must flush or shut the writer down before sealing.
    pub async fn writer(&mut self) -> Result<StagedWriter<'_>, PlacementError> {
        match self.state {
            BufferState::Acquired => {}
            BufferState::Released => {
                return Err(PlacementError::Released(self.attachment_id.clone()));
            }
            BufferState::Writing | BufferState::Finalized => {
                return Err(PlacementError::WriterTaken(self.attachment_id.clone()));
            }
        }

        self.state = BufferState::Writing;
        match &mut self.storage {
            Storage::Memory(bytes) => Ok(StagedWriter::Memory(bytes)),
            Storage::File(path) => {
                let file = tokio::fs::File::create(&*path).await?;
                Ok(StagedWriter::File(file))
            }
            Storage::Sealed(_) | Storage::Discarded => Err(PlacementError::Internal(format!(
                "buffer for {} has no writable storage",
                self.attachment_id
            ))),
        }
    }

    /// Convert the written bytes into readable content.
    ///
    /// Sealing twice returns the same content again.
    pub async fn seal(&mut self) -> Result<AttachmentContent, PlacementError> {
        match self.state {
            BufferState::Writing | BufferState::Finalized => {}
            BufferState::Acquired => {
                return Err(PlacementError::NotWritten(self.attachment_id.clone()));
            }
            BufferState::Released => {
                return Err(PlacementError::Released(self.attachment_id.clone()));
            }
        }

        let content = match &mut self.storage {
            Storage::Memory(bytes) => {
                let sealed: Arc<[u8]> = std::mem::take(bytes).into();
                self.length = sealed.len() as u64;
                self.storage = Storage::Sealed(Arc::clone(&sealed));
                AttachmentContent::Memory(sealed)
            }
            Storage::Sealed(sealed) => AttachmentContent::Memory(Arc::clone(sealed)),
            Storage::File(path) => {
                self.length = tokio::fs::metadata(&*path).await?.len();
                AttachmentContent::File(path.clone())
            }
            Storage::Discarded => {
                return Err(PlacementError::Released(self.attachment_id.clone()));
            }
        };

        self.state = BufferState::Finalized;
        Ok(content)
    }

    /// Drop the staged bytes and mark the buffer released.
    ///
    /// Returns false when the buffer was already released. Removing a
    /// staging file that no longer exists is not an error.
    pub async fn discard(&mut self) -> io::Result<bool> {
        if self.is_released() {
            return Ok(false);
        }
        self.state = BufferState::Released;

        match std::mem::replace(&mut self.storage, Storage::Discarded) {
            Storage::File(path) => match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(true),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(true),
                Err(err) => Err(err),
            },
            Storage::Memory(_) | Storage::Sealed(_) | Storage::Discarded => Ok(true),
        }
    }
}

/// The write side of a [`StagedBuffer`].
#[derive(Debug)]
pub enum StagedWriter<'a> {
    Memory(&'a mut Vec<u8>),
    File(tokio::fs::File),
}

impl AsyncWrite for StagedWriter<'_> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Memory(bytes) => Pin::new(&mut **bytes).poll_write(cx, buf),
            Self::File(file) => Pin::new(file).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Memory(bytes) => Pin::new(&mut **bytes).poll_flush(cx),
            Self::File(file) => Pin::new(file).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Memory(bytes) => Pin::new(&mut **bytes).poll_shutdown(cx),
            Self::File(file) => Pin::new(file).poll_shutdown(cx),
        }
    }
}
