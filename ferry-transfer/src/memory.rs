use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{BulkTransfer, Coordinates, TransferError};

#[derive(Debug, Default)]
struct Store {
    directories: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
}

/// A bulk store held in process memory.
///
/// Follows the same rules as a remote store: an upload fails when its
/// directory already exists, and a download of an unknown path fails.
/// Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransfer {
    store: Arc<Mutex<Store>>,
    unavailable: Arc<AtomicBool>,
    uploads: Arc<AtomicUsize>,
    downloads: Arc<AtomicUsize>,
}

impl MemoryTransfer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail as if the store were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Place a payload directly, as if another party had uploaded it.
    pub fn insert(&self, coordinates: &Coordinates, content: impl Into<Vec<u8>>) {
        let mut store = self.store.lock();
        store.directories.insert(coordinates.directory.clone());
        store.files.insert(coordinates.path(), content.into());
    }

    #[must_use]
    pub fn get(&self, coordinates: &Coordinates) -> Option<Vec<u8>> {
        self.store.lock().files.get(&coordinates.path()).cloned()
    }

    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.store.lock().files.keys().cloned().collect()
    }

    #[must_use]
    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    fn check_available(&self, coordinates: &Coordinates) -> Result<(), TransferError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(TransferError::Connect {
                address: coordinates.address.clone(),
                reason: "store unavailable".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BulkTransfer for MemoryTransfer {
    async fn upload(
        &self,
        coordinates: &Coordinates,
        content: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, TransferError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.check_available(coordinates)?;

        let created = self
            .store
            .lock()
            .directories
            .insert(coordinates.directory.clone());
        if !created {
            return Err(TransferError::CreateDirectory {
                directory: coordinates.directory.clone(),
                code: 550,
                message: "Directory already exists".to_string(),
            });
        }

        let mut bytes = Vec::new();
        let read = content.read_to_end(&mut bytes).await?;
        self.store.lock().files.insert(coordinates.path(), bytes);

        Ok(read as u64)
    }

    async fn download(
        &self,
        coordinates: &Coordinates,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, TransferError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.check_available(coordinates)?;

        let bytes = self
            .get(coordinates)
            .ok_or_else(|| TransferError::NotFound(coordinates.path()))?;
        sink.write_all(&bytes).await?;
        sink.flush().await?;

        Ok(bytes.len() as u64)
    }
}
