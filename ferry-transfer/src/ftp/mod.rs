//! FTP implementation of [`BulkTransfer`].
//!
//! Binary mode, passive data connections, one control session per call.

mod reply;
mod session;

use std::time::Duration;

use async_trait::async_trait;
use ferry_common::tracing;
use tokio::io::{AsyncRead, AsyncWrite};

pub use reply::{Reply, ReplyLine};
use session::FtpSession;

use crate::{BulkTransfer, Coordinates, TransferConfig, TransferError};

#[derive(Debug, Clone)]
pub struct FtpTransfer {
    timeout: Duration,
}

impl FtpTransfer {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    #[must_use]
    pub const fn from_config(config: &TransferConfig) -> Self {
        Self::new(config.timeout())
    }

    /// Connect, log in and switch to binary mode. The session is closed
    /// again when any of those steps fail.
    async fn open(&self, coordinates: &Coordinates) -> Result<FtpSession, TransferError> {
        let mut session = FtpSession::connect(&coordinates.address, self.timeout)
            .await
            .inspect_err(|err| {
                tracing::error!(address = %coordinates.address, "Connect failed: {err}");
            })?;

        let prepared = async {
            session.login(&coordinates.credentials).await?;
            session.binary().await
        }
        .await;

        match prepared {
            Ok(()) => Ok(session),
            Err(err) => {
                tracing::error!(login = %coordinates.credentials.login, "Login failed: {err}");
                Self::close(session).await;
                Err(err)
            }
        }
    }

    /// Disconnect failures never mask the outcome of the transfer.
    async fn close(session: FtpSession) {
        match session.quit().await {
            Ok(()) => tracing::debug!("Disconnected from bulk store"),
            Err(err) => tracing::warn!("Disconnect failed: {err}"),
        }
    }
}

#[async_trait]
impl BulkTransfer for FtpTransfer {
    async fn upload(
        &self,
        coordinates: &Coordinates,
        content: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, TransferError> {
        let mut session = self.open(coordinates).await?;

        let result = async {
            session.make_directory(&coordinates.directory).await?;
            session.change_directory(&coordinates.directory).await?;
            session.store(&coordinates.file_name, content).await
        }
        .await;

        Self::close(session).await;

        match &result {
            Ok(bytes) => tracing::info!(%coordinates, bytes, "Uploaded attachment"),
            Err(err) => tracing::error!(%coordinates, "Upload failed: {err}"),
        }

        result
    }

    async fn download(
        &self,
        coordinates: &Coordinates,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, TransferError> {
        let mut session = self.open(coordinates).await?;

        let result = async {
            if !coordinates.directory.is_empty() {
                session.change_directory(&coordinates.directory).await?;
            }
            session.retrieve(&coordinates.file_name, sink).await
        }
        .await;

        Self::close(session).await;

        match &result {
            Ok(bytes) => tracing::info!(%coordinates, bytes, "Downloaded attachment"),
            Err(err) => tracing::error!(%coordinates, "Download failed: {err}"),
        }

        result
    }
}
