//! Bulk transfer channel.
//!
//! Moves one named payload to or from a remote bulk store per call. Every
//! call is a self-contained session: connect, authenticate with the
//! credentials carried in the [`Coordinates`], perform exactly one transfer,
//! disconnect. Nothing is retried here; callers own the retry policy and use
//! [`TransferConfig::retries`] to drive it.

mod config;
mod coordinates;
mod error;
pub mod ftp;
mod memory;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

pub use config::TransferConfig;
pub use coordinates::{Coordinates, Credentials};
pub use error::TransferError;
pub use ftp::FtpTransfer;
pub use memory::MemoryTransfer;

#[async_trait]
pub trait BulkTransfer: std::fmt::Debug + Send + Sync {
    /// Store `content` at `coordinates`, creating `coordinates.directory`
    /// first. Returns the number of bytes stored.
    async fn upload(
        &self,
        coordinates: &Coordinates,
        content: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, TransferError>;

    /// Copy the payload at `coordinates` into `sink`. Returns the number of
    /// bytes copied.
    async fn download(
        &self,
        coordinates: &Coordinates,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, TransferError>;
}
