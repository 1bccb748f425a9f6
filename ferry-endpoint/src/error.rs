//! Typed errors for the consumption loop and the dispatch producer.
//!
//! Each side aggregates the lower-level errors it can observe:
//! - [`EnvelopeError`]: building or taking apart a protocol envelope
//! - [`CycleError`]: one consumption cycle (fetch, materialize, handle)
//! - [`DispatchError`]: one producer call

use std::io;

use ferry_attachments::PlacementError;
use ferry_common::{ConfigurationError, HeaderError, protocol::UnknownRejectCode};
use ferry_transfer::TransferError;
use thiserror::Error;

use crate::{broker::BrokerError, signer::SignerError};

/// The handler failed, or marked the exchange as failed.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Handler failed: {0}")]
    Failed(String),

    #[error("Exchange marked as failed: {0}")]
    MarkedFailed(String),
}

impl HandlerError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Placement error: {0}")]
    Placement(#[from] PlacementError),

    #[error("Bulk transfer of {uuid} failed after {attempts} attempt(s): {source}")]
    Transfer {
        uuid: String,
        attempts: u32,
        #[source]
        source: TransferError,
    },

    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),

    #[error("Attachment {0} changed while it was being sent")]
    ContentChanged(String),

    #[error("Invalid attachment header: {0}")]
    Header(#[from] HeaderError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl EnvelopeError {
    /// True when retrying the whole message may succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Transfer { source, .. } => source.is_retryable(),
            Self::Io(_) => true,
            Self::Placement(_)
            | Self::Signer(_)
            | Self::ContentChanged(_)
            | Self::Header(_)
            | Self::Configuration(_) => false,
        }
    }
}

/// Why a consumption cycle ended in the failed state.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Materialization failed: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error("Invalid header: {0}")]
    Header(#[from] HeaderError),

    #[error("Inbound message failed validation: {0}")]
    Invalid(String),
}

impl CycleError {
    #[must_use]
    pub const fn is_handler(&self) -> bool {
        matches!(self, Self::Handler(_))
    }

    #[must_use]
    pub const fn is_broker(&self) -> bool {
        matches!(self, Self::Broker(_))
    }
}

/// Why a producer call failed.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Assembly failed: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),

    #[error("Invalid header: {0}")]
    Header(#[from] HeaderError),

    #[error(transparent)]
    RejectCode(#[from] UnknownRejectCode),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The message body is of a kind the current mode cannot send.
    #[error("Unsupported body for {mode}: {kind}")]
    UnsupportedBody {
        mode: &'static str,
        kind: &'static str,
    },

    #[error("Missing required header {0}")]
    MissingHeader(&'static str),

    #[error("Outbound message failed validation: {0}")]
    Invalid(String),
}
