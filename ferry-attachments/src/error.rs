//! Errors raised while staging attachments.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlacementError {
    /// `acquire` was called without the identifiers it needs.
    #[error("Invalid acquire request: {0}")]
    InvalidRequest(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The writer of a buffer may only be handed out once.
    #[error("Writer for attachment {0} was already taken")]
    WriterTaken(String),

    #[error("Attachment {0} was sealed before anything was written")]
    NotWritten(String),

    #[error("Attachment {0} has already been released")]
    Released(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlacementError {
    /// True for errors caused by calling the buffer lifecycle out of order.
    #[must_use]
    pub const fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::WriterTaken(_) | Self::NotWritten(_) | Self::Released(_)
        )
    }
}
