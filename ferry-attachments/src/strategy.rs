use std::fmt::Debug;

use async_trait::async_trait;
use ferry_common::{Attachment, ExchangeMessage};

use crate::{PlacementError, StagedBuffer};

/// Everything known about an inbound attachment before its bytes arrive.
#[derive(Debug, Clone, Copy)]
pub struct AcquireRequest<'a> {
    pub message_id: &'a str,
    pub attachment_id: &'a str,
    pub attachment_name: &'a str,
    pub mime_type: &'a str,
    pub signature: &'a [u8],
    /// Zero-based position of the attachment in the message.
    pub ordinal: usize,
    pub total: usize,
}

impl AcquireRequest<'_> {
    /// # Errors
    ///
    /// The message and attachment ids must be non-empty, and the ordinal
    /// must fall inside the attachment count.
    pub const fn validate(&self) -> Result<(), PlacementError> {
        if self.message_id.is_empty() {
            return Err(PlacementError::InvalidRequest("message id is empty"));
        }
        if self.attachment_id.is_empty() {
            return Err(PlacementError::InvalidRequest("attachment id is empty"));
        }
        if self.ordinal >= self.total {
            return Err(PlacementError::InvalidRequest(
                "ordinal is outside the attachment count",
            ));
        }
        Ok(())
    }
}

/// Decides where the bytes of an inbound attachment are staged while the
/// handler runs.
///
/// Every buffer returned by `acquire` must be passed to `release` exactly
/// once, whether or not the rest of the cycle succeeds.
#[async_trait]
pub trait PlacementStrategy: Debug + Send + Sync {
    /// Allocate a buffer for one attachment. `None` skips the attachment
    /// and needs no release.
    async fn acquire(
        &self,
        exchange: &ExchangeMessage,
        request: &AcquireRequest<'_>,
    ) -> Result<Option<StagedBuffer>, PlacementError>;

    /// Annotate `attachment` from its sealed buffer. Returns whether the
    /// handler gets to see it.
    async fn finalize(
        &self,
        exchange: &ExchangeMessage,
        attachment: &mut Attachment,
        buffer: &StagedBuffer,
    ) -> Result<bool, PlacementError>;

    /// Free the staged storage. Safe to call more than once; failures are
    /// logged rather than returned.
    async fn release(&self, buffer: &mut StagedBuffer);
}
