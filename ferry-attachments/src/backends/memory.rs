use async_trait::async_trait;
use ferry_common::{Attachment, ExchangeMessage};

use crate::{AcquireRequest, BufferState, PlacementError, PlacementStrategy, StagedBuffer};

/// Stages attachments in process memory.
///
/// Release only drops the bytes, so it cannot fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStrategy;

impl MemoryStrategy {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PlacementStrategy for MemoryStrategy {
    async fn acquire(
        &self,
        _exchange: &ExchangeMessage,
        request: &AcquireRequest<'_>,
    ) -> Result<Option<StagedBuffer>, PlacementError> {
        request.validate()?;
        Ok(Some(StagedBuffer::in_memory(request)))
    }

    async fn finalize(
        &self,
        _exchange: &ExchangeMessage,
        attachment: &mut Attachment,
        buffer: &StagedBuffer,
    ) -> Result<bool, PlacementError> {
        if buffer.state() != BufferState::Finalized {
            return Err(PlacementError::NotWritten(buffer.attachment_id().to_string()));
        }

        attachment.headers.length = Some(buffer.length());
        Ok(true)
    }

    async fn release(&self, buffer: &mut StagedBuffer) {
        if let Err(err) = buffer.discard().await {
            tracing::warn!(attachment = buffer.attachment_id(), "Failed to release buffer: {err}");
        }
    }
}
