use std::sync::Arc;

use async_trait::async_trait;
use ferry_common::ExchangeMessage;
use ferry_endpoint::{Handler, HandlerError};
use parking_lot::Mutex;

/// What the handler does with each exchange after recording it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Leave,
    Accept,
    Reject,
    Fail,
    MarkFailed,
}

/// Records every exchange, and the bytes of its attachments as seen while
/// the cycle was still running.
#[derive(Debug, Clone)]
pub struct RecordingHandler {
    outcome: Outcome,
    seen: Arc<Mutex<Vec<ExchangeMessage>>>,
    contents: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl RecordingHandler {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            seen: Arc::default(),
            contents: Arc::default(),
        }
    }

    pub fn seen(&self) -> Vec<ExchangeMessage> {
        self.seen.lock().clone()
    }

    pub fn contents(&self) -> Vec<(String, Vec<u8>)> {
        self.contents.lock().clone()
    }
}

#[async_trait]
impl Handler for RecordingHandler {
    async fn handle(&self, exchange: &mut ExchangeMessage) -> Result<(), HandlerError> {
        for attachment in &exchange.attachments {
            let bytes = attachment
                .content
                .read_all()
                .await
                .map_err(|err| HandlerError::failed(err.to_string()))?;
            self.contents.lock().push((attachment.name().to_string(), bytes));
        }
        self.seen.lock().push(exchange.clone());

        match self.outcome {
            Outcome::Leave => {}
            Outcome::Accept => exchange.accept(),
            Outcome::Reject => exchange.reject(),
            Outcome::Fail => return Err(HandlerError::failed("handler exploded")),
            Outcome::MarkFailed => exchange.fail("content rejected by handler"),
        }
        Ok(())
    }
}
