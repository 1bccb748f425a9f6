//! Shared building blocks for the ferry exchange adapter.
//!
//! - [`message`]: the generic [`ExchangeMessage`] handed to and from handlers
//! - [`headers`]: named metadata keys and typed header values
//! - [`protocol`]: the broker's view of a message
//! - [`logging`]: subscriber setup and the `internal!`/`incoming!`/`outgoing!` macros
//! - [`error`]: configuration errors shared by every crate

pub mod error;
pub mod headers;
pub mod logging;
pub mod message;
pub mod protocol;

pub use error::ConfigurationError;
pub use headers::{HeaderError, HeaderValue, Headers};
pub use message::{
    Attachment, AttachmentContent, AttachmentHeaders, Body, Disposition, ExchangeMessage,
};
pub use protocol::{ProtocolAttachment, ProtocolMessage, QueryDescriptor};
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
