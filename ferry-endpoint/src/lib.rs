//! Endpoints of the ferry exchange adapter.
//!
//! An [`Endpoint`] is built from one [`EndpointConfig`] plus the two
//! capabilities the adapter does not implement itself: a [`Broker`] client
//! and a [`Signer`]. It hands out:
//! - a [`Consumer`], which polls the broker, materializes each message for a
//!   [`Handler`] and acknowledges the outcome
//! - a [`Producer`], which turns outbound exchanges into protocol messages
//!
//! Attachments move between the two worlds through the [`EnvelopeBuilder`].

pub mod broker;
pub mod config;
pub mod consumer;
pub mod crypto;
mod endpoint;
pub mod envelope;
pub mod error;
pub mod metadata;
pub mod producer;
pub mod signer;

pub use broker::{Broker, BrokerError, BrokerSettings, TransportSettings};
pub use config::{BodyType, EndpointConfig, Mode, QuerySettings};
pub use consumer::{Consumer, CycleReport, CycleState, Handler};
pub use crypto::{crypto_provider, init_crypto_provider};
pub use endpoint::Endpoint;
pub use envelope::{EnvelopeBuilder, Placement};
pub use error::{CycleError, DispatchError, EnvelopeError, HandlerError};
pub use producer::Producer;
pub use signer::{AttachmentSeal, AttachmentSigner, DigestSigner, Signer, SignerError, SignerSettings};
