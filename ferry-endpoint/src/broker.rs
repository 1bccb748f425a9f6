//! The remote broker, seen as a capability.
//!
//! The wire client lives outside this crate. Endpoints only need the three
//! calls below, plus the transport settings the client is built from.

use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use ferry_common::{
    ConfigurationError, ProtocolMessage, QueryDescriptor, protocol::ProtocolMetadata,
};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker unavailable at {url}: {reason}")]
    Unavailable { url: String, reason: String },

    #[error("Broker did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Acknowledge of {message_id} failed: {reason}")]
    Acknowledge { message_id: String, reason: String },

    /// The broker refused the message itself; resending it unchanged will
    /// fail again.
    #[error("Message rejected by broker: {0}")]
    Rejected(String),
}

impl BrokerError {
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

#[async_trait]
pub trait Broker: Debug + Send + Sync {
    /// Take at most one message matching `query`.
    async fn fetch(&self, query: &QueryDescriptor) -> Result<Option<ProtocolMessage>, BrokerError>;

    /// Report the disposition of a previously fetched message.
    async fn acknowledge(
        &self,
        metadata: &ProtocolMetadata,
        accepted: bool,
    ) -> Result<(), BrokerError>;

    /// Deliver a message, returning it as the broker recorded it.
    async fn send(&self, message: ProtocolMessage) -> Result<ProtocolMessage, BrokerError>;
}

/// One broker transport endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransportSettings {
    pub url: String,

    #[serde(default = "TransportSettings::default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "TransportSettings::default_retries")]
    pub retries: u32,
}

impl TransportSettings {
    const fn default_timeout_ms() -> u64 {
        1000
    }

    const fn default_retries() -> u32 {
        5
    }

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_ms: Self::default_timeout_ms(),
            retries: Self::default_retries(),
        }
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self, field: &str) -> Result<(), ConfigurationError> {
        if self.url.trim().is_empty() {
            return Err(ConfigurationError::invalid(
                format!("{field}.url"),
                "must not be empty",
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigurationError::invalid(
                format!("{field}.timeout_ms"),
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Primary broker transport, with an optional reserve to fail over to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrokerSettings {
    pub primary: TransportSettings,

    #[serde(default)]
    pub reserve: Option<TransportSettings>,
}

impl BrokerSettings {
    /// Primary first, then the reserve.
    pub fn transports(&self) -> impl Iterator<Item = &TransportSettings> {
        std::iter::once(&self.primary).chain(self.reserve.as_ref())
    }

    /// # Errors
    ///
    /// Every configured transport needs a URL and a non-zero timeout.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.primary.validate("broker.primary")?;
        if let Some(reserve) = &self.reserve {
            reserve.validate("broker.reserve")?;
        }
        Ok(())
    }
}
