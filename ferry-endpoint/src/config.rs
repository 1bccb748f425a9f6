//! Endpoint configuration.
//!
//! One [`EndpointConfig`] is read per endpoint and never changes afterwards.
//! The settings handed to the broker client, the bulk transfer channel and
//! the signer are derived from it on demand.

use std::{fmt, str::FromStr, time::Duration};

use ferry_attachments::{Classifier, DEFAULT_THRESHOLD, StrategyConfig};
use ferry_common::{
    ConfigurationError, QueryDescriptor,
    protocol::MessageType,
};
use ferry_transfer::TransferConfig;
use serde::Deserialize;

use crate::{broker::BrokerSettings, signer::SignerSettings};

/// What a producer sends, and what a consumer asks the broker for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Mode {
    Request,
    Response,
    Status,
    Reject,
    Ack,
}

impl Mode {
    pub const ALLOWED: &'static str = "Request, Response, Status, Reject, Ack";

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "Request",
            Self::Response => "Response",
            Self::Status => "Status",
            Self::Reject => "Reject",
            Self::Ack => "Ack",
        }
    }

    /// The message type a consumer in this mode fetches.
    ///
    /// Rejections travel as responses; acknowledgments concern requests.
    #[must_use]
    pub const fn message_type(self) -> MessageType {
        match self {
            Self::Request | Self::Ack => MessageType::Request,
            Self::Response | Self::Reject => MessageType::Response,
            Self::Status => MessageType::Status,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Request" => Ok(Self::Request),
            "Response" => Ok(Self::Response),
            "Status" => Ok(Self::Status),
            "Reject" => Ok(Self::Reject),
            "Ack" => Ok(Self::Ack),
            other => Err(ConfigurationError::UnknownVariant {
                field: "mode",
                value: other.to_string(),
                allowed: Self::ALLOWED,
            }),
        }
    }
}

impl TryFrom<String> for Mode {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// How a consumed message is presented to the handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum BodyType {
    /// The business content as an XML string.
    #[default]
    Content,
    /// The raw envelope as received from the broker.
    Envelope,
    /// The protocol message itself.
    Message,
}

impl BodyType {
    pub const ALLOWED: &'static str = "Content, Envelope, Message";
}

impl FromStr for BodyType {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Content" => Ok(Self::Content),
            "Envelope" => Ok(Self::Envelope),
            "Message" => Ok(Self::Message),
            other => Err(ConfigurationError::UnknownVariant {
                field: "body_type",
                value: other.to_string(),
                allowed: Self::ALLOWED,
            }),
        }
    }
}

impl TryFrom<String> for BodyType {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Filter on the messages a consumer fetches. The message type comes from
/// the endpoint [`Mode`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub node_id: Option<String>,
    pub namespace_uri: Option<String>,
    pub root_element: Option<String>,
}

/// Settings for one endpoint
///
/// # Examples
///
/// ```ron
/// Endpoint (
///     mode: "Request",
///     query: (namespace_uri: Some("urn://x-artefacts/registry/1.0.0")),
///     broker: (primary: (url: "http://broker.local/ws")),
///     transfer: (address: Some("bulk.local:21")),
///     attachment_strategy: (type: "File", path: "/var/lib/ferry/attachments"),
///     error_delay_ms: 30000,
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub mode: Mode,

    #[serde(default)]
    pub query: QuerySettings,

    #[serde(default)]
    pub body_type: BodyType,

    /// Poll again straight away after a cycle that consumed a message
    #[serde(default = "EndpointConfig::default_true")]
    pub greedy: bool,

    #[serde(default = "EndpointConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Pause after a failed cycle, in milliseconds
    #[serde(default = "EndpointConfig::default_error_delay_ms")]
    pub error_delay_ms: u64,

    /// Accept consumed messages unless the handler says otherwise
    #[serde(default = "EndpointConfig::default_true")]
    pub auto_ack: bool,

    #[serde(default = "EndpointConfig::default_true")]
    pub omit_xml_declaration: bool,

    #[serde(default)]
    pub attachment_strategy: StrategyConfig,

    pub broker: BrokerSettings,

    #[serde(default)]
    pub transfer: TransferConfig,

    /// Attachments of at least this many bytes go through the bulk store
    #[serde(default = "EndpointConfig::default_threshold")]
    pub large_attachment_threshold: u64,

    #[serde(default = "EndpointConfig::default_true")]
    pub validate_input: bool,

    #[serde(default = "EndpointConfig::default_true")]
    pub validate_output: bool,

    #[serde(default)]
    pub log_input: bool,

    #[serde(default)]
    pub log_output: bool,

    #[serde(default)]
    pub signer: SignerSettings,

    #[serde(default)]
    pub crypto_license_key: Option<String>,
}

impl EndpointConfig {
    const fn default_true() -> bool {
        true
    }

    const fn default_poll_interval_ms() -> u64 {
        500
    }

    const fn default_error_delay_ms() -> u64 {
        60_000
    }

    const fn default_threshold() -> u64 {
        DEFAULT_THRESHOLD
    }

    /// A configuration with every optional setting at its default.
    #[must_use]
    pub fn new(mode: Mode, broker: BrokerSettings) -> Self {
        Self {
            mode,
            query: QuerySettings::default(),
            body_type: BodyType::default(),
            greedy: true,
            poll_interval_ms: Self::default_poll_interval_ms(),
            error_delay_ms: Self::default_error_delay_ms(),
            auto_ack: true,
            omit_xml_declaration: true,
            attachment_strategy: StrategyConfig::default(),
            broker,
            transfer: TransferConfig::default(),
            large_attachment_threshold: Self::default_threshold(),
            validate_input: true,
            validate_output: true,
            log_input: false,
            log_output: false,
            signer: SignerSettings::default(),
            crypto_license_key: None,
        }
    }

    /// Parse and validate a RON document.
    ///
    /// # Errors
    ///
    /// Fails when the document does not parse or does not validate.
    pub fn from_ron(document: &str) -> Result<Self, ConfigurationError> {
        let config: Self =
            ron::from_str(document).map_err(|err| ConfigurationError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Fails on the first setting that cannot be used.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.classifier()?;
        self.broker.validate()?;
        self.transfer.validate()?;

        if self.poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid(
                "poll_interval_ms",
                "must be greater than zero",
            ));
        }

        if let Some(key) = &self.crypto_license_key
            && key.trim().is_empty()
        {
            return Err(ConfigurationError::invalid(
                "crypto_license_key",
                "must not be empty",
            ));
        }

        Ok(())
    }

    #[must_use]
    pub fn query(&self) -> QueryDescriptor {
        QueryDescriptor {
            message_type: self.mode.message_type(),
            node_id: self.query.node_id.clone(),
            namespace_uri: self.query.namespace_uri.clone(),
            root_element: self.query.root_element.clone(),
        }
    }

    /// # Errors
    ///
    /// Fails on a zero threshold.
    pub fn classifier(&self) -> Result<Classifier, ConfigurationError> {
        Classifier::new(self.large_attachment_threshold)
    }

    #[must_use]
    pub fn broker_settings(&self) -> BrokerSettings {
        self.broker.clone()
    }

    #[must_use]
    pub fn transfer_config(&self) -> TransferConfig {
        self.transfer.clone()
    }

    #[must_use]
    pub fn signer_settings(&self) -> SignerSettings {
        self.signer.clone()
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub const fn error_delay(&self) -> Duration {
        Duration::from_millis(self.error_delay_ms)
    }
}
