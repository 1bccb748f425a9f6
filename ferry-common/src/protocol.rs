//! The broker's view of a message.
//!
//! These types mirror what the remote broker exchanges with the adapter:
//! identity and routing metadata, the business content, and the attachments
//! in the representation the broker chose for them. The wire encoding itself
//! belongs to the broker client and is not modelled here.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which kind of message a query asks for, or a message carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    #[default]
    Request,
    Response,
    /// Status-only traffic. Never acknowledged.
    Status,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Request => "REQUEST",
            Self::Response => "RESPONSE",
            Self::Status => "STATUS",
        })
    }
}

/// Filter handed to the broker on every fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryDescriptor {
    pub message_type: MessageType,
    pub node_id: Option<String>,
    pub namespace_uri: Option<String>,
    pub root_element: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageIdentity {
    pub message_id: String,
    pub reference_message_id: Option<String>,
    pub transaction_code: Option<String>,
}

impl MessageIdentity {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInformation {
    pub node_id: Option<String>,
    pub end_of_life: Option<DateTime<Utc>>,
    pub test_message: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseInformation {
    pub node_id: Option<String>,
    pub original_message_id: Option<String>,
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingInformation {
    Request(RequestInformation),
    Response(ResponseInformation),
}

impl ProcessingInformation {
    #[must_use]
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::Request(info) => info.node_id.as_deref(),
            Self::Response(info) => info.node_id.as_deref(),
        }
    }

    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::Request(_) => MessageType::Request,
            Self::Response(_) => MessageType::Response,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Participant {
    pub mnemonic: Option<String>,
    pub display_name: Option<String>,
}

/// A processing fault the broker reports against a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerFault {
    pub code: Option<String>,
    pub cause: Option<String>,
    pub message: Option<String>,
    pub localized_message: Option<String>,
    pub stack_trace: Option<String>,
    pub dump: Option<String>,
}

/// Routing details filled in by the broker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerContext {
    pub transport_id: Option<String>,
    pub processing_details: Option<String>,
    pub interaction_type: Option<String>,
    pub destination_name: Option<String>,
    pub sending_timestamp: Option<DateTime<Utc>>,
    pub delivery_timestamp: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub reply_to: Option<String>,
    pub sender: Option<Participant>,
    pub recipient: Option<Participant>,
    pub fault: Option<BrokerFault>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolMetadata {
    pub identity: MessageIdentity,
    pub processing: Option<ProcessingInformation>,
    pub context: Option<BrokerContext>,
}

/// Root element of the business payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlContent {
    pub namespace_uri: Option<String>,
    pub local_name: String,
    /// The serialized element, with or without an XML declaration.
    pub xml: String,
}

/// Credentials the broker hands out for one bulk transfer.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TransportDetails {
    pub login: String,
    pub password: String,
}

impl fmt::Debug for TransportDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportDetails")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An attachment in the representation the broker chose for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolAttachment {
    /// Bytes embedded in the envelope. `id` is a valid NCName.
    Inline {
        id: String,
        mime_type: String,
        signature: Vec<u8>,
        passport_id: Option<String>,
        content: Vec<u8>,
    },
    /// Bytes held by the bulk store under `<uuid>/<file_ref>`.
    Bulk {
        uuid: String,
        mime_type: String,
        signature: Vec<u8>,
        passport_id: Option<String>,
        file_ref: String,
        /// Base64 checksum of the content.
        hash: String,
        transport: TransportDetails,
    },
}

impl ProtocolAttachment {
    /// The identity the attachment is keyed by on the generic message.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Inline { id, .. } => id,
            Self::Bulk { uuid, .. } => uuid,
        }
    }

    #[must_use]
    pub fn mime_type(&self) -> &str {
        match self {
            Self::Inline { mime_type, .. } | Self::Bulk { mime_type, .. } => mime_type,
        }
    }

    #[must_use]
    pub const fn is_bulk(&self) -> bool {
        matches!(self, Self::Bulk { .. })
    }
}

/// Content, signature and attachments of a request or response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusinessData {
    pub content: XmlContent,
    pub personal_signature: Option<String>,
    pub attachments: Vec<ProtocolAttachment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectCode {
    AccessDenied,
    NoData,
    UnknownRequestDescription,
    Failure,
}

impl RejectCode {
    pub const ALLOWED: &'static str =
        "ACCESS_DENIED, NO_DATA, UNKNOWN_REQUEST_DESCRIPTION, FAILURE";

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AccessDenied => "ACCESS_DENIED",
            Self::NoData => "NO_DATA",
            Self::UnknownRequestDescription => "UNKNOWN_REQUEST_DESCRIPTION",
            Self::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for RejectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown rejection reason code: {0}")]
pub struct UnknownRejectCode(pub String);

impl FromStr for RejectCode {
    type Err = UnknownRejectCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ACCESS_DENIED" => Ok(Self::AccessDenied),
            "NO_DATA" => Ok(Self::NoData),
            "UNKNOWN_REQUEST_DESCRIPTION" => Ok(Self::UnknownRequestDescription),
            "FAILURE" => Ok(Self::Failure),
            other => Err(UnknownRejectCode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub code: RejectCode,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusinessContent {
    Request(BusinessData),
    Response(BusinessData),
    Status {
        code: Option<i64>,
        description: Option<String>,
        parameters: BTreeMap<String, String>,
    },
    Reject(Vec<Rejection>),
}

impl BusinessContent {
    /// The data block, for content kinds that carry one.
    #[must_use]
    pub const fn data(&self) -> Option<&BusinessData> {
        match self {
            Self::Request(data) | Self::Response(data) => Some(data),
            Self::Status { .. } | Self::Reject(_) => None,
        }
    }
}

/// A message as exchanged with the broker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolMessage {
    pub metadata: ProtocolMetadata,
    pub content: Option<BusinessContent>,
    /// The raw inbound envelope, when the broker client keeps it.
    pub raw_envelope: Option<String>,
}

impl ProtocolMessage {
    #[must_use]
    pub fn data(&self) -> Option<&BusinessData> {
        self.content.as_ref().and_then(BusinessContent::data)
    }

    #[must_use]
    pub fn attachments(&self) -> &[ProtocolAttachment] {
        self.data().map_or(&[], |data| data.attachments.as_slice())
    }

    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.metadata.identity.message_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_code_parse() {
        assert_eq!("NO_DATA".parse(), Ok(RejectCode::NoData));
        assert_eq!(" FAILURE ".parse(), Ok(RejectCode::Failure));
        assert_eq!(
            "GONE".parse::<RejectCode>(),
            Err(UnknownRejectCode("GONE".to_string()))
        );
        assert_eq!(RejectCode::AccessDenied.to_string(), "ACCESS_DENIED");
    }

    #[test]
    fn test_attachments_only_on_data_content() {
        let mut message = ProtocolMessage::default();
        assert!(message.attachments().is_empty());

        message.content = Some(BusinessContent::Request(BusinessData {
            attachments: vec![ProtocolAttachment::Inline {
                id: "a1".to_string(),
                mime_type: "text/plain".to_string(),
                signature: Vec::new(),
                passport_id: None,
                content: b"x".to_vec(),
            }],
            ..BusinessData::default()
        }));
        assert_eq!(message.attachments().len(), 1);
        assert_eq!(message.attachments()[0].key(), "a1");

        message.content = Some(BusinessContent::Reject(vec![]));
        assert!(message.attachments().is_empty());
    }

    #[test]
    fn test_transport_details_debug_is_redacted() {
        let details = TransportDetails {
            login: "anonymous".to_string(),
            password: "secret".to_string(),
        };
        let rendered = format!("{details:?}");
        assert!(rendered.contains("anonymous"));
        assert!(!rendered.contains("secret"));
    }
}
