//! Named metadata carried by an [`ExchangeMessage`](crate::ExchangeMessage).
//!
//! Keys are plain strings so handlers can attach their own fields, but every
//! field the adapter reads or writes has a constant here. Values are scalars:
//! text, integers, booleans, timestamps, or raw bytes.

use std::{collections::BTreeMap, fmt};

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const PREFIX: &str = "Ferry";

macro_rules! header_keys {
    ($($(#[$meta:meta])* $name:ident => $suffix:literal),* $(,)?) => {
        $(
            $(#[$meta])*
            pub const $name: &str = concat!("Ferry", $suffix);
        )*
    };
}

header_keys! {
    /// Identifier assigned to the message by its sender.
    MESSAGE_ID => "MessageId",
    /// Identifier of the request a response answers.
    ORIGINAL_MESSAGE_ID => "MessageOriginalId",
    /// Identifier of the root message of a message chain.
    REFERENCE_MESSAGE_ID => "MessageReferenceId",
    /// Opaque return address supplied by the broker; copy it into responses.
    REPLY_TO => "MessageReplyTo",
    TRANSACTION_CODE => "MetadataTransactionCode",
    NODE_ID => "MetadataNodeId",
    /// Set on requests that must not change data at the provider.
    TEST_MESSAGE => "MetadataTestMessage",
    END_OF_LIFE => "MessageEndOfLife",
    TRANSPORT_ID => "MetadataTransportId",
    PROCESSING_DETAILS => "MetadataProcessingDetails",
    INTERACTION_TYPE => "MetadataInteractionType",
    DESTINATION_NAME => "MetadataDestinationName",
    MESSAGE_TYPE => "MetadataMessageType",
    SENDER_MNEMONIC => "MetadataSenderMnemonic",
    SENDER_DISPLAY_NAME => "MetadataSenderHumanReadableName",
    RECIPIENT_MNEMONIC => "MetadataRecipientMnemonic",
    RECIPIENT_DISPLAY_NAME => "MetadataRecipientHumanReadableName",
    SENDING_TIMESTAMP => "MetadataSendingTimestamp",
    DELIVERY_TIMESTAMP => "MetadataDeliveryTimestamp",
    STATUS => "MetadataStatus",
    STATUS_CODE => "MessageStatusCode",
    REJECTION_REASON_CODE => "MessageRejectionReasonCode",
    DESCRIPTION => "MessageDescription",
    /// Accept/reject flag used by acknowledging producers.
    ACCEPTED => "MessageAccepted",
    CONTENT_NAMESPACE_URI => "ContentNamespaceURI",
    CONTENT_ROOT_ELEMENT => "ContentRootElementLocalName",
    PERSONAL_SIGNATURE => "ContentPersonalSignature",
    EXCEPTION_CAUSE => "MetadataExceptionCause",
    EXCEPTION_MESSAGE => "MetadataExceptionMessage",
    EXCEPTION_LOCALIZED_MESSAGE => "MetadataExceptionLocalizedMessage",
    EXCEPTION_CODE => "MetadataExceptionCode",
    EXCEPTION_STACK_TRACE => "MetadataExceptionStackTrace",
    EXCEPTION_DUMP => "MetadataExceptionDump",
}

/// Returns true when `key` belongs to the adapter's own namespace.
#[must_use]
pub fn is_reserved(key: &str) -> bool {
    key.starts_with(PREFIX)
}

/// A header value read back with the wrong shape.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Header {key} is not a valid {expected}: {value}")]
pub struct HeaderError {
    pub key: String,
    pub expected: &'static str,
    pub value: String,
}

/// Scalar value stored under a header key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderValue {
    Text(String),
    Integer(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Bytes(Vec<u8>),
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Timestamp(value) => f.write_str(&value.to_rfc3339()),
            Self::Bytes(bytes) => f.write_str(&STANDARD.encode(bytes)),
        }
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<&String> for HeaderValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for HeaderValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Vec<u8>> for HeaderValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

/// Ordered header map of an exchange message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    values: BTreeMap<String, HeaderValue>,
}

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<HeaderValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Set `key` only when a value is present; absent values never clear an
    /// existing header.
    pub fn set_opt<V: Into<HeaderValue>>(&mut self, key: impl Into<String>, value: Option<V>) {
        if let Some(value) = value {
            self.set(key, value);
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.values.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<HeaderValue> {
        self.values.remove(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// The header rendered as a string, whatever its stored shape.
    #[must_use]
    pub fn string(&self, key: &str) -> Option<String> {
        self.get(key).map(ToString::to_string)
    }

    /// The header as an integer, parsing text values.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError`] when the stored value cannot be read as an integer.
    pub fn integer(&self, key: &str) -> Result<Option<i64>, HeaderError> {
        match self.get(key) {
            None => Ok(None),
            Some(HeaderValue::Integer(value)) => Ok(Some(*value)),
            Some(HeaderValue::Text(text)) => text
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| Self::mismatch(key, "integer", text)),
            Some(other) => Err(Self::mismatch(key, "integer", &other.to_string())),
        }
    }

    /// The header as a boolean, parsing `true`/`false` text values.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError`] when the stored value cannot be read as a boolean.
    pub fn boolean(&self, key: &str) -> Result<Option<bool>, HeaderError> {
        match self.get(key) {
            None => Ok(None),
            Some(HeaderValue::Bool(value)) => Ok(Some(*value)),
            Some(HeaderValue::Text(text)) => match text.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(Self::mismatch(key, "boolean", text)),
            },
            Some(other) => Err(Self::mismatch(key, "boolean", &other.to_string())),
        }
    }

    /// The header as a UTC timestamp, parsing RFC 3339 text values.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError`] when the stored value cannot be read as a timestamp.
    pub fn timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>, HeaderError> {
        match self.get(key) {
            None => Ok(None),
            Some(HeaderValue::Timestamp(value)) => Ok(Some(*value)),
            Some(HeaderValue::Text(text)) => DateTime::parse_from_rfc3339(text.trim())
                .map(|value| Some(value.with_timezone(&Utc)))
                .map_err(|_| Self::mismatch(key, "timestamp", text)),
            Some(other) => Err(Self::mismatch(key, "timestamp", &other.to_string())),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn mismatch(key: &str, expected: &'static str, value: &str) -> HeaderError {
        HeaderError {
            key: key.to_string(),
            expected,
            value: value.to_string(),
        }
    }
}
