use std::fmt;

use ferry_common::{
    Body, ExchangeMessage, ProtocolMessage,
    headers::{self as keys},
    protocol::BusinessContent,
};

use crate::{config::BodyType, error::CycleError, metadata::fill_headers};

/// Where a consumer is within one poll/acknowledge cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CycleState {
    #[default]
    Idle,
    Fetching,
    Materializing,
    Handling,
    AwaitingDisposition,
    Acknowledging,
    Failed,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Materializing => "materializing",
            Self::Handling => "handling",
            Self::AwaitingDisposition => "awaiting disposition",
            Self::Acknowledging => "acknowledging",
            Self::Failed => "failed",
        })
    }
}

/// Running totals over the life of a consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Messages fetched from the broker.
    pub polled: u64,
    /// Cycles that ended in rollback.
    pub failed: u64,
    /// Successful acknowledgments.
    pub acknowledged: u64,
}

/// Build the exchange handed to the handler: body per `body_type`, content
/// headers and broker metadata. Attachments are added separately.
pub(super) fn materialize(
    message: &ProtocolMessage,
    body_type: BodyType,
    omit_xml_declaration: bool,
) -> ExchangeMessage {
    let mut exchange = ExchangeMessage::default();

    if let Some(data) = message.data() {
        exchange
            .headers
            .set_opt(keys::CONTENT_NAMESPACE_URI, data.content.namespace_uri.as_ref());
        exchange
            .headers
            .set(keys::CONTENT_ROOT_ELEMENT, data.content.local_name.as_str());
    }

    exchange.body = match body_type {
        BodyType::Content => message.data().map_or(Body::Empty, |data| {
            exchange
                .headers
                .set_opt(keys::PERSONAL_SIGNATURE, data.personal_signature.as_ref());
            let xml = if omit_xml_declaration {
                strip_xml_declaration(&data.content.xml)
            } else {
                data.content.xml.as_str()
            };
            Body::Text(xml.to_string())
        }),
        BodyType::Envelope => message.raw_envelope.clone().map_or(Body::Empty, Body::Text),
        BodyType::Message => Body::Protocol(Box::new(message.clone())),
    };

    match &message.content {
        Some(BusinessContent::Status {
            code, description, ..
        }) => {
            exchange.headers.set_opt(keys::STATUS_CODE, *code);
            exchange.headers.set_opt(keys::DESCRIPTION, description.as_ref());
        }
        Some(BusinessContent::Reject(rejections)) => {
            if let Some(rejection) = rejections.first() {
                exchange
                    .headers
                    .set(keys::REJECTION_REASON_CODE, rejection.code.as_str());
                exchange
                    .headers
                    .set_opt(keys::DESCRIPTION, rejection.description.as_ref());
            }
        }
        Some(BusinessContent::Request(_) | BusinessContent::Response(_)) | None => {}
    }

    fill_headers(&mut exchange.headers, &message.metadata);
    exchange
}

/// Reject inbound messages the handler could not make sense of.
pub(super) fn validate_inbound(message: &ProtocolMessage) -> Result<(), CycleError> {
    if message.message_id().trim().is_empty() {
        return Err(CycleError::Invalid("message id is empty".to_string()));
    }

    if let Some(data) = message.data() {
        if data.content.local_name.trim().is_empty() {
            return Err(CycleError::Invalid(format!(
                "message {} has no root element name",
                message.message_id()
            )));
        }
        if data.content.xml.trim().is_empty() {
            return Err(CycleError::Invalid(format!(
                "message {} has empty content",
                message.message_id()
            )));
        }
    }

    Ok(())
}

/// Drop a leading `<?xml ...?>` declaration.
pub(super) fn strip_xml_declaration(xml: &str) -> &str {
    let trimmed = xml.trim_start();
    if let Some(rest) = trimmed.strip_prefix("<?xml")
        && let Some(end) = rest.find("?>")
    {
        return rest[end + 2..].trim_start();
    }
    xml
}

#[cfg(test)]
mod tests {
    use ferry_common::{
        HeaderValue,
        protocol::{BusinessData, MessageIdentity, ProtocolMetadata, RejectCode, Rejection, XmlContent},
    };

    use super::*;

    fn request(xml: &str) -> ProtocolMessage {
        ProtocolMessage {
            metadata: ProtocolMetadata {
                identity: MessageIdentity::new("m-1"),
                ..ProtocolMetadata::default()
            },
            content: Some(BusinessContent::Request(BusinessData {
                content: XmlContent {
                    namespace_uri: Some("urn://registry/1.0".to_string()),
                    local_name: "Query".to_string(),
                    xml: xml.to_string(),
                },
                personal_signature: Some("<sig/>".to_string()),
                attachments: Vec::new(),
            })),
            raw_envelope: Some("<Envelope/>".to_string()),
        }
    }

    #[test]
    fn test_validate_inbound() {
        assert!(validate_inbound(&request("<Query/>")).is_ok());
        assert!(validate_inbound(&request("  ")).is_err());

        let anonymous = ProtocolMessage::default();
        let err = validate_inbound(&anonymous).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Inbound message failed validation: message id is empty"
        );
    }

    #[test]
    fn test_strip_xml_declaration() {
        assert_eq!(
            strip_xml_declaration("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<a/>"),
            "<a/>"
        );
        assert_eq!(strip_xml_declaration("<a/>"), "<a/>");
        assert_eq!(strip_xml_declaration("<?xml unterminated"), "<?xml unterminated");
    }

    #[test]
    fn test_content_body() {
        let message = request("<?xml version=\"1.0\"?><Query/>");

        let exchange = materialize(&message, BodyType::Content, true);
        assert_eq!(exchange.body, Body::Text("<Query/>".to_string()));
        assert_eq!(
            exchange.headers.string(keys::CONTENT_NAMESPACE_URI).as_deref(),
            Some("urn://registry/1.0")
        );
        assert_eq!(
            exchange.headers.string(keys::CONTENT_ROOT_ELEMENT).as_deref(),
            Some("Query")
        );
        assert_eq!(
            exchange.headers.string(keys::PERSONAL_SIGNATURE).as_deref(),
            Some("<sig/>")
        );
        assert_eq!(exchange.headers.string(keys::MESSAGE_ID).as_deref(), Some("m-1"));

        let exchange = materialize(&message, BodyType::Content, false);
        assert_eq!(
            exchange.body,
            Body::Text("<?xml version=\"1.0\"?><Query/>".to_string())
        );
    }

    #[test]
    fn test_envelope_and_message_bodies() {
        let message = request("<Query/>");

        let exchange = materialize(&message, BodyType::Envelope, true);
        assert_eq!(exchange.body, Body::Text("<Envelope/>".to_string()));
        assert!(!exchange.headers.contains(keys::PERSONAL_SIGNATURE));

        let exchange = materialize(&message, BodyType::Message, true);
        assert_eq!(exchange.body, Body::Protocol(Box::new(message)));
    }

    #[test]
    fn test_status_and_reject_headers() {
        let status = ProtocolMessage {
            content: Some(BusinessContent::Status {
                code: Some(3),
                description: Some("Delivered".to_string()),
                parameters: Default::default(),
            }),
            ..ProtocolMessage::default()
        };
        let exchange = materialize(&status, BodyType::Content, true);
        assert_eq!(exchange.body, Body::Empty);
        assert_eq!(exchange.headers.get(keys::STATUS_CODE), Some(&HeaderValue::Integer(3)));
        assert_eq!(exchange.headers.string(keys::DESCRIPTION).as_deref(), Some("Delivered"));

        let reject = ProtocolMessage {
            content: Some(BusinessContent::Reject(vec![Rejection {
                code: RejectCode::NoData,
                description: None,
            }])),
            ..ProtocolMessage::default()
        };
        let exchange = materialize(&reject, BodyType::Content, true);
        assert_eq!(
            exchange.headers.string(keys::REJECTION_REASON_CODE).as_deref(),
            Some("NO_DATA")
        );
        assert!(!exchange.headers.contains(keys::MESSAGE_ID));
    }
}
