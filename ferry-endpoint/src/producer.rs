//! Dispatch producer.
//!
//! Turns an outbound [`ExchangeMessage`] into a protocol message for the
//! configured [`Mode`] and hands it to the broker. Acknowledging producers
//! send no message at all and report a disposition instead.

use std::{collections::BTreeMap, sync::Arc};

use ferry_common::{
    Body, ExchangeMessage, Headers, ProtocolMessage, internal, outgoing,
    headers::{self as keys},
    protocol::{
        BrokerContext, BusinessContent, BusinessData, MessageIdentity, ProcessingInformation,
        ProtocolMetadata, RejectCode, Rejection, RequestInformation, ResponseInformation,
        XmlContent,
    },
};
use uuid::Uuid;

use crate::{
    broker::Broker,
    config::{EndpointConfig, Mode},
    envelope::EnvelopeBuilder,
    error::DispatchError,
    metadata::fill_headers,
    signer::Signer,
};

#[derive(Debug, Clone)]
pub struct Producer {
    config: Arc<EndpointConfig>,
    broker: Arc<dyn Broker>,
    envelope: EnvelopeBuilder,
    signer: Arc<dyn Signer>,
}

impl Producer {
    pub(crate) fn new(
        config: Arc<EndpointConfig>,
        broker: Arc<dyn Broker>,
        envelope: EnvelopeBuilder,
        signer: Arc<dyn Signer>,
    ) -> Self {
        Self {
            config,
            broker,
            envelope,
            signer,
        }
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    /// Send `exchange` to the broker, then copy the metadata the broker
    /// recorded back into its headers.
    ///
    /// # Errors
    ///
    /// Fails when a required header is missing or malformed, the body cannot
    /// be sent in this mode, an attachment cannot be assembled, or the broker
    /// refuses the call. Nothing is retried.
    pub async fn process(&self, exchange: &mut ExchangeMessage) -> Result<(), DispatchError> {
        if self.config.mode == Mode::Ack {
            return self.acknowledge(exchange).await;
        }

        let message = self.build(exchange).await?;
        if self.config.log_output {
            log_output(&message);
        }

        let sent = self.broker.send(message).await?;
        internal!(
            level = DEBUG,
            "Broker accepted {} message {}",
            self.config.mode,
            sent.message_id()
        );
        fill_headers(&mut exchange.headers, &sent.metadata);
        Ok(())
    }

    /// Build the protocol message for the configured mode without sending it.
    /// Bulk attachments are uploaded as a side effect.
    ///
    /// # Errors
    ///
    /// As [`Producer::process`], minus broker failures.
    pub async fn build(&self, exchange: &ExchangeMessage) -> Result<ProtocolMessage, DispatchError> {
        let headers = &exchange.headers;
        let identity = MessageIdentity {
            message_id: headers
                .string(keys::MESSAGE_ID)
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| Uuid::now_v7().to_string()),
            reference_message_id: headers.string(keys::REFERENCE_MESSAGE_ID),
            transaction_code: headers.string(keys::TRANSACTION_CODE),
        };

        let (processing, content) = match self.config.mode {
            Mode::Request => {
                let processing = ProcessingInformation::Request(RequestInformation {
                    node_id: headers.string(keys::NODE_ID),
                    end_of_life: headers.timestamp(keys::END_OF_LIFE)?,
                    test_message: headers.boolean(keys::TEST_MESSAGE)?.unwrap_or(false),
                });
                let data = self.business_data(exchange).await?;
                (processing, BusinessContent::Request(data))
            }
            Mode::Response => {
                let processing = response_information(headers)?;
                let data = self.business_data(exchange).await?;
                (processing, BusinessContent::Response(data))
            }
            Mode::Status => {
                let code = headers
                    .integer(keys::STATUS_CODE)?
                    .ok_or(DispatchError::MissingHeader(keys::STATUS_CODE))?;
                let content = BusinessContent::Status {
                    code: Some(code),
                    description: headers.string(keys::DESCRIPTION),
                    parameters: BTreeMap::new(),
                };
                (response_information(headers)?, content)
            }
            Mode::Reject => {
                let code: RejectCode = headers
                    .string(keys::REJECTION_REASON_CODE)
                    .ok_or(DispatchError::MissingHeader(keys::REJECTION_REASON_CODE))?
                    .parse()?;
                let content = BusinessContent::Reject(vec![Rejection {
                    code,
                    description: headers.string(keys::DESCRIPTION),
                }]);
                (response_information(headers)?, content)
            }
            Mode::Ack => {
                return Err(DispatchError::UnsupportedBody {
                    mode: Mode::Ack.as_str(),
                    kind: exchange.body.kind(),
                });
            }
        };

        Ok(ProtocolMessage {
            metadata: ProtocolMetadata {
                identity,
                processing: Some(processing),
                context: None,
            },
            content: Some(content),
            raw_envelope: None,
        })
    }

    async fn business_data(&self, exchange: &ExchangeMessage) -> Result<BusinessData, DispatchError> {
        let xml = match &exchange.body {
            Body::Text(text) => text.clone(),
            Body::Bytes(bytes) => {
                String::from_utf8(bytes.clone()).map_err(|_| DispatchError::UnsupportedBody {
                    mode: self.config.mode.as_str(),
                    kind: "non-UTF-8 bytes",
                })?
            }
            other => {
                return Err(DispatchError::UnsupportedBody {
                    mode: self.config.mode.as_str(),
                    kind: other.kind(),
                });
            }
        };

        let local_name = exchange
            .headers
            .string(keys::CONTENT_ROOT_ELEMENT)
            .or_else(|| root_element(&xml).map(str::to_string))
            .unwrap_or_default();

        if self.config.validate_output {
            if xml.trim().is_empty() {
                return Err(DispatchError::Invalid("content is empty".to_string()));
            }
            if local_name.is_empty() {
                return Err(DispatchError::Invalid(
                    "content has no root element".to_string(),
                ));
            }
        }

        let personal_signature = self.signer.sign_content(&xml)?;
        let attachments = self.envelope.assemble(exchange).await?;

        Ok(BusinessData {
            content: XmlContent {
                namespace_uri: exchange.headers.string(keys::CONTENT_NAMESPACE_URI),
                local_name,
                xml,
            },
            personal_signature,
            attachments,
        })
    }

    async fn acknowledge(&self, exchange: &mut ExchangeMessage) -> Result<(), DispatchError> {
        let headers = &exchange.headers;
        let message_id = headers
            .string(keys::MESSAGE_ID)
            .filter(|id| !id.trim().is_empty())
            .ok_or(DispatchError::MissingHeader(keys::MESSAGE_ID))?;
        let accepted = headers.boolean(keys::ACCEPTED)?.unwrap_or(true);

        let metadata = ProtocolMetadata {
            identity: MessageIdentity::new(message_id),
            processing: None,
            context: Some(BrokerContext {
                transport_id: headers.string(keys::TRANSPORT_ID),
                ..BrokerContext::default()
            }),
        };

        if self.config.log_output {
            outgoing!(
                level = INFO,
                "Acknowledging {} (accepted: {accepted})",
                metadata.identity.message_id
            );
        }
        self.broker.acknowledge(&metadata, accepted).await?;
        Ok(())
    }
}

fn response_information(headers: &Headers) -> Result<ProcessingInformation, DispatchError> {
    let reply_to = headers
        .string(keys::REPLY_TO)
        .ok_or(DispatchError::MissingHeader(keys::REPLY_TO))?;

    Ok(ProcessingInformation::Response(ResponseInformation {
        node_id: headers.string(keys::NODE_ID),
        original_message_id: headers.string(keys::ORIGINAL_MESSAGE_ID),
        reply_to: Some(reply_to),
    }))
}

/// Local name of the first element in `xml`, skipping the declaration,
/// comments and processing instructions.
fn root_element(xml: &str) -> Option<&str> {
    let mut rest = xml;
    loop {
        let start = rest.find('<')?;
        rest = &rest[start + 1..];
        if rest.starts_with('?') || rest.starts_with('!') {
            continue;
        }

        let end = rest
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(rest.len());
        let name = &rest[..end];
        let local = name.rsplit(':').next().unwrap_or(name);
        return (!local.is_empty()).then_some(local);
    }
}

fn log_output(message: &ProtocolMessage) {
    match message.data() {
        Some(data) => outgoing!(
            level = INFO,
            "{}: {} ({} attachment(s))",
            message.message_id(),
            data.content.xml,
            data.attachments.len()
        ),
        None => outgoing!(level = INFO, "{}: {:?}", message.message_id(), message.content),
    }
}
