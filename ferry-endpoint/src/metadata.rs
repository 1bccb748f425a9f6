//! Copy broker metadata into message headers.

use ferry_common::{
    Headers,
    headers::{self as keys},
    protocol::{BrokerContext, BrokerFault, ProcessingInformation, ProtocolMetadata},
};

/// Write every field the broker reported into `headers`. Fields the broker
/// left empty are not touched.
pub fn fill_headers(headers: &mut Headers, metadata: &ProtocolMetadata) {
    let identity = &metadata.identity;
    if !identity.message_id.is_empty() {
        headers.set(keys::MESSAGE_ID, identity.message_id.as_str());
    }
    headers.set_opt(
        keys::REFERENCE_MESSAGE_ID,
        identity.reference_message_id.clone(),
    );
    headers.set_opt(keys::TRANSACTION_CODE, identity.transaction_code.clone());

    if let Some(processing) = &metadata.processing {
        headers.set(keys::MESSAGE_TYPE, processing.message_type().to_string());
        match processing {
            ProcessingInformation::Request(info) => {
                headers.set_opt(keys::NODE_ID, info.node_id.clone());
                headers.set_opt(keys::END_OF_LIFE, info.end_of_life);
                headers.set(keys::TEST_MESSAGE, info.test_message);
            }
            ProcessingInformation::Response(info) => {
                headers.set_opt(keys::NODE_ID, info.node_id.clone());
                headers.set_opt(keys::ORIGINAL_MESSAGE_ID, info.original_message_id.clone());
                headers.set_opt(keys::REPLY_TO, info.reply_to.clone());
            }
        }
    }

    if let Some(context) = &metadata.context {
        fill_context(headers, context);
    }
}

fn fill_context(headers: &mut Headers, context: &BrokerContext) {
    headers.set_opt(keys::TRANSPORT_ID, context.transport_id.clone());
    headers.set_opt(keys::PROCESSING_DETAILS, context.processing_details.clone());
    headers.set_opt(keys::INTERACTION_TYPE, context.interaction_type.clone());
    headers.set_opt(keys::DESTINATION_NAME, context.destination_name.clone());
    headers.set_opt(keys::SENDING_TIMESTAMP, context.sending_timestamp);
    headers.set_opt(keys::DELIVERY_TIMESTAMP, context.delivery_timestamp);
    headers.set_opt(keys::STATUS, context.status.clone());
    headers.set_opt(keys::REPLY_TO, context.reply_to.clone());

    if let Some(sender) = &context.sender {
        headers.set_opt(keys::SENDER_MNEMONIC, sender.mnemonic.clone());
        headers.set_opt(keys::SENDER_DISPLAY_NAME, sender.display_name.clone());
    }
    if let Some(recipient) = &context.recipient {
        headers.set_opt(keys::RECIPIENT_MNEMONIC, recipient.mnemonic.clone());
        headers.set_opt(keys::RECIPIENT_DISPLAY_NAME, recipient.display_name.clone());
    }

    if let Some(fault) = &context.fault {
        fill_fault(headers, fault);
    }
}

fn fill_fault(headers: &mut Headers, fault: &BrokerFault) {
    headers.set_opt(keys::EXCEPTION_CODE, fault.code.clone());
    headers.set_opt(keys::EXCEPTION_CAUSE, fault.cause.clone());
    headers.set_opt(keys::EXCEPTION_MESSAGE, fault.message.clone());
    headers.set_opt(
        keys::EXCEPTION_LOCALIZED_MESSAGE,
        fault.localized_message.clone(),
    );
    headers.set_opt(keys::EXCEPTION_STACK_TRACE, fault.stack_trace.clone());
    headers.set_opt(keys::EXCEPTION_DUMP, fault.dump.clone());
}
