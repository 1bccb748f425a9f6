use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use ferry_common::{
    ProtocolMessage, QueryDescriptor,
    protocol::{BrokerContext, ProtocolMetadata},
};
use ferry_endpoint::{Broker, BrokerError};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct State {
    inbox: VecDeque<ProtocolMessage>,
    queries: Vec<QueryDescriptor>,
    acks: Vec<(String, bool)>,
    ack_transports: Vec<Option<String>>,
    sent: Vec<ProtocolMessage>,
    fail_fetch: bool,
    fail_ack: bool,
    loopback: bool,
}

/// A broker held in process memory.
///
/// Fetch pops the inbox in order. With loopback enabled every sent message
/// is also queued for fetching. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct FakeBroker {
    state: Arc<Mutex<State>>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loopback() -> Self {
        let broker = Self::default();
        broker.state.lock().loopback = true;
        broker
    }

    pub fn push(&self, message: ProtocolMessage) {
        self.state.lock().inbox.push_back(message);
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.state.lock().fail_fetch = fail;
    }

    pub fn fail_ack(&self, fail: bool) {
        self.state.lock().fail_ack = fail;
    }

    pub fn acks(&self) -> Vec<(String, bool)> {
        self.state.lock().acks.clone()
    }

    pub fn ack_transports(&self) -> Vec<Option<String>> {
        self.state.lock().ack_transports.clone()
    }

    pub fn sent(&self) -> Vec<ProtocolMessage> {
        self.state.lock().sent.clone()
    }

    pub fn queries(&self) -> Vec<QueryDescriptor> {
        self.state.lock().queries.clone()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().inbox.len()
    }
}

#[async_trait]
impl Broker for FakeBroker {
    async fn fetch(&self, query: &QueryDescriptor) -> Result<Option<ProtocolMessage>, BrokerError> {
        let mut state = self.state.lock();
        state.queries.push(query.clone());
        if state.fail_fetch {
            return Err(BrokerError::Fetch("broker offline".to_string()));
        }
        Ok(state.inbox.pop_front())
    }

    async fn acknowledge(
        &self,
        metadata: &ProtocolMetadata,
        accepted: bool,
    ) -> Result<(), BrokerError> {
        let mut state = self.state.lock();
        if state.fail_ack {
            return Err(BrokerError::Acknowledge {
                message_id: metadata.identity.message_id.clone(),
                reason: "broker offline".to_string(),
            });
        }
        state
            .acks
            .push((metadata.identity.message_id.clone(), accepted));
        state.ack_transports.push(
            metadata
                .context
                .as_ref()
                .and_then(|context| context.transport_id.clone()),
        );
        Ok(())
    }

    async fn send(&self, mut message: ProtocolMessage) -> Result<ProtocolMessage, BrokerError> {
        let mut state = self.state.lock();
        message.metadata.context = Some(BrokerContext {
            transport_id: Some(format!("transport-{}", state.sent.len() + 1)),
            ..BrokerContext::default()
        });
        state.sent.push(message.clone());
        if state.loopback {
            state.inbox.push_back(message.clone());
        }
        Ok(message)
    }
}
