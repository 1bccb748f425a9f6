//! Poll/acknowledge consumption loop.
//!
//! A [`Consumer`] runs strictly sequential cycles: fetch at most one message,
//! materialize it into an [`ExchangeMessage`], hand it to the [`Handler`],
//! then acknowledge the recorded disposition. Buffers staged for a cycle are
//! released when the cycle ends, whichever way it ends.

mod cycle;

use std::sync::Arc;

use async_trait::async_trait;
use ferry_attachments::StagedBuffer;
use ferry_common::{
    Disposition, ExchangeMessage, ProtocolMessage, QueryDescriptor, Signal, incoming, internal,
    protocol::{MessageType, ProtocolMetadata},
    tracing,
};
use tokio::sync::broadcast;

pub use cycle::{CycleReport, CycleState};

use crate::{
    broker::Broker,
    config::{BodyType, EndpointConfig},
    envelope::EnvelopeBuilder,
    error::{CycleError, HandlerError},
};

/// Business logic run once per consumed message.
///
/// The handler may change the disposition through
/// [`ExchangeMessage::accept`]/[`ExchangeMessage::reject`], or fail the
/// exchange with [`ExchangeMessage::fail`] or an error.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, exchange: &mut ExchangeMessage) -> Result<(), HandlerError>;
}

/// The message consumed by the last successful poll, waiting for commit.
#[derive(Debug)]
struct Pending {
    metadata: ProtocolMetadata,
    disposition: Disposition,
}

pub struct Consumer {
    config: Arc<EndpointConfig>,
    query: QueryDescriptor,
    broker: Arc<dyn Broker>,
    envelope: EnvelopeBuilder,
    handler: Arc<dyn Handler>,
    state: CycleState,
    pending: Option<Pending>,
    report: CycleReport,
}

impl Consumer {
    pub(crate) fn new(
        config: Arc<EndpointConfig>,
        broker: Arc<dyn Broker>,
        envelope: EnvelopeBuilder,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self {
            query: config.query(),
            config,
            broker,
            envelope,
            handler,
            state: CycleState::Idle,
            pending: None,
            report: CycleReport::default(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> CycleState {
        self.state
    }

    #[must_use]
    pub const fn stats(&self) -> CycleReport {
        self.report
    }

    #[must_use]
    pub const fn query(&self) -> &QueryDescriptor {
        &self.query
    }

    /// Fetch and handle at most one message. Returns how many were consumed.
    ///
    /// # Errors
    ///
    /// Any failure while fetching, materializing or handling. Staged
    /// attachments are released before this returns.
    pub async fn poll(&mut self) -> Result<usize, CycleError> {
        self.pending = None;
        self.state = CycleState::Fetching;

        let message = match self.broker.fetch(&self.query).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                self.state = CycleState::Idle;
                return Ok(0);
            }
            Err(err) => {
                self.state = CycleState::Failed;
                return Err(err.into());
            }
        };

        self.report.polled += 1;
        internal!(level = DEBUG, "Fetched message {}", message.message_id());

        let mut staged = Vec::new();
        let result = self.consume(&message, &mut staged).await;
        self.teardown(&mut staged).await;

        match result {
            Ok(disposition) => {
                self.pending = Some(Pending {
                    metadata: message.metadata,
                    disposition,
                });
                self.state = CycleState::AwaitingDisposition;
                Ok(1)
            }
            Err(err) => {
                self.state = CycleState::Failed;
                Err(err)
            }
        }
    }

    async fn consume(
        &mut self,
        message: &ProtocolMessage,
        staged: &mut Vec<StagedBuffer>,
    ) -> Result<Disposition, CycleError> {
        self.state = CycleState::Materializing;
        if self.config.validate_input {
            cycle::validate_inbound(message)?;
        }

        let mut exchange = cycle::materialize(
            message,
            self.config.body_type,
            self.config.omit_xml_declaration,
        );
        if self.config.log_input {
            log_input(message, &exchange, self.config.body_type);
        }

        self.envelope.decompose(message, &mut exchange, staged).await?;

        if self.config.auto_ack {
            exchange.accept();
        }

        self.state = CycleState::Handling;
        self.handler.handle(&mut exchange).await?;

        if let Some(reason) = exchange.failure() {
            return Err(HandlerError::MarkedFailed(reason.to_string()).into());
        }

        Ok(exchange.disposition()?)
    }

    async fn teardown(&self, staged: &mut Vec<StagedBuffer>) {
        let strategy = self.envelope.strategy();
        for buffer in staged.iter_mut() {
            strategy.release(buffer).await;
        }
        staged.clear();
    }

    /// Acknowledge the message consumed by the last poll.
    ///
    /// Nothing is sent when nothing was polled, when no disposition was
    /// recorded, or for status traffic. Acknowledgment failures are logged.
    pub async fn commit(&mut self, polled: usize) {
        let pending = self.pending.take();
        self.state = CycleState::Idle;

        if polled == 0 {
            return;
        }
        let Some(pending) = pending else {
            return;
        };
        let message_id = pending.metadata.identity.message_id.as_str();

        let Some(accepted) = pending.disposition.as_flag() else {
            internal!(level = DEBUG, "No disposition recorded for {message_id}");
            return;
        };
        if self.query.message_type == MessageType::Status {
            internal!("Status message {message_id} is not acknowledged");
            return;
        }

        self.state = CycleState::Acknowledging;
        match self.broker.acknowledge(&pending.metadata, accepted).await {
            Ok(()) => {
                self.report.acknowledged += 1;
                internal!(
                    level = DEBUG,
                    "Acknowledged {message_id} (accepted: {accepted})"
                );
            }
            Err(err) => {
                tracing::error!(message_id, error = %err, "Failed to acknowledge message");
            }
        }
        self.state = CycleState::Idle;
    }

    /// Record a failed cycle and wait out the error delay. Always returns
    /// `false`: the message is never retried straight away.
    pub async fn rollback(&mut self, err: &CycleError) -> bool {
        self.report.failed += 1;
        self.pending = None;

        let delay = self.config.error_delay();
        tracing::error!(
            error = %err,
            delay_ms = self.config.error_delay_ms,
            "Consumption cycle failed"
        );
        tokio::time::sleep(delay).await;

        self.state = CycleState::Idle;
        false
    }

    /// One full cycle: poll, then commit or roll back. Returns the number of
    /// messages consumed.
    pub async fn run_cycle(&mut self) -> usize {
        match self.poll().await {
            Ok(polled) => {
                self.commit(polled).await;
                polled
            }
            Err(err) => {
                self.rollback(&err).await;
                0
            }
        }
    }

    /// Run cycles on the poll interval until a shutdown signal arrives.
    ///
    /// Cycles are never interrupted; the signal is honored between them.
    pub async fn serve(mut self, mut shutdown: broadcast::Receiver<Signal>) -> CycleReport {
        internal!(
            level = INFO,
            "Consumer starting for {} messages",
            self.query.message_type
        );

        let mut timer = tokio::time::interval(self.config.poll_interval());
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    while self.run_cycle().await > 0 && self.config.greedy {
                        if shutdown_requested(&mut shutdown) {
                            internal!(level = INFO, "Consumer received shutdown signal");
                            return self.report;
                        }
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) | Err(broadcast::error::RecvError::Closed) => {
                            internal!(level = INFO, "Consumer received shutdown signal");
                            return self.report;
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                    }
                }
            }
        }
    }
}

fn shutdown_requested(shutdown: &mut broadcast::Receiver<Signal>) -> bool {
    use broadcast::error::TryRecvError;

    match shutdown.try_recv() {
        Ok(_) | Err(TryRecvError::Closed) => true,
        Err(TryRecvError::Empty | TryRecvError::Lagged(_)) => false,
    }
}

fn log_input(message: &ProtocolMessage, exchange: &ExchangeMessage, body_type: BodyType) {
    match (&exchange.body, body_type) {
        (ferry_common::Body::Text(text), _) => {
            incoming!(level = INFO, "{}: {text}", message.message_id());
        }
        (_, BodyType::Message) => {
            incoming!(level = INFO, "{}: {message:?}", message.message_id());
        }
        _ => {
            incoming!(level = INFO, "{}: no content", message.message_id());
        }
    }
}
