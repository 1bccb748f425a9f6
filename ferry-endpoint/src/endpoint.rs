use std::sync::Arc;

use ferry_attachments::PlacementStrategy;
use ferry_common::{ConfigurationError, internal};
use ferry_transfer::{BulkTransfer, FtpTransfer};

use crate::{
    broker::Broker,
    config::EndpointConfig,
    consumer::{Consumer, Handler},
    crypto::init_crypto_provider,
    envelope::EnvelopeBuilder,
    producer::Producer,
    signer::Signer,
};

/// One configured endpoint. Builds consumers and producers that share its
/// broker, signer, placement strategy and bulk transfer channel.
#[derive(Debug, Clone)]
pub struct Endpoint {
    config: Arc<EndpointConfig>,
    broker: Arc<dyn Broker>,
    signer: Arc<dyn Signer>,
    strategy: Arc<dyn PlacementStrategy>,
    transfer: Arc<dyn BulkTransfer>,
}

impl Endpoint {
    /// Validate `config` and set up everything derived from it.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is invalid or the crypto provider cannot
    /// be registered.
    pub fn new(
        config: EndpointConfig,
        broker: Arc<dyn Broker>,
        signer: Arc<dyn Signer>,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;

        if let Some(key) = &config.crypto_license_key {
            init_crypto_provider(key)?;
        }

        let strategy = config.attachment_strategy.clone().into_strategy();
        let transfer: Arc<dyn BulkTransfer> =
            Arc::new(FtpTransfer::from_config(&config.transfer_config()));

        internal!(
            level = INFO,
            "Endpoint configured in {} mode with {:?} placement",
            config.mode,
            strategy
        );

        Ok(Self {
            config: Arc::new(config),
            broker,
            signer,
            strategy,
            transfer,
        })
    }

    /// Replace the bulk transfer channel.
    #[must_use]
    pub fn with_transfer(mut self, transfer: Arc<dyn BulkTransfer>) -> Self {
        self.transfer = transfer;
        self
    }

    /// Replace the placement strategy chosen by the configuration.
    #[must_use]
    pub fn with_strategy(mut self, strategy: Arc<dyn PlacementStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn consumer(&self, handler: Arc<dyn Handler>) -> Result<Consumer, ConfigurationError> {
        Ok(Consumer::new(
            Arc::clone(&self.config),
            Arc::clone(&self.broker),
            self.envelope()?,
            handler,
        ))
    }

    pub fn producer(&self) -> Result<Producer, ConfigurationError> {
        Ok(Producer::new(
            Arc::clone(&self.config),
            Arc::clone(&self.broker),
            self.envelope()?,
            Arc::clone(&self.signer),
        ))
    }

    fn envelope(&self) -> Result<EnvelopeBuilder, ConfigurationError> {
        Ok(EnvelopeBuilder::new(
            Arc::clone(&self.strategy),
            Arc::clone(&self.transfer),
            self.config.transfer_config(),
            self.config.classifier()?,
            Arc::clone(&self.signer),
        ))
    }
}
