#![allow(dead_code)]

pub mod broker;
pub mod handlers;

use std::sync::Arc;

use ferry_endpoint::{
    BrokerSettings, DigestSigner, Endpoint, EndpointConfig, Mode, TransportSettings,
};
use ferry_transfer::MemoryTransfer;

use self::broker::FakeBroker;

pub const BULK_ADDRESS: &str = "bulk.test:21";

/// Defaults plus a bulk address, a 1000 byte threshold and a short error
/// delay.
pub fn config(mode: Mode) -> EndpointConfig {
    let mut config = EndpointConfig::new(
        mode,
        BrokerSettings {
            primary: TransportSettings::new("http://broker.test/ws"),
            reserve: None,
        },
    );
    config.transfer.address = Some(BULK_ADDRESS.to_string());
    config.transfer.retries = 1;
    config.large_attachment_threshold = 1000;
    config.error_delay_ms = 10;
    config
}

pub fn endpoint(config: EndpointConfig, broker: &FakeBroker, store: &MemoryTransfer) -> Endpoint {
    Endpoint::new(config, Arc::new(broker.clone()), Arc::new(DigestSigner))
        .unwrap()
        .with_transfer(Arc::new(store.clone()))
}
