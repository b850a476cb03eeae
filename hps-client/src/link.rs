//! Transport seen by the client: find a peripheral by name, then talk to its
//! characteristics.
//!
//! Platform crates implement these traits on top of their BLE stack, see
//! `ble` for btleplug.

use std::future::Future;
use std::time::Duration;

use uuid::Uuid;

/// Invoked with the raw value of every notification on a subscribed
/// characteristic
pub type NotificationHandler = Box<dyn Fn(Vec<u8>) + Send + Sync + 'static>;

#[derive(thiserror::Error, Debug)]
pub enum LinkError {
    #[error("no peripheral named {0:?} found")]
    DeviceNotFound(String),
    #[error("connection not established within {0:?}")]
    ConnectionTimeout(Duration),
    #[error("characteristic {0} not discovered")]
    UnknownCharacteristic(Uuid),
    #[error("peripheral disconnected")]
    Disconnected,
    #[error("{0}")]
    Other(String),
}

/// Establishes links to peripherals advertising a given local name
pub trait Connector {
    type Link: Link;

    /// Scan for `name` and connect, giving up after `timeout`
    fn connect(
        &self,
        name: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Self::Link, LinkError>>;
}

/// A connected peripheral with its profile discovered
pub trait Link {
    /// Characteristics found during discovery
    fn characteristics(&self) -> Vec<Uuid>;

    /// Write with acknowledgement
    fn write(&self, characteristic: Uuid, value: &[u8]) -> impl Future<Output = Result<(), LinkError>>;

    fn read(&self, characteristic: Uuid) -> impl Future<Output = Result<Vec<u8>, LinkError>>;

    /// Enable notifications and forward each one to `handler`
    fn subscribe(
        &self,
        characteristic: Uuid,
        handler: NotificationHandler,
    ) -> impl Future<Output = Result<(), LinkError>>;

    fn disconnect(&self) -> impl Future<Output = Result<(), LinkError>>;
}
