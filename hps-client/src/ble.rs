//! btleplug transport for the client

use std::sync::Mutex;
use std::time::Duration;

use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::link::{Connector, Link, LinkError, NotificationHandler};

const SCAN_POLL: Duration = Duration::from_millis(250);

impl From<btleplug::Error> for LinkError {
    fn from(e: btleplug::Error) -> Self {
        match e {
            btleplug::Error::NotConnected => LinkError::Disconnected,
            e => LinkError::Other(e.to_string()),
        }
    }
}

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, LinkError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters
        .into_iter()
        .next()
        .ok_or_else(|| LinkError::Other("no Bluetooth adapter found".to_string()))
}

/// Connects through the first local adapter
#[derive(Debug, Default, Clone, Copy)]
pub struct BtleConnector;

impl Connector for BtleConnector {
    type Link = BtleLink;

    async fn connect(&self, name: &str, timeout: Duration) -> Result<BtleLink, LinkError> {
        let deadline = Instant::now() + timeout;
        let adapter = get_adapter().await?;

        adapter.start_scan(ScanFilter::default()).await?;
        let found = find_device(&adapter, name, deadline).await;
        adapter.stop_scan().await?;
        let peripheral = found?.ok_or_else(|| LinkError::DeviceNotFound(name.to_string()))?;

        info!(name, address = %peripheral.address(), "found peripheral, connecting");
        let connect = async {
            peripheral.connect().await?;
            peripheral.discover_services().await
        };
        match tokio::time::timeout_at(deadline, connect).await {
            Ok(result) => result?,
            Err(_) => {
                let _ = peripheral.disconnect().await;
                return Err(LinkError::ConnectionTimeout(timeout));
            }
        }

        Ok(BtleLink {
            peripheral,
            forwarder: Mutex::new(None),
        })
    }
}

/// Poll scan results until a peripheral advertises `name` or `deadline` passes
async fn find_device(
    adapter: &Adapter,
    name: &str,
    deadline: Instant,
) -> Result<Option<Peripheral>, LinkError> {
    loop {
        for peripheral in adapter.peripherals().await? {
            let Some(props) = peripheral.properties().await? else {
                continue;
            };
            let local_name = props.local_name.unwrap_or_default();
            let matches = local_name.eq_ignore_ascii_case(name);
            debug!(%local_name, name, matches, "filter by name");
            if matches {
                return Ok(Some(peripheral));
            }
        }
        if Instant::now() + SCAN_POLL > deadline {
            return Ok(None);
        }
        tokio::time::sleep(SCAN_POLL).await;
    }
}

pub struct BtleLink {
    peripheral: Peripheral,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl BtleLink {
    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, LinkError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(LinkError::UnknownCharacteristic(uuid))
    }

    fn stop_forwarding(&self) {
        let task = self
            .forwarder
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl Link for BtleLink {
    fn characteristics(&self) -> Vec<Uuid> {
        self.peripheral
            .characteristics()
            .iter()
            .map(|c| c.uuid)
            .collect()
    }

    async fn write(&self, characteristic: Uuid, value: &[u8]) -> Result<(), LinkError> {
        let characteristic = self.characteristic(characteristic)?;
        self.peripheral
            .write(&characteristic, value, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, LinkError> {
        let characteristic = self.characteristic(characteristic)?;
        Ok(self.peripheral.read(&characteristic).await?)
    }

    async fn subscribe(
        &self,
        characteristic: Uuid,
        handler: NotificationHandler,
    ) -> Result<(), LinkError> {
        let characteristic = self.characteristic(characteristic)?;
        let mut notifications = self.peripheral.notifications().await?;
        self.peripheral.subscribe(&characteristic).await?;

        let uuid = characteristic.uuid;
        let task = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid == uuid {
                    handler(notification.value);
                }
            }
            debug!(%uuid, "notification stream ended");
        });
        self.stop_forwarding();
        *self.forwarder.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), LinkError> {
        self.stop_forwarding();
        self.peripheral.disconnect().await?;
        Ok(())
    }
}
