//! Loopback transport wiring the client straight into a server session.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use uuid::Uuid;

use hps_client::{Connector, Link, LinkError, NotificationHandler};
use hps_proto::ble::{BODY_UUID, CONTROL_POINT_UUID, HEADERS_UUID, URI_UUID};
use hps_server::{Config, Notifier, NotifyError, Proxy, Session};

/// A peripheral reachable without a radio
#[derive(Clone)]
pub struct Loopback {
    pub name: String,
    pub session: Session,
    /// Characteristics left out of discovery
    pub missing: Vec<Uuid>,
    /// Accept subscriptions but never notify
    pub silent: bool,
    /// Every write in arrival order
    pub writes: Arc<Mutex<Vec<(Uuid, Vec<u8>)>>>,
    /// How many times a client disconnected
    pub disconnects: Arc<Mutex<usize>>,
}

#[allow(dead_code)]
impl Loopback {
    pub fn new() -> Self {
        Self {
            name: "HPS".to_string(),
            session: Session::new(Proxy::new(&Config::default())),
            missing: Vec::new(),
            silent: false,
            writes: Arc::default(),
            disconnects: Arc::default(),
        }
    }

    pub fn without(mut self, characteristic: Uuid) -> Self {
        self.missing.push(characteristic);
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn writes(&self) -> Vec<Uuid> {
        self.writes.lock().unwrap().iter().map(|(uuid, _)| *uuid).collect()
    }

    /// Last value written to `characteristic`
    pub fn written(&self, characteristic: Uuid) -> Option<Vec<u8>> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(uuid, _)| *uuid == characteristic)
            .map(|(_, value)| value.clone())
    }

    pub fn disconnects(&self) -> usize {
        *self.disconnects.lock().unwrap()
    }
}

impl Connector for Loopback {
    type Link = LoopbackLink;

    async fn connect(&self, name: &str, _timeout: Duration) -> Result<LoopbackLink, LinkError> {
        if !self.name.eq_ignore_ascii_case(name) {
            return Err(LinkError::DeviceNotFound(name.to_string()));
        }
        let (stop, _) = watch::channel(false);
        Ok(LoopbackLink {
            peripheral: self.clone(),
            stop,
        })
    }
}

pub struct LoopbackLink {
    peripheral: Loopback,
    stop: watch::Sender<bool>,
}

impl Link for LoopbackLink {
    fn characteristics(&self) -> Vec<Uuid> {
        [URI_UUID, HEADERS_UUID, BODY_UUID, CONTROL_POINT_UUID]
            .into_iter()
            .filter(|uuid| !self.peripheral.missing.contains(uuid))
            .collect()
    }

    async fn write(&self, characteristic: Uuid, value: &[u8]) -> Result<(), LinkError> {
        self.peripheral
            .writes
            .lock()
            .unwrap()
            .push((characteristic, value.to_vec()));
        let session = &self.peripheral.session;
        match characteristic {
            URI_UUID => session.write_uri(value),
            HEADERS_UUID => session.write_headers(value),
            BODY_UUID => session.write_body(value),
            CONTROL_POINT_UUID => session
                .write_control(value)
                .map_err(|e| LinkError::Other(e.to_string()))?,
            uuid => return Err(LinkError::UnknownCharacteristic(uuid)),
        }
        Ok(())
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, LinkError> {
        let session = &self.peripheral.session;
        match characteristic {
            HEADERS_UUID => Ok(session.read_headers()),
            BODY_UUID => Ok(session.read_body()),
            uuid => Err(LinkError::UnknownCharacteristic(uuid)),
        }
    }

    async fn subscribe(
        &self,
        characteristic: Uuid,
        handler: NotificationHandler,
    ) -> Result<(), LinkError> {
        if characteristic != CONTROL_POINT_UUID {
            return Err(LinkError::UnknownCharacteristic(characteristic));
        }
        if self.peripheral.silent {
            // keep the handler alive so the client keeps waiting
            let mut stop = self.stop.subscribe();
            tokio::spawn(async move {
                let _handler = handler;
                loop {
                    if *stop.borrow_and_update() {
                        return;
                    }
                    if stop.changed().await.is_err() {
                        return;
                    }
                }
            });
            return Ok(());
        }
        let session = self.peripheral.session.clone();
        let notifier = CallbackNotifier {
            handler,
            stop: self.stop.subscribe(),
        };
        tokio::spawn(async move { session.serve_notifications(notifier).await });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), LinkError> {
        let _ = self.stop.send(true);
        *self.peripheral.disconnects.lock().unwrap() += 1;
        Ok(())
    }
}

struct CallbackNotifier {
    handler: NotificationHandler,
    stop: watch::Receiver<bool>,
}

impl Notifier for CallbackNotifier {
    async fn notify(&mut self, value: Vec<u8>) -> Result<(), NotifyError> {
        (self.handler)(value);
        Ok(())
    }

    async fn stopped(&mut self) {
        loop {
            if *self.stop.borrow_and_update() {
                return;
            }
            if self.stop.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Start a mock backend answering every request with `status` and `body`
#[allow(dead_code)]
pub async fn start_backend(status: u16, body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut data = Vec::new();
                let mut buf = [0u8; 1024];
                loop {
                    if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                        if data.len() >= end + 4 + content_length(&data[..end]) {
                            break;
                        }
                    }
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => data.extend_from_slice(&buf[..n]),
                    }
                }
                let response = format!(
                    "HTTP/1.1 {status} Status\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len(),
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

fn content_length(head: &[u8]) -> usize {
    String::from_utf8_lossy(head)
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse().ok())?
        })
        .unwrap_or(0)
}
