//! Shared utilities for proxy and session tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use hps_proto::NotifyStatus;
use hps_server::{Config, Notifier, NotifyError, Proxy, Session};

/// What the mock backend saw
#[derive(Debug, Clone)]
pub struct Received {
    pub head: String,
    pub body: Vec<u8>,
}

#[allow(dead_code)]
impl Received {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.trim().eq_ignore_ascii_case(name).then(|| v.trim().to_string())
        })
    }

    /// Every value sent under `name`, in order
    pub fn headers_named(&self, name: &str) -> Vec<String> {
        self.head
            .lines()
            .skip(1)
            .filter_map(|line| {
                let (k, v) = line.split_once(':')?;
                k.trim().eq_ignore_ascii_case(name).then(|| v.trim().to_string())
            })
            .collect()
    }
}

/// What the mock backend answers
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Overrides Content-Length, a larger value makes the body come up short
    pub content_length: Option<usize>,
    pub delay: Duration,
}

#[allow(dead_code)]
impl Reply {
    pub fn ok(body: &str) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
            content_length: None,
            delay: Duration::ZERO,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn short_body(mut self, declared: usize) -> Self {
        self.content_length = Some(declared);
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Start a programmable mock backend on an ephemeral port.
///
/// Every request received is also forwarded to the returned channel.
pub async fn start_backend<F>(f: F) -> (SocketAddr, mpsc::UnboundedReceiver<Received>)
where
    F: Fn(&Received) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let Some(received) = read_request(&mut socket).await else {
                    return;
                };
                let reply = f(&received);
                let _ = tx.send(received);
                tokio::time::sleep(reply.delay).await;

                let mut response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
                    reply.status,
                    reason(reply.status),
                    reply.content_length.unwrap_or(reply.body.len()),
                );
                for (name, value) in &reply.headers {
                    response.push_str(&format!("{name}: {value}\r\n"));
                }
                response.push_str("\r\n");
                let mut bytes = response.into_bytes();
                bytes.extend_from_slice(&reply.body);
                let _ = socket.write_all(&bytes).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, rx)
}

#[allow(dead_code)]
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    start_backend(move |_| Reply::ok(body)).await.0
}

/// An address nothing listens on
#[allow(dead_code)]
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

async fn read_request(socket: &mut TcpStream) -> Option<Received> {
    let mut data = Vec::new();
    let mut buf = [0u8; 1024];
    let head_end = loop {
        if let Some(i) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break i;
        }
        let n = socket.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
    };

    let head = String::from_utf8_lossy(&data[..head_end]).into_owned();
    let mut received = Received {
        head,
        body: data[head_end + 4..].to_vec(),
    };
    let length = received
        .header("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    while received.body.len() < length {
        let n = socket.read(&mut buf).await.ok()?;
        if n == 0 {
            break;
        }
        received.body.extend_from_slice(&buf[..n]);
    }
    Some(received)
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

#[allow(dead_code)]
pub fn session() -> Session {
    session_with(Config::default())
}

#[allow(dead_code)]
pub fn session_with(config: Config) -> Session {
    Session::new(Proxy::new(&config))
}

/// Notifier that hands every notification to a channel
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    stop: watch::Receiver<bool>,
}

impl Notifier for ChannelNotifier {
    async fn notify(&mut self, value: Vec<u8>) -> Result<(), NotifyError> {
        self.tx
            .send(value)
            .map_err(|_| NotifyError("subscriber dropped".to_string()))
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

/// A central subscribed to the control point
pub struct Subscription {
    notifications: mpsc::UnboundedReceiver<Vec<u8>>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

#[allow(dead_code)]
impl Subscription {
    pub fn new(session: &Session) -> Self {
        let (tx, notifications) = mpsc::unbounded_channel();
        let (stop, stop_rx) = watch::channel(false);
        let session = session.clone();
        let task = tokio::spawn(async move {
            session
                .serve_notifications(ChannelNotifier { tx, stop: stop_rx })
                .await
        });
        Self {
            notifications,
            stop,
            task,
        }
    }

    /// Raw payload of the next notification
    pub async fn next_raw(&mut self) -> Vec<u8> {
        tokio::time::timeout(Duration::from_secs(10), self.notifications.recv())
            .await
            .expect("no notification within 10s")
            .expect("notification loop ended")
    }

    pub async fn next_status(&mut self) -> NotifyStatus {
        NotifyStatus::from_bytes(&self.next_raw().await).unwrap()
    }

    /// Asserts nothing is notified for `within`
    pub async fn assert_silent(&mut self, within: Duration) {
        if let Ok(Some(value)) = tokio::time::timeout(within, self.notifications.recv()).await {
            panic!("unexpected notification {value:?}");
        }
    }

    /// Drop the receiving end so the next notification fails to deliver
    pub fn close(&mut self) {
        self.notifications.close();
    }

    /// Waits for the notification loop to return on its own
    pub async fn wait_ended(self) {
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("notification loop still running")
            .unwrap();
    }

    pub async fn unsubscribe(self) {
        let _ = self.stop.send(true);
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("notification loop did not stop")
            .unwrap();
    }
}
