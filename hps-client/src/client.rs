//! Client orchestrator: drives one proxied request over a `Link`
//!
//! URI, headers and body are written in that order, the control point is
//! subscribed before the control byte is written, then the status
//! notification is awaited under the response timeout.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::{Position, Url};
use uuid::Uuid;

use hps_proto::ble::{BODY_UUID, CONTROL_POINT_UUID, HEADERS_UUID, URI_UUID};
use hps_proto::{ControlError, NotifyStatus, Response, StatusError, control, headers};

use crate::config::Config;
use crate::link::{Connector, Link, LinkError};

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("invalid URI {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error("HPS peripheral {0:?} not found")]
    DeviceNotFound(String),
    #[error("connection timed out after {0:?}")]
    ConnectionTimeout(Duration),
    #[error("missing URI characteristic")]
    MissingUriCharacteristic,
    #[error("missing Headers characteristic")]
    MissingHeadersCharacteristic,
    #[error("missing Body characteristic")]
    MissingBodyCharacteristic,
    #[error("missing Control Point characteristic")]
    MissingControlCharacteristic,
    #[error("failed to write {characteristic} characteristic: {reason}")]
    Write {
        characteristic: &'static str,
        reason: String,
    },
    #[error("failed to subscribe to the control point: {0}")]
    Subscribe(String),
    #[error("peripheral disconnected")]
    Disconnected,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed status notification: {0}")]
    MalformedStatus(#[from] StatusError),
    #[error("no response within {timeout:?}")]
    ResponseTimeout {
        timeout: Duration,
        partial: Box<Response>,
    },
}

impl From<LinkError> for ClientError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::DeviceNotFound(name) => ClientError::DeviceNotFound(name),
            LinkError::ConnectionTimeout(after) => ClientError::ConnectionTimeout(after),
            LinkError::Disconnected => ClientError::Disconnected,
            e => ClientError::Transport(e.to_string()),
        }
    }
}

fn write_error(characteristic: &'static str) -> impl FnOnce(LinkError) -> ClientError {
    move |e| match e {
        LinkError::Disconnected => ClientError::Disconnected,
        e => ClientError::Write {
            characteristic,
            reason: e.to_string(),
        },
    }
}

/// A request as handed to the peripheral
struct Outbound {
    uri: String,
    control: u8,
    headers: Vec<u8>,
    body: Vec<u8>,
}

pub struct Client<C> {
    connector: C,
    config: Config,
}

impl<C: Connector> Client<C> {
    pub fn new(connector: C, config: Config) -> Self {
        Self { connector, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Send `method uri` through the peripheral and wait for the result.
    ///
    /// Upstream failures are not errors here: they come back as a response
    /// with a 502 or 500 status. On `ResponseTimeout` the response held so
    /// far travels inside the error.
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        headers: &[(String, String)],
        body: &[u8],
    ) -> Result<Response, ClientError> {
        let outbound = self.prepare(method, uri, headers, body)?;

        let link = self
            .connector
            .connect(&self.config.device_name, self.config.connect_timeout())
            .await?;
        info!(device = %self.config.device_name, "connected");

        let result = self.exchange(&link, outbound).await;
        if let Err(e) = link.disconnect().await {
            warn!(error = %e, "disconnect failed");
        }
        result
    }

    /// Everything that can fail before touching the radio
    fn prepare(
        &self,
        method: &str,
        uri: &str,
        request_headers: &[(String, String)],
        body: &[u8],
    ) -> Result<Outbound, ClientError> {
        let invalid = |reason: String| ClientError::InvalidUri {
            uri: uri.to_string(),
            reason,
        };
        let url = Url::parse(uri).map_err(|e| invalid(e.to_string()))?;
        if url.host_str().is_none() {
            return Err(invalid("missing host".to_string()));
        }
        let control = control::encode(method, url.scheme())?;

        let (headers, truncated) = headers::encode(
            request_headers.iter().map(|(name, value)| (name, value)),
            self.config.headers_max_octets,
        );
        if truncated {
            warn!(max = self.config.headers_max_octets, "request headers truncated");
        }

        let (body, truncated) = headers::truncate(body.to_vec(), self.config.body_max_octets);
        if truncated {
            warn!(max = self.config.body_max_octets, "request body truncated");
        }

        Ok(Outbound {
            uri: url[Position::BeforeHost..].to_string(),
            control,
            headers,
            body,
        })
    }

    async fn exchange(&self, link: &C::Link, outbound: Outbound) -> Result<Response, ClientError> {
        let found = link.characteristics();
        let require = |uuid: Uuid, missing: ClientError| {
            if found.contains(&uuid) { Ok(()) } else { Err(missing) }
        };
        require(URI_UUID, ClientError::MissingUriCharacteristic)?;
        require(HEADERS_UUID, ClientError::MissingHeadersCharacteristic)?;
        require(BODY_UUID, ClientError::MissingBodyCharacteristic)?;
        require(CONTROL_POINT_UUID, ClientError::MissingControlCharacteristic)?;

        link.write(URI_UUID, outbound.uri.as_bytes())
            .await
            .map_err(write_error("URI"))?;
        debug!(uri = %outbound.uri, "URI set");
        link.write(HEADERS_UUID, &outbound.headers)
            .await
            .map_err(write_error("Headers"))?;
        debug!(len = outbound.headers.len(), "headers set");
        link.write(BODY_UUID, &outbound.body)
            .await
            .map_err(write_error("Body"))?;
        debug!(len = outbound.body.len(), "body set");

        let (tx, mut rx) = mpsc::channel(1);
        link.subscribe(
            CONTROL_POINT_UUID,
            Box::new(move |value: Vec<u8>| {
                let status = NotifyStatus::from_bytes(&value);
                if tx.try_send(status).is_err() {
                    debug!("extra status notification ignored");
                }
            }),
        )
        .await
        .map_err(|e| match e {
            LinkError::Disconnected => ClientError::Disconnected,
            e => ClientError::Subscribe(e.to_string()),
        })?;

        link.write(CONTROL_POINT_UUID, &[outbound.control])
            .await
            .map_err(write_error("Control Point"))?;
        debug!(control = outbound.control, "control point set");

        let timeout = self.config.response_timeout();
        let status = match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(status)) => status?,
            Ok(None) => return Err(ClientError::Disconnected),
            Err(_) => {
                warn!(?timeout, "response timeout");
                return Err(ClientError::ResponseTimeout {
                    timeout,
                    partial: Box::default(),
                });
            }
        };
        info!(status = status.status_code, "got response");

        let mut response = Response {
            status,
            ..Response::default()
        };
        if status.headers_received {
            response.headers = link.read(HEADERS_UUID).await?;
        }
        if status.body_received {
            response.body = link.read(BODY_UUID).await?;
        }
        Ok(response)
    }
}
