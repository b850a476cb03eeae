//! Proxy executor: performs the real HTTP call for an assembled request
//!
//! Failures never escape as errors. They are folded into the response as a
//! synthetic status the central can read from the notification:
//! - request construction or connection failure -> 502 Bad Gateway
//! - failure reading the body of a received response -> 500 Internal Server Error

use std::sync::Arc;
use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderName, HeaderValue, HOST};
use hyper::{StatusCode, Uri};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use hps_proto::{Request, Response, NotifyStatus, Scheme, headers};

use crate::config::Config;

#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
    #[error("invalid target {target:?}: {reason}")]
    InvalidTarget { target: String, reason: String },
    #[error("failed to build request: {0}")]
    Build(#[from] hyper::http::Error),
    #[error("connection failed: {0}")]
    Connect(#[from] std::io::Error),
    #[error("http exchange failed: {0}")]
    Http(#[from] hyper::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Executes proxied requests, one upstream connection per request
#[derive(Clone)]
pub struct Proxy {
    tls: TlsConnector,
    headers_max_octets: usize,
    body_max_octets: usize,
    timeout: Duration,
}

impl Proxy {
    pub fn new(config: &Config) -> Self {
        let mut roots = rustls::RootCertStore::empty();
        match rustls_native_certs::load_native_certs() {
            Ok(certs) => {
                let (added, ignored) = roots.add_parsable_certificates(certs);
                debug!(added, ignored, "loaded native root certificates");
            }
            Err(e) => warn!(error = %e, "no native root certificates, https will fail"),
        }
        let tls = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Self {
            tls: TlsConnector::from(Arc::new(tls)),
            headers_max_octets: config.headers_max_octets,
            body_max_octets: config.body_max_octets,
            timeout: config.upstream_timeout(),
        }
    }

    /// Fetch `request` and describe the outcome
    pub async fn execute(&self, request: &Request) -> Response {
        info!(method = %request.method, target = %request.target(), "proxying request");
        let deadline = Instant::now() + self.timeout;

        let upstream = match tokio::time::timeout_at(deadline, self.send(request)).await {
            Ok(Ok(upstream)) => upstream,
            Ok(Err(e)) => return bad_gateway(e),
            Err(_) => return bad_gateway(ProxyError::Timeout(self.timeout)),
        };

        let (parts, body) = upstream.into_parts();
        let body = match tokio::time::timeout_at(deadline, body.collect()).await {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(e)) => return read_failure(ProxyError::Http(e)),
            Err(_) => return read_failure(ProxyError::Timeout(self.timeout)),
        };

        let (headers, headers_truncated) = headers::encode(
            parts
                .headers
                .iter()
                .map(|(name, value)| (name.as_str(), String::from_utf8_lossy(value.as_bytes()))),
            self.headers_max_octets,
        );

        let status = NotifyStatus {
            status_code: parts.status.as_u16(),
            headers_received: true,
            headers_truncated,
            body_received: !body.is_empty(),
            body_truncated: body.len() > self.body_max_octets,
        };
        info!(
            status = status.status_code,
            headers = headers.len(),
            body = body.len(),
            headers_truncated,
            body_truncated = status.body_truncated,
            "proxied request completed"
        );

        Response {
            status,
            headers,
            body: body.to_vec(),
            error: None,
        }
    }

    async fn send(&self, request: &Request) -> Result<hyper::Response<Incoming>, ProxyError> {
        let target = request.target();
        let invalid = |reason: String| ProxyError::InvalidTarget {
            target: target.clone(),
            reason,
        };

        let uri: Uri = target.parse().map_err(|e: hyper::http::uri::InvalidUri| invalid(e.to_string()))?;
        let authority = uri
            .authority()
            .ok_or_else(|| invalid("missing host".to_string()))?
            .clone();
        let host = authority.host().trim_start_matches('[').trim_end_matches(']').to_string();
        let port = authority.port_u16().unwrap_or(request.scheme.default_port());
        let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

        let mut builder = hyper::Request::builder()
            .method(request.method.as_str())
            .uri(path)
            .header(HOST, authority.as_str());
        if let Some(headers) = builder.headers_mut() {
            for (name, value) in headers::decode(request.headers.as_bytes()) {
                match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
                    // a caller supplied Host replaces the derived one
                    (Ok(name), Ok(value)) if name == HOST => {
                        headers.insert(name, value);
                    }
                    (Ok(name), Ok(value)) => {
                        headers.append(name, value);
                    }
                    _ => warn!(%name, "ignoring invalid header"),
                }
            }
        }
        let outbound = builder.body(Full::new(Bytes::from(request.body.clone())))?;

        let stream = TcpStream::connect((host.as_str(), port)).await?;
        match request.scheme {
            Scheme::Http => send_over(TokioIo::new(stream), outbound).await,
            Scheme::Https => {
                let server_name =
                    ServerName::try_from(host.clone()).map_err(|e| invalid(e.to_string()))?;
                let stream = self.tls.connect(server_name, stream).await?;
                send_over(TokioIo::new(stream), outbound).await
            }
        }
    }
}

async fn send_over<T>(
    io: T,
    request: hyper::Request<Full<Bytes>>,
) -> Result<hyper::Response<Incoming>, ProxyError>
where
    T: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "upstream connection closed");
        }
    });
    Ok(sender.send_request(request).await?)
}

fn bad_gateway(e: ProxyError) -> Response {
    warn!(error = %e, "HTTP call failed");
    Response::failure(StatusCode::BAD_GATEWAY.as_u16(), e.to_string())
}

fn read_failure(e: ProxyError) -> Response {
    warn!(error = %e, "read response body failed");
    Response::failure(StatusCode::INTERNAL_SERVER_ERROR.as_u16(), e.to_string())
}
