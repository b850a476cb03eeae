//! Request and response records exchanged through the characteristics

use crate::control::{Method, Scheme};
use crate::status::NotifyStatus;

/// An HTTP request assembled from characteristic writes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    /// Authority and path, without the scheme, eg: `localhost:8100/hello.txt`
    pub uri: String,
    pub method: Method,
    pub scheme: Scheme,
    /// Serialized `name=value` lines
    pub headers: String,
    pub body: Vec<u8>,
}

impl Request {
    /// The absolute URL to fetch: `scheme://uri`
    pub fn target(&self) -> String {
        format!("{}://{}", self.scheme, self.uri)
    }
}

/// Outcome of one proxied request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub status: NotifyStatus,
    /// Encoded headers, possibly truncated
    pub headers: Vec<u8>,
    pub body: Vec<u8>,
    /// Failure detail, never sent over the air
    pub error: Option<String>,
}

impl Response {
    pub fn failure(status_code: u16, error: impl Into<String>) -> Self {
        Self {
            status: NotifyStatus::failure(status_code),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn decoded_headers(&self) -> Vec<(String, String)> {
        crate::headers::decode(&self.headers)
    }
}
