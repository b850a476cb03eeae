//! HTTP Control Point codec
//!
//! A single octet carries both the HTTP method and the URL scheme of the
//! request the peripheral should proxy:
//!
//! | byte        | meaning                              |
//! |-------------|--------------------------------------|
//! | 0x00        | reserved                             |
//! | 0x01..=0x05 | GET, HEAD, POST, PUT, DELETE (http)  |
//! | 0x06..=0x0a | GET, HEAD, POST, PUT, DELETE (https) |
//! | 0x0b        | cancel the request in progress       |

use std::fmt;
use std::str::FromStr;

pub const HTTP_RESERVED: u8 = 0x00;
pub const HTTP_GET: u8 = 0x01;
pub const HTTP_HEAD: u8 = 0x02;
pub const HTTP_POST: u8 = 0x03;
pub const HTTP_PUT: u8 = 0x04;
pub const HTTP_DELETE: u8 = 0x05;
pub const HTTPS_GET: u8 = 0x06;
pub const HTTPS_HEAD: u8 = 0x07;
pub const HTTPS_POST: u8 = 0x08;
pub const HTTPS_PUT: u8 = 0x09;
pub const HTTPS_DELETE: u8 = 0x0a;
pub const HTTP_REQUEST_CANCEL: u8 = 0x0b;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("unsupported method {0:?}, valid values are GET, HEAD, POST, PUT, DELETE")]
    UnsupportedMethod(String),
    #[error("unsupported scheme {0:?}, valid values are http and https")]
    UnsupportedScheme(String),
    #[error("unable to decode HTTP method from byte 0x{0:02x}")]
    UndecodableMethod(u8),
    #[error("unable to decode URL scheme from byte 0x{0:02x}")]
    UndecodableScheme(u8),
    #[error("empty control point write")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl Method {
    pub const ALL: [Method; 5] = [
        Method::Get,
        Method::Head,
        Method::Post,
        Method::Put,
        Method::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    /// Position within each half of the code table, 1-based
    fn offset(&self) -> u8 {
        match self {
            Method::Get => 1,
            Method::Head => 2,
            Method::Post => 3,
            Method::Put => 4,
            Method::Delete => 5,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive, surrounding whitespace is ignored
impl FromStr for Method {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            _ => Err(ControlError::UnsupportedMethod(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    pub const ALL: [Scheme; 2] = [Scheme::Http, Scheme::Https];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact match only: "HTTP" or " http" are rejected
impl FromStr for Scheme {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            _ => Err(ControlError::UnsupportedScheme(s.to_string())),
        }
    }
}

/// A decoded control point write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCode {
    Request { method: Method, scheme: Scheme },
    Cancel,
}

impl ControlCode {
    pub fn from_byte(b: u8) -> Result<Self, ControlError> {
        if b == HTTP_REQUEST_CANCEL {
            return Ok(ControlCode::Cancel);
        }
        Ok(ControlCode::Request {
            method: decode_method(b)?,
            scheme: decode_scheme(b)?,
        })
    }

    pub fn to_byte(self) -> u8 {
        match self {
            ControlCode::Request { method, scheme } => control_byte(method, scheme),
            ControlCode::Cancel => HTTP_REQUEST_CANCEL,
        }
    }
}

pub fn decode_method(b: u8) -> Result<Method, ControlError> {
    match b {
        HTTP_GET | HTTPS_GET => Ok(Method::Get),
        HTTP_HEAD | HTTPS_HEAD => Ok(Method::Head),
        HTTP_POST | HTTPS_POST => Ok(Method::Post),
        HTTP_PUT | HTTPS_PUT => Ok(Method::Put),
        HTTP_DELETE | HTTPS_DELETE => Ok(Method::Delete),
        _ => Err(ControlError::UndecodableMethod(b)),
    }
}

pub fn decode_scheme(b: u8) -> Result<Scheme, ControlError> {
    match b {
        HTTP_GET..=HTTP_DELETE => Ok(Scheme::Http),
        HTTPS_GET..=HTTPS_DELETE => Ok(Scheme::Https),
        _ => Err(ControlError::UndecodableScheme(b)),
    }
}

pub fn control_byte(method: Method, scheme: Scheme) -> u8 {
    match scheme {
        Scheme::Http => method.offset(),
        Scheme::Https => HTTP_DELETE + method.offset(),
    }
}

/// Encode textual method and scheme, eg: ("get", "https") -> 0x06
pub fn encode(method: &str, scheme: &str) -> Result<u8, ControlError> {
    let method: Method = method.parse()?;
    let scheme: Scheme = scheme.parse()?;
    Ok(control_byte(method, scheme))
}
