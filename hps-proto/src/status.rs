//! Notification status word sent on the control point when a proxied
//! request completes.
//!
//! Layout, 3 octets: little-endian u16 HTTP status code followed by one
//! data-status octet.

pub const HEADERS_RECEIVED: u8 = 0x01;
pub const HEADERS_TRUNCATED: u8 = 0x02;
pub const BODY_RECEIVED: u8 = 0x04;
pub const BODY_TRUNCATED: u8 = 0x08;

pub const NOTIFY_STATUS_LEN: usize = 3;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    #[error("malformed notify status: expected {NOTIFY_STATUS_LEN} bytes, got {0}")]
    MalformedPayload(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotifyStatus {
    /// HTTP status code, 0 if no HTTP exchange happened
    pub status_code: u16,
    pub headers_received: bool,
    pub headers_truncated: bool,
    pub body_received: bool,
    pub body_truncated: bool,
}

impl NotifyStatus {
    /// Synthetic status for a proxy failure: no headers, no body
    pub fn failure(status_code: u16) -> Self {
        Self {
            status_code,
            ..Self::default()
        }
    }

    pub fn data_status(&self) -> u8 {
        let mut b = 0;
        if self.headers_received {
            b |= HEADERS_RECEIVED;
        }
        if self.headers_truncated {
            b |= HEADERS_TRUNCATED;
        }
        if self.body_received {
            b |= BODY_RECEIVED;
        }
        if self.body_truncated {
            b |= BODY_TRUNCATED;
        }
        b
    }

    pub fn to_bytes(&self) -> [u8; NOTIFY_STATUS_LEN] {
        let [lo, hi] = self.status_code.to_le_bytes();
        [lo, hi, self.data_status()]
    }

    /// Decode from a notification payload. Bytes past the third and the
    /// undefined high bits of the data-status octet are ignored.
    pub fn from_bytes(data: &[u8]) -> Result<Self, StatusError> {
        if data.len() < NOTIFY_STATUS_LEN {
            return Err(StatusError::MalformedPayload(data.len()));
        }
        let flags = data[2];
        Ok(Self {
            status_code: u16::from_le_bytes([data[0], data[1]]),
            headers_received: flags & HEADERS_RECEIVED != 0,
            headers_truncated: flags & HEADERS_TRUNCATED != 0,
            body_received: flags & BODY_RECEIVED != 0,
            body_truncated: flags & BODY_TRUNCATED != 0,
        })
    }
}
