//! HTTP Proxy Service wire protocol
//!
//! Shared by the peripheral that proxies requests and the central that
//! issues them:
//! - `ble`: service and characteristic UUIDs
//! - `control`: method + scheme control point byte
//! - `status`: completion notification payload
//! - `headers`: bounded `name=value` header buffers
//! - `message`: request/response records

pub mod ble;
pub mod control;
pub mod headers;
pub mod message;
pub mod status;

pub use control::{ControlCode, ControlError, Method, Scheme};
pub use message::{Request, Response};
pub use status::{NotifyStatus, StatusError};
