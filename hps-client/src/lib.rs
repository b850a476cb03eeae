//! HTTP Proxy Service central
//!
//! Sends an HTTP request through a BLE peripheral running the HTTP Proxy
//! Service and returns the proxied response.
//!
//! # Example
//!
//! ```ignore
//! use hps_client::{Client, Config, ble::BtleConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(BtleConnector, Config::default());
//!     let response = client
//!         .send("GET", "http://localhost:8100/hello.txt", &[], b"")
//!         .await?;
//!     println!("{}", response.status.status_code);
//!     Ok(())
//! }
//! ```

#[cfg(feature = "btleplug")]
pub mod ble;
pub mod client;
pub mod config;
pub mod link;

pub use client::{Client, ClientError};
pub use config::{Config, ConfigError};
pub use link::{Connector, Link, LinkError, NotificationHandler};
