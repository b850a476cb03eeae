//! HTTP Proxy Service peripheral
//!
//! Accepts a request through GATT characteristic writes, performs the HTTP
//! call on the central's behalf and notifies the outcome on the control
//! point.
//!
//! # Example
//!
//! ```ignore
//! use hps_server::{Config, Proxy, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_or_default(None)?;
//!     let session = Session::new(Proxy::new(&config));
//!     let _peripheral = hps_server::gatt::serve(&session, &config).await?;
//!     tokio::signal::ctrl_c().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
#[cfg(feature = "bluez")]
pub mod gatt;
pub mod proxy;
pub mod session;

pub use config::{Config, ConfigError};
pub use proxy::{Proxy, ProxyError};
pub use session::{Notifier, NotifyError, Phase, Session, SessionError};
