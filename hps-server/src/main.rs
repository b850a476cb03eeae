//! HTTP Proxy Service peripheral
//!
//! Advertises the service and proxies HTTP requests written by a central.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hps_server::{Config, Proxy, Session};

#[derive(Parser)]
#[command(name = "hps-server")]
#[command(about = "BLE HTTP Proxy Service peripheral")]
struct Cli {
    /// Config file, defaults to $HPS_HOME/server.json
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Device name to advertise
    #[arg(short, long)]
    device: Option<String>,
    /// Advertising duration in seconds, 0 for indefinitely
    #[arg(long)]
    duration: Option<u64>,
    /// Max octets of encoded response headers
    #[arg(long)]
    headers_max: Option<usize>,
    /// Max octets of response body
    #[arg(long)]
    body_max: Option<usize>,
}

impl Cli {
    fn config(&self) -> Result<Config, hps_server::ConfigError> {
        let mut config = Config::load_or_default(self.config.as_deref())?;
        if let Some(device) = &self.device {
            config.device_name = device.clone();
        }
        if let Some(duration) = self.duration {
            config.advertise_secs = duration;
        }
        if let Some(headers_max) = self.headers_max {
            config.headers_max_octets = headers_max;
        }
        if let Some(body_max) = self.body_max {
            config.body_max_octets = body_max;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hps_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.config()?;

    let session = Session::new(Proxy::new(&config));
    let _peripheral = hps_server::gatt::serve(&session, &config).await?;

    match config.advertise_duration() {
        Some(duration) => {
            println!("Advertising as '{}' for {:?}...", config.device_name, duration);
            tokio::select! {
                _ = tokio::time::sleep(duration) => println!("done"),
                r = tokio::signal::ctrl_c() => {
                    r?;
                    println!("canceled");
                }
            }
        }
        None => {
            println!("Advertising as '{}' until interrupted...", config.device_name);
            tokio::signal::ctrl_c().await?;
            println!("canceled");
        }
    }

    session.abort();
    Ok(())
}
