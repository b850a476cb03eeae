//! Send an HTTP request through a BLE HTTP Proxy Service peripheral

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hps_client::{Client, ClientError, Config, ble::BtleConnector};

#[derive(Parser)]
#[command(name = "hps-client")]
#[command(about = "Send HTTP requests through a BLE HTTP Proxy Service peripheral")]
struct Cli {
    /// Config file, defaults to $HPS_HOME/client.json
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Device name to scan for
    #[arg(short, long)]
    name: Option<String>,
    /// URI to request
    #[arg(short, long, default_value = "http://localhost:8100/hello.txt")]
    uri: String,
    /// HTTP verb, eg: GET, HEAD, POST, PUT, DELETE
    #[arg(short, long, default_value = "GET")]
    verb: String,
    /// HTTP header, repeatable, eg: --header Accept=text/plain
    #[arg(long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,
    /// HTTP body to POST/PUT
    #[arg(short, long, default_value = "")]
    body: String,
    /// Seconds to wait for the peripheral to return the response
    #[arg(short, long)]
    timeout: Option<u64>,
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() && !value.contains('=') => {
            Ok((name.to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got {s:?}")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hps_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if let Some(name) = cli.name {
        config.device_name = name;
    }
    if let Some(timeout) = cli.timeout {
        config.set_response_timeout_secs(timeout);
    }
    config.validate()?;

    println!("Sending {} {} via '{}'...", cli.verb, cli.uri, config.device_name);
    let client = Client::new(BtleConnector, config);
    let response = match client
        .send(&cli.verb, &cli.uri, &cli.headers, cli.body.as_bytes())
        .await
    {
        Ok(response) => response,
        Err(ClientError::ResponseTimeout { timeout, partial }) => {
            println!("No response within {timeout:?}, status so far: {}", partial.status.status_code);
            return Err(ClientError::ResponseTimeout { timeout, partial }.into());
        }
        Err(e) => return Err(e.into()),
    };

    let status = response.status;
    println!("Status: {}", status.status_code);
    if status.headers_truncated {
        println!("Headers (truncated):");
    } else {
        println!("Headers:");
    }
    for (name, value) in response.decoded_headers() {
        println!("  {name}: {value}");
    }
    if status.body_truncated {
        println!("Body (truncated):");
    } else {
        println!("Body:");
    }
    println!("{}", String::from_utf8_lossy(&response.body));
    Ok(())
}
