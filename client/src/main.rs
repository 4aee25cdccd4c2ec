use clap::Parser;
use client::display::TerminalSurface;
use client::gps::{FixedPosition, RandomWalk};
use client::network::{Client, ClientConfig};
use log::info;
use shared::{is_valid_coordinate, DEFAULT_SERVER_ADDR, HEARTBEAT_INTERVAL_MS, POLL_INTERVAL_MS};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay server address to connect to
    #[arg(short = 's', long, default_value = DEFAULT_SERVER_ADDR)]
    server: String,

    /// Identity of the local user
    #[arg(short = 'u', long)]
    user_id: String,

    /// Poll interval per active user in milliseconds
    #[arg(short = 'p', long, default_value_t = POLL_INTERVAL_MS)]
    poll_ms: u64,

    /// Latitude of the local position
    #[arg(long, requires = "longitude", allow_hyphen_values = true)]
    latitude: Option<f64>,

    /// Longitude of the local position
    #[arg(long, requires = "latitude", allow_hyphen_values = true)]
    longitude: Option<f64>,

    /// Drift the local position randomly by up to this many degrees per report
    #[arg(long, requires = "latitude")]
    simulate: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    if args.poll_ms == 0 {
        return Err("poll interval must be greater than zero".into());
    }

    let config = ClientConfig {
        server_addr: args.server,
        user_id: args.user_id,
        poll_interval: Duration::from_millis(args.poll_ms),
        heartbeat_interval: Duration::from_millis(HEARTBEAT_INTERVAL_MS),
    };

    info!("Starting client...");
    info!("Connecting to: {}", config.server_addr);

    let mut client = Client::new(config, TerminalSurface).await?;

    if let (Some(latitude), Some(longitude)) = (args.latitude, args.longitude) {
        if !is_valid_coordinate(latitude, longitude) {
            return Err(format!("invalid coordinate ({}, {})", latitude, longitude).into());
        }

        match args.simulate {
            Some(step) if step.is_finite() => {
                info!(
                    "Simulating movement from ({}, {}) with step {}",
                    latitude, longitude, step
                );
                client.set_gps_source(Box::new(RandomWalk::new(latitude, longitude, step)));
            }
            Some(step) => return Err(format!("invalid simulation step {}", step).into()),
            None => {
                info!("Reporting fixed position ({}, {})", latitude, longitude);
                client.set_gps_source(Box::new(FixedPosition::new(latitude, longitude)));
            }
        }
    } else {
        info!("No local position configured, only requesting GPS pushes");
    }

    client.run().await?;

    Ok(())
}
