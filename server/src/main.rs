use clap::Parser;
use log::info;
use server::network::{Server, ServerConfig};
use shared::SESSION_TIMEOUT_SECS;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Roster and GPS broadcast interval in milliseconds
    #[arg(short, long, default_value = "1000")]
    broadcast_ms: u64,

    /// Maximum number of concurrent sessions
    #[arg(short, long, default_value = "64")]
    max_clients: usize,

    /// Maximum stored points per user track
    #[arg(long, default_value = "1000")]
    max_track_points: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    if args.broadcast_ms == 0 {
        return Err("broadcast interval must be greater than zero".into());
    }

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        broadcast_interval: Duration::from_millis(args.broadcast_ms),
        session_timeout: Duration::from_secs(SESSION_TIMEOUT_SECS),
        max_clients: args.max_clients,
        max_track_points: args.max_track_points,
    };

    info!("Starting relay server on {}", config.bind_addr);

    let mut server = Server::new(config).await?;
    server.run().await?;

    Ok(())
}
