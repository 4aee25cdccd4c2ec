//! # GPS Relay Server Library
//!
//! This library provides the relay server for the proximity roster. It keeps
//! track of which users are connected, records the positions they report and
//! regularly pushes the roster and the latest positions to every session.
//!
//! ## Core Responsibilities
//!
//! ### Session Management
//! Users join with a `connect` handshake carrying their user id. Sessions are
//! keyed by socket address, refreshed by any packet from that address and
//! dropped after a period of silence. A user reconnecting from a new address
//! replaces their previous session, which is told it was replaced.
//!
//! ### GPS Recording
//! `gps_data` reports are accepted only from a session reporting its own user
//! id with valid coordinates.
//! Accepted reports extend the user's bounded track history.
//!
//! ### Broadcasting
//! At a fixed interval every session receives `update_gps` (latest position per
//! user) followed by `update_active_users` (roster in join order). Clients also
//! pull on demand: `send_gps` returns a GPS snapshot and `find_tracks` returns a
//! user's recorded track as `track_info`.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Session roster, capacity limit and timeout detection.
//!
//! ### Tracks Module (`tracks`)
//! Report validation and the per-user track store.
//!
//! ### Network Module (`network`)
//! UDP socket handling, packet dispatch and the broadcast loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         bind_addr: "0.0.0.0:3000".to_string(),
//!         broadcast_interval: Duration::from_secs(1),
//!         ..ServerConfig::default()
//!     };
//!
//!     let mut server = Server::new(config).await?;
//!
//!     // Runs the receive, send and timeout tasks plus the broadcast loop
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The server uses an event-driven architecture with internal async tasks that handle:
//! - **Network Receiver**: Continuously listens for incoming packets
//! - **Network Sender**: Processes outgoing packet queue and broadcasts
//! - **Timeout Checker**: Monitors session health and removes silent users
//! - **Main Loop**: Dispatches packets and runs the periodic broadcast

pub mod client_manager;
pub mod network;
pub mod tracks;
