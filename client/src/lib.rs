//! # Proximity Roster Client Library
//!
//! This library implements the client side of the proximity roster: it keeps a
//! ranked view of nearby active users and polls the relay server for their
//! track metadata while pushing the local position upstream.
//!
//! ## Core Responsibilities
//!
//! ### Distance Ranking
//! Every `update_active_users` event is merged with the most recent
//! `update_gps` dataset. Each active user is measured against the local user's
//! position with a planar Euclidean distance over (latitude, longitude) and the
//! roster is ordered nearest first. Users that cannot be measured are kept and
//! flagged rather than silently treated as distance zero.
//!
//! ### Periodic Polling
//! Each ranked user owns exactly one recurring timer (5 seconds by default).
//! On every tick the client emits `find_tracks` for that user and `send_gps`
//! for itself. Roster updates reconcile the timer set, so departed users stop
//! being polled and repeated rosters never stack duplicate timers.
//!
//! ### Rendering
//! Two display regions are maintained: `active-users` with the ranked roster
//! and `gps-data` with the raw dataset as pretty-printed JSON.
//!
//! ## Module Organization
//!
//! ### Ranking Module (`ranking`)
//! Pure ranking pass: GPS record lookup, local position, distances, stable sort
//! and issue flags.
//!
//! ### Scheduler Module (`scheduler`)
//! One cancellable tokio timer per user id, reporting ticks over a channel.
//!
//! ### Session Module (`session`)
//! Connection-scoped state and the event handlers wiring ranking, timers,
//! rendering and outbound requests together.
//!
//! ### Display Module (`display`)
//! Display regions, the `Surface` trait and the text renderers.
//!
//! ### GPS Module (`gps`)
//! Local position sources: fixed coordinates or a simulated random walk.
//!
//! ### Network Module (`network`)
//! UDP transport: handshake, heartbeat, packet codec and the event loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::display::TerminalSurface;
//! use client::gps::FixedPosition;
//! use client::network::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig {
//!         server_addr: "127.0.0.1:3000".to_string(),
//!         user_id: "auth0|alice".to_string(),
//!         ..ClientConfig::default()
//!     };
//!
//!     let mut client = Client::new(config, TerminalSurface).await?;
//!     client.set_gps_source(Box::new(FixedPosition::new(52.52, 13.405)));
//!
//!     // Runs until Ctrl+C or until the server drops the session
//!     client.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod display;
pub mod gps;
pub mod network;
pub mod ranking;
pub mod scheduler;
pub mod session;
