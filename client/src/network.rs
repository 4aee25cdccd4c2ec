//! Client network layer: UDP transport around a [`Session`]

use crate::display::Surface;
use crate::gps::GpsSource;
use crate::scheduler::PollTick;
use crate::session::Session;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{
    Packet, DEFAULT_SERVER_ADDR, HEARTBEAT_INTERVAL_MS, MAX_DATAGRAM_SIZE, POLL_INTERVAL_MS,
    PROTOCOL_VERSION, UNKNOWN_SESSION_REASON,
};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: String,
    pub user_id: String,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_SERVER_ADDR.to_string(),
            user_id: String::new(),
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
            heartbeat_interval: Duration::from_millis(HEARTBEAT_INTERVAL_MS),
        }
    }
}

/// What the event loop does after a server packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    /// The server lost our session; handshake again
    Rejoin,
    Stop,
}

pub struct Client<S: Surface> {
    socket: UdpSocket,
    server_addr: SocketAddr,
    connected: bool,
    session: Session<S>,
    outbound_rx: mpsc::UnboundedReceiver<Packet>,
    tick_rx: mpsc::UnboundedReceiver<PollTick>,
    heartbeat_interval: Duration,
}

impl<S: Surface> Client<S> {
    pub async fn new(config: ClientConfig, surface: S) -> Result<Self, Box<dyn std::error::Error>> {
        if config.user_id.is_empty() {
            return Err("user id must not be empty".into());
        }

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = config.server_addr.parse()?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let session = Session::new(
            config.user_id,
            config.poll_interval,
            surface,
            outbound_tx,
            tick_tx,
        );

        Ok(Client {
            socket,
            server_addr,
            connected: false,
            session,
            outbound_rx,
            tick_rx,
            heartbeat_interval: config.heartbeat_interval,
        })
    }

    pub fn set_gps_source(&mut self, source: Box<dyn GpsSource>) {
        self.session.set_gps_source(source);
    }

    pub fn session(&self) -> &Session<S> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<S> {
        &mut self.session
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!(
            "Connecting to {} as {}",
            self.server_addr,
            self.session.local_user_id()
        );

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
            user_id: self.session.local_user_id().to_string(),
        };
        self.send_packet(&packet).await
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Applies a server packet and tells the loop how to continue
    fn handle_packet(&mut self, packet: Packet) -> Flow {
        match packet {
            Packet::Connected { user_id } => {
                if user_id != self.session.local_user_id() {
                    warn!(
                        "Server acknowledged {} but this session is {}",
                        user_id,
                        self.session.local_user_id()
                    );
                }
                if !self.connected {
                    info!("Connected as {}", user_id);
                }
                self.connected = true;
            }

            Packet::Disconnected { reason } if reason == UNKNOWN_SESSION_REASON => {
                warn!("Server no longer knows this session, reconnecting");
                self.connected = false;
                return Flow::Rejoin;
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                return Flow::Stop;
            }

            packet => {
                if !self.connected {
                    debug!("Received {} before connection was accepted", packet.event_name());
                }
                self.session.handle_packet(packet);
            }
        }
        Flow::Continue
    }

    /// Runs until Ctrl+C or until the server disconnects us
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl+C, shutting down...");
        })
        .await
    }

    /// Runs the event loop until `shutdown` resolves or the server disconnects us
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), Box<dyn std::error::Error>>
    where
        F: Future<Output = ()>,
    {
        self.connect().await?;

        // The handshake above already went out, so wait a full period
        let mut heartbeat_interval = interval_at(
            Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, addr)) => {
                            if addr != self.server_addr {
                                debug!("Ignoring datagram from {}", addr);
                                continue;
                            }
                            match deserialize::<Packet>(&buffer[0..len]) {
                                Ok(packet) => match self.handle_packet(packet) {
                                    Flow::Continue => {}
                                    Flow::Rejoin => {
                                        if let Err(e) = self.connect().await {
                                            error!("Error reconnecting: {}", e);
                                        }
                                    }
                                    Flow::Stop => break,
                                },
                                Err(e) => warn!("Failed to deserialize packet: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                Some(packet) = self.outbound_rx.recv() => {
                    if let Err(e) = self.send_packet(&packet).await {
                        error!("Error sending {}: {}", packet.event_name(), e);
                    }
                },

                Some(tick) = self.tick_rx.recv() => {
                    self.session.on_poll_tick(tick);
                },

                _ = heartbeat_interval.tick() => {
                    // Keep retrying the handshake until the server answers
                    let packet = if self.connected {
                        Packet::Heartbeat
                    } else {
                        Packet::Connect {
                            client_version: PROTOCOL_VERSION,
                            user_id: self.session.local_user_id().to_string(),
                        }
                    };
                    if let Err(e) = self.send_packet(&packet).await {
                        error!("Error sending {}: {}", packet.event_name(), e);
                    }
                },

                _ = &mut shutdown => {
                    break;
                },
            }
        }

        self.session.shutdown();

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
            self.connected = false;
        }

        Ok(())
    }
}
