//! Server network layer handling UDP communications and the broadcast loop

use crate::client_manager::{ClientManager, JoinOutcome};
use crate::tracks::{validate_report, GpsRejection, TrackStore};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{
    GpsRecord, Packet, TrackPoint, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION, SESSION_TIMEOUT_SECS,
    UNKNOWN_SESSION_REASON,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// How often the roster and GPS dataset are pushed to every session
    pub broadcast_interval: Duration,
    pub session_timeout: Duration,
    pub max_clients: usize,
    /// Upper bound on stored points per user track
    pub max_track_points: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            broadcast_interval: Duration::from_secs(1),
            session_timeout: Duration::from_secs(SESSION_TIMEOUT_SECS),
            max_clients: 64,
            max_track_points: 1000,
        }
    }
}

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { user_id: String },
}

/// Messages sent from the main loop to the sender task
#[derive(Debug)]
pub enum OutboundMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
    BroadcastPacket { packet: Packet },
}

/// Relay server coordinating sessions, GPS tracks and broadcasts
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    tracks: TrackStore,
    config: ServerConfig,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: Option<mpsc::UnboundedReceiver<OutboundMessage>>,

    tasks: Vec<JoinHandle<()>>,
}

impl Server {
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(&config.bind_addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            tracks: TrackStore::new(config.max_track_points),
            config,
            server_tx,
            server_rx,
            outbound_tx,
            outbound_rx: Some(outbound_rx),
            tasks: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&mut self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        self.tasks.push(tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }));
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let Some(mut outbound_rx) = self.outbound_rx.take() else {
            return;
        };
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);

        self.tasks.push(tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                match message {
                    OutboundMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send {} to {}: {}", packet.event_name(), addr, e);
                        }
                    }
                    OutboundMessage::BroadcastPacket { packet } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.client_addrs()
                        };

                        for addr in client_addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to broadcast {} to {}: {}", packet.event_name(), addr, e);
                            }
                        }
                    }
                }
            }
        }));
    }

    /// Spawns task that monitors session timeouts
    fn spawn_timeout_checker(&mut self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let timeout = self.config.session_timeout;

        self.tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts(timeout)
                };

                for client in timed_out {
                    let message = ServerMessage::ClientTimeout {
                        user_id: client.user_id,
                    };
                    if let Err(e) = server_tx.send(message) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        }));
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self
            .outbound_tx
            .send(OutboundMessage::SendPacket { packet, addr })
        {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet) {
        if let Err(e) = self
            .outbound_tx
            .send(OutboundMessage::BroadcastPacket { packet })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Processes an incoming packet from `addr`
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect {
                client_version,
                user_id,
            } => {
                info!(
                    "User {} connecting from {} (version: {})",
                    user_id, addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    let reason = "Unsupported client version".to_string();
                    self.send_packet(Packet::Disconnected { reason }, addr);
                    return;
                }

                if user_id.is_empty() {
                    let reason = "Missing user id".to_string();
                    self.send_packet(Packet::Disconnected { reason }, addr);
                    return;
                }

                let outcome = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(&user_id, addr)
                };

                match outcome {
                    JoinOutcome::Joined => {
                        self.send_packet(Packet::Connected { user_id }, addr);
                    }
                    JoinOutcome::Replaced { previous_addr } => {
                        let reason = "Session replaced by a new connection".to_string();
                        self.send_packet(Packet::Disconnected { reason }, previous_addr);
                        self.send_packet(Packet::Connected { user_id }, addr);
                    }
                    JoinOutcome::Displaced { previous_user } => {
                        // The displaced peer shared this address, so it cannot be told
                        warn!("Session of {} at {} taken over by {}", previous_user, addr, user_id);
                        self.send_packet(Packet::Connected { user_id }, addr);
                        self.broadcast_roster().await;
                    }
                    JoinOutcome::ServerFull => {
                        let reason = "Server full".to_string();
                        self.send_packet(Packet::Disconnected { reason }, addr);
                    }
                }
            }

            Packet::Heartbeat => {
                let known = {
                    let mut clients = self.clients.write().await;
                    clients.touch(&addr)
                };
                if !known {
                    self.reject_unknown("heartbeat", addr);
                }
            }

            Packet::GpsData {
                user_id,
                latitude,
                longitude,
                timestamp,
            } => {
                let session_user = {
                    let mut clients = self.clients.write().await;
                    clients.touch(&addr);
                    clients.find_user(&addr).map(str::to_string)
                };

                let accepted = validate_report(session_user.as_deref(), &user_id, latitude, longitude)
                    .and_then(|_| {
                        self.tracks.record(
                            &user_id,
                            TrackPoint {
                                latitude,
                                longitude,
                                timestamp,
                            },
                        )
                    });

                match accepted {
                    Ok(()) => debug!("Recorded position of {} ({}, {})", user_id, latitude, longitude),
                    Err(GpsRejection::UnknownSession) => self.reject_unknown("gps_data", addr),
                    Err(rejection) => warn!("Dropped gps_data from {}: {}", addr, rejection),
                }
            }

            Packet::SendGps => {
                let known = {
                    let mut clients = self.clients.write().await;
                    clients.touch(&addr)
                };
                if known {
                    let records = self.live_records().await;
                    self.send_packet(Packet::UpdateGps { records }, addr);
                } else {
                    self.reject_unknown("send_gps", addr);
                }
            }

            Packet::FindTracks { user_id } => {
                let known = {
                    let mut clients = self.clients.write().await;
                    clients.touch(&addr)
                };
                if known {
                    let points = self.tracks.track(&user_id);
                    self.send_packet(Packet::TrackInfo { user_id, points }, addr);
                } else {
                    self.reject_unknown("find_tracks", addr);
                }
            }

            Packet::Disconnect => {
                let removed = {
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&addr)
                };
                if removed.is_some() {
                    self.broadcast_roster().await;
                }
            }

            other => {
                warn!("Unexpected {} packet from {}", other.event_name(), addr);
            }
        }
    }

    /// Tells a sender without a session to reconnect
    fn reject_unknown(&self, event: &str, addr: SocketAddr) {
        debug!("{} from unknown address {}", event, addr);
        let reason = UNKNOWN_SESSION_REASON.to_string();
        self.send_packet(Packet::Disconnected { reason }, addr);
    }

    /// Latest positions of the users currently on the roster
    async fn live_records(&self) -> Vec<GpsRecord> {
        let users = {
            let clients = self.clients.read().await;
            clients.roster()
        };
        self.tracks.latest_records(&users)
    }

    async fn broadcast_roster(&self) {
        let users = {
            let clients = self.clients.read().await;
            clients.roster()
        };
        self.broadcast_packet(Packet::UpdateActiveUsers { users });
    }

    /// Pushes the GPS dataset and the roster to every session
    ///
    /// GPS goes first so clients rank the roster against fresh positions.
    async fn broadcast_state(&self) {
        let client_count = {
            let clients = self.clients.read().await;
            clients.len()
        };

        if client_count == 0 {
            return;
        }

        self.broadcast_packet(Packet::UpdateGps {
            records: self.live_records().await,
        });
        self.broadcast_roster().await;
    }

    /// Runs the server until Ctrl+C
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

    /// Main server loop, running until `shutdown` resolves
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), Box<dyn std::error::Error>>
    where
        F: Future<Output = ()>,
    {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut broadcast_interval = interval(self.config.broadcast_interval);

        tokio::pin!(shutdown);

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { user_id }) => {
                            debug!("Dropping timed out user {} from roster", user_id);
                            self.broadcast_roster().await;
                        },
                        None => {
                            info!("Server channel closed");
                            break;
                        }
                    }
                },

                _ = broadcast_interval.tick() => {
                    self.broadcast_state().await;
                },

                _ = &mut shutdown => {
                    info!("Server shutting down");
                    break;
                },
            }
        }

        // Give queued packets a moment to leave before the sender is aborted
        tokio::time::sleep(Duration::from_millis(20)).await;
        for task in self.tasks.drain(..) {
            task.abort();
        }

        Ok(())
    }
}
