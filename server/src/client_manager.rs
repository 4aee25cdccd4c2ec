//! Session management for the relay server
//!
//! This module tracks which users are connected and from where:
//! - Session lifecycle (connect, reconnect, disconnect, timeout)
//! - Capacity limits
//! - The active-user roster, ordered by join time
//!
//! A session is keyed by the sender's socket address. A user id is held by at
//! most one session: reconnecting from a new address replaces the old session.

use log::{debug, info, warn};
use shared::UserRef;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected user and the address their packets come from
#[derive(Debug)]
pub struct Client {
    /// Identity announced in the connect handshake
    pub user_id: String,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this session
    pub last_seen: Instant,
    /// Join order, used to keep the roster stable between broadcasts
    pub joined_seq: u64,
}

impl Client {
    pub fn new(user_id: String, addr: SocketAddr, joined_seq: u64) -> Self {
        Self {
            user_id,
            addr,
            last_seen: Instant::now(),
            joined_seq,
        }
    }

    /// Checks if the session has exceeded the connection timeout
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Outcome of a connect handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    /// The user held a session at another address, which was dropped
    Replaced { previous_addr: SocketAddr },
    /// Another user held a session at this address, which was dropped
    Displaced { previous_user: String },
    ServerFull,
}

pub struct ClientManager {
    clients: HashMap<SocketAddr, Client>,
    next_seq: u64,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_seq: 1,
            max_clients,
        }
    }

    /// Registers `user_id` as connected from `addr`
    ///
    /// A repeated handshake from the same user and address keeps its place in
    /// the roster. Any other session at the same address is dropped first, as
    /// is any session of the same user at a different address. When both
    /// happen the outcome reports the replaced address, since only that peer
    /// can still be told.
    pub fn add_client(&mut self, user_id: &str, addr: SocketAddr) -> JoinOutcome {
        let mut joined_seq = None;
        let mut displaced_user = None;

        if let Some(existing) = self.clients.remove(&addr) {
            if existing.user_id == user_id {
                joined_seq = Some(existing.joined_seq);
            } else {
                warn!(
                    "User {} at {} displaced by {}",
                    existing.user_id, addr, user_id
                );
                displaced_user = Some(existing.user_id);
            }
        }

        let previous_addr = self
            .clients
            .values()
            .find(|client| client.user_id == user_id)
            .map(|client| client.addr);

        if let Some(previous) = previous_addr {
            self.clients.remove(&previous);
            info!("User {} moved from {} to {}", user_id, previous, addr);
        }

        if self.clients.len() >= self.max_clients {
            return JoinOutcome::ServerFull;
        }

        let joined_seq = match joined_seq {
            Some(seq) => {
                debug!("Repeated handshake from {} at {}", user_id, addr);
                seq
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                info!("User {} connected from {}", user_id, addr);
                seq
            }
        };
        self.clients
            .insert(addr, Client::new(user_id.to_string(), addr, joined_seq));

        match (previous_addr, displaced_user) {
            (Some(previous_addr), _) => JoinOutcome::Replaced { previous_addr },
            (None, Some(previous_user)) => JoinOutcome::Displaced { previous_user },
            (None, None) => JoinOutcome::Joined,
        }
    }

    /// Removes the session at `addr`, returning it if one existed
    pub fn remove_client(&mut self, addr: &SocketAddr) -> Option<Client> {
        let client = self.clients.remove(addr)?;
        info!("User {} disconnected", client.user_id);
        Some(client)
    }

    /// User id of the session at `addr`
    pub fn find_user(&self, addr: &SocketAddr) -> Option<&str> {
        self.clients.get(addr).map(|client| client.user_id.as_str())
    }

    /// Marks the session at `addr` as alive, returning false if unknown
    pub fn touch(&mut self, addr: &SocketAddr) -> bool {
        match self.clients.get_mut(addr) {
            Some(client) => {
                client.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Removes and returns sessions not heard from within `timeout`
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<Client> {
        let timed_out: Vec<SocketAddr> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(addr, _)| *addr)
            .collect();

        timed_out
            .iter()
            .filter_map(|addr| self.clients.remove(addr))
            .inspect(|client| info!("User {} timed out", client.user_id))
            .collect()
    }

    /// Active users in join order
    pub fn roster(&self) -> Vec<UserRef> {
        let mut clients: Vec<&Client> = self.clients.values().collect();
        clients.sort_by_key(|client| client.joined_seq);
        clients
            .into_iter()
            .map(|client| UserRef::new(client.user_id.clone()))
            .collect()
    }

    pub fn client_addrs(&self) -> Vec<SocketAddr> {
        self.clients.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
