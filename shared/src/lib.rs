use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const PROTOCOL_VERSION: u32 = 1;
pub const POLL_INTERVAL_MS: u64 = 5000;
pub const HEARTBEAT_INTERVAL_MS: u64 = 2000;
pub const SESSION_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:3000";
pub const MAX_DATAGRAM_SIZE: usize = 65_536;

/// `disconnected` reason sent to an address the server holds no session for.
/// Clients answer it with a fresh `connect`.
pub const UNKNOWN_SESSION_REASON: &str = "Unknown session";

pub const MAX_LATITUDE: f64 = 90.0;
pub const MAX_LONGITUDE: f64 = 180.0;

/// Wire protocol shared by the relay server and the roster client.
///
/// One value is bincode-encoded per UDP datagram. Variants map one-to-one onto
/// the named channel events returned by [`Packet::event_name`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        client_version: u32,
        user_id: String,
    },
    Heartbeat,
    GpsData {
        user_id: String,
        latitude: f64,
        longitude: f64,
        timestamp: u64,
    },
    SendGps,
    FindTracks {
        user_id: String,
    },
    Disconnect,

    Connected {
        user_id: String,
    },
    UpdateActiveUsers {
        users: Vec<UserRef>,
    },
    UpdateGps {
        records: Vec<GpsRecord>,
    },
    TrackInfo {
        user_id: String,
        points: Vec<TrackPoint>,
    },
    Disconnected {
        reason: String,
    },
}

impl Packet {
    /// Channel event name carried by this packet
    pub fn event_name(&self) -> &'static str {
        match self {
            Packet::Connect { .. } => "connect",
            Packet::Heartbeat => "heartbeat",
            Packet::GpsData { .. } => "gps_data",
            Packet::SendGps => "send_gps",
            Packet::FindTracks { .. } => "find_tracks",
            Packet::Disconnect => "disconnect",
            Packet::Connected { .. } => "connected",
            Packet::UpdateActiveUsers { .. } => "update_active_users",
            Packet::UpdateGps { .. } => "update_gps",
            Packet::TrackInfo { .. } => "track_info",
            Packet::Disconnected { .. } => "disconnected",
        }
    }
}

/// Roster entry for a user the server considers active
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct UserRef {
    pub user_id: String,
}

impl UserRef {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// A user's last known coordinate pair
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GpsRecord {
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsRecord {
    pub fn new(user_id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            user_id: user_id.into(),
            latitude,
            longitude,
        }
    }
}

/// One entry of a user's recorded GPS history
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: u64,
}

/// Straight-line distance between two records in coordinate units.
///
/// Planar approximation over (latitude, longitude); not a geodesic distance.
pub fn euclidean_distance(a: &GpsRecord, b: &GpsRecord) -> f64 {
    let d_lat = a.latitude - b.latitude;
    let d_lon = a.longitude - b.longitude;
    (d_lat * d_lat + d_lon * d_lon).sqrt()
}

pub fn is_valid_coordinate(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && latitude.abs() <= MAX_LATITUDE
        && longitude.abs() <= MAX_LONGITUDE
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn timestamp_millis() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    (millis.min(u64::MAX as u128)) as u64
}
