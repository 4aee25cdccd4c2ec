//! Per-user GPS history
//!
//! Every accepted `gps_data` report is appended to the reporting user's track.
//! Tracks are bounded: once a track holds `max_points` entries the oldest one
//! is dropped for each new report.
//!
//! Tracks outlive sessions so `find_tracks` can still return the history of a
//! user who left. Live views such as `update_gps` only include users on the
//! current roster.

use shared::{is_valid_coordinate, GpsRecord, TrackPoint, UserRef};
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// Why a `gps_data` report was not recorded
#[derive(Debug, Clone, PartialEq)]
pub enum GpsRejection {
    /// The sender never completed the connect handshake
    UnknownSession,
    /// The report names a different user than the sender's session
    UserMismatch {
        session_user: String,
        reported_user: String,
    },
    InvalidCoordinate {
        latitude: f64,
        longitude: f64,
    },
}

impl fmt::Display for GpsRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpsRejection::UnknownSession => write!(f, "no session for sender"),
            GpsRejection::UserMismatch {
                session_user,
                reported_user,
            } => write!(
                f,
                "report for {} sent by session of {}",
                reported_user, session_user
            ),
            GpsRejection::InvalidCoordinate {
                latitude,
                longitude,
            } => write!(f, "invalid coordinate ({}, {})", latitude, longitude),
        }
    }
}

impl std::error::Error for GpsRejection {}

/// Checks that a report may be recorded for `reported_user`
///
/// Only a session's own user may report positions for that user.
pub fn validate_report(
    session_user: Option<&str>,
    reported_user: &str,
    latitude: f64,
    longitude: f64,
) -> Result<(), GpsRejection> {
    let session_user = session_user.ok_or(GpsRejection::UnknownSession)?;

    if session_user != reported_user {
        return Err(GpsRejection::UserMismatch {
            session_user: session_user.to_string(),
            reported_user: reported_user.to_string(),
        });
    }

    if !is_valid_coordinate(latitude, longitude) {
        return Err(GpsRejection::InvalidCoordinate {
            latitude,
            longitude,
        });
    }

    Ok(())
}

pub struct TrackStore {
    tracks: HashMap<String, VecDeque<TrackPoint>>,
    max_points: usize,
}

impl TrackStore {
    pub fn new(max_points: usize) -> Self {
        Self {
            tracks: HashMap::new(),
            max_points: max_points.max(1),
        }
    }

    /// Appends a point to the user's track
    pub fn record(&mut self, user_id: &str, point: TrackPoint) -> Result<(), GpsRejection> {
        if !is_valid_coordinate(point.latitude, point.longitude) {
            return Err(GpsRejection::InvalidCoordinate {
                latitude: point.latitude,
                longitude: point.longitude,
            });
        }

        let track = self.tracks.entry(user_id.to_string()).or_default();
        while track.len() >= self.max_points {
            track.pop_front();
        }
        track.push_back(point);
        Ok(())
    }

    /// Recorded points of a user, oldest first
    pub fn track(&self, user_id: &str) -> Vec<TrackPoint> {
        self.tracks
            .get(user_id)
            .map(|track| track.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Latest position of each listed user that has a track, in list order
    pub fn latest_records(&self, users: &[UserRef]) -> Vec<GpsRecord> {
        users
            .iter()
            .filter_map(|user| {
                self.tracks
                    .get(&user.user_id)
                    .and_then(|track| track.back())
                    .map(|point| {
                        GpsRecord::new(user.user_id.clone(), point.latitude, point.longitude)
                    })
            })
            .collect()
    }

    /// Number of users with a track
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn point(latitude: f64, longitude: f64, timestamp: u64) -> TrackPoint {
        TrackPoint {
            latitude,
            longitude,
            timestamp,
        }
    }

    #[test]
    fn test_validate_report_accepts_own_user() {
        assert!(validate_report(Some("alice"), "alice", 10.0, 20.0).is_ok());
    }

    #[test]
    fn test_validate_report_unknown_session() {
        assert_eq!(
            validate_report(None, "alice", 10.0, 20.0),
            Err(GpsRejection::UnknownSession)
        );
    }

    #[test]
    fn test_validate_report_user_mismatch() {
        let result = validate_report(Some("alice"), "mallory", 10.0, 20.0);
        assert_eq!(
            result,
            Err(GpsRejection::UserMismatch {
                session_user: "alice".to_string(),
                reported_user: "mallory".to_string()
            })
        );
    }

    #[test]
    fn test_validate_report_bad_coordinate() {
        assert!(matches!(
            validate_report(Some("alice"), "alice", 91.0, 0.0),
            Err(GpsRejection::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn test_record_and_track() {
        let mut store = TrackStore::new(10);
        store.record("alice", point(1.0, 2.0, 100)).unwrap();
        store.record("alice", point(1.5, 2.5, 200)).unwrap();

        let track = store.track("alice");
        assert_eq!(track.len(), 2);
        assert_eq!(track[0].timestamp, 100);
        assert_eq!(track[1].timestamp, 200);
        assert_approx_eq!(track[1].latitude, 1.5);
        assert_approx_eq!(track[1].longitude, 2.5);
        assert!(store.track("bob").is_empty());
    }

    #[test]
    fn test_record_rejects_non_finite() {
        let mut store = TrackStore::new(10);
        assert!(store.record("alice", point(f64::NAN, 0.0, 1)).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_track_is_bounded() {
        let mut store = TrackStore::new(3);
        for i in 0..5 {
            store.record("alice", point(i as f64, 0.0, i)).unwrap();
        }

        let timestamps: Vec<u64> = store.track("alice").iter().map(|p| p.timestamp).collect();
        assert_eq!(timestamps, vec![2, 3, 4]);
    }

    #[test]
    fn test_latest_records() {
        let mut store = TrackStore::new(10);
        store.record("bob", point(5.0, 5.0, 1)).unwrap();
        store.record("alice", point(1.0, 1.0, 1)).unwrap();
        store.record("alice", point(2.0, 3.0, 2)).unwrap();

        let latest = store.latest_records(&[UserRef::new("alice"), UserRef::new("bob")]);
        assert_eq!(
            latest,
            vec![GpsRecord::new("alice", 2.0, 3.0), GpsRecord::new("bob", 5.0, 5.0)]
        );
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_latest_records_skip_departed_users() {
        let mut store = TrackStore::new(10);
        store.record("alice", point(1.0, 1.0, 1)).unwrap();
        store.record("bob", point(5.0, 5.0, 1)).unwrap();

        // Bob left the roster, carol never reported
        let latest = store.latest_records(&[UserRef::new("carol"), UserRef::new("alice")]);
        assert_eq!(latest, vec![GpsRecord::new("alice", 1.0, 1.0)]);

        // History stays queryable
        assert_eq!(store.track("bob").len(), 1);
    }

    #[test]
    fn test_rejection_display() {
        let rejection = GpsRejection::UserMismatch {
            session_user: "alice".to_string(),
            reported_user: "mallory".to_string(),
        };
        assert_eq!(rejection.to_string(), "report for mallory sent by session of alice");
    }
}
