//! Active-user distance ranking
//!
//! Attaches cached GPS records to the users of a roster, measures every user
//! against the local user's position and orders the roster nearest first.
//! Users whose distance cannot be measured are kept in the result and carry
//! a [`RankingIssue`] instead of a number.

use shared::{euclidean_distance, GpsRecord, UserRef};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// Reason a roster entry has no usable distance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingIssue {
    /// The roster entry has no matching record in the GPS dataset
    MissingGpsRecord,
    /// No roster entry for the local user carries a GPS record
    MissingLocalPosition,
    /// The computed distance is NaN or infinite
    InvalidDistance,
}

impl fmt::Display for RankingIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankingIssue::MissingGpsRecord => write!(f, "missing GPS record"),
            RankingIssue::MissingLocalPosition => write!(f, "missing local position"),
            RankingIssue::InvalidDistance => write!(f, "invalid distance"),
        }
    }
}

impl std::error::Error for RankingIssue {}

/// A roster entry with its attached GPS record and measured distance
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveUser {
    pub user_id: String,
    pub gps: Option<GpsRecord>,
    pub distance: Result<f64, RankingIssue>,
}

impl ActiveUser {
    pub fn distance_value(&self) -> Option<f64> {
        self.distance.ok()
    }

    pub fn issue(&self) -> Option<RankingIssue> {
        self.distance.err()
    }
}

/// Result of one ranking pass
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ranking {
    /// Users ordered by ascending distance, flagged users last
    pub users: Vec<ActiveUser>,
    /// GPS record of the local user, when the roster contains one
    pub local_position: Option<GpsRecord>,
}

impl Ranking {
    pub fn user_ids(&self) -> Vec<String> {
        self.users.iter().map(|user| user.user_id.clone()).collect()
    }

    pub fn flagged(&self) -> impl Iterator<Item = (&str, RankingIssue)> {
        self.users
            .iter()
            .filter_map(|user| user.issue().map(|issue| (user.user_id.as_str(), issue)))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Ranks a roster by distance from the local user
///
/// Each roster entry gets the first record in `gps_data` with the same user
/// id. The local position is the record attached to the roster entry whose id
/// equals `local_user_id`, so a local user missing from the roster leaves every
/// other user flagged with [`RankingIssue::MissingLocalPosition`].
///
/// The sort is stable: users at equal distance keep their roster order, and
/// flagged users follow all measured users in roster order.
pub fn rank_active_users(
    roster: &[UserRef],
    gps_data: &[GpsRecord],
    local_user_id: &str,
) -> Ranking {
    let mut lookup: HashMap<&str, &GpsRecord> = HashMap::with_capacity(gps_data.len());
    for record in gps_data {
        // First match wins when the dataset holds duplicates
        lookup.entry(record.user_id.as_str()).or_insert(record);
    }

    let attached: Vec<(String, Option<GpsRecord>)> = roster
        .iter()
        .map(|user| {
            let gps = lookup.get(user.user_id.as_str()).map(|record| (*record).clone());
            (user.user_id.clone(), gps)
        })
        .collect();

    let local_position = attached
        .iter()
        .find(|(user_id, gps)| user_id == local_user_id && gps.is_some())
        .and_then(|(_, gps)| gps.clone());

    let mut users: Vec<ActiveUser> = attached
        .into_iter()
        .map(|(user_id, gps)| {
            let distance = measure(gps.as_ref(), local_position.as_ref());
            ActiveUser {
                user_id,
                gps,
                distance,
            }
        })
        .collect();

    users.sort_by(compare_distance);

    Ranking {
        users,
        local_position,
    }
}

fn measure(
    gps: Option<&GpsRecord>,
    local_position: Option<&GpsRecord>,
) -> Result<f64, RankingIssue> {
    let gps = gps.ok_or(RankingIssue::MissingGpsRecord)?;
    let local_position = local_position.ok_or(RankingIssue::MissingLocalPosition)?;

    let distance = euclidean_distance(local_position, gps);
    if distance.is_finite() {
        Ok(distance)
    } else {
        Err(RankingIssue::InvalidDistance)
    }
}

fn compare_distance(a: &ActiveUser, b: &ActiveUser) -> Ordering {
    match (&a.distance, &b.distance) {
        (Ok(x), Ok(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn roster(ids: &[&str]) -> Vec<UserRef> {
        ids.iter().map(|id| UserRef::new(*id)).collect()
    }

    #[test]
    fn test_two_user_scenario() {
        let gps = vec![GpsRecord::new("1", 0.0, 0.0), GpsRecord::new("2", 3.0, 4.0)];

        let ranking = rank_active_users(&roster(&["1", "2"]), &gps, "1");

        assert_eq!(ranking.user_ids(), vec!["1", "2"]);
        assert_approx_eq!(ranking.users[0].distance_value().unwrap(), 0.0, 1e-12);
        assert_approx_eq!(ranking.users[1].distance_value().unwrap(), 5.0, 1e-12);
        assert_eq!(ranking.local_position, Some(GpsRecord::new("1", 0.0, 0.0)));
    }

    #[test]
    fn test_sorted_nearest_first() {
        let gps = vec![
            GpsRecord::new("far", 10.0, 10.0),
            GpsRecord::new("me", 0.0, 0.0),
            GpsRecord::new("near", 0.5, 0.5),
            GpsRecord::new("mid", 2.0, -1.0),
        ];

        let ranking = rank_active_users(&roster(&["far", "mid", "me", "near"]), &gps, "me");

        assert_eq!(ranking.user_ids(), vec!["me", "near", "mid", "far"]);
        for pair in ranking.users.windows(2) {
            assert!(pair[0].distance_value().unwrap() <= pair[1].distance_value().unwrap());
        }
    }

    #[test]
    fn test_output_is_permutation_of_roster() {
        let gps = vec![
            GpsRecord::new("a", 1.0, 1.0),
            GpsRecord::new("b", -3.0, 2.0),
            GpsRecord::new("c", 0.0, 0.0),
        ];
        let input = roster(&["a", "b", "c", "ghost"]);

        let ranking = rank_active_users(&input, &gps, "c");

        let mut ranked = ranking.user_ids();
        let mut expected: Vec<String> = input.iter().map(|u| u.user_id.clone()).collect();
        ranked.sort();
        expected.sort();
        assert_eq!(ranked, expected);
    }

    #[test]
    fn test_equal_distances_keep_roster_order() {
        let gps = vec![
            GpsRecord::new("me", 0.0, 0.0),
            GpsRecord::new("east", 0.0, 1.0),
            GpsRecord::new("north", 1.0, 0.0),
            GpsRecord::new("west", 0.0, -1.0),
        ];

        let ranking = rank_active_users(&roster(&["west", "me", "north", "east"]), &gps, "me");
        assert_eq!(ranking.user_ids(), vec!["me", "west", "north", "east"]);

        let ranking = rank_active_users(&roster(&["east", "north", "west", "me"]), &gps, "me");
        assert_eq!(ranking.user_ids(), vec!["me", "east", "north", "west"]);
    }

    #[test]
    fn test_missing_gps_record_is_flagged_not_zero() {
        let gps = vec![GpsRecord::new("1", 0.0, 0.0), GpsRecord::new("2", 3.0, 4.0)];

        let ranking = rank_active_users(&roster(&["3", "1", "2"]), &gps, "1");

        assert_eq!(ranking.user_ids(), vec!["1", "2", "3"]);
        let ghost = &ranking.users[2];
        assert!(ghost.gps.is_none());
        assert_eq!(ghost.distance, Err(RankingIssue::MissingGpsRecord));
        assert_eq!(
            ranking.flagged().collect::<Vec<_>>(),
            vec![("3", RankingIssue::MissingGpsRecord)]
        );
    }

    #[test]
    fn test_missing_local_position() {
        let gps = vec![GpsRecord::new("1", 0.0, 0.0), GpsRecord::new("2", 3.0, 4.0)];

        // Local user is not part of the roster
        let ranking = rank_active_users(&roster(&["1", "2"]), &gps, "me");

        assert!(ranking.local_position.is_none());
        assert_eq!(ranking.user_ids(), vec!["1", "2"]);
        assert!(ranking
            .users
            .iter()
            .all(|u| u.distance == Err(RankingIssue::MissingLocalPosition)));
    }

    #[test]
    fn test_local_user_without_record() {
        let gps = vec![GpsRecord::new("2", 3.0, 4.0)];

        let ranking = rank_active_users(&roster(&["1", "2"]), &gps, "1");

        assert_eq!(ranking.users[0].distance, Err(RankingIssue::MissingGpsRecord));
        assert_eq!(ranking.users[1].distance, Err(RankingIssue::MissingLocalPosition));
    }

    #[test]
    fn test_empty_dataset_flags_everyone() {
        let ranking = rank_active_users(&roster(&["1", "2"]), &[], "1");

        assert_eq!(ranking.len(), 2);
        assert!(ranking
            .users
            .iter()
            .all(|u| u.distance == Err(RankingIssue::MissingGpsRecord)));
    }

    #[test]
    fn test_duplicate_records_first_match_wins() {
        let gps = vec![
            GpsRecord::new("me", 0.0, 0.0),
            GpsRecord::new("dup", 3.0, 4.0),
            GpsRecord::new("dup", 0.3, 0.4),
        ];

        let ranking = rank_active_users(&roster(&["me", "dup"]), &gps, "me");

        assert_eq!(ranking.users[1].gps, Some(GpsRecord::new("dup", 3.0, 4.0)));
        assert_approx_eq!(ranking.users[1].distance_value().unwrap(), 5.0, 1e-12);
    }

    #[test]
    fn test_non_finite_coordinates_flag_invalid_distance() {
        let gps = vec![
            GpsRecord::new("me", 0.0, 0.0),
            GpsRecord::new("broken", f64::NAN, 1.0),
            GpsRecord::new("ok", 1.0, 0.0),
        ];

        let ranking = rank_active_users(&roster(&["broken", "ok", "me"]), &gps, "me");

        assert_eq!(ranking.user_ids(), vec!["me", "ok", "broken"]);
        assert_eq!(ranking.users[2].issue(), Some(RankingIssue::InvalidDistance));
    }

    #[test]
    fn test_empty_roster() {
        let gps = vec![GpsRecord::new("1", 0.0, 0.0)];
        let ranking = rank_active_users(&[], &gps, "1");
        assert!(ranking.is_empty());
        assert!(ranking.local_position.is_none());
    }

    #[test]
    fn test_issue_display() {
        assert_eq!(RankingIssue::MissingGpsRecord.to_string(), "missing GPS record");
        assert_eq!(
            RankingIssue::MissingLocalPosition.to_string(),
            "missing local position"
        );
        assert_eq!(RankingIssue::InvalidDistance.to_string(), "invalid distance");
    }
}
