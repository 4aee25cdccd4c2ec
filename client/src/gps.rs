//! Local GPS sources feeding `gps_data` reports

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{MAX_LATITUDE, MAX_LONGITUDE};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Provides the local user's current position
pub trait GpsSource: Send {
    /// Returns the latest reading, or None if no fix is available
    fn read(&mut self) -> Option<Position>;
}

/// Always reports the same coordinates
#[derive(Debug, Clone)]
pub struct FixedPosition {
    position: Position,
}

impl FixedPosition {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            position: Position::new(latitude, longitude),
        }
    }
}

impl GpsSource for FixedPosition {
    fn read(&mut self) -> Option<Position> {
        Some(self.position)
    }
}

/// Simulated receiver that drifts by a bounded random step on every read
pub struct RandomWalk {
    position: Position,
    max_step: f64,
    rng: StdRng,
}

impl RandomWalk {
    pub fn new(latitude: f64, longitude: f64, max_step: f64) -> Self {
        Self::with_rng(latitude, longitude, max_step, StdRng::from_entropy())
    }

    pub fn with_seed(latitude: f64, longitude: f64, max_step: f64, seed: u64) -> Self {
        Self::with_rng(latitude, longitude, max_step, StdRng::seed_from_u64(seed))
    }

    fn with_rng(latitude: f64, longitude: f64, max_step: f64, rng: StdRng) -> Self {
        Self {
            position: Position::new(
                latitude.clamp(-MAX_LATITUDE, MAX_LATITUDE),
                longitude.clamp(-MAX_LONGITUDE, MAX_LONGITUDE),
            ),
            max_step: if max_step.is_finite() { max_step.abs() } else { 0.0 },
            rng,
        }
    }
}

impl GpsSource for RandomWalk {
    fn read(&mut self) -> Option<Position> {
        let d_lat = self.rng.gen_range(-self.max_step..=self.max_step);
        let d_lon = self.rng.gen_range(-self.max_step..=self.max_step);

        self.position.latitude = (self.position.latitude + d_lat).clamp(-MAX_LATITUDE, MAX_LATITUDE);
        self.position.longitude =
            (self.position.longitude + d_lon).clamp(-MAX_LONGITUDE, MAX_LONGITUDE);

        Some(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::is_valid_coordinate;

    #[test]
    fn test_fixed_position() {
        let mut source = FixedPosition::new(51.5074, -0.1278);
        assert_eq!(source.read(), Some(Position::new(51.5074, -0.1278)));
        assert_eq!(source.read(), Some(Position::new(51.5074, -0.1278)));
    }

    #[test]
    fn test_random_walk_step_is_bounded() {
        let mut source = RandomWalk::with_seed(10.0, 20.0, 0.001, 7);
        let mut previous = Position::new(10.0, 20.0);

        for _ in 0..100 {
            let next = source.read().unwrap();
            assert!((next.latitude - previous.latitude).abs() <= 0.001 + 1e-12);
            assert!((next.longitude - previous.longitude).abs() <= 0.001 + 1e-12);
            previous = next;
        }
    }

    #[test]
    fn test_random_walk_stays_in_range() {
        let mut source = RandomWalk::with_seed(89.99, 179.99, 0.5, 42);

        for _ in 0..200 {
            let position = source.read().unwrap();
            assert!(is_valid_coordinate(position.latitude, position.longitude));
        }
    }

    #[test]
    fn test_random_walk_is_reproducible_with_seed() {
        let mut a = RandomWalk::with_seed(0.0, 0.0, 0.01, 99);
        let mut b = RandomWalk::with_seed(0.0, 0.0, 0.01, 99);

        for _ in 0..10 {
            assert_eq!(a.read(), b.read());
        }
    }

    #[test]
    fn test_zero_step_does_not_move() {
        let mut source = RandomWalk::with_seed(1.0, 2.0, 0.0, 1);
        assert_eq!(source.read(), Some(Position::new(1.0, 2.0)));
    }
}
