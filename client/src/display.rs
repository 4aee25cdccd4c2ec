//! Display regions for the ranked roster and the raw GPS dump

use crate::ranking::Ranking;
use log::error;
use shared::GpsRecord;
use std::collections::HashMap;
use std::fmt::Write;

/// The two display regions a session renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    ActiveUsers,
    GpsData,
}

impl Region {
    pub fn id(&self) -> &'static str {
        match self {
            Region::ActiveUsers => "active-users",
            Region::GpsData => "gps-data",
        }
    }
}

/// Somewhere rendered text can be placed
///
/// Each call replaces the region's previous contents entirely.
pub trait Surface {
    fn replace(&mut self, region: Region, content: &str);
}

/// Writes each region update to stdout under a region header
#[derive(Debug, Default)]
pub struct TerminalSurface;

impl Surface for TerminalSurface {
    fn replace(&mut self, region: Region, content: &str) {
        println!("==== {} ====", region.id());
        println!("{}", content);
    }
}

/// Keeps the latest contents of every region in memory
#[derive(Debug, Default, Clone)]
pub struct MemorySurface {
    regions: HashMap<Region, String>,
    writes: usize,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self, region: Region) -> Option<&str> {
        self.regions.get(&region).map(String::as_str)
    }

    /// Total number of replace calls across all regions
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl Surface for MemorySurface {
    fn replace(&mut self, region: Region, content: &str) {
        self.regions.insert(region, content.to_string());
        self.writes += 1;
    }
}

/// Renders a ranking as one line per user in ranked order
pub fn render_roster(ranking: &Ranking, local_user_id: &str) -> String {
    if ranking.is_empty() {
        return "no active users".to_string();
    }

    let mut out = String::new();
    for (rank, user) in ranking.users.iter().enumerate() {
        let distance = match &user.distance {
            Ok(distance) => format!("{:.6}", distance),
            Err(issue) => issue.to_string(),
        };
        let marker = if user.user_id == local_user_id {
            "  (you)"
        } else {
            ""
        };
        let _ = writeln!(out, "{:>3}. {}  {}{}", rank + 1, user.user_id, distance, marker);
    }

    // No trailing newline, the surface decides line endings
    out.pop();
    out
}

/// Pretty-prints the GPS dataset as JSON with two-space indentation
pub fn render_gps_dump(records: &[GpsRecord]) -> String {
    match serde_json::to_string_pretty(records) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to render GPS data: {}", e);
            String::new()
        }
    }
}
