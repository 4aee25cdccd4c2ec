//! Proximity ranker and poller
//!
//! A [`Session`] owns everything the roster view needs for one connection:
//! the local user id, the cached GPS dataset, the latest ranking, the poll
//! timers and the display surface. Inbound channel events are fed in through
//! [`Session::handle_packet`]; outbound requests are queued on an unbounded
//! channel that the network layer drains into the socket.
//!
//! All handlers run to completion on the caller's task, so the GPS cache is
//! never observed half-updated. Poll timers only send [`PollTick`] messages
//! back, which the owner passes to [`Session::on_poll_tick`].

use crate::display::{render_gps_dump, render_roster, Region, Surface};
use crate::gps::GpsSource;
use crate::ranking::{rank_active_users, Ranking};
use crate::scheduler::{PollScheduler, PollTick};
use log::{debug, error, info, warn};
use shared::{timestamp_millis, GpsRecord, Packet, TrackPoint, UserRef};
use std::time::Duration;
use tokio::sync::mpsc;

/// Extension point for `track_info` events
///
/// Called with the user id the metadata belongs to and the recorded track
/// points. Implementations must not block; they run on the session task.
pub trait TrackInfoHandler: Send {
    fn on_track_info(&mut self, user_id: &str, points: &[TrackPoint]);
}

/// Default handler: accepts track metadata and does nothing with it
#[derive(Debug, Default)]
pub struct IgnoreTrackInfo;

impl TrackInfoHandler for IgnoreTrackInfo {
    fn on_track_info(&mut self, user_id: &str, points: &[TrackPoint]) {
        debug!(
            "Ignoring track info for {} ({} points)",
            user_id,
            points.len()
        );
    }
}

pub struct Session<S: Surface> {
    local_user_id: String,
    gps_cache: Option<Vec<GpsRecord>>,
    ranking: Ranking,
    outbound: mpsc::UnboundedSender<Packet>,
    scheduler: PollScheduler,
    surface: S,
    gps_source: Option<Box<dyn GpsSource>>,
    track_handler: Box<dyn TrackInfoHandler>,
}

impl<S: Surface> Session<S> {
    /// Creates a session for `local_user_id`
    ///
    /// `outbound` receives every packet the session wants sent upstream and
    /// `ticks` receives the poll timer ticks, firing every `poll_interval`.
    pub fn new(
        local_user_id: impl Into<String>,
        poll_interval: Duration,
        surface: S,
        outbound: mpsc::UnboundedSender<Packet>,
        ticks: mpsc::UnboundedSender<PollTick>,
    ) -> Self {
        Self {
            local_user_id: local_user_id.into(),
            gps_cache: None,
            ranking: Ranking::default(),
            outbound,
            scheduler: PollScheduler::new(poll_interval, ticks),
            surface,
            gps_source: None,
            track_handler: Box::new(IgnoreTrackInfo),
        }
    }

    pub fn set_gps_source(&mut self, source: Box<dyn GpsSource>) {
        self.gps_source = Some(source);
    }

    pub fn set_track_handler(&mut self, handler: Box<dyn TrackInfoHandler>) {
        self.track_handler = handler;
    }

    pub fn local_user_id(&self) -> &str {
        &self.local_user_id
    }

    /// Cached GPS dataset, None until the first `update_gps` event
    pub fn gps_data(&self) -> Option<&[GpsRecord]> {
        self.gps_cache.as_deref()
    }

    pub fn ranking(&self) -> &Ranking {
        &self.ranking
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn scheduled_users(&self) -> Vec<String> {
        self.scheduler.scheduled_users()
    }

    /// Dispatches an inbound channel event
    ///
    /// Returns false when the packet is not a roster, GPS or track event.
    pub fn handle_packet(&mut self, packet: Packet) -> bool {
        match packet {
            Packet::UpdateActiveUsers { users } => {
                self.on_roster_update(users);
            }
            Packet::UpdateGps { records } => {
                self.on_gps_update(records);
            }
            Packet::TrackInfo { user_id, points } => {
                self.on_track_info(&user_id, &points);
            }
            other => {
                warn!("Session ignoring unexpected {} event", other.event_name());
                return false;
            }
        }
        true
    }

    /// Ranks the new roster, renders it and reconciles the poll timers
    pub fn on_roster_update(&mut self, users: Vec<UserRef>) -> &Ranking {
        let gps_data: &[GpsRecord] = match &self.gps_cache {
            Some(records) => records,
            None => {
                warn!("Roster update received before any GPS data");
                &[]
            }
        };

        let ranking = rank_active_users(&users, gps_data, &self.local_user_id);

        for (user_id, issue) in ranking.flagged() {
            warn!("Active user {}: {}", user_id, issue);
        }

        self.surface.replace(
            Region::ActiveUsers,
            &render_roster(&ranking, &self.local_user_id),
        );

        let summary = self.scheduler.reconcile(&ranking.user_ids());
        info!(
            "Ranked {} active users ({} new timers, {} cancelled)",
            ranking.len(),
            summary.armed,
            summary.cancelled
        );

        self.ranking = ranking;
        &self.ranking
    }

    /// Replaces the cached GPS dataset and renders it as pretty JSON
    pub fn on_gps_update(&mut self, records: Vec<GpsRecord>) {
        debug!("GPS dataset updated with {} records", records.len());
        self.surface
            .replace(Region::GpsData, &render_gps_dump(&records));
        self.gps_cache = Some(records);
    }

    pub fn on_track_info(&mut self, user_id: &str, points: &[TrackPoint]) {
        self.track_handler.on_track_info(user_id, points);
    }

    /// Runs one poll for the user owning `tick`
    ///
    /// Ticks from timers cancelled after they fired are dropped.
    pub fn on_poll_tick(&mut self, tick: PollTick) {
        if !self.scheduler.is_current(&tick) {
            debug!("Dropping stale poll tick for {}", tick.user_id);
            return;
        }

        self.request_track_info(&tick.user_id);
        self.push_local_gps();
    }

    /// Asks the server for the track metadata of `user_id`
    pub fn request_track_info(&self, user_id: &str) {
        self.emit(Packet::FindTracks {
            user_id: user_id.to_string(),
        });
    }

    /// Asks the server to take the local GPS reading
    ///
    /// When a GPS source is attached its current reading goes out as a
    /// `gps_data` report right after the `send_gps` request.
    pub fn push_local_gps(&mut self) {
        self.emit(Packet::SendGps);

        let reading = self.gps_source.as_mut().and_then(|source| source.read());
        if let Some(position) = reading {
            self.emit(Packet::GpsData {
                user_id: self.local_user_id.clone(),
                latitude: position.latitude,
                longitude: position.longitude,
                timestamp: timestamp_millis(),
            });
        }
    }

    /// Cancels every poll timer
    pub fn shutdown(&mut self) {
        let timers = self.scheduler.len();
        self.scheduler.cancel_all();
        info!("Session for {} shut down ({} timers cancelled)", self.local_user_id, timers);
    }

    fn emit(&self, packet: Packet) {
        let event = packet.event_name();
        if self.outbound.send(packet).is_err() {
            error!("Failed to queue {} event: transport closed", event);
        }
    }
}
