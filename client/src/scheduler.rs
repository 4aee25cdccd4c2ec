//! Per-user poll timers
//!
//! Every active user owns at most one recurring timer. A timer does no work
//! itself: on each tick it sends a [`PollTick`] back to the session loop, which
//! performs the track lookup and GPS push on its own task.

use log::debug;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Tick emitted by a user's poll timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTick {
    pub user_id: String,
    /// Identifies the timer that fired; a re-armed user gets a new generation
    pub generation: u64,
}

/// Outcome of a [`PollScheduler::reconcile`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileSummary {
    pub armed: usize,
    pub cancelled: usize,
    pub kept: usize,
}

/// Tracks one timer handle per user id
///
/// Must be used from within a tokio runtime since arming a timer spawns a task.
/// Dropping the scheduler cancels every timer.
pub struct PollScheduler {
    period: Duration,
    tick_tx: mpsc::UnboundedSender<PollTick>,
    timers: HashMap<String, Timer>,
    next_generation: u64,
}

struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

impl PollScheduler {
    pub fn new(period: Duration, tick_tx: mpsc::UnboundedSender<PollTick>) -> Self {
        Self {
            period,
            tick_tx,
            timers: HashMap::new(),
            next_generation: 1,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Makes the armed timers match `user_ids` exactly
    ///
    /// Timers of users no longer listed are cancelled, users already armed keep
    /// their running timer and new users get a fresh one. Repeated ids arm a
    /// single timer.
    pub fn reconcile(&mut self, user_ids: &[String]) -> ReconcileSummary {
        let wanted: HashSet<&str> = user_ids.iter().map(String::as_str).collect();

        let stale: Vec<String> = self
            .timers
            .keys()
            .filter(|user_id| !wanted.contains(user_id.as_str()))
            .cloned()
            .collect();

        let mut summary = ReconcileSummary::default();
        for user_id in &stale {
            if self.cancel(user_id) {
                summary.cancelled += 1;
            }
        }

        for user_id in user_ids {
            match self.timers.get(user_id) {
                Some(timer) if !timer.handle.is_finished() => summary.kept += 1,
                _ => {
                    self.arm(user_id);
                    summary.armed += 1;
                }
            }
        }

        debug!(
            "Poll timers reconciled: {} armed, {} kept, {} cancelled",
            summary.armed, summary.kept, summary.cancelled
        );

        summary
    }

    fn arm(&mut self, user_id: &str) {
        let period = self.period;
        let tick_tx = self.tick_tx.clone();
        let owner = user_id.to_string();
        let generation = self.next_generation;
        self.next_generation += 1;

        let handle = tokio::spawn(async move {
            // First tick one full period after arming, like a browser interval
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                timer.tick().await;
                let tick = PollTick {
                    user_id: owner.clone(),
                    generation,
                };
                if tick_tx.send(tick).is_err() {
                    break;
                }
            }
        });

        let timer = Timer { generation, handle };
        if let Some(previous) = self.timers.insert(user_id.to_string(), timer) {
            previous.handle.abort();
        }
    }

    /// Cancels the timer of one user, returning false if none was armed
    pub fn cancel(&mut self, user_id: &str) -> bool {
        match self.timers.remove(user_id) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
    }

    pub fn is_scheduled(&self, user_id: &str) -> bool {
        self.timers
            .get(user_id)
            .map(|timer| !timer.handle.is_finished())
            .unwrap_or(false)
    }

    /// Whether `tick` came from the timer currently armed for its user
    ///
    /// False for ticks queued by a timer that has since been cancelled, even
    /// when the same user was armed again afterwards.
    pub fn is_current(&self, tick: &PollTick) -> bool {
        self.timers
            .get(&tick.user_id)
            .map(|timer| timer.generation == tick.generation && !timer.handle.is_finished())
            .unwrap_or(false)
    }

    /// User ids with an armed timer, sorted
    pub fn scheduled_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.timers.keys().cloned().collect();
        users.sort();
        users
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout};

    const PERIOD: Duration = Duration::from_millis(5000);

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<PollTick>) -> Vec<String> {
        let mut ticks = Vec::new();
        while let Ok(tick) = rx.try_recv() {
            ticks.push(tick.user_id);
        }
        ticks.sort();
        ticks
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_full_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = PollScheduler::new(PERIOD, tx);

        scheduler.reconcile(&ids(&["alice"]));

        let early = timeout(PERIOD - Duration::from_millis(1), rx.recv()).await;
        assert!(early.is_err(), "timer fired before its period elapsed");

        let tick = rx.recv().await.unwrap();
        assert_eq!(tick.user_id, "alice");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_repeats() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = PollScheduler::new(PERIOD, tx);

        scheduler.reconcile(&ids(&["alice"]));
        sleep(PERIOD * 3 + Duration::from_millis(100)).await;

        assert_eq!(drain(&mut rx), ids(&["alice", "alice", "alice"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_roster_keeps_one_timer_per_user() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = PollScheduler::new(PERIOD, tx);

        let first = scheduler.reconcile(&ids(&["alice", "bob"]));
        let second = scheduler.reconcile(&ids(&["bob", "alice"]));

        assert_eq!(first.armed, 2);
        assert_eq!(second.armed, 0);
        assert_eq!(second.kept, 2);
        assert_eq!(scheduler.len(), 2);

        sleep(PERIOD + Duration::from_millis(100)).await;
        assert_eq!(drain(&mut rx), ids(&["alice", "bob"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_ids_arm_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = PollScheduler::new(PERIOD, tx);

        let summary = scheduler.reconcile(&ids(&["alice", "alice"]));
        assert_eq!(summary.armed, 1);
        assert_eq!(scheduler.len(), 1);

        sleep(PERIOD + Duration::from_millis(100)).await;
        assert_eq!(drain(&mut rx), ids(&["alice"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_departed_users_are_cancelled() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = PollScheduler::new(PERIOD, tx);

        scheduler.reconcile(&ids(&["alice", "bob"]));
        let summary = scheduler.reconcile(&ids(&["bob", "carol"]));

        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.armed, 1);
        assert_eq!(summary.kept, 1);
        assert!(!scheduler.is_scheduled("alice"));
        assert_eq!(scheduler.scheduled_users(), ids(&["bob", "carol"]));

        sleep(PERIOD + Duration::from_millis(100)).await;
        assert_eq!(drain(&mut rx), ids(&["bob", "carol"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_stops_ticks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = PollScheduler::new(PERIOD, tx);

        scheduler.reconcile(&ids(&["alice", "bob"]));
        scheduler.cancel_all();
        assert!(scheduler.is_empty());

        sleep(PERIOD * 2).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_timers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let mut scheduler = PollScheduler::new(PERIOD, tx);
            scheduler.reconcile(&ids(&["alice"]));
        }

        sleep(PERIOD * 2).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_from_cancelled_timer_are_not_current() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = PollScheduler::new(PERIOD, tx);

        scheduler.reconcile(&ids(&["alice"]));
        sleep(PERIOD + Duration::from_millis(100)).await;
        let queued = rx.try_recv().unwrap();
        assert!(scheduler.is_current(&queued));

        // Alice leaves and rejoins before the queued tick is handled
        scheduler.reconcile(&[]);
        scheduler.reconcile(&ids(&["alice"]));

        assert!(scheduler.is_scheduled("alice"));
        assert!(!scheduler.is_current(&queued));

        sleep(PERIOD + Duration::from_millis(100)).await;
        let fresh = rx.try_recv().unwrap();
        assert!(scheduler.is_current(&fresh));
        assert_ne!(fresh.generation, queued.generation);
    }

    #[tokio::test]
    async fn test_cancel_unknown_user() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut scheduler = PollScheduler::new(PERIOD, tx);
        assert!(!scheduler.cancel("nobody"));
    }
}
