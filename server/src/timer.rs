//! Per-round countdown ticks
//!
//! The timer never touches room state. It only queues `ServerEvent::TimerTick` into
//! the server event loop, tagged with the generation it was started under, and the
//! room drops any tick whose generation is no longer current.

use crate::network::ServerEvent;
use log::debug;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Identifies one started countdown
pub type RoundId = u64;

pub struct RoundTimer {
    events: mpsc::UnboundedSender<ServerEvent>,
    period: Duration,
    generation: RoundId,
    handle: Option<JoinHandle<()>>,
}

impl RoundTimer {
    pub fn new(events: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self::with_period(events, Duration::from_secs(1))
    }

    pub fn with_period(events: mpsc::UnboundedSender<ServerEvent>, period: Duration) -> Self {
        Self {
            events,
            period,
            generation: 0,
            handle: None,
        }
    }

    /// Starts a fresh countdown, replacing any running one
    pub fn start(&mut self) -> RoundId {
        self.stop();
        self.generation += 1;
        let round = self.generation;

        let events = self.events.clone();
        let period = self.period;
        self.handle = Some(tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticks.tick().await;
                if events.send(ServerEvent::TimerTick { round }).is_err() {
                    debug!("Event loop gone, timer for round {} exits", round);
                    break;
                }
            }
        }));

        debug!("Round timer {} started", round);
        round
    }

    /// Stops ticking. Ticks already queued by this generation become stale.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("Round timer {} stopped", self.generation);
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Generation of the running countdown, if any
    pub fn current(&self) -> Option<RoundId> {
        self.is_running().then_some(self.generation)
    }

    /// True if `round` belongs to the countdown that is running right now
    pub fn is_current(&self, round: RoundId) -> bool {
        self.is_running() && round == self.generation
    }
}

impl Drop for RoundTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn assert_elapsed(started: Instant, expected: Duration) {
        let elapsed = started.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(50),
            "expected ~{:?}, got {:?}",
            expected,
            elapsed
        );
    }

    async fn next_tick(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> RoundId {
        match rx.recv().await {
            Some(ServerEvent::TimerTick { round }) => round,
            other => panic!("Expected a timer tick, got {:?}", other),
        }
    }

    /// First tick after one period, then one per period
    #[tokio::test(start_paused = true)]
    async fn test_ticks_once_per_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = RoundTimer::new(tx);

        let started = Instant::now();
        let round = timer.start();

        assert_eq!(next_tick(&mut rx).await, round);
        assert_elapsed(started, Duration::from_secs(1));
        assert_eq!(next_tick(&mut rx).await, round);
        assert_elapsed(started, Duration::from_secs(2));
    }

    /// Restarting leaves exactly one live countdown
    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_previous_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = RoundTimer::new(tx);

        let first = timer.start();
        let second = timer.start();

        assert_ne!(first, second);
        assert!(!timer.is_current(first));
        assert!(timer.is_current(second));

        // Only one live instance: every tick belongs to the second round and
        // ticks arrive one period apart rather than doubled up
        let started = Instant::now();
        for n in 1..=3 {
            assert_eq!(next_tick(&mut rx).await, second);
            assert_elapsed(started, Duration::from_secs(n));
        }
    }

    /// No ticks arrive after stop
    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_ticks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = RoundTimer::new(tx);

        let round = timer.start();
        assert_eq!(next_tick(&mut rx).await, round);

        timer.stop();
        assert!(!timer.is_running());
        assert!(!timer.is_current(round));

        let waited = timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(waited.is_err(), "No tick expected after stop");
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = RoundTimer::with_period(tx, Duration::from_millis(250));

        let started = Instant::now();
        timer.start();
        next_tick(&mut rx).await;

        assert_elapsed(started, Duration::from_millis(250));
    }
}
