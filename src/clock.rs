//! World tick clock
//!
//! A single logical clock drives every block mover so animations advance on
//! tick boundaries only. The clock is either advanced by the host (one call per
//! world tick) or by [`TickClock::start`], which ticks on a timer.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Tick counter shared by every block mover
#[derive(Debug, Clone)]
pub struct TickClock {
    tx: Arc<watch::Sender<u64>>,
    tick_rate: u32,
}

impl TickClock {
    /// Create a clock at tick 0 running `tick_rate` ticks per second
    pub fn new(tick_rate: u32) -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            tx: Arc::new(tx),
            tick_rate: tick_rate.max(1),
        }
    }

    /// Ticks per second
    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    /// Length of one tick
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate as f64)
    }

    /// Current tick number
    pub fn current_tick(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Advance by one tick and return the new tick number
    pub fn advance(&self) -> u64 {
        let mut now = 0;
        self.tx.send_modify(|tick| {
            *tick += 1;
            now = *tick;
        });
        now
    }

    /// Subscribe to tick updates
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    /// Convert seconds to a tick count, rounding up
    pub fn secs_to_ticks(&self, secs: f64) -> u64 {
        (secs.max(0.0) * self.tick_rate as f64).ceil() as u64
    }

    /// Wait until `ticks` more ticks have passed
    pub async fn wait_ticks(&self, ticks: u64) {
        self.wait_until(self.current_tick().saturating_add(ticks)).await;
    }

    /// Wait until the clock reaches `tick`
    pub async fn wait_until(&self, tick: u64) {
        let mut rx = self.subscribe();
        // The sender lives as long as any clone of the clock, including self.
        let _ = rx.wait_for(|now| *now >= tick).await;
    }

    /// Tick on a timer until the returned task is aborted
    pub fn start(&self) -> JoinHandle<()> {
        let clock = self.clone();
        let period = self.tick_duration();
        debug!(tick_rate = self.tick_rate, "Starting tick clock");
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first interval tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                clock.advance();
            }
        })
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new(20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_advance() {
        let clock = TickClock::new(20);
        let rx = clock.subscribe();
        assert_eq!(clock.advance(), 1);
        assert_eq!(clock.advance(), 2);
        assert_eq!(*rx.borrow(), 2);
        assert_eq!(clock.current_tick(), 2);
    }

    #[test]
    fn test_secs_to_ticks() {
        let clock = TickClock::new(20);
        assert_eq!(clock.secs_to_ticks(1.0), 20);
        assert_eq!(clock.secs_to_ticks(0.26), 6);
        assert_eq!(clock.secs_to_ticks(-3.0), 0);
        assert_eq!(clock.tick_duration(), Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_clock_ticks() {
        let clock = TickClock::new(20);
        let task = clock.start();
        clock.wait_ticks(10).await;
        assert!(clock.current_tick() >= 10);
        task.abort();
    }

    #[tokio::test]
    async fn test_wait_until_past_tick_returns() {
        let clock = TickClock::new(20);
        clock.advance();
        clock.advance();
        clock.wait_until(1).await;
    }

    #[tokio::test]
    async fn test_wait_ticks_zero_returns() {
        let clock = TickClock::new(20);
        clock.wait_ticks(0).await;
        assert_eq!(clock.current_tick(), 0);
    }
}
