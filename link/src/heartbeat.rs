//! Liveness pings for a connected channel.

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::models::OutboundMessage;
use crate::transport::Channel;

/// Current time in millis since Unix epoch.
#[inline]
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Owns the single heartbeat timer of a client.
///
/// The monitor only keeps time; the connection task awaits
/// [`tick`](Self::tick) and then calls [`beat`](Self::beat) with the
/// current channel.
#[derive(Debug, Default)]
pub struct HeartbeatMonitor {
    ticker: Option<Interval>,
    interval: Duration,
    last_beat_at_ms: Option<u64>,
}

impl HeartbeatMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a recurring timer, replacing any running one. The first tick is
    /// one full `interval` from now. A zero interval leaves the monitor
    /// stopped.
    pub fn start(&mut self, interval: Duration) {
        self.stop();
        if interval.is_zero() {
            log::debug!("[feed-link] Heartbeat disabled");
            return;
        }
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
        self.interval = interval;
    }

    /// Cancel the timer. Safe to call when nothing is running.
    pub fn stop(&mut self) {
        self.ticker = None;
    }

    pub fn is_active(&self) -> bool {
        self.ticker.is_some()
    }

    /// Period of the running timer, if any.
    pub fn interval(&self) -> Option<Duration> {
        self.ticker.as_ref().map(|_| self.interval)
    }

    /// Resolve on the next tick. Never resolves while stopped.
    pub async fn tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            },
            None => std::future::pending::<()>().await,
        }
    }

    /// Send one liveness message on `channel`.
    ///
    /// Returns whether the beat was sent; on success the beat time is
    /// available from [`last_beat_at_ms`](Self::last_beat_at_ms). Send
    /// failures are logged and swallowed; the channel reports real breakage
    /// on its own.
    pub async fn beat(&mut self, channel: &mut dyn Channel) -> bool {
        match channel.send(OutboundMessage::Heartbeat).await {
            Ok(()) => {
                self.last_beat_at_ms = Some(now_ms());
                true
            },
            Err(e) => {
                log::debug!("[feed-link] Heartbeat send failed: {}", e);
                false
            },
        }
    }

    /// Time of the last successful beat, in millis since Unix epoch.
    pub fn last_beat_at_ms(&self) -> Option<u64> {
        self.last_beat_at_ms
    }
}
