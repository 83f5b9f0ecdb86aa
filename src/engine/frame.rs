//! Frame clocks: the source of the coordinator loop's frame pulses.
//!
//! Awaiting the next frame is the loop's only suspension point. A clock that returns `None`
//! is closed and the loop stops.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use crate::engine::config::CoordinatorConfig;

/// Monotonic timestamp of a frame, relative to the clock's origin.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameTime(Duration);

impl FrameTime {
    pub fn from_nanos(nanos: u64) -> Self {
        Self(Duration::from_nanos(nanos))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn as_nanos(&self) -> u128 {
        self.0.as_nanos()
    }
}

impl From<Duration> for FrameTime {
    fn from(d: Duration) -> Self {
        Self(d)
    }
}

/// The host's frame clock.
pub trait FrameClock: Send + 'static {
    /// Waits for the next frame pulse. `None` means the clock is closed and no further frame
    /// will come.
    fn next_frame(&mut self) -> impl Future<Output = Option<FrameTime>> + Send;
}

/// Fixed cadence clock built on a tokio interval. Missed ticks are skipped, never bunched up.
///
/// Must be created from within a tokio runtime.
pub struct IntervalFrameClock {
    interval: Interval,
    origin: Instant,
}

impl IntervalFrameClock {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            interval,
            origin: Instant::now(),
        }
    }

    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self::new(config.frame_interval())
    }
}

impl FrameClock for IntervalFrameClock {
    async fn next_frame(&mut self) -> Option<FrameTime> {
        let tick = self.interval.tick().await;
        Some(FrameTime(tick.saturating_duration_since(self.origin)))
    }
}

/// Clock driven by explicit pulses from a [`FramePulser`], for hosts that receive a vsync
/// callback of their own.
///
/// The clock closes once every pulser has been dropped. Timestamps never go backwards: a pulse
/// older than the previous one is delivered with the previous timestamp.
pub struct ManualFrameClock {
    rx: mpsc::UnboundedReceiver<FrameTime>,
    last: FrameTime,
}

/// Sending half of a [`ManualFrameClock`]. Cheap to clone; pulsing never blocks.
#[derive(Clone)]
pub struct FramePulser {
    tx: mpsc::UnboundedSender<FrameTime>,
    origin: std::time::Instant,
}

impl ManualFrameClock {
    pub fn new() -> (Self, FramePulser) {
        let (tx, rx) = mpsc::unbounded_channel();
        let clock = Self {
            rx,
            last: FrameTime::default(),
        };
        let pulser = FramePulser {
            tx,
            origin: std::time::Instant::now(),
        };
        (clock, pulser)
    }
}

impl FrameClock for ManualFrameClock {
    async fn next_frame(&mut self) -> Option<FrameTime> {
        let frame = self.rx.recv().await?;
        self.last = self.last.max(frame);
        Some(self.last)
    }
}

impl FramePulser {
    /// Fires a frame stamped with the time elapsed since the pulser was created. Returns
    /// `false` when the clock is gone.
    pub fn pulse(&self) -> bool {
        self.pulse_at(FrameTime(self.origin.elapsed()))
    }

    /// Fires a frame with an explicit timestamp.
    pub fn pulse_at(&self, frame: FrameTime) -> bool {
        self.tx.send(frame).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manual_clock_delivers_pulses_in_order() {
        let (mut clock, pulser) = ManualFrameClock::new();
        assert!(pulser.pulse_at(FrameTime::from_nanos(10)));
        assert!(pulser.pulse_at(FrameTime::from_nanos(20)));

        assert_eq!(clock.next_frame().await, Some(FrameTime::from_nanos(10)));
        assert_eq!(clock.next_frame().await, Some(FrameTime::from_nanos(20)));
    }

    #[tokio::test]
    async fn manual_clock_never_goes_backwards() {
        let (mut clock, pulser) = ManualFrameClock::new();
        pulser.pulse_at(FrameTime::from_nanos(50));
        pulser.pulse_at(FrameTime::from_nanos(30));

        assert_eq!(clock.next_frame().await, Some(FrameTime::from_nanos(50)));
        assert_eq!(clock.next_frame().await, Some(FrameTime::from_nanos(50)));
    }

    #[tokio::test]
    async fn manual_clock_closes_when_pulsers_drop() {
        let (mut clock, pulser) = ManualFrameClock::new();
        let second = pulser.clone();
        pulser.pulse();
        drop(pulser);
        drop(second);

        assert!(clock.next_frame().await.is_some());
        assert_eq!(clock.next_frame().await, None);
    }

    #[tokio::test]
    async fn pulser_notices_dropped_clock() {
        let (clock, pulser) = ManualFrameClock::new();
        drop(clock);
        assert!(pulser.is_closed());
        assert!(!pulser.pulse());
    }

    #[tokio::test]
    async fn interval_clock_is_monotonic() {
        let mut clock = IntervalFrameClock::new(Duration::from_millis(1));
        let mut previous = clock.next_frame().await.unwrap();
        for _ in 0..3 {
            let next = clock.next_frame().await.unwrap();
            assert!(next >= previous);
            previous = next;
        }
    }
}
