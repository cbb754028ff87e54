//! Loop-relative timekeeping for the backing track.
//!
//! - [`LoopClock`] - tracks where in the backing loop playback currently is
//! - [`LoopPosition`] - one reading of that clock

use std::time::Instant;

/// One reading of the loop clock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoopPosition {
    /// Seconds since the loop (re)started.
    pub seconds: f64,
    /// The reading ran past the loop end and the clock was rewound.
    pub wrapped: bool,
}

/// Position within a fixed-length backing loop.
///
/// The position is taken from the playback engine's playhead when one is
/// reported, otherwise from wall time elapsed since the loop started.
#[derive(Clone, Debug)]
pub struct LoopClock {
    loop_duration: f64,
    started_at: Option<Instant>,
}

impl LoopClock {
    /// Create a stopped clock for a loop of `loop_duration` seconds.
    pub fn new(loop_duration: f64) -> Self {
        Self {
            loop_duration,
            started_at: None,
        }
    }

    pub fn loop_duration(&self) -> f64 {
        self.loop_duration
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Start (or restart) the loop at `now`.
    pub fn restart(&mut self, now: Instant) {
        self.started_at = Some(now);
    }

    /// Seconds into the loop without wrapping. Zero while stopped.
    pub fn elapsed(&self, now: Instant) -> f64 {
        self.started_at
            .map(|start| now.saturating_duration_since(start).as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Read the position, rewinding to 0 when it has run past the loop end.
    ///
    /// A `wrapped` reading means the caller must restart the backing track.
    pub fn advance(&mut self, now: Instant, playhead: Option<f64>) -> LoopPosition {
        let seconds = match playhead {
            Some(p) if p.is_finite() => p,
            _ => self.elapsed(now),
        };
        if seconds > self.loop_duration {
            self.restart(now);
            LoopPosition {
                seconds: 0.0,
                wrapped: true,
            }
        } else {
            LoopPosition {
                seconds,
                wrapped: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_stopped_clock_reads_zero() {
        let clock = LoopClock::new(10.0);
        assert!(!clock.is_running());
        assert_eq!(clock.elapsed(Instant::now()), 0.0);
    }

    #[test]
    fn test_elapsed_time_drives_position() {
        let t0 = Instant::now();
        let mut clock = LoopClock::new(10.0);
        clock.restart(t0);
        let pos = clock.advance(t0 + Duration::from_millis(2500), None);
        assert!((pos.seconds - 2.5).abs() < 1e-6);
        assert!(!pos.wrapped);
    }

    #[test]
    fn test_wraps_past_loop_end() {
        let t0 = Instant::now();
        let mut clock = LoopClock::new(10.0);
        clock.restart(t0);
        let later = t0 + Duration::from_millis(10_300);
        let pos = clock.advance(later, None);
        assert!(pos.wrapped);
        assert_eq!(pos.seconds, 0.0);
        // Clock was rewound to `later`
        let pos = clock.advance(later + Duration::from_secs(1), None);
        assert!((pos.seconds - 1.0).abs() < 1e-6);
        assert!(!pos.wrapped);
    }

    #[test]
    fn test_playhead_overrides_wall_time() {
        let t0 = Instant::now();
        let mut clock = LoopClock::new(10.0);
        clock.restart(t0);
        let pos = clock.advance(t0 + Duration::from_secs(5), Some(1.25));
        assert_eq!(pos.seconds, 1.25);

        let pos = clock.advance(t0 + Duration::from_secs(5), Some(f64::NAN));
        assert!((pos.seconds - 5.0).abs() < 1e-6);
    }
}
