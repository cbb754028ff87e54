//! Auto-play timer and pending note requests.
//!
//! [`AutoPlayLoop`] is a self-rearming timer: every tick it reads the
//! backing-loop position, resolves the active progression segment and may
//! ask for one note. [`NoteScheduler`] holds note requests that are due in
//! the future, whether they came from the auto-play loop or from a manual
//! trigger.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::config::GeneratorConfig;
use crate::timeline::ScaleTimeline;
use crate::timing::LoopClock;

/// Upper bound (exclusive) of the random delay before a requested note.
pub const MAX_LEAD_IN: Duration = Duration::from_millis(200);

/// Delay before the first note of a manual progression.
pub const PROGRESSION_OFFSET: Duration = Duration::from_millis(100);

/// Spacing between notes of a manual progression.
pub const PROGRESSION_STEP: Duration = Duration::from_millis(200);

/// Uniform random delay in `[0, MAX_LEAD_IN)`.
pub fn lead_in<R: Rng>(rng: &mut R) -> Duration {
    let micros = MAX_LEAD_IN.as_micros() as u64;
    Duration::from_micros(rng.random_range(0..micros))
}

/// Delays for an `n` note progression: the i-th note waits
/// `100 + 200 * i` ms plus a lead-in, so delays never decrease.
pub fn progression_delays<R: Rng>(count: usize, rng: &mut R) -> Vec<Duration> {
    (0..count)
        .map(|i| PROGRESSION_OFFSET + PROGRESSION_STEP * i as u32 + lead_in(rng))
        .collect()
}

/// Who asked for a note.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteOrigin {
    /// The auto-play loop.
    Auto,
    /// A manual trigger from the control surface.
    Manual,
}

/// A note request waiting for its due time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingNote {
    pub due: Instant,
    pub origin: NoteOrigin,
}

/// Delayed note requests, released in due order.
///
/// Requests cannot be withdrawn once scheduled.
#[derive(Debug, Default)]
pub struct NoteScheduler {
    /// Keyed by due time, then insertion order for equal due times.
    pending: BTreeMap<(Instant, u64), NoteOrigin>,
    next_seq: u64,
}

impl NoteScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: Instant, origin: NoteOrigin) {
        self.pending.insert((due, self.next_seq), origin);
        self.next_seq += 1;
    }

    pub fn schedule_after(&mut self, now: Instant, delay: Duration, origin: NoteOrigin) {
        self.schedule(now + delay, origin);
    }

    /// Schedule an `n` note manual progression. Returns the delays used.
    pub fn schedule_progression<R: Rng>(
        &mut self,
        now: Instant,
        count: usize,
        rng: &mut R,
    ) -> Vec<Duration> {
        let delays = progression_delays(count, rng);
        for delay in &delays {
            self.schedule_after(now, *delay, NoteOrigin::Manual);
        }
        delays
    }

    /// Remove and return every request due at or before `now`.
    pub fn take_due(&mut self, now: Instant) -> Vec<PendingNote> {
        let mut due = Vec::new();
        while let Some(entry) = self.pending.first_entry() {
            let (at, _) = *entry.key();
            if at > now {
                break;
            }
            let origin = entry.remove();
            due.push(PendingNote { due: at, origin });
        }
        due
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.pending.keys().next().map(|(at, _)| *at)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Result of one auto-play tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickOutcome {
    /// Loop-relative position in seconds.
    pub position: f64,
    /// Active progression segment.
    pub segment_index: usize,
    /// The position ran past the loop end; the backing track must restart.
    pub restarted_loop: bool,
    /// Lead-in before a requested note, if this tick asked for one.
    pub note_delay: Option<Duration>,
}

/// Cooperative, self-rearming auto-play timer.
#[derive(Debug)]
pub struct AutoPlayLoop {
    clock: LoopClock,
    next_tick: Option<Instant>,
}

impl AutoPlayLoop {
    pub fn new(loop_duration: f64) -> Self {
        Self {
            clock: LoopClock::new(loop_duration),
            next_tick: None,
        }
    }

    /// Start the loop clock; the first tick is due immediately.
    pub fn start(&mut self, now: Instant) {
        self.clock.restart(now);
        self.next_tick = Some(now);
    }

    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    pub fn next_tick(&self) -> Option<Instant> {
        self.next_tick
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.next_tick.is_some_and(|at| at <= now)
    }

    /// Run one tick and re-arm for `auto_play_interval_ms` later.
    ///
    /// `playhead` is the backing track position reported by the playback
    /// engine, if any; otherwise elapsed wall time is used.
    pub fn tick<R: Rng>(
        &mut self,
        now: Instant,
        playhead: Option<f64>,
        timeline: &ScaleTimeline,
        config: &GeneratorConfig,
        rng: &mut R,
    ) -> TickOutcome {
        let position = self.clock.advance(now, playhead);
        if position.wrapped {
            log::debug!("[AUTOPLAY] backing loop wrapped, restarting");
        }
        let segment_index = timeline.locate(position.seconds);

        let note_delay = if config.auto_play && rng.random::<f64>() < config.auto_play_chance {
            Some(lead_in(rng))
        } else {
            None
        };

        self.next_tick = Some(now + config.auto_play_interval());

        TickOutcome {
            position: position.seconds,
            segment_index,
            restarted_loop: position.wrapped,
            note_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_progression_of_three() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut scheduler = NoteScheduler::new();
        let now = Instant::now();
        let delays = scheduler.schedule_progression(now, 3, &mut rng);

        assert_eq!(delays.len(), 3);
        assert_eq!(scheduler.len(), 3);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        for (i, delay) in delays.iter().enumerate() {
            let floor = Duration::from_millis(100 + 200 * i as u64);
            assert!(*delay >= floor && *delay < floor + MAX_LEAD_IN);
        }
    }

    #[test]
    fn test_progression_delays_never_decrease() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let delays = progression_delays(8, &mut rng);
            assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        }
        assert!(progression_delays(0, &mut rng).is_empty());
    }

    #[test]
    fn test_take_due_releases_in_order() {
        let t0 = Instant::now();
        let mut scheduler = NoteScheduler::new();
        scheduler.schedule(t0 + Duration::from_millis(300), NoteOrigin::Manual);
        scheduler.schedule(t0 + Duration::from_millis(100), NoteOrigin::Auto);
        scheduler.schedule(t0 + Duration::from_millis(100), NoteOrigin::Manual);

        assert!(scheduler.take_due(t0).is_empty());
        assert_eq!(scheduler.next_due(), Some(t0 + Duration::from_millis(100)));

        let due = scheduler.take_due(t0 + Duration::from_millis(150));
        assert_eq!(
            due.iter().map(|n| n.origin).collect::<Vec<_>>(),
            vec![NoteOrigin::Auto, NoteOrigin::Manual]
        );
        assert_eq!(scheduler.len(), 1);

        let due = scheduler.take_due(t0 + Duration::from_secs(1));
        assert_eq!(due.len(), 1);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_tick_rearms_and_resolves_segment() {
        let t0 = Instant::now();
        let timeline = ScaleTimeline::default();
        let config = GeneratorConfig::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut auto = AutoPlayLoop::new(timeline.loop_duration());

        assert!(!auto.is_due(t0));
        auto.start(t0);
        assert!(auto.is_due(t0));

        let later = t0 + Duration::from_secs(5);
        let outcome = auto.tick(later, None, &timeline, &config, &mut rng);
        assert_eq!(outcome.segment_index, 1);
        assert!(!outcome.restarted_loop);
        assert_eq!(auto.next_tick(), Some(later + Duration::from_millis(300)));
        assert!(!auto.is_due(later + Duration::from_millis(299)));
    }

    #[test]
    fn test_tick_reports_wraparound() {
        let t0 = Instant::now();
        let timeline = ScaleTimeline::default();
        let config = GeneratorConfig::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut auto = AutoPlayLoop::new(timeline.loop_duration());
        auto.start(t0);

        let outcome = auto.tick(t0 + Duration::from_secs(28), None, &timeline, &config, &mut rng);
        assert!(outcome.restarted_loop);
        assert_eq!(outcome.position, 0.0);
        assert_eq!(outcome.segment_index, 0);
    }

    #[test]
    fn test_chance_bounds() {
        let t0 = Instant::now();
        let timeline = ScaleTimeline::default();
        let mut rng = StdRng::seed_from_u64(5);
        let mut auto = AutoPlayLoop::new(timeline.loop_duration());
        auto.start(t0);

        let mut always = GeneratorConfig::default();
        always.set_auto_play_chance(1.0).unwrap();
        let mut never = GeneratorConfig::default();
        never.set_auto_play_chance(0.0).unwrap();
        let mut disabled = always.clone();
        disabled.set_auto_play(false);

        for _ in 0..100 {
            let delay = auto.tick(t0, None, &timeline, &always, &mut rng).note_delay;
            assert!(delay.is_some_and(|d| d < MAX_LEAD_IN));
            assert!(auto.tick(t0, None, &timeline, &never, &mut rng).note_delay.is_none());
            assert!(auto.tick(t0, None, &timeline, &disabled, &mut rng).note_delay.is_none());
        }
    }
}
