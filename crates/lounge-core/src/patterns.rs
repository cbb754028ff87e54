//! Melodic contour patterns and the cursor that walks them.
//!
//! Patterns are absolute pitches written against C; the active scale nudges
//! them into key at selection time. A cursor keeps playing one pattern until
//! it goes stale, which is the engine's way of developing one idea before
//! moving to the next.

use std::time::{Duration, Instant};

use rand::Rng;

/// A pattern goes stale when no note was emitted for this long.
pub const STALE_AFTER: Duration = Duration::from_millis(900);

/// A pattern goes stale once more than this many notes came from it.
pub const MAX_NOTES_PER_PATTERN: u32 = 30;

/// The fixed pattern library.
pub static PATTERNS: [&[i32]; 9] = [
    &[
        71, 72, 69, 71, 67, 69, 64, 67, 62, 64, 62, 60, 59, 60, 62, 64, 65, 67, 69, 71, 67, 64,
        62, 60, 59, 60, 57, 59, 55,
    ],
    &[83, 88, 86, 81, 79, 83, 81, 76, 74, 79, 76, 72, 71, 72, 69, 67],
    &[
        74, 72, 70, 69, 70, 67, 69, 65, 67, 62, 65, 63, 67, 70, 74, 77, 74, 77, 74, 72, 70, 69,
        70, 67, 69, 65,
    ],
    &[
        69, 74, 72, 67, 64, 69, 67, 62, 60, 64, 62, 57, 55, 60, 57, 53, 55, 57, 60, 62, 64, 65,
        67, 62, 65, 64, 62, 64, 62, 60, 59,
    ],
    &[
        59, 60, 64, 67, 71, 72, 76, 79, 83, 84, 88, 91, 95, 98, 95, 98, 95, 91, 88, 91, 88, 84,
        83, 86, 83, 79, 76, 79, 76, 72, 71, 74, 71, 67, 64, 67, 64, 60, 59, 55,
    ],
    &[
        91, 86, 88, 84, 83, 86, 83, 79, 76, 79, 76, 72, 71, 74, 71, 67, 64, 67, 64, 60, 59, 60,
        64, 67, 71, 72, 74, 76, 79, 74, 76, 71, 72, 67,
    ],
    &[
        67, 65, 64, 65, 69, 72, 76, 79, 77, 76, 74, 76, 72, 71, 74, 71, 72, 67, 64, 67, 62, 60,
    ],
    &[
        65, 67, 65, 64, 65, 67, 69, 71, 72, 74, 76, 77, 79, 81, 83, 84, 86, 88, 89, 91, 93, 91,
        88, 86, 88, 86, 84, 83, 84, 79, 81, 76, 79, 74, 76, 72, 71, 71, 72, 67,
    ],
    &[
        55, 59, 60, 62, 67, 71, 72, 76, 79, 83, 86, 88, 93, 91, 88, 84, 81, 79, 77, 76, 74, 72,
        71,
    ],
];

/// Position within the pattern library.
///
/// `step` is always a valid index into the active pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatternCursor {
    pattern: usize,
    step: usize,
}

impl Default for PatternCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternCursor {
    /// Cursor at the start of the first pattern.
    pub fn new() -> Self {
        Self { pattern: 0, step: 0 }
    }

    /// Cursor at a specific pattern and step. Out-of-range values wrap.
    pub fn at(pattern: usize, step: usize) -> Self {
        let pattern = pattern % PATTERNS.len();
        Self {
            pattern,
            step: step % PATTERNS[pattern].len(),
        }
    }

    /// Index of the active pattern.
    pub fn pattern_index(&self) -> usize {
        self.pattern
    }

    /// Index of the next step to be read.
    pub fn step(&self) -> usize {
        self.step
    }

    /// The active pattern's pitches.
    pub fn pattern(&self) -> &'static [i32] {
        PATTERNS[self.pattern]
    }

    /// Switch to a uniformly random pattern and rewind.
    pub fn change_pattern<R: Rng>(&mut self, rng: &mut R) {
        self.pattern = rng.random_range(0..PATTERNS.len());
        self.step = 0;
        log::trace!("[PATTERN] switched to pattern {}", self.pattern);
    }

    /// Read the raw pitch under the cursor and advance, wrapping at the end.
    pub fn advance(&mut self) -> i32 {
        let pattern = self.pattern();
        let pitch = pattern[self.step];
        self.step = (self.step + 1) % pattern.len();
        pitch
    }
}

/// Whether the current pattern has run long enough to switch.
///
/// A cursor that has never emitted is always stale, so the first note picks
/// a random pattern.
pub fn is_stale(last_emit: Option<Instant>, notes_since_change: u32, now: Instant) -> bool {
    let idle_too_long = match last_emit {
        Some(at) => now.saturating_duration_since(at) > STALE_AFTER,
        None => true,
    };
    idle_too_long || notes_since_change > MAX_NOTES_PER_PATTERN
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_pattern_lengths() {
        for pattern in PATTERNS.iter() {
            assert!((16..=40).contains(&pattern.len()), "len {}", pattern.len());
        }
    }

    #[test]
    fn test_advance_wraps_at_pattern_end() {
        let mut cursor = PatternCursor::at(1, 15);
        assert_eq!(cursor.advance(), 67);
        assert_eq!(cursor.step(), 0);
        assert_eq!(cursor.advance(), 83);
    }

    #[test]
    fn test_cursor_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut cursor = PatternCursor::new();
        for i in 0..2000 {
            if i % 37 == 0 {
                cursor.change_pattern(&mut rng);
                assert_eq!(cursor.step(), 0);
            }
            cursor.advance();
            assert!(cursor.step() < cursor.pattern().len());
        }
    }

    #[test]
    fn test_at_wraps_out_of_range() {
        let cursor = PatternCursor::at(PATTERNS.len() + 2, 1000);
        assert_eq!(cursor.pattern_index(), 2);
        assert!(cursor.step() < PATTERNS[2].len());
    }

    #[test]
    fn test_staleness() {
        let t0 = Instant::now();
        assert!(is_stale(None, 0, t0));
        assert!(!is_stale(Some(t0), 0, t0 + Duration::from_millis(900)));
        assert!(is_stale(Some(t0), 0, t0 + Duration::from_millis(901)));
        assert!(!is_stale(Some(t0), 30, t0));
        assert!(is_stale(Some(t0), 31, t0));
    }
}
