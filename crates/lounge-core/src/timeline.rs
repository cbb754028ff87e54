//! Harmonic timeline of the backing loop.
//!
//! The backing track is split into [`ProgressionSegment`]s, each carrying the
//! scale used to quantize melody notes, the chord root, and the pitch classes
//! the melody should land on when the harmony changes. Positions are
//! loop-relative seconds.

use crate::error::{Error, Result};
use crate::scales::ScaleName;

/// Length of the built-in backing loop in seconds.
pub const DEFAULT_LOOP_DURATION_SECS: f64 = 27.428;

const EPSILON: f64 = 1e-9;

/// A time-bounded span of the backing loop with its harmony.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressionSegment {
    /// Start of the span in loop-relative seconds.
    pub start: f64,
    /// End of the span in loop-relative seconds.
    pub end: f64,
    /// Scale used to quantize melody notes inside the span.
    pub scale: ScaleName,
    /// Chord root pitch class (0-11).
    pub root: u8,
    /// Pitch classes a note is pulled toward when the root changes (1-3 values).
    pub targets: &'static [u8],
}

impl ProgressionSegment {
    pub const fn new(
        start: f64,
        end: f64,
        scale: ScaleName,
        root: u8,
        targets: &'static [u8],
    ) -> Self {
        Self {
            start,
            end,
            scale,
            root,
            targets,
        }
    }

    /// Whether `position` falls inside `[start, end]` (both ends inclusive).
    #[inline]
    pub fn contains(&self, position: f64) -> bool {
        self.start <= position && position <= self.end
    }
}

/// The progression that accompanies the default backing loop.
pub static DEFAULT_PROGRESSION: [ProgressionSegment; 9] = [
    ProgressionSegment::new(0.0, 3.428, ScaleName::Custom, 7, &[2, 4, 7]),
    ProgressionSegment::new(3.428, 6.857, ScaleName::Diatonic, 2, &[2, 4, 7]),
    ProgressionSegment::new(6.857, 10.285, ScaleName::Custom, 7, &[2, 4, 7]),
    ProgressionSegment::new(10.285, 12.0, ScaleName::Diatonic, 9, &[4, 5, 9]),
    ProgressionSegment::new(12.0, 13.714, ScaleName::Custom2, 2, &[2, 4, 11]),
    ProgressionSegment::new(13.714, 17.142, ScaleName::Custom, 11, &[4, 7, 11]),
    ProgressionSegment::new(17.142, 20.571, ScaleName::Custom, 4, &[0, 2, 4]),
    ProgressionSegment::new(20.571, 24.0, ScaleName::Diatonic, 9, &[4, 5, 9]),
    ProgressionSegment::new(24.0, 27.428, ScaleName::Custom2, 2, &[2, 4, 11]),
];

/// Ordered, immutable segment table covering `[0, loop_duration)`.
#[derive(Clone, Debug)]
pub struct ScaleTimeline {
    segments: Vec<ProgressionSegment>,
    loop_duration: f64,
}

impl Default for ScaleTimeline {
    fn default() -> Self {
        Self {
            segments: DEFAULT_PROGRESSION.to_vec(),
            loop_duration: DEFAULT_LOOP_DURATION_SECS,
        }
    }
}

impl ScaleTimeline {
    /// Build a timeline, checking that the segments partition the loop.
    ///
    /// Segments must be non-empty, ordered, start at 0, touch their
    /// neighbours with no gap, and end at `loop_duration`.
    pub fn new(segments: Vec<ProgressionSegment>, loop_duration: f64) -> Result<Self> {
        if !(loop_duration > 0.0 && loop_duration.is_finite()) {
            return Err(Error::InvalidTimeline(format!(
                "loop duration must be positive, got {}",
                loop_duration
            )));
        }
        let first = segments
            .first()
            .ok_or_else(|| Error::InvalidTimeline("no segments".to_string()))?;
        if first.start.abs() > EPSILON {
            return Err(Error::InvalidTimeline(format!(
                "first segment starts at {} instead of 0",
                first.start
            )));
        }

        for (i, segment) in segments.iter().enumerate() {
            if segment.end <= segment.start {
                return Err(Error::InvalidTimeline(format!(
                    "segment {} is empty ({}..{})",
                    i, segment.start, segment.end
                )));
            }
            if segment.root > 11 {
                return Err(Error::InvalidTimeline(format!(
                    "segment {} root {} is not a pitch class",
                    i, segment.root
                )));
            }
            if segment.targets.is_empty()
                || segment.targets.len() > 3
                || segment.targets.iter().any(|pc| *pc > 11)
            {
                return Err(Error::InvalidTimeline(format!(
                    "segment {} needs 1-3 target pitch classes, got {:?}",
                    i, segment.targets
                )));
            }
            if let Some(next) = segments.get(i + 1) {
                if (next.start - segment.end).abs() > EPSILON {
                    return Err(Error::InvalidTimeline(format!(
                        "gap or overlap between segment {} (ends {}) and {} (starts {})",
                        i,
                        segment.end,
                        i + 1,
                        next.start
                    )));
                }
            }
        }

        let last_end = segments[segments.len() - 1].end;
        if (last_end - loop_duration).abs() > EPSILON {
            return Err(Error::InvalidTimeline(format!(
                "last segment ends at {} but the loop is {} long",
                last_end, loop_duration
            )));
        }

        Ok(Self {
            segments,
            loop_duration,
        })
    }

    /// The default progression scaled to a backing loop of `loop_duration`
    /// seconds, for a loop rendered at another tempo.
    pub fn stretched(loop_duration: f64) -> Result<Self> {
        let factor = loop_duration / DEFAULT_LOOP_DURATION_SECS;
        let segments = DEFAULT_PROGRESSION
            .iter()
            .map(|s| ProgressionSegment {
                start: s.start * factor,
                end: s.end * factor,
                ..s.clone()
            })
            .collect();
        Self::new(segments, loop_duration)
    }

    /// Length of the backing loop in seconds.
    pub fn loop_duration(&self) -> f64 {
        self.loop_duration
    }

    pub fn segments(&self) -> &[ProgressionSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Index of the segment playing at loop-relative `position`.
    ///
    /// Boundary positions belong to the earlier segment (first match wins).
    /// Positions outside every segment, which happens when the clock drifts
    /// past the final boundary, fall back to segment 0.
    pub fn locate(&self, position: f64) -> usize {
        match self.segments.iter().position(|s| s.contains(position)) {
            Some(index) => index,
            None => {
                log::trace!("[TIMELINE] position {:.3}s outside all segments, using 0", position);
                0
            }
        }
    }

    /// Segment at `index`, falling back to segment 0 when out of range.
    pub fn segment(&self, index: usize) -> &ProgressionSegment {
        match self.segments.get(index) {
            Some(segment) => segment,
            None => {
                log::warn!(
                    "[TIMELINE] segment index {} out of range ({} segments), using 0",
                    index,
                    self.segments.len()
                );
                &self.segments[0]
            }
        }
    }
}
