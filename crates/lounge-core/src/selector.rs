//! Note selection: turns the timeline, the pattern cursor and the scale
//! table into one absolute pitch per call.
//!
//! Each call walks the active pattern, snaps the raw pitch into the
//! segment's scale, applies the transpose, and, on the first note after a
//! chord change, pulls the pitch onto one of the new chord's target pitch
//! classes. Immediate repeats are redrawn a bounded number of times.
//!
//! All mutable musical counters live in [`MelodicState`]; the selector itself
//! only holds immutable tables, so one selector can serve any number of
//! independent states.

use std::time::Instant;

use rand::Rng;

use crate::patterns::{is_stale, PatternCursor};
use crate::samples::SampleMapper;
use crate::scales::pitch_class;
use crate::timeline::{ProgressionSegment, ScaleTimeline};

/// Redraws allowed when a candidate repeats the previous pitch. After this
/// many the repeat is emitted.
pub const MAX_REPEAT_RETRIES: u32 = 20;

/// Mutable melodic state of one generator.
///
/// Created when the generator starts, changed only by [`NoteSelector`], and
/// dropped with the generator.
#[derive(Clone, Debug, PartialEq)]
pub struct MelodicState {
    /// Segment the last note was generated for.
    pub current_segment_index: usize,
    /// Active pattern and step.
    pub cursor: PatternCursor,
    /// Last emitted absolute pitch.
    pub last_pitch: Option<i32>,
    /// Root pitch class of the segment the last note was emitted in.
    pub last_root: Option<u8>,
    /// Notes emitted since the last pattern change.
    pub notes_since_change: u32,
    /// When the last note was emitted.
    pub last_emit: Option<Instant>,
    /// Transpose applied after quantization, in semitones.
    pub transpose: i32,
}

impl Default for MelodicState {
    fn default() -> Self {
        Self::new(0)
    }
}

impl MelodicState {
    pub fn new(transpose: i32) -> Self {
        Self {
            current_segment_index: 0,
            cursor: PatternCursor::new(),
            last_pitch: None,
            last_root: None,
            notes_since_change: 0,
            last_emit: None,
            transpose,
        }
    }
}

/// One generated note.
#[derive(Clone, Debug, PartialEq)]
pub struct Note {
    /// Final absolute pitch.
    pub pitch: i32,
    /// Sample that plays it.
    pub sample_id: &'static str,
    /// Speed multiplier for the sample.
    pub playback_rate: f64,
    /// Segment the note was generated for.
    pub segment_index: usize,
}

/// Signed shortest distance from pitch class `from` to `to`, in `-6..=5`.
#[inline]
pub fn pitch_class_distance(from: u8, to: u8) -> i32 {
    (to as i32 - from as i32 + 6).rem_euclid(12) - 6
}

/// Pull `pitch` onto the nearest of the segment's target pitch classes and
/// re-quantize it against the segment's scale.
///
/// Pitches already on a target class are returned unchanged. Ties between
/// equally distant targets go to the one listed first.
pub fn harmonize(pitch: i32, segment: &ProgressionSegment) -> i32 {
    let pc = pitch_class(pitch);
    if segment.targets.contains(&pc) {
        return pitch;
    }

    let mut best: Option<i32> = None;
    for &target in segment.targets {
        let distance = pitch_class_distance(pc, target);
        if best.map_or(true, |b| distance.abs() < b.abs()) {
            best = Some(distance);
        }
    }

    match best {
        Some(shift) => segment.scale.quantize(pitch + shift.clamp(-6, 6)),
        None => pitch,
    }
}

/// Call `draw` until it returns something other than `previous`, at most
/// [`MAX_REPEAT_RETRIES`] extra times. The last draw is returned either way.
pub fn draw_distinct(previous: Option<i32>, mut draw: impl FnMut() -> i32) -> i32 {
    let mut pitch = draw();
    let mut retries = 0;
    while Some(pitch) == previous {
        if retries == MAX_REPEAT_RETRIES {
            log::debug!(
                "[SELECTOR] accepting repeated pitch {} after {} redraws",
                pitch,
                retries
            );
            break;
        }
        retries += 1;
        pitch = draw();
    }
    pitch
}

/// Stateless note generator over fixed tables.
#[derive(Clone, Debug, Default)]
pub struct NoteSelector {
    timeline: ScaleTimeline,
    mapper: SampleMapper,
}

impl NoteSelector {
    pub fn new(timeline: ScaleTimeline) -> Self {
        Self {
            timeline,
            mapper: SampleMapper::new(),
        }
    }

    pub fn timeline(&self) -> &ScaleTimeline {
        &self.timeline
    }

    pub fn mapper(&self) -> &SampleMapper {
        &self.mapper
    }

    /// Generate the next note for `segment_index` and record it in `state`.
    ///
    /// An out-of-range segment index is treated as segment 0.
    pub fn next_note<R: Rng>(
        &self,
        state: &mut MelodicState,
        segment_index: usize,
        now: Instant,
        rng: &mut R,
    ) -> Note {
        let segment_index = if segment_index < self.timeline.len() {
            segment_index
        } else {
            log::warn!(
                "[SELECTOR] segment index {} out of range, using 0",
                segment_index
            );
            0
        };
        let segment = self.timeline.segment(segment_index);

        if is_stale(state.last_emit, state.notes_since_change, now) {
            state.cursor.change_pattern(rng);
            state.notes_since_change = 0;
        }

        let root_changed = state.last_root != Some(segment.root);
        let previous = state.last_pitch;
        let pitch = draw_distinct(previous, || self.candidate(state, segment, root_changed));

        let choice = self.mapper.map_pitch(pitch);

        state.current_segment_index = segment_index;
        state.last_pitch = Some(pitch);
        state.last_root = Some(segment.root);
        state.notes_since_change += 1;
        state.last_emit = Some(now);

        log::trace!(
            "[SELECTOR] segment={} pattern={} pitch={} sample={} rate={:.4}",
            segment_index,
            state.cursor.pattern_index(),
            pitch,
            choice.sample.id,
            choice.playback_rate
        );

        Note {
            pitch,
            sample_id: choice.sample.id,
            playback_rate: choice.playback_rate,
            segment_index,
        }
    }

    /// Read, quantize, transpose and (on a chord change) harmonize one
    /// pattern step.
    fn candidate(
        &self,
        state: &mut MelodicState,
        segment: &ProgressionSegment,
        root_changed: bool,
    ) -> i32 {
        let raw = state.cursor.advance();
        let pitch = segment.scale.quantize(raw) + state.transpose;
        if root_changed {
            harmonize(pitch, segment)
        } else {
            pitch
        }
    }
}
