//! Sample selection and pitch shifting.
//!
//! Each instrument is recorded as a handful of samples, one every three
//! semitones or so. A pitch is played by picking the sample whose range
//! covers it and speeding that sample up or down by the equal-tempered ratio
//! between the pitch and the sample's root.

/// Highest absolute pitch the lookup table covers.
pub const MAX_PITCH: i32 = 127;

/// Offsets within this many semitones use the precomputed rate table.
const RATE_TABLE_SPAN: i32 = 127;

/// One recorded sample and the pitches it may be stretched to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleDescriptor {
    /// File stem of the sample, e.g. `note_60`.
    pub id: &'static str,
    /// Pitch the sample was recorded at.
    pub root: i32,
    /// Lowest pitch this sample plays (inclusive).
    pub lo: i32,
    /// Highest pitch this sample plays (inclusive).
    pub hi: i32,
}

impl SampleDescriptor {
    const fn new(id: &'static str, root: i32, lo: i32, hi: i32) -> Self {
        Self { id, root, lo, hi }
    }

    #[inline]
    pub fn covers(&self, pitch: i32) -> bool {
        self.lo <= pitch && pitch <= self.hi
    }
}

/// Sample set shared by every instrument. Earlier entries win where two
/// ranges touch the same pitch.
pub static SAMPLES: [SampleDescriptor; 17] = [
    SampleDescriptor::new("note_96", 96, 95, 127),
    SampleDescriptor::new("note_93", 93, 92, 94),
    SampleDescriptor::new("note_90", 90, 89, 91),
    SampleDescriptor::new("note_87", 87, 86, 88),
    SampleDescriptor::new("note_84", 84, 83, 85),
    SampleDescriptor::new("note_81", 81, 80, 82),
    SampleDescriptor::new("note_77", 77, 76, 79),
    SampleDescriptor::new("note_74", 74, 73, 75),
    SampleDescriptor::new("note_71", 71, 70, 72),
    SampleDescriptor::new("note_69", 69, 68, 70),
    SampleDescriptor::new("note_66", 66, 65, 67),
    SampleDescriptor::new("note_63", 63, 62, 64),
    SampleDescriptor::new("note_60", 60, 59, 61),
    SampleDescriptor::new("note_57", 57, 56, 58),
    SampleDescriptor::new("note_54", 54, 53, 55),
    SampleDescriptor::new("note_51", 51, 50, 52),
    SampleDescriptor::new("note_48", 48, 0, 49),
];

/// Convert a semitone difference to a playback-rate multiplier.
///
/// `0` maps to exactly `1.0` and every 12 semitones doubles the rate.
pub fn semitones_to_playback_rate(semitones: i32) -> f64 {
    2f64.powf(semitones as f64 / 12.0)
}

/// URL of a sample for one instrument: `{base}/{instrument}/{id}.ogg`.
pub fn sample_url(base_url: &str, instrument: &str, sample_id: &str) -> String {
    format!("{}/{}/{}.ogg", base_url.trim_end_matches('/'), instrument, sample_id)
}

/// Pitches in `0..=MAX_PITCH` that no sample covers.
fn uncovered(by_pitch: &[Option<usize>]) -> Vec<usize> {
    by_pitch
        .iter()
        .enumerate()
        .filter(|(_, index)| index.is_none())
        .map(|(pitch, _)| pitch)
        .collect()
}

/// A pitch resolved to a concrete sample and speed.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleChoice {
    pub sample: &'static SampleDescriptor,
    /// `pitch - sample.root`
    pub semitone_offset: i32,
    pub playback_rate: f64,
}

/// Pitch to sample lookup, built once at startup.
#[derive(Clone, Debug)]
pub struct SampleMapper {
    /// Index into [`SAMPLES`] for every pitch in `0..=MAX_PITCH`.
    by_pitch: Vec<Option<usize>>,
    /// Index of the lowest-root sample, used outside coverage.
    fallback: usize,
    /// Rates for offsets `-RATE_TABLE_SPAN..=RATE_TABLE_SPAN`.
    rates: Vec<f64>,
}

impl Default for SampleMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleMapper {
    pub fn new() -> Self {
        let by_pitch = (0..=MAX_PITCH)
            .map(|pitch| SAMPLES.iter().position(|s| s.covers(pitch)))
            .collect::<Vec<_>>();
        debug_assert!(
            uncovered(&by_pitch).is_empty(),
            "sample table leaves pitches {:?} uncovered",
            uncovered(&by_pitch)
        );
        let fallback = SAMPLES
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.root)
            .map(|(i, _)| i)
            .unwrap_or(0);
        let rates = (-RATE_TABLE_SPAN..=RATE_TABLE_SPAN)
            .map(semitones_to_playback_rate)
            .collect();
        Self {
            by_pitch,
            fallback,
            rates,
        }
    }

    /// Resolve `pitch` to a sample and playback rate.
    ///
    /// Pitches outside the covered range are played from the lowest-root
    /// sample.
    pub fn map_pitch(&self, pitch: i32) -> SampleChoice {
        let covering = usize::try_from(pitch)
            .ok()
            .and_then(|p| self.by_pitch.get(p).copied().flatten());
        let index = match covering {
            Some(index) => index,
            None => {
                log::warn!(
                    "[SAMPLES] no sample covers pitch {}, using {}",
                    pitch,
                    SAMPLES[self.fallback].id
                );
                self.fallback
            }
        };
        let sample = &SAMPLES[index];
        let semitone_offset = pitch - sample.root;
        SampleChoice {
            sample,
            semitone_offset,
            playback_rate: self.playback_rate(semitone_offset),
        }
    }

    /// Playback rate for an offset, from the table when in range.
    pub fn playback_rate(&self, semitone_offset: i32) -> f64 {
        if semitone_offset.abs() <= RATE_TABLE_SPAN {
            self.rates[(semitone_offset + RATE_TABLE_SPAN) as usize]
        } else {
            semitones_to_playback_rate(semitone_offset)
        }
    }

    /// Descriptor with the given id.
    pub fn sample(&self, id: &str) -> Option<&'static SampleDescriptor> {
        SAMPLES.iter().find(|s| s.id == id)
    }
}
