//! Fixed scale table used to quantize pattern pitches.
//!
//! A scale here is not a list of intervals but a per-pitch-class nudge: each
//! of the twelve entries is a `-1`, `0` or `+1` semitone adjustment that is
//! added to any pitch of that class. Quantizing is therefore a single table
//! lookup and never moves a pitch by more than one semitone.

/// Number of pitch classes in an octave.
pub const PITCH_CLASSES: i32 = 12;

/// Pitch class (0-11) of an absolute pitch, correct for negative input.
#[inline]
pub fn pitch_class(pitch: i32) -> u8 {
    pitch.rem_euclid(PITCH_CLASSES) as u8
}

/// Named scales available to progression segments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScaleName {
    Diatonic,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Aeolian,
    Locrian,
    HarmonicMinor,
    MelodicMinor,
    MajorPentatonic,
    MinorPentatonic,
    DoubleHarmonic,
    HalfDim,
    Chromatic,
    Custom,
    Custom2,
}

impl ScaleName {
    pub const ALL: [ScaleName; 16] = [
        Self::Diatonic,
        Self::Dorian,
        Self::Phrygian,
        Self::Lydian,
        Self::Mixolydian,
        Self::Aeolian,
        Self::Locrian,
        Self::HarmonicMinor,
        Self::MelodicMinor,
        Self::MajorPentatonic,
        Self::MinorPentatonic,
        Self::DoubleHarmonic,
        Self::HalfDim,
        Self::Chromatic,
        Self::Custom,
        Self::Custom2,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Diatonic => "diatonic",
            Self::Dorian => "dorian",
            Self::Phrygian => "phrygian",
            Self::Lydian => "lydian",
            Self::Mixolydian => "mixolydian",
            Self::Aeolian => "aeolian",
            Self::Locrian => "locrian",
            Self::HarmonicMinor => "harmonicMinor",
            Self::MelodicMinor => "melodicMinor",
            Self::MajorPentatonic => "majorPentatonic",
            Self::MinorPentatonic => "minorPentatonic",
            Self::DoubleHarmonic => "doubleHarmonic",
            Self::HalfDim => "halfDim",
            Self::Chromatic => "chromatic",
            Self::Custom => "custom",
            Self::Custom2 => "custom2",
        }
    }

    /// Semitone adjustment per pitch class (index 0 = C).
    pub fn adjustments(self) -> &'static [i8; 12] {
        match self {
            Self::Diatonic => &[0, -1, 0, -1, 0, 0, -1, 0, -1, 0, -1, 0],
            Self::Dorian => &[0, 1, 0, 0, -1, 0, 1, 0, 1, 0, 0, -1],
            Self::Phrygian => &[0, 0, -1, 0, -1, 0, 1, 0, 0, -1, 0, -1],
            Self::Lydian => &[0, 1, 0, 1, 0, 1, 0, 0, 1, 0, 1, 0],
            Self::Mixolydian => &[0, 1, 0, 1, 0, 0, -1, 0, -1, 0, 0, -1],
            Self::Aeolian => &[0, -1, 0, 0, -1, 0, -1, 0, 0, -1, 0, -1],
            Self::Locrian => &[0, 0, -1, 0, -1, 0, 0, -1, 0, -1, 0, -1],
            Self::HarmonicMinor => &[0, 1, 0, 0, -1, 0, 1, 0, 0, -1, 1, 0],
            Self::MelodicMinor => &[0, 1, 0, 0, -1, 0, 1, 0, -1, 0, 1, 0],
            Self::MajorPentatonic => &[0, 1, 0, 1, 0, -1, 1, 0, 1, 0, -1, 1],
            Self::MinorPentatonic => &[0, -1, 1, 0, -1, 0, 1, 0, -1, 1, 0, -1],
            Self::DoubleHarmonic => &[0, 0, -1, 1, 0, 0, 1, 0, 0, -1, 1, 0],
            Self::HalfDim => &[0, 1, 0, 0, -1, 0, 0, -1, 0, -1, 0, -1],
            Self::Chromatic => &[0; 12],
            Self::Custom => &[0, -1, 0, -1, 0, -1, -1, 0, -1, 0, -1, 0],
            Self::Custom2 => &[-1, 0, 0, -1, 0, 0, 1, 0, 0, -1, 0, 0],
        }
    }

    /// Adjustment for the pitch class of `pitch`.
    #[inline]
    pub fn adjustment(self, pitch: i32) -> i32 {
        self.adjustments()[pitch_class(pitch) as usize] as i32
    }

    /// Snap `pitch` into the scale.
    #[inline]
    pub fn quantize(self, pitch: i32) -> i32 {
        pitch + self.adjustment(pitch)
    }
}
