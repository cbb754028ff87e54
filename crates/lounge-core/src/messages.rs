//! Messages sent from a [`GeneratorHandle`](crate::GeneratorHandle) to the
//! runtime thread.
//!
//! Settings that the runtime simply reads on its next tick (instrument,
//! auto-play flag, chance and interval) are written straight into the shared
//! [`SettingsManager`](crate::settings::SettingsManager) and need no message.
//! Everything that has to act on live sounds or on the melodic state goes
//! through here.

/// Requests handled by the runtime thread, in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub enum GeneratorMessage {
    /// Start the backing loop and the auto-play timer.
    Start,

    /// Play one note after a short random lead-in.
    PlayNote,

    /// Play `count` notes spaced 200 ms apart.
    PlayNoteProgression { count: usize },

    /// Effective volume changed (new volume, mute or unmute); apply it to
    /// the backing loop and the last note.
    VolumeChanged,

    /// Transpose changed; forward it to the melodic state.
    SetTranspose { semitones: i32 },
}
