//! Lounge Core - generative melody engine for a looping backing track.
//!
//! This crate provides the building blocks of the generator:
//!
//! - **Timeline** - progression segments of the backing loop
//! - **Patterns & Scales** - fixed melodic contours and quantization tables
//! - **Selector** - turns timeline, pattern and scale into one pitch per call
//! - **Samples** - pitch to sample and playback-rate mapping
//! - **Scheduler** - auto-play timer and delayed note requests
//! - **Worker** - optional off-thread note computation
//! - **Runtime** - the generator thread and its cloneable handle
//!
//! # Architecture
//!
//! A [`Generator`] owns a runtime thread. Control surfaces hold a
//! [`GeneratorHandle`]; setters validate and update the shared
//! [`SettingsManager`], and anything that must act on live sounds travels as
//! a [`GeneratorMessage`]. The runtime asks a [`NoteEngine`] for notes and
//! hands finished ones to a [`PlaybackService`].

pub mod config;
pub mod engine;
pub mod error;
pub mod messages;
pub mod patterns;
pub mod playback;
pub mod runtime;
pub mod samples;
pub mod scales;
pub mod scheduler;
pub mod selector;
pub mod settings;
pub mod timeline;
pub mod timing;
pub mod worker;

// Re-export main types for convenience
pub use config::{ComputeMode, GeneratorConfig};
pub use engine::{NoteEngine, RenderedNote};
pub use error::{Error, Result};
pub use messages::GeneratorMessage;
pub use patterns::PatternCursor;
pub use playback::{LogPlayback, PlaybackService, SoundHandle};
pub use runtime::{Generator, GeneratorHandle};
pub use samples::{sample_url, semitones_to_playback_rate, SampleMapper};
pub use scales::ScaleName;
pub use scheduler::{AutoPlayLoop, NoteOrigin, NoteScheduler, TickOutcome};
pub use selector::{MelodicState, Note, NoteSelector};
pub use settings::SettingsManager;
pub use timeline::{ProgressionSegment, ScaleTimeline};
pub use timing::LoopClock;
pub use worker::{WorkerHandle, WorkerReply, WorkerRequest};

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::{Duration, Instant};

    #[test]
    fn test_walk_the_whole_loop() {
        let selector = NoteSelector::default();
        let mut state = MelodicState::new(-5);
        let mut rng = StdRng::seed_from_u64(2024);
        let t0 = Instant::now();

        let mut seen = vec![false; selector.timeline().len()];
        let mut step = 0u64;
        let mut position = 0.0;
        while position < selector.timeline().loop_duration() {
            let segment = selector.timeline().locate(position);
            seen[segment] = true;
            let now = t0 + Duration::from_millis(300 * step);
            let note = selector.next_note(&mut state, segment, now, &mut rng);
            let sample = selector.mapper().sample(note.sample_id).unwrap();
            assert!(sample.covers(note.pitch) || note.pitch < 0 || note.pitch > 127);
            position += 0.3;
            step += 1;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_same_seed_same_melody() {
        let melody = |seed| {
            let selector = NoteSelector::default();
            let mut state = MelodicState::new(0);
            let mut rng = StdRng::seed_from_u64(seed);
            let t0 = Instant::now();
            (0..64)
                .map(|i| {
                    let now = t0 + Duration::from_millis(250 * i);
                    selector.next_note(&mut state, (i / 8) as usize, now, &mut rng).pitch
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(melody(5), melody(5));
    }
}
