//! Boundary to the audio playback engine.
//!
//! The generator never mixes audio itself. It asks a [`PlaybackService`] to
//! start samples and the backing loop, and keeps the returned
//! [`SoundHandle`]s to change volume, fade and stop them later.

use std::time::Duration;

/// A sound started by the playback service.
pub trait SoundHandle: Send {
    fn set_volume(&mut self, volume: f64);

    /// Ramp volume from `from` to `to` over `duration`.
    fn fade(&mut self, from: f64, to: f64, duration: Duration);

    fn stop(&mut self);

    fn seek(&mut self, seconds: f64);

    /// Current playback position in seconds, if the engine reports one.
    fn playhead(&self) -> Option<f64>;
}

/// Sample playback and mixing engine consumed by the generator.
pub trait PlaybackService: Send {
    /// Play a sample once at `volume` with speed multiplier `rate`.
    fn play_sample(&mut self, url: &str, volume: f64, rate: f64) -> Box<dyn SoundHandle>;

    /// Play a sample in a loop.
    fn play_loop(&mut self, url: &str, volume: f64, rate: f64) -> Box<dyn SoundHandle>;
}

/// Playback service that only logs what it would play.
///
/// Used by the CLI to run the generator without an audio device.
#[derive(Debug, Default)]
pub struct LogPlayback {
    started: u64,
}

impl LogPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sounds started so far.
    pub fn started(&self) -> u64 {
        self.started
    }
}

impl PlaybackService for LogPlayback {
    fn play_sample(&mut self, url: &str, volume: f64, rate: f64) -> Box<dyn SoundHandle> {
        self.started += 1;
        log::info!("♪ {} vol={:.2} rate={:.4}", url, volume, rate);
        Box::new(LogHandle {
            id: self.started,
            looping: false,
        })
    }

    fn play_loop(&mut self, url: &str, volume: f64, rate: f64) -> Box<dyn SoundHandle> {
        self.started += 1;
        log::info!("⟳ {} vol={:.2} rate={:.4}", url, volume, rate);
        Box::new(LogHandle {
            id: self.started,
            looping: true,
        })
    }
}

#[derive(Debug)]
struct LogHandle {
    id: u64,
    looping: bool,
}

impl SoundHandle for LogHandle {
    fn set_volume(&mut self, volume: f64) {
        log::debug!("[PLAYBACK] #{} volume {:.2}", self.id, volume);
    }

    fn fade(&mut self, from: f64, to: f64, duration: Duration) {
        log::trace!(
            "[PLAYBACK] #{} fade {:.2} -> {:.2} over {:?}",
            self.id,
            from,
            to,
            duration
        );
    }

    fn stop(&mut self) {
        log::debug!(
            "[PLAYBACK] #{} stop{}",
            self.id,
            if self.looping { " (loop)" } else { "" }
        );
    }

    fn seek(&mut self, seconds: f64) {
        log::debug!("[PLAYBACK] #{} seek {:.3}s", self.id, seconds);
    }

    fn playhead(&self) -> Option<f64> {
        None
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording playback double shared by the runtime tests.

    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Debug, PartialEq)]
    pub enum PlaybackEvent {
        Sample { url: String, volume: f64, rate: f64 },
        Loop { url: String, volume: f64 },
        Volume { id: usize, volume: f64 },
        Fade { id: usize, to: f64 },
        Stop { id: usize },
    }

    #[derive(Clone, Default)]
    pub struct RecordingPlayback {
        pub events: Arc<Mutex<Vec<PlaybackEvent>>>,
        pub playhead: Arc<Mutex<Option<f64>>>,
        next_id: usize,
    }

    impl RecordingPlayback {
        pub fn events(&self) -> Vec<PlaybackEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn samples(&self) -> Vec<(String, f64, f64)> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    PlaybackEvent::Sample { url, volume, rate } => Some((url, volume, rate)),
                    _ => None,
                })
                .collect()
        }

        pub fn loops_started(&self) -> usize {
            self.events()
                .iter()
                .filter(|e| matches!(e, PlaybackEvent::Loop { .. }))
                .count()
        }

        fn handle(&mut self) -> Box<dyn SoundHandle> {
            self.next_id += 1;
            Box::new(RecordingHandle {
                id: self.next_id,
                events: self.events.clone(),
                playhead: self.playhead.clone(),
            })
        }
    }

    impl PlaybackService for RecordingPlayback {
        fn play_sample(&mut self, url: &str, volume: f64, rate: f64) -> Box<dyn SoundHandle> {
            self.events.lock().unwrap().push(PlaybackEvent::Sample {
                url: url.to_string(),
                volume,
                rate,
            });
            self.handle()
        }

        fn play_loop(&mut self, url: &str, volume: f64, _rate: f64) -> Box<dyn SoundHandle> {
            self.events.lock().unwrap().push(PlaybackEvent::Loop {
                url: url.to_string(),
                volume,
            });
            self.handle()
        }
    }

    struct RecordingHandle {
        id: usize,
        events: Arc<Mutex<Vec<PlaybackEvent>>>,
        playhead: Arc<Mutex<Option<f64>>>,
    }

    impl SoundHandle for RecordingHandle {
        fn set_volume(&mut self, volume: f64) {
            self.events.lock().unwrap().push(PlaybackEvent::Volume {
                id: self.id,
                volume,
            });
        }

        fn fade(&mut self, _from: f64, to: f64, _duration: Duration) {
            self.events
                .lock()
                .unwrap()
                .push(PlaybackEvent::Fade { id: self.id, to });
        }

        fn stop(&mut self) {
            self.events
                .lock()
                .unwrap()
                .push(PlaybackEvent::Stop { id: self.id });
        }

        fn seek(&mut self, _seconds: f64) {}

        fn playhead(&self) -> Option<f64> {
            *self.playhead.lock().unwrap()
        }
    }
}
