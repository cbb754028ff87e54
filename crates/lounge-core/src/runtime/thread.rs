//! Runtime thread for the generator.
//!
//! The runtime thread owns everything that changes while music plays: the
//! loop clock, pending note requests, the note engine and the live sound
//! handles. Control surfaces talk to it through a cloneable
//! [`GeneratorHandle`].

use crate::config::GeneratorConfig;
use crate::engine::{NoteEngine, RenderedNote};
use crate::error::{Error, Result};
use crate::messages::GeneratorMessage;
use crate::playback::{PlaybackService, SoundHandle};
use crate::samples::sample_url;
use crate::scheduler::{lead_in, AutoPlayLoop, NoteOrigin, NoteScheduler};
use crate::selector::NoteSelector;
use crate::settings::SettingsManager;
use crate::timeline::ScaleTimeline;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Longest the runtime waits for a message between ticks.
const MAX_IDLE: Duration = Duration::from_millis(10);

/// Wait between polls while offloaded notes are outstanding.
const REPLY_POLL: Duration = Duration::from_millis(1);

/// Handle to a running generator.
///
/// Setters validate on the calling thread: an invalid value returns
/// [`Error::Config`], is never sent to the runtime, and the previous value
/// stays in effect.
#[derive(Clone)]
pub struct GeneratorHandle {
    /// Sender for generator messages.
    message_tx: Sender<GeneratorMessage>,
    /// Live settings shared with the runtime thread.
    settings: SettingsManager,
    /// Flag to signal shutdown.
    shutdown: Arc<AtomicBool>,
}

impl GeneratorHandle {
    /// Send a message to the runtime thread.
    pub fn send(&self, msg: GeneratorMessage) -> Result<()> {
        self.message_tx.send(msg).map_err(|_| Error::Disconnected)
    }

    pub fn settings(&self) -> &SettingsManager {
        &self.settings
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> GeneratorConfig {
        self.settings.snapshot()
    }

    /// Begin timeline tracking and the auto-play loop.
    ///
    /// Calling it again while running only logs a warning.
    pub fn start(&self) -> Result<()> {
        self.send(GeneratorMessage::Start)
    }

    /// Play one note after a short random lead-in.
    pub fn play_note(&self) -> Result<()> {
        self.send(GeneratorMessage::PlayNote)
    }

    /// Play `count` notes, roughly 200 ms apart.
    pub fn play_note_progression(&self, count: usize) -> Result<()> {
        self.send(GeneratorMessage::PlayNoteProgression { count })
    }

    /// Set the volume (0.0-1.0) of the backing loop and all notes.
    pub fn set_volume(&self, volume: f64) -> Result<()> {
        self.settings.update(|c| c.set_volume(volume))?;
        self.send(GeneratorMessage::VolumeChanged)
    }

    /// Select one instrument or a comma separated list to pick from.
    pub fn set_instrument(&self, csv: &str) -> Result<()> {
        self.settings.update(|c| c.set_instrument(csv))
    }

    pub fn set_transpose(&self, semitones: i32) -> Result<()> {
        self.settings.update(|c| c.set_transpose(semitones))?;
        self.send(GeneratorMessage::SetTranspose { semitones })
    }

    pub fn set_auto_play(&self, enabled: bool) {
        self.settings.with_write(|c| c.set_auto_play(enabled));
    }

    pub fn set_auto_play_chance(&self, chance: f64) -> Result<()> {
        self.settings.update(|c| c.set_auto_play_chance(chance))
    }

    /// Set the time between auto-play ticks in milliseconds.
    pub fn set_auto_play_delay(&self, ms: u64) -> Result<()> {
        self.settings.update(|c| c.set_auto_play_interval(ms))
    }

    /// Silence everything without forgetting the configured volume.
    pub fn mute(&self) -> Result<()> {
        self.settings.set_muted(true);
        self.send(GeneratorMessage::VolumeChanged)
    }

    /// Restore the configured volume.
    pub fn unmute(&self) -> Result<()> {
        self.settings.set_muted(false);
        self.send(GeneratorMessage::VolumeChanged)
    }

    pub fn is_muted(&self) -> bool {
        self.settings.is_muted()
    }

    /// Signal the runtime thread to shut down.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Check if shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

/// A generator with its runtime thread.
pub struct Generator {
    handle: GeneratorHandle,
    thread_handle: Option<JoinHandle<()>>,
}

impl Generator {
    /// Validate `config`, then start the runtime thread.
    ///
    /// Nothing plays until [`GeneratorHandle::start`] is called.
    pub fn spawn(config: GeneratorConfig, playback: Box<dyn PlaybackService>) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mode = config.compute_mode;

        let settings = SettingsManager::new(config);
        let (message_tx, message_rx) = unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut rt = RuntimeThread::new(settings.clone(), message_rx, playback, rng)?;

        let handle = GeneratorHandle {
            message_tx,
            settings,
            shutdown: shutdown.clone(),
        };

        let thread_shutdown = shutdown.clone();
        let thread_handle = thread::Builder::new()
            .name("lounge-runtime".to_string())
            .spawn(move || rt.run(thread_shutdown))?;

        log::info!("Generator runtime started ({:?} note computation)", mode);

        Ok(Self {
            handle,
            thread_handle: Some(thread_handle),
        })
    }

    /// Get a handle to interact with the generator.
    pub fn handle(&self) -> &GeneratorHandle {
        &self.handle
    }

    /// Shut down the generator and wait for its thread.
    pub fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        self.handle.shutdown();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Generator {
    fn drop(&mut self) {
        self.join();
    }
}

/// The runtime thread that processes messages and runs the auto-play loop.
pub(crate) struct RuntimeThread {
    settings: SettingsManager,
    message_rx: Receiver<GeneratorMessage>,
    playback: Box<dyn PlaybackService>,
    timeline: ScaleTimeline,
    auto_play: AutoPlayLoop,
    scheduler: NoteScheduler,
    engine: NoteEngine,
    rng: StdRng,
    /// Segment resolved by the latest auto-play tick.
    segment_index: usize,
    backing: Option<Box<dyn SoundHandle>>,
    last_note: Option<Box<dyn SoundHandle>>,
}

impl RuntimeThread {
    pub(crate) fn new(
        settings: SettingsManager,
        message_rx: Receiver<GeneratorMessage>,
        playback: Box<dyn PlaybackService>,
        mut rng: StdRng,
    ) -> Result<Self> {
        let config = settings.snapshot();
        let timeline = ScaleTimeline::stretched(config.loop_duration_secs)?;
        let engine = NoteEngine::new(
            config.compute_mode,
            NoteSelector::new(timeline.clone()),
            config.transpose,
            config.worker_timeout(),
            &mut rng,
        )?;
        Ok(Self {
            settings,
            message_rx,
            playback,
            auto_play: AutoPlayLoop::new(timeline.loop_duration()),
            timeline,
            scheduler: NoteScheduler::new(),
            engine,
            rng,
            segment_index: 0,
            backing: None,
            last_note: None,
        })
    }

    fn run(&mut self, shutdown: Arc<AtomicBool>) {
        while !shutdown.load(Ordering::Relaxed) {
            self.drain_messages(Instant::now());
            let now = Instant::now();
            self.tick(now);

            match self.message_rx.recv_timeout(self.idle_time(now)) {
                Ok(msg) => self.handle_message(msg, Instant::now()),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    log::warn!("[RUNTIME] all handles dropped");
                    break;
                }
            }
        }

        if let Some(mut backing) = self.backing.take() {
            backing.stop();
        }
        log::info!("Generator runtime stopped");
    }

    /// How long the loop may block before something is due: the next
    /// pending note or auto-play tick, capped at [`MAX_IDLE`].
    pub(crate) fn idle_time(&self, now: Instant) -> Duration {
        if self.engine.is_waiting() {
            return REPLY_POLL;
        }
        [self.scheduler.next_due(), self.auto_play.next_tick()]
            .into_iter()
            .flatten()
            .min()
            .map_or(MAX_IDLE, |at| at.saturating_duration_since(now).min(MAX_IDLE))
    }

    fn drain_messages(&mut self, now: Instant) {
        while let Ok(msg) = self.message_rx.try_recv() {
            self.handle_message(msg, now);
        }
    }

    pub(crate) fn handle_message(&mut self, msg: GeneratorMessage, now: Instant) {
        match msg {
            GeneratorMessage::Start => self.start(now),
            GeneratorMessage::PlayNote => {
                let delay = lead_in(&mut self.rng);
                self.scheduler.schedule_after(now, delay, NoteOrigin::Manual);
            }
            GeneratorMessage::PlayNoteProgression { count } => {
                let delays = self.scheduler.schedule_progression(now, count, &mut self.rng);
                log::debug!("[RUNTIME] progression of {} scheduled: {:?}", count, delays);
            }
            GeneratorMessage::VolumeChanged => self.apply_volume(),
            GeneratorMessage::SetTranspose { semitones } => {
                log::debug!("[RUNTIME] transpose {}", semitones);
                self.engine.set_transpose(semitones);
            }
        }
    }

    fn start(&mut self, now: Instant) {
        if self.auto_play.is_running() {
            log::warn!("[RUNTIME] start requested but the generator is already running");
            return;
        }
        let url = self.settings.with_read(|c| c.backing_loop_path());
        let volume = self.settings.effective_volume();
        self.backing = Some(self.playback.play_loop(&url, volume, 1.0));
        self.auto_play.start(now);
        log::info!("Generator started ({:.3}s loop)", self.timeline.loop_duration());
    }

    /// One pass of the runtime loop: auto-play, due requests, finished notes.
    pub(crate) fn tick(&mut self, now: Instant) {
        if self.auto_play.is_due(now) {
            let playhead = self.backing.as_ref().and_then(|b| b.playhead());
            let config = self.settings.snapshot();
            let outcome = self
                .auto_play
                .tick(now, playhead, &self.timeline, &config, &mut self.rng);

            if outcome.restarted_loop {
                self.restart_backing(&config);
            }
            self.segment_index = outcome.segment_index;
            if let Some(delay) = outcome.note_delay {
                self.scheduler.schedule_after(now, delay, NoteOrigin::Auto);
            }
        }

        for pending in self.scheduler.take_due(now) {
            log::trace!(
                "[RUNTIME] {:?} note due in segment {}",
                pending.origin,
                self.segment_index
            );
            self.engine.request(self.segment_index, now, &mut self.rng);
        }

        for note in self.engine.poll(now, &mut self.rng) {
            self.play(note);
        }
    }

    fn restart_backing(&mut self, config: &GeneratorConfig) {
        if let Some(mut old) = self.backing.take() {
            old.stop();
        }
        let volume = self.settings.effective_volume();
        self.backing = Some(self.playback.play_loop(&config.backing_loop_path(), volume, 1.0));
    }

    fn play(&mut self, note: RenderedNote) {
        let (instruments, base_url, fade) = self
            .settings
            .with_read(|c| (c.instruments(), c.base_url.clone(), c.note_fade()));
        if instruments.is_empty() {
            log::warn!("[RUNTIME] no instrument selected, dropping {}", note.sample_id);
            return;
        }
        let instrument = &instruments[self.rng.random_range(0..instruments.len())];
        let url = sample_url(&base_url, instrument, &note.sample_id);
        let volume = self.settings.effective_volume();

        let mut sound = self.playback.play_sample(&url, volume, note.playback_rate);
        sound.fade(volume, 0.0, fade);
        self.last_note = Some(sound);
    }

    fn apply_volume(&mut self) {
        let volume = self.settings.effective_volume();
        if let Some(backing) = self.backing.as_mut() {
            backing.set_volume(volume);
        }
        if let Some(note) = self.last_note.as_mut() {
            note.set_volume(volume);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ComputeMode;
    use crate::engine::OffloadedEngine;
    use crate::playback::testing::{PlaybackEvent, RecordingPlayback};
    use crate::worker::{encode_reply, WorkerHandle, WorkerReply};

    fn runtime_with(config: GeneratorConfig) -> (RuntimeThread, RecordingPlayback, SettingsManager) {
        let recording = RecordingPlayback::default();
        let settings = SettingsManager::new(config);
        let (_tx, rx) = unbounded();
        let rt = RuntimeThread::new(
            settings.clone(),
            rx,
            Box::new(recording.clone()),
            StdRng::seed_from_u64(42),
        )
        .unwrap();
        (rt, recording, settings)
    }

    fn quiet_config() -> GeneratorConfig {
        GeneratorConfig {
            auto_play: false,
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn test_start_is_idempotent() {
        let (mut rt, recording, _) = runtime_with(quiet_config());
        let t0 = Instant::now();
        rt.handle_message(GeneratorMessage::Start, t0);
        rt.handle_message(GeneratorMessage::Start, t0);
        assert_eq!(recording.loops_started(), 1);
        assert_eq!(
            recording.events()[0],
            PlaybackEvent::Loop {
                url: "web/sounds/jazz_loop.ogg".into(),
                volume: 1.0
            }
        );
    }

    #[test]
    fn test_auto_play_plays_a_faded_note() {
        let mut config = GeneratorConfig::default();
        config.set_auto_play_chance(1.0).unwrap();
        let (mut rt, recording, _) = runtime_with(config);
        let t0 = Instant::now();
        rt.handle_message(GeneratorMessage::Start, t0);
        rt.tick(t0);
        rt.tick(t0 + Duration::from_millis(250));

        let samples = recording.samples();
        assert_eq!(samples.len(), 1);
        let (url, volume, rate) = &samples[0];
        assert!(url.starts_with("web/sounds/piano/note_") && url.ends_with(".ogg"));
        assert_eq!(*volume, 1.0);
        assert!(*rate > 0.0);
        assert!(recording
            .events()
            .iter()
            .any(|e| matches!(e, PlaybackEvent::Fade { id: 2, to } if *to == 0.0)));
    }

    #[test]
    fn test_disabled_auto_play_stays_silent() {
        let (mut rt, recording, _) = runtime_with(quiet_config());
        let t0 = Instant::now();
        rt.handle_message(GeneratorMessage::Start, t0);
        for i in 0..20 {
            rt.tick(t0 + Duration::from_millis(300 * i));
        }
        assert!(recording.samples().is_empty());
    }

    #[test]
    fn test_wraparound_restarts_backing_loop() {
        let (mut rt, recording, _) = runtime_with(quiet_config());
        let t0 = Instant::now();
        rt.handle_message(GeneratorMessage::Start, t0);
        rt.tick(t0);
        rt.tick(t0 + Duration::from_secs(28));

        assert_eq!(recording.loops_started(), 2);
        assert!(recording.events().contains(&PlaybackEvent::Stop { id: 1 }));
        assert_eq!(rt.segment_index, 0);
    }

    #[test]
    fn test_progression_plays_three_notes() {
        let (mut rt, recording, _) = runtime_with(quiet_config());
        let t0 = Instant::now();
        rt.handle_message(GeneratorMessage::PlayNoteProgression { count: 3 }, t0);

        rt.tick(t0 + Duration::from_millis(50));
        assert!(recording.samples().is_empty());

        rt.tick(t0 + Duration::from_secs(1));
        assert_eq!(recording.samples().len(), 3);
    }

    #[test]
    fn test_volume_and_mute_reach_live_sounds() {
        let (mut rt, recording, settings) = runtime_with(quiet_config());
        let t0 = Instant::now();
        rt.handle_message(GeneratorMessage::Start, t0);
        rt.handle_message(GeneratorMessage::PlayNote, t0);
        rt.tick(t0 + Duration::from_millis(200));
        assert_eq!(recording.samples().len(), 1);

        settings.update(|c| c.set_volume(0.5)).unwrap();
        rt.handle_message(GeneratorMessage::VolumeChanged, t0);
        let events = recording.events();
        assert!(events.contains(&PlaybackEvent::Volume { id: 1, volume: 0.5 }));
        assert!(events.contains(&PlaybackEvent::Volume { id: 2, volume: 0.5 }));

        settings.set_muted(true);
        rt.handle_message(GeneratorMessage::VolumeChanged, t0);
        assert!(recording
            .events()
            .contains(&PlaybackEvent::Volume { id: 1, volume: 0.0 }));

        let t1 = t0 + Duration::from_secs(1);
        rt.handle_message(GeneratorMessage::PlayNote, t1);
        rt.tick(t1 + Duration::from_millis(200));
        let samples = recording.samples();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].1, 0.0);
    }

    #[test]
    fn test_instruments_are_picked_from_the_selection() {
        let config = GeneratorConfig {
            auto_play: false,
            available_instruments: vec!["piano".into(), "guitar".into()],
            instrument: "piano,guitar".into(),
            ..GeneratorConfig::default()
        };
        let (mut rt, recording, _) = runtime_with(config);
        let t0 = Instant::now();
        rt.handle_message(GeneratorMessage::PlayNoteProgression { count: 40 }, t0);
        rt.tick(t0 + Duration::from_secs(10));

        let samples = recording.samples();
        assert_eq!(samples.len(), 40);
        assert!(samples.iter().any(|(url, _, _)| url.contains("/piano/")));
        assert!(samples.iter().any(|(url, _, _)| url.contains("/guitar/")));
    }

    #[test]
    fn test_transpose_reaches_inline_state() {
        let (mut rt, _, _) = runtime_with(quiet_config());
        rt.handle_message(GeneratorMessage::SetTranspose { semitones: 7 }, Instant::now());
        match &rt.engine {
            NoteEngine::Inline(engine) => assert_eq!(engine.state().transpose, 7),
            NoteEngine::Offloaded(_) => panic!("expected inline engine"),
        }
    }

    #[test]
    fn test_offloaded_notes_reach_playback() {
        let config = GeneratorConfig {
            compute_mode: ComputeMode::Offloaded,
            ..quiet_config()
        };
        let (mut rt, recording, _) = runtime_with(config);
        rt.handle_message(GeneratorMessage::PlayNoteProgression { count: 2 }, Instant::now());

        let deadline = Instant::now() + Duration::from_secs(5);
        while recording.samples().len() < 2 {
            assert!(Instant::now() < deadline, "offloaded notes never arrived");
            rt.tick(Instant::now());
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_malformed_reply_drops_one_note() {
        let (mut rt, recording, _) = runtime_with(quiet_config());
        let (request_tx, request_rx) = unbounded::<String>();
        let (reply_tx, reply_rx) = unbounded::<String>();
        rt.engine = NoteEngine::Offloaded(OffloadedEngine::with_worker(
            WorkerHandle::detached(request_tx, reply_rx),
            NoteSelector::new(rt.timeline.clone()),
            -5,
            Duration::from_secs(2),
        ));

        let t0 = Instant::now();
        rt.handle_message(GeneratorMessage::PlayNoteProgression { count: 2 }, t0);
        rt.tick(t0 + Duration::from_secs(1));
        assert_eq!(request_rx.try_iter().count(), 2);
        assert!(rt.engine.is_waiting());

        reply_tx.send(r#"{"sampleId":"note_60""#.to_string()).unwrap();
        let good = WorkerReply {
            sample_id: "note_60".into(),
            playback_rate: 1.0,
        };
        reply_tx.send(encode_reply(&good).unwrap()).unwrap();
        rt.tick(t0 + Duration::from_millis(1100));

        let samples = recording.samples();
        assert_eq!(samples.len(), 1);
        assert!(samples[0].0.ends_with("/note_60.ogg"));
        assert!(!rt.engine.is_waiting());
        match &rt.engine {
            NoteEngine::Offloaded(engine) => assert_eq!(engine.restarts(), 0),
            NoteEngine::Inline(_) => panic!("expected offloaded engine"),
        }
    }

    #[test]
    fn test_idle_time_tracks_next_due_event() {
        let (mut rt, _, _) = runtime_with(GeneratorConfig::default());
        let t0 = Instant::now();
        assert_eq!(rt.idle_time(t0), MAX_IDLE);

        rt.handle_message(GeneratorMessage::PlayNoteProgression { count: 1 }, t0);
        assert_eq!(rt.idle_time(t0), MAX_IDLE);
        assert_eq!(rt.idle_time(t0 + Duration::from_millis(300)), Duration::ZERO);

        rt.handle_message(GeneratorMessage::Start, t0);
        assert_eq!(rt.idle_time(t0), Duration::ZERO);
    }

    #[test]
    fn test_generator_lifecycle() {
        let _ = env_logger::builder().is_test(true).try_init();
        let recording = RecordingPlayback::default();
        let mut config = GeneratorConfig::default();
        config.set_auto_play_chance(1.0).unwrap();
        config.set_auto_play_interval(50).unwrap();
        config.seed = Some(7);
        let generator = Generator::spawn(config, Box::new(recording.clone())).unwrap();
        let handle = generator.handle().clone();

        assert!(handle.set_volume(1.5).is_err());
        assert_eq!(handle.config().volume, 1.0);
        assert!(handle.set_transpose(30).is_err());
        assert!(handle.set_instrument("kazoo").is_err());
        assert!(handle.set_auto_play_delay(10).is_err());

        handle.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while recording.samples().is_empty() {
            assert!(Instant::now() < deadline, "no note played");
            thread::sleep(Duration::from_millis(5));
        }

        handle.mute().unwrap();
        assert!(handle.is_muted());
        handle.unmute().unwrap();
        assert!(!handle.is_muted());

        generator.shutdown();
        assert!(handle.is_shutdown_requested());
        assert!(matches!(handle.play_note(), Err(Error::Disconnected)));
    }

    #[test]
    fn test_spawn_rejects_invalid_config() {
        let config = GeneratorConfig {
            volume: 3.0,
            ..GeneratorConfig::default()
        };
        let result = Generator::spawn(config, Box::new(RecordingPlayback::default()));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
