//! One front for both places a note can be computed.
//!
//! The runtime asks a [`NoteEngine`] for notes and later polls for the
//! results. Inline, the answer is ready on the next poll. Offloaded, the
//! request travels to a [`WorkerHandle`] and the reply shows up whenever the
//! worker gets to it; the engine also watches the worker's health and
//! restarts it when it stops answering.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::config::ComputeMode;
use crate::error::Result;
use crate::selector::{MelodicState, NoteSelector};
use crate::worker::{decode_reply, WorkerHandle, WorkerReply};

/// A note ready to hand to the playback service.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedNote {
    pub sample_id: String,
    pub playback_rate: f64,
}

/// Note computation, inline or on a worker thread.
pub enum NoteEngine {
    Inline(InlineEngine),
    Offloaded(OffloadedEngine),
}

impl NoteEngine {
    /// Build the engine for `mode`. Offloaded mode starts its worker here.
    pub fn new<R: Rng>(
        mode: ComputeMode,
        selector: NoteSelector,
        transpose: i32,
        worker_timeout: Duration,
        rng: &mut R,
    ) -> Result<Self> {
        Ok(match mode {
            ComputeMode::Inline => NoteEngine::Inline(InlineEngine::new(selector, transpose)),
            ComputeMode::Offloaded => {
                let worker = WorkerHandle::spawn(selector.clone(), transpose, rng.random())?;
                NoteEngine::Offloaded(OffloadedEngine::with_worker(
                    worker,
                    selector,
                    transpose,
                    worker_timeout,
                ))
            }
        })
    }

    pub fn mode(&self) -> ComputeMode {
        match self {
            NoteEngine::Inline(_) => ComputeMode::Inline,
            NoteEngine::Offloaded(_) => ComputeMode::Offloaded,
        }
    }

    /// Ask for one note in `segment_index`.
    pub fn request<R: Rng>(&mut self, segment_index: usize, now: Instant, rng: &mut R) {
        match self {
            NoteEngine::Inline(engine) => engine.request(segment_index, now, rng),
            NoteEngine::Offloaded(engine) => engine.request(segment_index, now, rng),
        }
    }

    pub fn set_transpose(&mut self, semitones: i32) {
        match self {
            NoteEngine::Inline(engine) => engine.state.transpose = semitones,
            NoteEngine::Offloaded(engine) => engine.set_transpose(semitones),
        }
    }

    /// True while notes have been requested but not collected yet.
    pub fn is_waiting(&self) -> bool {
        match self {
            NoteEngine::Inline(engine) => !engine.ready.is_empty(),
            NoteEngine::Offloaded(engine) => engine.outstanding() > 0,
        }
    }

    /// Collect finished notes.
    pub fn poll<R: Rng>(&mut self, now: Instant, rng: &mut R) -> Vec<RenderedNote> {
        match self {
            NoteEngine::Inline(engine) => std::mem::take(&mut engine.ready),
            NoteEngine::Offloaded(engine) => engine.poll(now, rng),
        }
    }
}

/// Selector and melodic state on the caller's thread.
pub struct InlineEngine {
    selector: NoteSelector,
    state: MelodicState,
    ready: Vec<RenderedNote>,
}

impl InlineEngine {
    pub fn new(selector: NoteSelector, transpose: i32) -> Self {
        Self {
            selector,
            state: MelodicState::new(transpose),
            ready: Vec::new(),
        }
    }

    pub fn state(&self) -> &MelodicState {
        &self.state
    }

    fn request<R: Rng>(&mut self, segment_index: usize, now: Instant, rng: &mut R) {
        let note = self
            .selector
            .next_note(&mut self.state, segment_index, now, rng);
        self.ready.push(RenderedNote {
            sample_id: note.sample_id.to_string(),
            playback_rate: note.playback_rate,
        });
    }
}

/// Melodic state on a worker thread, with a health check.
pub struct OffloadedEngine {
    worker: Option<WorkerHandle>,
    /// Template for restarted workers; also validates replies.
    selector: NoteSelector,
    /// Send times of unanswered requests, oldest first.
    in_flight: VecDeque<Instant>,
    transpose: i32,
    timeout: Duration,
    restarts: u32,
}

impl OffloadedEngine {
    pub fn with_worker(
        worker: WorkerHandle,
        selector: NoteSelector,
        transpose: i32,
        timeout: Duration,
    ) -> Self {
        Self {
            worker: Some(worker),
            selector,
            in_flight: VecDeque::new(),
            transpose,
            timeout,
            restarts: 0,
        }
    }

    /// Requests sent but not yet answered.
    pub fn outstanding(&self) -> usize {
        self.in_flight.len()
    }

    /// Times the worker has been replaced.
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    fn request<R: Rng>(&mut self, segment_index: usize, now: Instant, rng: &mut R) {
        if self.worker.is_none() {
            self.restart("worker not running", rng);
        }
        let Some(worker) = &self.worker else {
            log::warn!("[ENGINE] no worker, dropping note for segment {}", segment_index);
            return;
        };
        match worker.generate(segment_index) {
            Ok(()) => self.in_flight.push_back(now),
            Err(e) => {
                log::warn!("[ENGINE] dropping note: {}", e);
                self.restart("request channel closed", rng);
            }
        }
    }

    fn set_transpose(&mut self, semitones: i32) {
        self.transpose = semitones;
        if let Some(worker) = &self.worker {
            if let Err(e) = worker.set_transpose(semitones) {
                // The next health check restarts the worker with this value.
                log::warn!("[ENGINE] transpose not delivered: {}", e);
            }
        }
    }

    fn poll<R: Rng>(&mut self, now: Instant, rng: &mut R) -> Vec<RenderedNote> {
        let mut notes = Vec::new();
        let mut failure = None;

        if let Some(worker) = &self.worker {
            loop {
                match worker.try_recv() {
                    Ok(Some(frame)) => {
                        self.in_flight.pop_front();
                        let checked = decode_reply(&frame)
                            .and_then(|reply| reply.validate(self.selector.mapper()).map(|()| reply));
                        match checked {
                            Ok(WorkerReply {
                                sample_id,
                                playback_rate,
                            }) => notes.push(RenderedNote {
                                sample_id,
                                playback_rate,
                            }),
                            Err(e) => log::warn!("[ENGINE] dropping reply: {}", e),
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        failure = Some(e.to_string());
                        break;
                    }
                }
            }
        }

        if failure.is_none() {
            if let Some(oldest) = self.in_flight.front() {
                let waited = now.saturating_duration_since(*oldest);
                if waited > self.timeout {
                    failure = Some(format!("no reply for {:?}", waited));
                }
            }
        }

        if let Some(reason) = failure {
            self.restart(&reason, rng);
        }
        notes
    }

    /// Replace the worker with a fresh one carrying the current transpose.
    /// Unanswered requests are forgotten.
    fn restart<R: Rng>(&mut self, reason: &str, rng: &mut R) {
        if let Some(old) = self.worker.take() {
            old.abandon();
        }
        if !self.in_flight.is_empty() {
            log::warn!("[ENGINE] dropping {} unanswered note request(s)", self.in_flight.len());
            self.in_flight.clear();
        }

        match WorkerHandle::spawn(self.selector.clone(), self.transpose, rng.random()) {
            Ok(worker) => {
                self.restarts += 1;
                log::warn!(
                    "[ENGINE] note worker restarted ({}), restart #{}",
                    reason,
                    self.restarts
                );
                self.worker = Some(worker);
            }
            Err(e) => log::error!("[ENGINE] could not restart note worker: {}", e),
        }
    }
}
