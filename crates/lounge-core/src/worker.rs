//! Off-thread note computation.
//!
//! In offloaded mode the [`MelodicState`] and the [`NoteSelector`] live on a
//! dedicated worker thread. The producer sends [`WorkerRequest`]s over a
//! channel and later collects [`WorkerReply`]s:
//!
//! - `GenerateNote` is a request/reply pair; the worker answers with the
//!   sample to play and its playback rate.
//! - `SetState` is fire-and-forget; the last one received wins.
//!
//! Both directions carry the JSON wire form. A frame that fails to decode is
//! dropped with a warning, which loses at most one note.
//!
//! The worker handles messages strictly in arrival order, but nothing orders
//! a `GenerateNote` already in flight against a `SetState` sent after it: the
//! note may still use the previous transpose. That window is accepted.
//!
//! On the wire the messages look like
//! `{"type":"generateNote","payload":{"segmentIndex":3}}`,
//! `{"type":"setState","payload":{"transpose":-5}}` and
//! `{"sampleId":"note_60","playbackRate":1.0}`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::samples::SampleMapper;
use crate::selector::{MelodicState, NoteSelector};

/// How often an idle worker checks for shutdown.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Producer to worker messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum WorkerRequest {
    /// Generate one note for the given progression segment.
    GenerateNote {
        #[serde(rename = "segmentIndex")]
        segment_index: usize,
    },
    /// Replace the worker's transpose.
    SetState { transpose: i32 },
}

/// Worker to producer reply for `GenerateNote`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerReply {
    pub sample_id: String,
    pub playback_rate: f64,
}

impl WorkerReply {
    /// Reject replies naming an unknown sample or carrying an unusable rate.
    pub fn validate(&self, mapper: &SampleMapper) -> Result<()> {
        if mapper.sample(&self.sample_id).is_none() {
            return Err(Error::Transport(format!(
                "reply names unknown sample '{}'",
                self.sample_id
            )));
        }
        if !(self.playback_rate.is_finite() && self.playback_rate > 0.0) {
            return Err(Error::Transport(format!(
                "reply carries invalid playback rate {}",
                self.playback_rate
            )));
        }
        Ok(())
    }
}

/// Decode a request from its JSON wire form.
pub fn decode_request(text: &str) -> Result<WorkerRequest> {
    serde_json::from_str(text).map_err(|e| Error::Transport(format!("bad request: {}", e)))
}

/// Decode a reply from its JSON wire form.
pub fn decode_reply(text: &str) -> Result<WorkerReply> {
    serde_json::from_str(text).map_err(|e| Error::Transport(format!("bad reply: {}", e)))
}

/// Encode a request to its JSON wire form.
pub fn encode_request(request: &WorkerRequest) -> Result<String> {
    Ok(serde_json::to_string(request)?)
}

/// Encode a reply to its JSON wire form.
pub fn encode_reply(reply: &WorkerReply) -> Result<String> {
    Ok(serde_json::to_string(reply)?)
}

/// Producer side of a worker thread.
pub struct WorkerHandle {
    request_tx: Sender<String>,
    reply_rx: Receiver<String>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Start a worker thread with a fresh melodic state.
    pub fn spawn(selector: NoteSelector, transpose: i32, seed: u64) -> Result<Self> {
        let (request_tx, request_rx) = unbounded();
        let (reply_tx, reply_rx) = unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_shutdown = shutdown.clone();
        let thread = thread::Builder::new()
            .name("lounge-note-worker".to_string())
            .spawn(move || {
                let mut worker = NoteWorker {
                    selector,
                    state: MelodicState::new(transpose),
                    rng: StdRng::seed_from_u64(seed),
                    request_rx,
                    reply_tx,
                };
                worker.run(thread_shutdown);
            })?;

        log::debug!("[WORKER] started (transpose {})", transpose);
        Ok(Self {
            request_tx,
            reply_rx,
            shutdown,
            thread: Some(thread),
        })
    }

    /// Handle over raw channels with no thread behind them.
    #[cfg(test)]
    pub(crate) fn detached(request_tx: Sender<String>, reply_rx: Receiver<String>) -> Self {
        Self {
            request_tx,
            reply_rx,
            shutdown: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Ask for one note. The reply arrives later through [`Self::try_recv`].
    pub fn generate(&self, segment_index: usize) -> Result<()> {
        self.send(WorkerRequest::GenerateNote { segment_index })
    }

    /// Fire-and-forget transpose update.
    pub fn set_transpose(&self, transpose: i32) -> Result<()> {
        self.send(WorkerRequest::SetState { transpose })
    }

    fn send(&self, request: WorkerRequest) -> Result<()> {
        let frame = encode_request(&request)?;
        self.request_tx
            .send(frame)
            .map_err(|e| Error::Transport(format!("worker unreachable: {}", e)))
    }

    /// Next raw reply frame if one is waiting. `Err` means the worker is
    /// gone. Decode it with [`decode_reply`].
    pub fn try_recv(&self) -> Result<Option<String>> {
        match self.reply_rx.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                Err(Error::Transport("worker reply channel closed".to_string()))
            }
        }
    }

    /// Stop the worker without waiting for it. Used when it stopped
    /// answering and may never return.
    pub fn abandon(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.thread.take();
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Worker side: owns the melodic state.
struct NoteWorker {
    selector: NoteSelector,
    state: MelodicState,
    rng: StdRng,
    request_rx: Receiver<String>,
    reply_tx: Sender<String>,
}

impl NoteWorker {
    fn run(&mut self, shutdown: Arc<AtomicBool>) {
        while !shutdown.load(Ordering::Relaxed) {
            match self.request_rx.recv_timeout(IDLE_POLL) {
                Ok(frame) => match decode_request(&frame) {
                    Ok(request) => {
                        if !self.handle(request) {
                            break;
                        }
                    }
                    Err(e) => log::warn!("[WORKER] dropping request: {}", e),
                },
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        log::debug!("[WORKER] stopped");
    }

    /// Process one request. Returns false once the producer is gone.
    fn handle(&mut self, request: WorkerRequest) -> bool {
        match request {
            WorkerRequest::GenerateNote { segment_index } => {
                let note =
                    self.selector
                        .next_note(&mut self.state, segment_index, Instant::now(), &mut self.rng);
                let reply = WorkerReply {
                    sample_id: note.sample_id.to_string(),
                    playback_rate: note.playback_rate,
                };
                match encode_reply(&reply) {
                    Ok(frame) => self.reply_tx.send(frame).is_ok(),
                    Err(e) => {
                        log::warn!("[WORKER] could not encode reply: {}", e);
                        true
                    }
                }
            }
            WorkerRequest::SetState { transpose } => {
                self.state.transpose = transpose;
                true
            }
        }
    }
}
