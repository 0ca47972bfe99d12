//! Playback handles and their lifecycle.

use std::fmt;
use std::path::Path;
use std::time::Instant;

use crate::engines::{AudioOutput, StartFuture, Unsubscribe};
use crate::error::Error;

/// Arena key of one playback instance: the sound it plays plus a per-sound
/// ordinal that is never reused within a pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceKey {
    source: String,
    ordinal: u64,
}

impl InstanceKey {
    pub fn new(source: impl Into<String>, ordinal: u64) -> Self {
        Self {
            source: source.into(),
            ordinal,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.source, self.ordinal)
    }
}

/// Lifecycle of a handle.
///
/// `Idle -> Starting -> Playing -> Paused`, and from any of those a single
/// teardown into `Ended`, `Stopped` or `Errored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Idle,
    Starting,
    Playing,
    Paused,
    Ended,
    Stopped,
    Errored,
}

impl HandleState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            HandleState::Ended | HandleState::Stopped | HandleState::Errored
        )
    }
}

/// Why a handle was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    /// The sound played to the end.
    Ended,
    /// Stopped by `stop_specific`, `stop_instance` or `stop_all`.
    Stopped,
    /// Stopped by the concurrency/repeat policy to make way for another sound.
    Replaced,
    /// Evicted to respect the pool or per-sound capacity.
    Evicted,
    /// The output failed mid-playback.
    Errored,
    /// The backend refused to start playback.
    StartRejected,
    /// Paused outside the pool. The handle stays live and may be evicted or
    /// stopped later without a second completion.
    Paused,
}

impl CompletionReason {
    fn terminal_state(self) -> HandleState {
        match self {
            CompletionReason::Ended => HandleState::Ended,
            CompletionReason::Errored | CompletionReason::StartRejected => HandleState::Errored,
            CompletionReason::Stopped
            | CompletionReason::Replaced
            | CompletionReason::Evicted
            | CompletionReason::Paused => HandleState::Stopped,
        }
    }
}

/// Delivered once to a `play` caller when its handle is torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub key: InstanceKey,
    pub reason: CompletionReason,
}

pub type CompletionCallback = Box<dyn FnOnce(Completion) + Send>;

/// A completion waiting to be delivered outside the pool lock.
pub(crate) struct PendingCompletion {
    callback: CompletionCallback,
    completion: Completion,
}

impl PendingCompletion {
    pub(crate) fn fire(self) {
        (self.callback)(self.completion);
    }
}

/// What remains of a handle after teardown.
pub(crate) struct Teardown {
    pub output: Option<Box<dyn AudioOutput>>,
    /// False when the output was torn down mid-start and must not be reused.
    pub reusable: bool,
    pub completion: Option<PendingCompletion>,
}

/// One live playback instance owned by the pool.
pub(crate) struct PlaybackHandle {
    key: InstanceKey,
    output: Option<Box<dyn AudioOutput>>,
    state: HandleState,
    last_used: u64,
    started_at: Instant,
    cleanups: Vec<Unsubscribe>,
    on_complete: Option<CompletionCallback>,
}

impl PlaybackHandle {
    pub(crate) fn new(
        key: InstanceKey,
        output: Box<dyn AudioOutput>,
        last_used: u64,
        on_complete: Option<CompletionCallback>,
    ) -> Self {
        Self {
            key,
            output: Some(output),
            state: HandleState::Idle,
            last_used,
            started_at: Instant::now(),
            cleanups: Vec::new(),
            on_complete,
        }
    }

    pub(crate) fn key(&self) -> &InstanceKey {
        &self.key
    }

    pub(crate) fn state(&self) -> HandleState {
        self.state
    }

    pub(crate) fn last_used(&self) -> u64 {
        self.last_used
    }

    pub(crate) fn started_at(&self) -> Instant {
        self.started_at
    }

    pub(crate) fn output(&self) -> Option<&dyn AudioOutput> {
        self.output.as_deref()
    }

    pub(crate) fn output_mut(&mut self) -> Option<&mut Box<dyn AudioOutput>> {
        self.output.as_mut()
    }

    /// Registers a cleanup to run at teardown.
    pub(crate) fn add_cleanup(&mut self, cleanup: Unsubscribe) {
        self.cleanups.push(cleanup);
    }

    pub(crate) fn begin_start(&mut self) {
        if self.state == HandleState::Idle {
            self.state = HandleState::Starting;
        }
    }

    /// Tells the output to play `location`.
    ///
    /// Cleanups must already be registered, so a teardown racing the start
    /// always unsubscribes.
    pub(crate) fn start(&mut self, location: &Path, volume: f32) -> StartFuture {
        self.begin_start();
        match self.output.as_mut() {
            Some(output) => output.start(location, volume),
            None => {
                let error = Error::OutputUnavailable(format!("{} has no output", self.key));
                Box::pin(futures::future::ready(Err(error)))
            }
        }
    }

    /// The backend accepted playback.
    pub(crate) fn mark_started(&mut self) {
        if self.state == HandleState::Starting {
            self.state = HandleState::Playing;
        }
    }

    /// External pause: the caller hears about it now, and the handle stays in
    /// the pool as an eviction candidate with no completion left to deliver.
    pub(crate) fn pause(&mut self) -> Option<PendingCompletion> {
        if !matches!(self.state, HandleState::Starting | HandleState::Playing) {
            return None;
        }
        self.state = HandleState::Paused;
        self.on_complete.take().map(|callback| PendingCompletion {
            callback,
            completion: Completion {
                key: self.key.clone(),
                reason: CompletionReason::Paused,
            },
        })
    }

    /// Whether this handle may be evicted to make room for a new one.
    ///
    /// Starting handles never are; otherwise the handle must not be audibly
    /// playing, either by its own state or as reported by the backend.
    pub(crate) fn is_evictable(&self) -> bool {
        use crate::engines::OutputStatus;

        match self.state {
            HandleState::Paused => true,
            HandleState::Playing => self
                .output
                .as_ref()
                .map_or(true, |o| o.status() != OutputStatus::Playing),
            _ => false,
        }
    }

    /// Single transition into a terminal state.
    ///
    /// Runs the cleanups in registration order and silences the output. A
    /// second call returns `None`.
    pub(crate) fn teardown(&mut self, reason: CompletionReason) -> Option<Teardown> {
        if self.state.is_terminal() {
            return None;
        }

        let reusable = self.state != HandleState::Starting;
        self.state = reason.terminal_state();

        for cleanup in self.cleanups.drain(..) {
            cleanup();
        }

        let mut output = self.output.take();
        if let Some(output) = output.as_mut() {
            output.stop();
        }

        let completion = self.on_complete.take().map(|callback| PendingCompletion {
            callback,
            completion: Completion {
                key: self.key.clone(),
                reason,
            },
        });

        Some(Teardown {
            output,
            reusable,
            completion,
        })
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        for cleanup in self.cleanups.drain(..) {
            cleanup();
        }
        if let Some(output) = self.output.as_mut() {
            output.stop();
        }
    }
}
