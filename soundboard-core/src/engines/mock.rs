//! Mock audio outputs for tests and headless front ends.
//!
//! Nothing is played. The [`MockOutputFactory`] keeps a record of every output
//! it built, so callers can decide how starts resolve and inject lifecycle
//! events the way a real device would.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::sync::oneshot;

use crate::engines::{
    AudioOutput, ListenerSet, OutputEvent, OutputFactory, OutputListener, OutputStatus,
    StartFuture, Unsubscribe,
};
use crate::error::{Error, Result};

/// How [`MockOutput::start`] resolves.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StartBehavior {
    /// Start succeeds immediately.
    #[default]
    Resolve,
    /// Start fails immediately with the given reason.
    Reject(String),
    /// Start stays pending until [`MockOutputFactory::release`] is called.
    Pending,
}

#[derive(Debug)]
struct MockState {
    status: OutputStatus,
    volume: f32,
    location: Option<PathBuf>,
    starts: usize,
    stops: usize,
    /// Listeners subscribed when the latest start began.
    listeners_at_start: Option<usize>,
    dropped: bool,
}

struct MockShared {
    listeners: ListenerSet,
    state: Mutex<MockState>,
}

struct PendingStart {
    index: usize,
    sender: oneshot::Sender<Result<()>>,
}

#[derive(Default)]
struct FactoryState {
    outputs: Vec<Arc<MockShared>>,
    behavior: StartBehavior,
    fail_create: bool,
    pending: Vec<PendingStart>,
}

/// Builds [`MockOutput`]s and exposes control over them.
///
/// Cloning shares the same records, so a test can keep a clone after handing
/// the factory to a pool.
#[derive(Clone, Default)]
pub struct MockOutputFactory {
    inner: Arc<Mutex<FactoryState>>,
}

impl MockOutputFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how subsequent starts resolve.
    pub fn set_start_behavior(&self, behavior: StartBehavior) {
        if let Ok(mut state) = self.inner.lock() {
            state.behavior = behavior;
        }
    }

    /// Makes `create` fail, simulating an exhausted audio device.
    pub fn set_fail_create(&self, fail: bool) {
        if let Ok(mut state) = self.inner.lock() {
            state.fail_create = fail;
        }
    }

    /// Number of outputs built so far.
    pub fn created(&self) -> usize {
        self.inner.lock().map(|s| s.outputs.len()).unwrap_or(0)
    }

    /// Number of starts still waiting for [`release`](Self::release).
    pub fn pending_starts(&self) -> usize {
        self.inner.lock().map(|s| s.pending.len()).unwrap_or(0)
    }

    /// Resolves the oldest pending start of output `index`.
    ///
    /// Returns false if that output has no pending start.
    pub fn release(&self, index: usize, result: Result<()>) -> bool {
        let pending = match self.inner.lock() {
            Ok(mut state) => match state.pending.iter().position(|p| p.index == index) {
                Some(position) => state.pending.remove(position),
                None => return false,
            },
            Err(_) => return false,
        };

        if result.is_ok() {
            self.with_state(index, |s| {
                if s.location.is_some() {
                    s.status = OutputStatus::Playing;
                }
            });
        }
        pending.sender.send(result).is_ok()
    }

    /// Resolves every pending start successfully. Returns how many were released.
    pub fn release_all(&self) -> usize {
        let indices: Vec<usize> = match self.inner.lock() {
            Ok(state) => state.pending.iter().map(|p| p.index).collect(),
            Err(_) => return 0,
        };
        indices
            .into_iter()
            .filter(|&index| self.release(index, Ok(())))
            .count()
    }

    /// Delivers `event` to the listeners of output `index`.
    pub fn emit(&self, index: usize, event: OutputEvent) -> bool {
        match self.output(index) {
            Some(output) => {
                output.listeners.emit(event);
                true
            }
            None => false,
        }
    }

    /// Simulates the output reaching the end of its source.
    pub fn finish(&self, index: usize) -> bool {
        self.with_state(index, |s| s.status = OutputStatus::Ended);
        self.emit(index, OutputEvent::Ended)
    }

    /// Simulates an external pause (device change, OS media controls).
    pub fn pause(&self, index: usize) -> bool {
        self.with_state(index, |s| s.status = OutputStatus::Paused);
        self.emit(index, OutputEvent::Paused)
    }

    /// Simulates a playback failure.
    pub fn fail(&self, index: usize, reason: &str) -> bool {
        self.with_state(index, |s| s.status = OutputStatus::Ended);
        self.emit(index, OutputEvent::Errored(reason.to_string()))
    }

    /// Indices of outputs currently loaded with `location`, oldest first.
    pub fn outputs_for(&self, location: &Path) -> Vec<usize> {
        let outputs = match self.inner.lock() {
            Ok(state) => state.outputs.clone(),
            Err(_) => return Vec::new(),
        };
        outputs
            .iter()
            .enumerate()
            .filter(|(_, output)| {
                output
                    .state
                    .lock()
                    .map(|s| s.location.as_deref() == Some(location))
                    .unwrap_or(false)
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// Locations of every output that is currently playing.
    pub fn playing_locations(&self) -> Vec<PathBuf> {
        let outputs = match self.inner.lock() {
            Ok(state) => state.outputs.clone(),
            Err(_) => return Vec::new(),
        };
        outputs
            .iter()
            .filter_map(|output| {
                let state = output.state.lock().ok()?;
                match state.status {
                    OutputStatus::Playing => state.location.clone(),
                    _ => None,
                }
            })
            .collect()
    }

    pub fn status(&self, index: usize) -> Option<OutputStatus> {
        self.read_state(index, |s| s.status)
    }

    pub fn volume(&self, index: usize) -> Option<f32> {
        self.read_state(index, |s| s.volume)
    }

    pub fn start_count(&self, index: usize) -> usize {
        self.read_state(index, |s| s.starts).unwrap_or(0)
    }

    pub fn stop_count(&self, index: usize) -> usize {
        self.read_state(index, |s| s.stops).unwrap_or(0)
    }

    /// Listeners that were subscribed when output `index` last started.
    pub fn listeners_at_start(&self, index: usize) -> Option<usize> {
        self.read_state(index, |s| s.listeners_at_start).flatten()
    }

    /// Whether output `index` has been dropped by its owner.
    pub fn is_dropped(&self, index: usize) -> bool {
        self.read_state(index, |s| s.dropped).unwrap_or(false)
    }

    /// Number of listeners currently subscribed to output `index`.
    pub fn listener_count(&self, index: usize) -> usize {
        self.output(index).map(|o| o.listeners.len()).unwrap_or(0)
    }

    fn output(&self, index: usize) -> Option<Arc<MockShared>> {
        self.inner
            .lock()
            .ok()
            .and_then(|state| state.outputs.get(index).cloned())
    }

    fn read_state<R>(&self, index: usize, f: impl FnOnce(&MockState) -> R) -> Option<R> {
        let output = self.output(index)?;
        let state = output.state.lock().ok()?;
        Some(f(&state))
    }

    fn with_state(&self, index: usize, f: impl FnOnce(&mut MockState)) {
        if let Some(output) = self.output(index) {
            if let Ok(mut state) = output.state.lock() {
                f(&mut state);
            }
        }
    }
}

impl OutputFactory for MockOutputFactory {
    fn create(&self) -> Result<Box<dyn AudioOutput>> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| Error::OutputUnavailable("Mock factory lock poisoned".to_string()))?;

        if state.fail_create {
            return Err(Error::OutputUnavailable(
                "Mock factory configured to fail".to_string(),
            ));
        }

        let index = state.outputs.len();
        let shared = Arc::new(MockShared {
            listeners: ListenerSet::new(),
            state: Mutex::new(MockState {
                status: OutputStatus::Idle,
                volume: 1.0,
                location: None,
                starts: 0,
                stops: 0,
                listeners_at_start: None,
                dropped: false,
            }),
        });
        state.outputs.push(Arc::clone(&shared));

        Ok(Box::new(MockOutput {
            index,
            shared,
            factory: Arc::clone(&self.inner),
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// An output that records what it was asked to do.
pub struct MockOutput {
    index: usize,
    shared: Arc<MockShared>,
    factory: Arc<Mutex<FactoryState>>,
}

impl MockOutput {
    /// Position of this output in its factory's records.
    pub fn index(&self) -> usize {
        self.index
    }

    fn update(&self, f: impl FnOnce(&mut MockState)) {
        if let Ok(mut state) = self.shared.state.lock() {
            f(&mut state);
        }
    }
}

impl AudioOutput for MockOutput {
    fn subscribe(&mut self, listener: OutputListener) -> Unsubscribe {
        self.shared.listeners.subscribe(listener)
    }

    fn start(&mut self, location: &Path, volume: f32) -> StartFuture {
        let behavior = self
            .factory
            .lock()
            .map(|s| s.behavior.clone())
            .unwrap_or_default();

        let listeners = self.shared.listeners.len();
        self.update(|s| {
            s.starts += 1;
            s.listeners_at_start = Some(listeners);
            s.volume = volume;
            s.location = Some(location.to_path_buf());
        });

        match behavior {
            StartBehavior::Resolve => {
                self.update(|s| s.status = OutputStatus::Playing);
                futures::future::ready(Ok(())).boxed()
            }
            StartBehavior::Reject(reason) => {
                self.update(|s| {
                    s.status = OutputStatus::Idle;
                    s.location = None;
                });
                let location = location.display().to_string();
                futures::future::ready(Err(Error::EngineStartRejected(location, reason))).boxed()
            }
            StartBehavior::Pending => {
                let (sender, receiver) = oneshot::channel();
                if let Ok(mut state) = self.factory.lock() {
                    state.pending.push(PendingStart {
                        index: self.index,
                        sender,
                    });
                }
                let location = location.display().to_string();
                async move {
                    match receiver.await {
                        Ok(result) => result,
                        Err(_) => Err(Error::EngineStartRejected(
                            location,
                            "start abandoned".to_string(),
                        )),
                    }
                }
                .boxed()
            }
        }
    }

    fn stop(&mut self) {
        self.update(|s| {
            s.status = OutputStatus::Idle;
            s.location = None;
            s.stops += 1;
        });
    }

    fn set_volume(&mut self, volume: f32) {
        self.update(|s| s.volume = volume);
    }

    fn volume(&self) -> f32 {
        self.shared.state.lock().map(|s| s.volume).unwrap_or(0.0)
    }

    fn status(&self) -> OutputStatus {
        self.shared
            .state
            .lock()
            .map(|s| s.status)
            .unwrap_or(OutputStatus::Idle)
    }
}

impl Drop for MockOutput {
    fn drop(&mut self) {
        self.update(|s| s.dropped = true);
    }
}
