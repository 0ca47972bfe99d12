//! Audio output abstraction and backend implementations.
//!
//! An [`AudioOutput`] is one reusable playback unit: it is loaded with a
//! source, started, stopped, and reused. The pool never talks to a backend
//! directly; it only sees outputs built by an [`OutputFactory`].

pub mod audio_output;
mod kira_backend;
pub mod mock;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use crate::error::Result;

pub use kira_backend::{KiraOutput, KiraOutputFactory};
pub use mock::{MockOutput, MockOutputFactory, StartBehavior};

/// Lifecycle events emitted by an output while it is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// Playback reached the end of the source.
    Ended,
    /// Playback was paused by something other than the pool.
    Paused,
    /// The output failed mid-playback.
    Errored(String),
}

/// Coarse state of an output, as reported by the backend itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStatus {
    /// No source loaded.
    Idle,
    Playing,
    Paused,
    /// The loaded source finished or was stopped.
    Ended,
}

/// Future returned by [`AudioOutput::start`]. Resolves once the backend
/// accepted or refused playback.
pub type StartFuture = BoxFuture<'static, Result<()>>;

/// Listener invoked for each [`OutputEvent`].
pub type OutputListener = Arc<dyn Fn(OutputEvent) + Send + Sync>;

/// Removes a previously registered listener.
pub type Unsubscribe = Box<dyn FnOnce() + Send>;

/// A reusable audio-output unit.
pub trait AudioOutput: Send {
    /// Registers a listener for lifecycle events.
    fn subscribe(&mut self, listener: OutputListener) -> Unsubscribe;

    /// Loads `location` and starts playback at `volume` (0.0-1.0).
    ///
    /// The returned future does not borrow the output, so callers can release
    /// any locks before awaiting it.
    fn start(&mut self, location: &Path, volume: f32) -> StartFuture;

    /// Silences playback and releases the loaded source. The output stays
    /// usable for another `start`.
    fn stop(&mut self);

    fn set_volume(&mut self, volume: f32);

    fn volume(&self) -> f32;

    fn status(&self) -> OutputStatus;
}

/// Builds new outputs.
pub trait OutputFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn AudioOutput>>;

    /// Human-readable backend name for logging.
    fn name(&self) -> &str;
}

/// Shared registry of output listeners.
///
/// Backends emit from whatever thread observes the event; subscriptions are
/// removed through the closure returned by [`ListenerSet::subscribe`].
#[derive(Clone, Default)]
pub struct ListenerSet {
    inner: Arc<Mutex<ListenerRegistry>>,
}

#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    listeners: BTreeMap<u64, OutputListener>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener and returns the closure that removes it.
    pub fn subscribe(&self, listener: OutputListener) -> Unsubscribe {
        let id = match self.inner.lock() {
            Ok(mut registry) => {
                registry.next_id += 1;
                let id = registry.next_id;
                registry.listeners.insert(id, listener);
                id
            }
            Err(_) => return Box::new(|| {}),
        };

        let inner = Arc::clone(&self.inner);
        Box::new(move || {
            if let Ok(mut registry) = inner.lock() {
                registry.listeners.remove(&id);
            }
        })
    }

    /// Delivers an event to every current listener, in subscription order.
    pub fn emit(&self, event: OutputEvent) {
        // Snapshot first so listeners may unsubscribe while being called.
        let listeners: Vec<OutputListener> = match self.inner.lock() {
            Ok(registry) => registry.listeners.values().cloned().collect(),
            Err(_) => return,
        };
        for listener in listeners {
            listener(event.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|r| r.listeners.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
