//! Playback pool: a bounded set of playing sound instances.
//!
//! Every start and stop goes through [`PlaybackPool`]. A `play` call applies
//! the concurrency/repeat policy, evicts what it must, and registers the new
//! handle before the backend is asked to start, all under one lock. The only
//! suspension point is the backend start itself; once it resolves the handle
//! is marked playing, unless something tore it down in the meantime.
//!
//! Output lifecycle events arrive on backend threads and are forwarded over a
//! channel; they are applied by [`PlaybackPool::process_events`] or
//! [`PlaybackPool::run_events`].

mod handle;
pub mod policy;
mod reserve;


use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::mpsc;

use crate::config::{PlaybackMode, PoolLimits, PoolSettings, SettingsValidator};
use crate::engines::{OutputEvent, OutputFactory, OutputListener};
use crate::error::{Error, Result};

pub use handle::{Completion, CompletionCallback, CompletionReason, HandleState, InstanceKey};

use handle::{PendingCompletion, PlaybackHandle};
use policy::LiveHandle;
use reserve::IdleReserve;

/// A request to start one sound.
pub struct PlayRequest {
    /// Logical sound identifier. Must not be empty.
    pub source: String,
    /// Resolved audio location handed to the backend.
    pub location: PathBuf,
    /// Linear volume (0.0-1.0) for this instance.
    pub volume: f32,
    /// Overrides the pool's repeat mode for this call.
    pub repeat: Option<bool>,
    /// Called once when the started instance is torn down.
    pub on_complete: Option<CompletionCallback>,
}

impl PlayRequest {
    pub fn new(source: impl Into<String>, location: impl Into<PathBuf>, volume: f32) -> Self {
        Self {
            source: source.into(),
            location: location.into(),
            volume,
            repeat: None,
            on_complete: None,
        }
    }

    pub fn repeat(mut self, repeat: bool) -> Self {
        self.repeat = Some(repeat);
        self
    }

    pub fn on_complete(mut self, callback: impl FnOnce(Completion) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }
}

/// Result of a `play` call that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    /// The instance is registered and its backend accepted playback.
    Started(InstanceKey),
    /// Nothing was started.
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The pool is full and no handle is eligible for eviction.
    PoolSaturated,
    /// The per-sound cap is zero.
    SourceDisabled,
    /// The same sound is still starting.
    AlreadyLoading,
    /// The instance was torn down before its backend finished starting.
    Superseded,
}

/// Read-only view of one handle.
#[derive(Debug, Clone)]
pub struct HandleInfo {
    pub key: InstanceKey,
    pub state: HandleState,
    pub volume: f32,
    pub started_at: Instant,
}

/// Event forwarded from an output listener.
struct PoolEvent {
    key: InstanceKey,
    event: OutputEvent,
}

struct PoolState {
    handles: HashMap<InstanceKey, PlaybackHandle>,
    instance_counts: HashMap<String, usize>,
    next_ordinal: HashMap<String, u64>,
    /// Sounds whose start is in flight, with the instance that is starting.
    loading: HashMap<String, InstanceKey>,
    reserve: IdleReserve,
    mode: PlaybackMode,
    volume: f32,
    clock: u64,
}

impl PoolState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn next_key(&mut self, source: &str) -> InstanceKey {
        let ordinal = self.next_ordinal.entry(source.to_string()).or_insert(0);
        *ordinal += 1;
        InstanceKey::new(source, *ordinal)
    }

    fn live_handles(&self) -> Vec<LiveHandle> {
        self.handles
            .values()
            .map(|h| LiveHandle::new(h.key().clone(), h.last_used()))
            .collect()
    }

    fn eviction_candidates(&self, excluded: &[InstanceKey]) -> Vec<LiveHandle> {
        self.handles
            .values()
            .filter(|h| h.is_evictable() && !excluded.contains(h.key()))
            .map(|h| LiveHandle::new(h.key().clone(), h.last_used()))
            .collect()
    }

    fn keys_for(&self, source: &str) -> Vec<InstanceKey> {
        self.handles
            .keys()
            .filter(|k| k.source() == source)
            .cloned()
            .collect()
    }

    fn insert(&mut self, handle: PlaybackHandle) {
        let key = handle.key().clone();
        *self
            .instance_counts
            .entry(key.source().to_string())
            .or_insert(0) += 1;
        self.handles.insert(key, handle);
    }

    /// Removes a handle and tears it down. Returns the completion to deliver
    /// once the lock is released.
    fn remove(&mut self, key: &InstanceKey, reason: CompletionReason) -> Option<PendingCompletion> {
        let mut handle = self.handles.remove(key)?;

        if let Some(count) = self.instance_counts.get_mut(key.source()) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.instance_counts.remove(key.source());
            }
        }
        if self.loading.get(key.source()) == Some(key) {
            self.loading.remove(key.source());
        }

        let torn = handle.teardown(reason)?;
        tracing::debug!("Tore down {} ({:?})", key, reason);

        if let Some(output) = torn.output {
            if torn.reusable {
                self.reserve.put(output);
            }
        }
        torn.completion
    }

    fn remove_all(
        &mut self,
        keys: &[InstanceKey],
        reason: CompletionReason,
        completions: &mut Vec<PendingCompletion>,
    ) {
        for key in keys {
            if let Some(completion) = self.remove(key, reason) {
                completions.push(completion);
            }
        }
    }
}

/// Bounded pool of playing sound instances.
pub struct PlaybackPool {
    factory: Arc<dyn OutputFactory>,
    limits: PoolLimits,
    state: Mutex<PoolState>,
    events_tx: mpsc::UnboundedSender<PoolEvent>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<PoolEvent>>,
}

impl PlaybackPool {
    /// Creates a pool. `limits` are fixed for the pool's lifetime.
    pub fn new(
        factory: Arc<dyn OutputFactory>,
        limits: PoolLimits,
        mode: PlaybackMode,
        volume: f32,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tracing::info!(
            "Playback pool using {} outputs (max {} handles, {} per sound)",
            factory.name(),
            limits.max_pool_size,
            limits.max_instances_per_sound
        );

        Self {
            factory,
            limits,
            state: Mutex::new(PoolState {
                handles: HashMap::new(),
                instance_counts: HashMap::new(),
                next_ordinal: HashMap::new(),
                loading: HashMap::new(),
                reserve: IdleReserve::new(limits.idle_reserve_size),
                mode,
                volume: sanitize_volume(volume),
                clock: 0,
            }),
            events_tx,
            events_rx: tokio::sync::Mutex::new(events_rx),
        }
    }

    /// Validates `settings` and creates a pool from them.
    pub fn from_settings(factory: Arc<dyn OutputFactory>, settings: &PoolSettings) -> Result<Self> {
        SettingsValidator::new().validate(settings)?;
        Ok(Self::new(
            factory,
            settings.limits(),
            settings.mode(),
            settings.volume,
        ))
    }

    /// Starts one instance of `request.source`.
    ///
    /// Policy stops and evictions are applied before the backend is asked to
    /// start. A request that cannot be satisfied without breaking a capacity
    /// limit is dropped without touching the pool. Backend start failures tear
    /// the new handle down and return [`Error::EngineStartRejected`].
    pub async fn play(&self, request: PlayRequest) -> Result<PlayOutcome> {
        let PlayRequest {
            source,
            location,
            volume,
            repeat,
            on_complete,
        } = request;

        if source.is_empty() {
            return Err(Error::InvalidSourceKey);
        }
        let volume = sanitize_volume(volume);

        let (key, start, completions) = {
            let mut state = self.state.lock().map_err(|_| Error::PoolLock)?;

            if state.loading.contains_key(&source) {
                tracing::debug!("Ignoring play of '{}': still starting", source);
                return Ok(PlayOutcome::Dropped(DropReason::AlreadyLoading));
            }

            let repeat = repeat.unwrap_or(state.mode.repeat_sound_enabled);
            let cap = self.limits.max_instances_per_sound;
            if cap == 0 {
                tracing::warn!("Sound '{}' is disabled (per-sound cap is 0)", source);
                return Ok(PlayOutcome::Dropped(DropReason::SourceDisabled));
            }

            let live = state.live_handles();
            let stops = policy::plan_stops(state.mode, &source, repeat, &live);
            let capped = policy::plan_instance_cap(&source, cap, &live, &stops);

            let mut excluded = stops.clone();
            excluded.extend(capped.iter().cloned());
            let remaining = state.handles.len() - excluded.len();

            let evictions = if remaining >= self.limits.max_pool_size {
                let needed = remaining + 1 - self.limits.max_pool_size;
                let candidates = state.eviction_candidates(&excluded);
                match policy::plan_evictions(needed, &candidates) {
                    Some(keys) => keys,
                    None => {
                        tracing::warn!(
                            "Pool full ({} of {} handles playing), dropping '{}'",
                            state.handles.len(),
                            self.limits.max_pool_size,
                            source
                        );
                        return Ok(PlayOutcome::Dropped(DropReason::PoolSaturated));
                    }
                }
            } else {
                Vec::new()
            };

            let mut output = match state.reserve.take() {
                Some(output) => output,
                None => self.factory.create()?,
            };

            let mut completions = Vec::new();
            state.remove_all(&stops, CompletionReason::Replaced, &mut completions);
            state.remove_all(&capped, CompletionReason::Evicted, &mut completions);
            state.remove_all(&evictions, CompletionReason::Evicted, &mut completions);

            let key = state.next_key(&source);
            let unsubscribe = output.subscribe(self.listener_for(&key));

            let tick = state.tick();
            let mut handle = PlaybackHandle::new(key.clone(), output, tick, on_complete);
            handle.add_cleanup(unsubscribe);
            let start = handle.start(&location, volume);

            state.insert(handle);
            state.loading.insert(source.clone(), key.clone());

            (key, start, completions)
        };

        fire(completions);

        let result = start.await;

        let (outcome, completion) = {
            let mut state = self.state.lock().map_err(|_| Error::PoolLock)?;

            if state.loading.get(&source) == Some(&key) {
                state.loading.remove(&source);
            }

            if !state.handles.contains_key(&key) {
                tracing::debug!("{} was torn down before it started", key);
                (Ok(PlayOutcome::Dropped(DropReason::Superseded)), None)
            } else {
                match result {
                    Ok(()) => {
                        if let Some(handle) = state.handles.get_mut(&key) {
                            handle.mark_started();
                        }
                        tracing::info!("Playing {} from {}", key, location.display());
                        (Ok(PlayOutcome::Started(key)), None)
                    }
                    Err(e) => {
                        let reason = match e {
                            Error::EngineStartRejected(_, reason) => reason,
                            other => other.to_string(),
                        };
                        tracing::warn!("Playback of {} was rejected: {}", key, reason);
                        let completion = state.remove(&key, CompletionReason::StartRejected);
                        (
                            Err(Error::EngineStartRejected(key.to_string(), reason)),
                            completion,
                        )
                    }
                }
            }
        };

        if let Some(completion) = completion {
            completion.fire();
        }
        outcome
    }

    /// Stops every instance of `source`. Returns how many were stopped.
    pub fn stop_specific(&self, source: &str) -> usize {
        self.stop_where(|state| state.keys_for(source))
    }

    /// Stops one instance. Returns false if it was not live.
    pub fn stop_instance(&self, key: &InstanceKey) -> bool {
        self.stop_where(|state| {
            if state.handles.contains_key(key) {
                vec![key.clone()]
            } else {
                Vec::new()
            }
        }) > 0
    }

    /// Stops every instance. Returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        self.stop_where(|state| state.handles.keys().cloned().collect())
    }

    fn stop_where(&self, select: impl FnOnce(&PoolState) -> Vec<InstanceKey>) -> usize {
        let mut completions = Vec::new();
        let stopped = match self.state.lock() {
            Ok(mut state) => {
                let keys = select(&state);
                state.remove_all(&keys, CompletionReason::Stopped, &mut completions);
                keys.len()
            }
            Err(_) => {
                tracing::error!("Failed to acquire pool lock");
                0
            }
        };

        if stopped > 0 {
            tracing::debug!("Stopped {} handle(s)", stopped);
        }
        fire(completions);
        stopped
    }

    /// Whether any instance of `source` is starting or audible.
    ///
    /// Paused instances stay in the pool but do not count.
    pub fn is_playing(&self, source: &str) -> bool {
        self.state
            .lock()
            .map(|state| {
                state.handles.values().any(|handle| {
                    handle.key().source() == source
                        && matches!(handle.state(), HandleState::Starting | HandleState::Playing)
                })
            })
            .unwrap_or(false)
    }

    /// Applies `volume` to every live instance.
    ///
    /// Later `play` calls still use the volume given in their own request.
    pub fn update_volume(&self, volume: f32) {
        let volume = sanitize_volume(volume);
        if let Ok(mut state) = self.state.lock() {
            state.volume = volume;
            for handle in state.handles.values_mut() {
                if let Some(output) = handle.output_mut() {
                    output.set_volume(volume);
                }
            }
            tracing::debug!("Volume set to {:.2}", volume);
        }
    }

    /// Enables or disables multi-sound mode. Disabling stops everything but
    /// the most recently started sound. Returns how many handles were stopped.
    pub fn update_concurrency_mode(&self, multi_sound_enabled: bool) -> usize {
        self.update_mode(|mode| mode.multi_sound_enabled = multi_sound_enabled, |mode, live| {
            if multi_sound_enabled {
                Vec::new()
            } else {
                policy::reconcile_single_sound(mode.repeat_sound_enabled, live)
            }
        })
    }

    /// Enables or disables repeat mode. Disabling collapses each sound to its
    /// most recent instance. Returns how many handles were stopped.
    pub fn update_repeat_mode(&self, repeat_sound_enabled: bool) -> usize {
        self.update_mode(|mode| mode.repeat_sound_enabled = repeat_sound_enabled, |_, live| {
            if repeat_sound_enabled {
                Vec::new()
            } else {
                policy::reconcile_single_instance(live)
            }
        })
    }

    fn update_mode(
        &self,
        change: impl FnOnce(&mut PlaybackMode),
        reconcile: impl FnOnce(PlaybackMode, &[LiveHandle]) -> Vec<InstanceKey>,
    ) -> usize {
        let mut completions = Vec::new();
        let stopped = match self.state.lock() {
            Ok(mut state) => {
                change(&mut state.mode);
                let mode = state.mode;
                let live = state.live_handles();
                let keys = reconcile(mode, &live);
                state.remove_all(&keys, CompletionReason::Replaced, &mut completions);
                tracing::info!(
                    "Playback mode: multi-sound {}, repeat {}",
                    mode.multi_sound_enabled,
                    mode.repeat_sound_enabled
                );
                keys.len()
            }
            Err(_) => {
                tracing::error!("Failed to acquire pool lock");
                0
            }
        };

        fire(completions);
        stopped
    }

    /// Pushes the runtime parts of `settings` (mode and volume) into the pool.
    ///
    /// Capacity limits are fixed at construction and are not changed.
    pub fn apply_settings(&self, settings: &PoolSettings) {
        if settings.limits() != self.limits {
            tracing::debug!("Ignoring changed pool limits until restart");
        }
        self.update_volume(settings.volume);
        self.update_concurrency_mode(settings.multi_sound_enabled);
        self.update_repeat_mode(settings.repeat_sound_enabled);
    }

    /// Applies every output event received so far. Returns how many were
    /// applied. Does nothing while [`run_events`](Self::run_events) is active.
    pub fn process_events(&self) -> usize {
        let mut receiver = match self.events_rx.try_lock() {
            Ok(receiver) => receiver,
            Err(_) => return 0,
        };

        let mut applied = 0;
        while let Ok(event) = receiver.try_recv() {
            self.apply_event(event);
            applied += 1;
        }
        applied
    }

    /// Applies output events as they arrive. Runs until the pool is dropped.
    pub async fn run_events(&self) {
        let mut receiver = self.events_rx.lock().await;
        while let Some(event) = receiver.recv().await {
            self.apply_event(event);
        }
    }

    fn apply_event(&self, PoolEvent { key, event }: PoolEvent) {
        let completion = {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(_) => {
                    tracing::error!("Failed to acquire pool lock");
                    return;
                }
            };

            let handle = match state.handles.get_mut(&key) {
                Some(handle) => handle,
                None => {
                    tracing::debug!("Ignoring {:?} for {}: no longer in pool", event, key);
                    return;
                }
            };

            match event {
                OutputEvent::Paused => {
                    tracing::debug!("{} paused", key);
                    handle.pause()
                }
                OutputEvent::Ended => {
                    tracing::debug!("{} ended", key);
                    state.remove(&key, CompletionReason::Ended)
                }
                OutputEvent::Errored(message) => {
                    tracing::warn!("Output error for {}: {}", key, message);
                    state.remove(&key, CompletionReason::Errored)
                }
            }
        };

        if let Some(completion) = completion {
            completion.fire();
        }
    }

    fn listener_for(&self, key: &InstanceKey) -> OutputListener {
        let sender = self.events_tx.clone();
        let key = key.clone();
        Arc::new(move |event: OutputEvent| {
            let _ = sender.send(PoolEvent {
                key: key.clone(),
                event,
            });
        })
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.handles.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live instances of `source`.
    pub fn instance_count(&self, source: &str) -> usize {
        self.state
            .lock()
            .map(|s| s.instance_counts.get(source).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Number of outputs waiting in the idle reserve.
    pub fn idle_count(&self) -> usize {
        self.state.lock().map(|s| s.reserve.len()).unwrap_or(0)
    }

    pub fn mode(&self) -> PlaybackMode {
        self.state.lock().map(|s| s.mode).unwrap_or_default()
    }

    /// The volume last set through `update_volume` or construction.
    pub fn volume(&self) -> f32 {
        self.state.lock().map(|s| s.volume).unwrap_or(0.0)
    }

    pub fn limits(&self) -> PoolLimits {
        self.limits
    }

    /// Snapshot of every live handle, oldest first.
    pub fn handles(&self) -> Vec<HandleInfo> {
        let state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => return Vec::new(),
        };

        let mut handles: Vec<(u64, HandleInfo)> = state
            .handles
            .values()
            .map(|h| {
                (
                    h.last_used(),
                    HandleInfo {
                        key: h.key().clone(),
                        state: h.state(),
                        volume: h.output().map(|o| o.volume()).unwrap_or(0.0),
                        started_at: h.started_at(),
                    },
                )
            })
            .collect();
        handles.sort_by_key(|(last_used, _)| *last_used);
        handles.into_iter().map(|(_, info)| info).collect()
    }
}

impl Drop for PlaybackPool {
    fn drop(&mut self) {
        self.stop_all();
        if let Ok(mut state) = self.state.lock() {
            state.reserve.clear();
        }
    }
}

fn fire(completions: Vec<PendingCompletion>) {
    for completion in completions {
        completion.fire();
    }
}

/// Last-resort volume repair: NaN becomes silence, everything else is clamped.
fn sanitize_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        tracing::warn!("Volume is NaN, using 0.0");
        return 0.0;
    }
    if !(0.0..=1.0).contains(&volume) {
        tracing::warn!("Volume {} out of range, clamping", volume);
    }
    volume.clamp(0.0, 1.0)
}
