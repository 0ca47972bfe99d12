//! Kira-backed audio outputs.
//!
//! Each [`KiraOutput`] owns at most one `StaticSoundHandle` at a time, kept in
//! a slot shared with its start job and monitor thread. Starting decodes and
//! plays on a blocking task inside the returned future, so callers never
//! decode while holding their own locks. Kira has no completion callbacks, so
//! a monitor thread polls the handle and emits [`OutputEvent::Ended`] when the
//! sound stops on its own. Every stop bumps the slot's generation under the
//! slot lock, which retires both pending start jobs and monitors.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use kira::sound::static_sound::{StaticSoundData, StaticSoundHandle};
use kira::sound::PlaybackState;
use kira::Tween;

use crate::cache::{CacheWeight, SoundCache, DEFAULT_CACHE_BYTES};
use crate::engines::audio_output::{volume_to_db, AudioDevice};
use crate::engines::{
    AudioOutput, ListenerSet, OutputEvent, OutputFactory, OutputListener, OutputStatus,
    StartFuture, Unsubscribe,
};
use crate::error::{Error, Result};

/// How often monitor threads check whether a sound has finished.
const MONITOR_INTERVAL: Duration = Duration::from_millis(50);

type SharedSoundCache = Arc<Mutex<SoundCache<StaticSoundData>>>;
type SharedSlot = Arc<Mutex<Slot<StaticSoundHandle>>>;

impl CacheWeight for StaticSoundData {
    fn weight_bytes(&self) -> usize {
        // Frames are stereo f32
        self.num_frames() * 2 * std::mem::size_of::<f32>()
    }
}

/// What an output is currently playing.
struct Slot<H> {
    handle: Option<H>,
    /// Incremented on every stop so stale start jobs and monitors give up.
    generation: u64,
}

impl<H> Slot<H> {
    fn new() -> Self {
        Self {
            handle: None,
            generation: 0,
        }
    }

    /// Moves to a new generation and hands back the handle to silence.
    fn retire(&mut self) -> Option<H> {
        self.generation += 1;
        self.handle.take()
    }
}

/// Builds kira outputs that share one audio device and one decoded-sound cache.
pub struct KiraOutputFactory {
    device: AudioDevice,
    cache: SharedSoundCache,
}

impl KiraOutputFactory {
    /// Creates a factory with the default cache budget.
    pub fn new(device: AudioDevice) -> Self {
        Self::with_cache_bytes(device, DEFAULT_CACHE_BYTES)
    }

    /// Creates a factory with an explicit cache budget in bytes.
    pub fn with_cache_bytes(device: AudioDevice, max_bytes: usize) -> Self {
        Self {
            device,
            cache: Arc::new(Mutex::new(SoundCache::new(max_bytes))),
        }
    }

    /// Opens the default audio device and builds a factory on it.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(AudioDevice::open_default()?))
    }

    /// Returns the number of decoded sounds currently cached.
    pub fn cached_sounds(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Drops every decoded sound from the cache.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }
}

impl OutputFactory for KiraOutputFactory {
    fn create(&self) -> Result<Box<dyn AudioOutput>> {
        Ok(Box::new(KiraOutput {
            device: self.device.clone(),
            cache: Arc::clone(&self.cache),
            slot: Arc::new(Mutex::new(Slot::new())),
            listeners: ListenerSet::new(),
            volume: 1.0,
        }))
    }

    fn name(&self) -> &str {
        "kira"
    }
}

/// One kira playback slot.
pub struct KiraOutput {
    device: AudioDevice,
    cache: SharedSoundCache,
    slot: SharedSlot,
    listeners: ListenerSet,
    volume: f32,
}

/// Everything a start needs once it leaves the output.
struct StartJob {
    device: AudioDevice,
    cache: SharedSoundCache,
    slot: SharedSlot,
    listeners: ListenerSet,
    location: PathBuf,
    volume: f32,
    generation: u64,
}

impl StartJob {
    fn run(self) -> Result<()> {
        let device = &self.device;
        let volume = self.volume;
        let installed = start_blocking(
            &self.cache,
            &self.slot,
            self.generation,
            &self.location,
            |data| device.play(data.volume(volume_to_db(volume))),
        )?;

        if !installed {
            return Err(Error::EngineStartRejected(
                self.location.display().to_string(),
                "stopped before playback began".to_string(),
            ));
        }

        let generation = self.generation;
        let slot = Arc::clone(&self.slot);
        let listeners = self.listeners.clone();
        let spawned = std::thread::Builder::new()
            .name("output-monitor".into())
            .spawn(move || monitor_loop(generation, &slot, &listeners));

        if let Err(e) = spawned {
            if let Ok(mut slot) = self.slot.lock() {
                if slot.generation == generation {
                    if let Some(mut handle) = slot.retire() {
                        handle.stop(Tween::default());
                    }
                }
            }
            return Err(Error::OutputUnavailable(format!(
                "Failed to spawn output monitor: {}",
                e
            )));
        }

        tracing::debug!("Started {} at volume {:.2}", self.location.display(), volume);
        Ok(())
    }
}

impl AudioOutput for KiraOutput {
    fn subscribe(&mut self, listener: OutputListener) -> Unsubscribe {
        self.listeners.subscribe(listener)
    }

    fn start(&mut self, location: &Path, volume: f32) -> StartFuture {
        self.stop();
        self.volume = volume;

        let generation = match self.slot.lock() {
            Ok(slot) => slot.generation,
            Err(_) => {
                let error = Error::OutputUnavailable("Output lock poisoned".to_string());
                return futures::future::ready(Err(error)).boxed();
            }
        };

        let job = StartJob {
            device: self.device.clone(),
            cache: Arc::clone(&self.cache),
            slot: Arc::clone(&self.slot),
            listeners: self.listeners.clone(),
            location: location.to_path_buf(),
            volume,
            generation,
        };

        async move {
            tokio::task::spawn_blocking(move || job.run())
                .await
                .map_err(|e| Error::OutputUnavailable(format!("Start task failed: {}", e)))?
        }
        .boxed()
    }

    fn stop(&mut self) {
        if let Ok(mut slot) = self.slot.lock() {
            if let Some(mut handle) = slot.retire() {
                handle.stop(Tween::default());
            }
        }
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        if let Ok(mut slot) = self.slot.lock() {
            if let Some(handle) = slot.handle.as_mut() {
                handle.set_volume(volume_to_db(volume), Tween::default());
            }
        }
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn status(&self) -> OutputStatus {
        match self.slot.lock() {
            Ok(slot) => match slot.handle.as_ref() {
                None => OutputStatus::Idle,
                Some(handle) => match handle.state() {
                    PlaybackState::Paused => OutputStatus::Paused,
                    PlaybackState::Stopped => OutputStatus::Ended,
                    _ => OutputStatus::Playing,
                },
            },
            Err(_) => OutputStatus::Idle,
        }
    }
}

impl Drop for KiraOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Decodes `location` through the cache, then installs what `play` returns.
///
/// Returns `Ok(false)` without playing when the slot moved past `generation`
/// while decoding.
fn start_blocking<H>(
    cache: &Mutex<SoundCache<StaticSoundData>>,
    slot: &Mutex<Slot<H>>,
    generation: u64,
    location: &Path,
    play: impl FnOnce(StaticSoundData) -> Result<H>,
) -> Result<bool> {
    let data = {
        let mut cache = cache
            .lock()
            .map_err(|_| Error::OutputUnavailable("Sound cache lock poisoned".to_string()))?;
        cache.get_or_load(location, load_sound_data)?
    };

    let mut slot = slot
        .lock()
        .map_err(|_| Error::OutputUnavailable("Output lock poisoned".to_string()))?;
    if slot.generation != generation {
        return Ok(false);
    }
    slot.handle = Some(play(data)?);
    Ok(true)
}

/// Polls a handle until it stops on its own or the output moves on.
fn monitor_loop(generation: u64, slot: &Mutex<Slot<StaticSoundHandle>>, listeners: &ListenerSet) {
    loop {
        std::thread::sleep(MONITOR_INTERVAL);

        let finished = |handle: &StaticSoundHandle| matches!(handle.state(), PlaybackState::Stopped);
        if !poll_slot(slot, generation, finished, listeners) {
            return;
        }
    }
}

/// One monitor step. Returns false once the monitor should exit.
///
/// The generation check and the emit both happen under the slot lock, so no
/// `Ended` from a retired generation can follow a `stop`.
fn poll_slot<H>(
    slot: &Mutex<Slot<H>>,
    generation: u64,
    finished: impl Fn(&H) -> bool,
    listeners: &ListenerSet,
) -> bool {
    let slot = match slot.lock() {
        Ok(slot) => slot,
        Err(_) => return false,
    };
    if slot.generation != generation {
        return false;
    }
    if slot.handle.as_ref().map_or(true, |handle| finished(handle)) {
        listeners.emit(OutputEvent::Ended);
        return false;
    }
    true
}

fn load_sound_data(path: &Path) -> Result<StaticSoundData> {
    StaticSoundData::from_file(path)
        .map_err(|e| Error::SoundLoad(path.display().to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use tempfile::TempDir;

    /// Helper: create a WAV file with a sine wave for testing.
    fn create_test_wav(path: &Path, frequency: f32, duration_secs: f32, sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let num_samples = (sample_rate as f32 * duration_secs) as usize;
        for i in 0..num_samples {
            let t = i as f32 / sample_rate as f32;
            let sample = (t * frequency * 2.0 * std::f32::consts::PI).sin();
            writer
                .write_sample((sample * i16::MAX as f32) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decode_into_cache() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("beep.wav");
        create_test_wav(&path, 440.0, 0.5, 44100);

        let mut cache: SoundCache<StaticSoundData> = SoundCache::default();
        let data = cache.get_or_load(&path, load_sound_data).unwrap();

        assert_eq!(data.num_frames(), 22050);
        assert_eq!(cache.total_bytes(), 22050 * 8);

        // Second lookup is served from the cache
        cache
            .get_or_load(&path, |_| panic!("should not decode twice"))
            .unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_missing_file_is_sound_load_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = load_sound_data(&temp_dir.path().join("missing.wav"));
        assert!(matches!(result, Err(Error::SoundLoad(_, _))));
    }

    fn recording_listeners() -> (ListenerSet, Arc<Mutex<Vec<OutputEvent>>>, Unsubscribe) {
        let listeners = ListenerSet::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let unsubscribe = listeners.subscribe(Arc::new(move |event: OutputEvent| {
            seen_clone.lock().unwrap().push(event)
        }));
        (listeners, seen, unsubscribe)
    }

    #[test]
    fn test_start_installs_decoded_sound() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("beep.wav");
        create_test_wav(&path, 440.0, 0.25, 44100);

        let cache = Mutex::new(SoundCache::default());
        let slot = Mutex::new(Slot::new());

        let installed =
            start_blocking(&cache, &slot, 0, &path, |data| Ok(data.num_frames())).unwrap();

        assert!(installed);
        assert_eq!(slot.lock().unwrap().handle, Some(11025));
        assert_eq!(cache.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_stop_while_decoding_abandons_start() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("beep.wav");
        create_test_wav(&path, 440.0, 0.25, 44100);

        let cache = Mutex::new(SoundCache::default());
        let slot: Mutex<Slot<usize>> = Mutex::new(Slot::new());
        let generation = slot.lock().unwrap().generation;

        // A stop lands between taking the generation and installing
        assert!(slot.lock().unwrap().retire().is_none());

        let installed = start_blocking(&cache, &slot, generation, &path, |_| {
            panic!("a retired start must not play")
        })
        .unwrap();

        assert!(!installed);
        assert!(slot.lock().unwrap().handle.is_none());
    }

    #[test]
    fn test_failed_decode_leaves_slot_empty() {
        let temp_dir = TempDir::new().unwrap();
        let cache = Mutex::new(SoundCache::default());
        let slot: Mutex<Slot<usize>> = Mutex::new(Slot::new());

        let result = start_blocking(&cache, &slot, 0, &temp_dir.path().join("missing.wav"), |_| {
            Ok(1)
        });

        assert!(matches!(result, Err(Error::SoundLoad(_, _))));
        assert!(slot.lock().unwrap().handle.is_none());
    }

    #[test]
    fn test_monitor_emits_ended_once_finished() {
        let (listeners, seen, _unsubscribe) = recording_listeners();
        let slot = Mutex::new(Slot::new());
        slot.lock().unwrap().handle = Some(false);

        assert!(poll_slot(&slot, 0, |done: &bool| *done, &listeners));
        assert!(seen.lock().unwrap().is_empty());

        slot.lock().unwrap().handle = Some(true);
        assert!(!poll_slot(&slot, 0, |done: &bool| *done, &listeners));
        assert_eq!(*seen.lock().unwrap(), vec![OutputEvent::Ended]);
    }

    #[test]
    fn test_retired_monitor_never_reaches_next_listener() {
        let (listeners, first, unsubscribe) = recording_listeners();
        let slot = Mutex::new(Slot::new());
        slot.lock().unwrap().handle = Some(true);
        let stale = slot.lock().unwrap().generation;

        // Stop, then reuse the output for a new instance
        assert_eq!(slot.lock().unwrap().retire(), Some(true));
        unsubscribe();
        let second = Arc::new(Mutex::new(Vec::new()));
        let second_clone = Arc::clone(&second);
        let _second = listeners.subscribe(Arc::new(move |event: OutputEvent| {
            second_clone.lock().unwrap().push(event)
        }));
        slot.lock().unwrap().handle = Some(false);

        assert!(!poll_slot(&slot, stale, |done: &bool| *done, &listeners));
        assert!(first.lock().unwrap().is_empty());
        assert!(second.lock().unwrap().is_empty());
    }

    /// Requires a working audio device.
    #[tokio::test]
    #[ignore] // Requires audio device; run with: cargo test -- --ignored
    async fn test_output_emits_ended() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("short.wav");
        create_test_wav(&path, 660.0, 0.2, 44100);

        let factory = KiraOutputFactory::open_default().unwrap();
        let mut output = factory.create().unwrap();

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let _unsubscribe = output.subscribe(Arc::new(move |event: OutputEvent| {
            let _ = tx.lock().unwrap().send(event);
        }));

        // Decoding waits for the future
        let start = output.start(&path, 0.5);
        assert_eq!(factory.cached_sounds(), 0);
        start.await.unwrap();
        assert_eq!(factory.cached_sounds(), 1);
        assert_eq!(output.status(), OutputStatus::Playing);

        let event = rx.recv_timeout(Duration::from_secs(3)).unwrap();
        assert_eq!(event, OutputEvent::Ended);
    }

    /// Requires a working audio device.
    #[tokio::test]
    #[ignore] // Requires audio device; run with: cargo test -- --ignored
    async fn test_stop_retires_monitor() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("long.wav");
        create_test_wav(&path, 440.0, 2.0, 44100);

        let factory = KiraOutputFactory::open_default().unwrap();
        let mut output = factory.create().unwrap();

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let _unsubscribe = output.subscribe(Arc::new(move |event: OutputEvent| {
            let _ = tx.lock().unwrap().send(event);
        }));

        output.start(&path, 1.0).await.unwrap();
        output.stop();

        assert_eq!(output.status(), OutputStatus::Idle);
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }

    /// Requires a working audio device.
    #[tokio::test]
    #[ignore] // Requires audio device; run with: cargo test -- --ignored
    async fn test_stop_before_start_resolves_rejects() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("long.wav");
        create_test_wav(&path, 440.0, 2.0, 44100);

        let factory = KiraOutputFactory::open_default().unwrap();
        let mut output = factory.create().unwrap();

        let start = output.start(&path, 1.0);
        output.stop();

        assert!(matches!(start.await, Err(Error::EngineStartRejected(_, _))));
        assert_eq!(output.status(), OutputStatus::Idle);
    }
}
