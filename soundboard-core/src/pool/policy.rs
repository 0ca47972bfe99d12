//! Concurrency and repeat rules.
//!
//! Pure decisions over a snapshot of the live handles. The pool applies the
//! returned keys; nothing here touches outputs.
//!
//! | multi-sound | repeat | stopped before a new start             |
//! |-------------|--------|----------------------------------------|
//! | off         | off    | every live handle                      |
//! | off         | on     | handles of other sounds                |
//! | on          | off    | handles of the same sound              |
//! | on          | on     | nothing (per-sound cap still applies)  |

use std::collections::HashMap;

use crate::config::PlaybackMode;
use crate::pool::InstanceKey;

/// Snapshot of one live handle as seen by the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveHandle {
    pub key: InstanceKey,
    /// Logical recency; larger is more recent.
    pub last_used: u64,
}

impl LiveHandle {
    pub fn new(key: InstanceKey, last_used: u64) -> Self {
        Self { key, last_used }
    }
}

/// Handles that must stop before `source` starts, per the decision table.
pub fn plan_stops(
    mode: PlaybackMode,
    source: &str,
    repeat: bool,
    live: &[LiveHandle],
) -> Vec<InstanceKey> {
    live.iter()
        .filter(|handle| {
            let same_source = handle.key.source() == source;
            match (mode.multi_sound_enabled, repeat) {
                (false, false) => true,
                (false, true) => !same_source,
                (true, false) => same_source,
                (true, true) => false,
            }
        })
        .map(|handle| handle.key.clone())
        .collect()
}

/// Oldest instances of `source` to evict so one more fits under `cap`.
///
/// Handles already listed in `stopping` are not counted.
pub fn plan_instance_cap(
    source: &str,
    cap: usize,
    live: &[LiveHandle],
    stopping: &[InstanceKey],
) -> Vec<InstanceKey> {
    let mut same: Vec<&LiveHandle> = live
        .iter()
        .filter(|h| h.key.source() == source && !stopping.contains(&h.key))
        .collect();

    if same.len() < cap {
        return Vec::new();
    }

    same.sort_by_key(|h| h.last_used);
    let excess = same.len() + 1 - cap;
    same.into_iter()
        .take(excess)
        .map(|h| h.key.clone())
        .collect()
}

/// Picks `needed` eviction victims from `candidates`, least recently used
/// first. Returns `None` when there are not enough candidates.
pub fn plan_evictions(needed: usize, candidates: &[LiveHandle]) -> Option<Vec<InstanceKey>> {
    if candidates.len() < needed {
        return None;
    }

    let mut sorted: Vec<&LiveHandle> = candidates.iter().collect();
    sorted.sort_by_key(|h| h.last_used);
    Some(
        sorted
            .into_iter()
            .take(needed)
            .map(|h| h.key.clone())
            .collect(),
    )
}

/// Handles to stop when multi-sound is switched off.
///
/// The most recently used handle survives; with repeat on, so do the other
/// instances of its sound.
pub fn reconcile_single_sound(repeat: bool, live: &[LiveHandle]) -> Vec<InstanceKey> {
    let newest = match live.iter().max_by_key(|h| h.last_used) {
        Some(newest) => newest,
        None => return Vec::new(),
    };

    live.iter()
        .filter(|h| {
            h.key != newest.key && !(repeat && h.key.source() == newest.key.source())
        })
        .map(|h| h.key.clone())
        .collect()
}

/// Handles to stop when repeat is switched off: every instance except the
/// most recent one of each sound.
pub fn reconcile_single_instance(live: &[LiveHandle]) -> Vec<InstanceKey> {
    let mut newest: HashMap<&str, &LiveHandle> = HashMap::new();
    for handle in live {
        newest
            .entry(handle.key.source())
            .and_modify(|current| {
                if handle.last_used > current.last_used {
                    *current = handle;
                }
            })
            .or_insert(handle);
    }

    live.iter()
        .filter(|h| {
            newest
                .get(h.key.source())
                .map_or(false, |keep| keep.key != h.key)
        })
        .map(|h| h.key.clone())
        .collect()
}
