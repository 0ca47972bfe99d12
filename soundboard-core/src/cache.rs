//! Decoded sound cache with a byte budget and least-recently-used eviction.
//!
//! Decoding a clip is the expensive part of pressing a button the first time;
//! the cache keeps decoded data keyed by resolved location so repeated presses
//! only clone a reference-counted buffer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Default cache budget: 50 MiB.
pub const DEFAULT_CACHE_BYTES: usize = 50 * 1024 * 1024;

/// Size accounting for cached values.
pub trait CacheWeight {
    /// Approximate memory held by this value, in bytes.
    fn weight_bytes(&self) -> usize;
}

struct CacheEntry<T> {
    value: T,
    bytes: usize,
    last_used: u64,
}

/// LRU cache of decoded sounds.
pub struct SoundCache<T> {
    entries: HashMap<PathBuf, CacheEntry<T>>,
    max_bytes: usize,
    current_bytes: usize,
    /// Logical clock; strictly increasing so recency never ties.
    clock: u64,
}

impl<T: CacheWeight + Clone> SoundCache<T> {
    /// Creates an empty cache with the given byte budget.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_bytes,
            current_bytes: 0,
            clock: 0,
        }
    }

    /// Returns the cached value for `path`, loading and inserting it on a miss.
    ///
    /// A value larger than the whole budget is still returned and cached on
    /// its own after everything else has been evicted.
    pub fn get_or_load<F>(&mut self, path: &Path, loader: F) -> Result<T>
    where
        F: FnOnce(&Path) -> Result<T>,
    {
        self.clock += 1;
        if let Some(entry) = self.entries.get_mut(path) {
            entry.last_used = self.clock;
            return Ok(entry.value.clone());
        }

        let value = loader(path)?;
        let bytes = value.weight_bytes();

        while self.current_bytes + bytes > self.max_bytes && !self.entries.is_empty() {
            self.evict_least_recently_used();
        }

        self.current_bytes += bytes;
        self.entries.insert(
            path.to_path_buf(),
            CacheEntry {
                value: value.clone(),
                bytes,
                last_used: self.clock,
            },
        );
        tracing::debug!(
            "Cached {} ({} KiB, {} KiB total)",
            path.display(),
            bytes / 1024,
            self.current_bytes / 1024
        );

        Ok(value)
    }

    /// Removes a single entry. Returns true if it was cached.
    pub fn remove(&mut self, path: &Path) -> bool {
        match self.entries.remove(path) {
            Some(entry) => {
                self.current_bytes -= entry.bytes;
                true
            }
            None => false,
        }
    }

    /// Drops every cached entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.current_bytes = 0;
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.current_bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    fn evict_least_recently_used(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(path, _)| path.clone());

        if let Some(path) = oldest {
            if let Some(entry) = self.entries.remove(&path) {
                self.current_bytes -= entry.bytes;
                tracing::debug!("Evicted {} from sound cache", path.display());
            }
        }
    }
}

impl<T: CacheWeight + Clone> Default for SoundCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::cell::Cell;

    #[derive(Clone, Debug, PartialEq)]
    struct Blob(usize);

    impl CacheWeight for Blob {
        fn weight_bytes(&self) -> usize {
            self.0
        }
    }

    fn load_blob(size: usize) -> impl FnOnce(&Path) -> Result<Blob> {
        move |_| Ok(Blob(size))
    }

    #[test]
    fn test_hit_does_not_reload() {
        let mut cache = SoundCache::new(100);
        let loads = Cell::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_load(Path::new("a.wav"), |_| {
                    loads.set(loads.get() + 1);
                    Ok(Blob(10))
                })
                .unwrap();
            assert_eq!(value, Blob(10));
        }

        assert_eq!(loads.get(), 1);
        assert_eq!(cache.total_bytes(), 10);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = SoundCache::new(30);
        cache.get_or_load(Path::new("a.wav"), load_blob(10)).unwrap();
        cache.get_or_load(Path::new("b.wav"), load_blob(10)).unwrap();
        cache.get_or_load(Path::new("c.wav"), load_blob(10)).unwrap();

        // Touch "a" so "b" becomes the oldest
        cache.get_or_load(Path::new("a.wav"), load_blob(10)).unwrap();
        cache.get_or_load(Path::new("d.wav"), load_blob(10)).unwrap();

        assert!(cache.contains(Path::new("a.wav")));
        assert!(!cache.contains(Path::new("b.wav")));
        assert!(cache.contains(Path::new("c.wav")));
        assert!(cache.contains(Path::new("d.wav")));
        assert_eq!(cache.total_bytes(), 30);
    }

    #[test]
    fn test_oversized_entry_replaces_everything() {
        let mut cache = SoundCache::new(20);
        cache.get_or_load(Path::new("a.wav"), load_blob(10)).unwrap();
        cache.get_or_load(Path::new("b.wav"), load_blob(10)).unwrap();

        let big = cache.get_or_load(Path::new("big.wav"), load_blob(50)).unwrap();
        assert_eq!(big, Blob(50));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 50);
    }

    #[test]
    fn test_load_error_leaves_cache_untouched() {
        let mut cache = SoundCache::new(100);
        cache.get_or_load(Path::new("a.wav"), load_blob(10)).unwrap();

        let result = cache.get_or_load(Path::new("broken.wav"), |p| {
            Err(Error::SoundLoad(p.display().to_string(), "corrupt".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 10);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cache = SoundCache::new(100);
        cache.get_or_load(Path::new("a.wav"), load_blob(10)).unwrap();
        cache.get_or_load(Path::new("b.wav"), load_blob(20)).unwrap();

        assert!(cache.remove(Path::new("a.wav")));
        assert!(!cache.remove(Path::new("a.wav")));
        assert_eq!(cache.total_bytes(), 20);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }
}
