//! The frame cache (component C): deduplicates concurrent decode work for
//! the same key and bounds total memory via byte-weighted LRU eviction.

use std::{
    collections::HashMap,
    sync::{Arc, Condvar, Mutex},
    time::Instant,
};

use ffmpeg::format::Pixel;
use tracing::{debug, instrument};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub file_identity: String,
    pub mtime: i64,
    pub frame_index: u64,
    pub out_width: u32,
    pub out_height: u32,
    pub pixel_format: PixelFormatKey,
}

/// A hashable stand-in for `ffmpeg::format::Pixel`, which doesn't implement
/// `Hash` itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelFormatKey(pub i32);

impl From<Pixel> for PixelFormatKey {
    fn from(p: Pixel) -> Self {
        PixelFormatKey(p as i32)
    }
}

#[derive(Clone)]
pub struct CacheEntry {
    pub data: Arc<Vec<u8>>,
}

struct StoredEntry {
    data: Arc<Vec<u8>>,
    last_access: Instant,
}

enum Slot {
    /// A producer is running for this key; `generation` lets a waiter
    /// notice the difference between "still in progress" and "finished
    /// (successfully or not) since I last checked".
    InFlight { generation: u64 },
    Ready(StoredEntry),
}

struct CacheState {
    slots: HashMap<CacheKey, Slot>,
    total_bytes: usize,
    generation: u64,
    hits: u64,
    misses: u64,
}

/// Bounded, singleflight-deduplicated map from `CacheKey` to decoded raster.
pub struct FrameCache {
    state: Mutex<CacheState>,
    changed: Condvar,
    max_bytes: usize,
}

impl FrameCache {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                slots: HashMap::new(),
                total_bytes: 0,
                generation: 0,
                hits: 0,
                misses: 0,
            }),
            changed: Condvar::new(),
            max_bytes,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let mut guard = self.state.lock().unwrap();
        match guard.slots.get_mut(key) {
            Some(Slot::Ready(entry)) => {
                entry.last_access = Instant::now();
                guard.hits += 1;
                Some(CacheEntry {
                    data: entry.data.clone(),
                })
            }
            _ => None,
        }
    }

    /// Returns the cached value for `key`, or runs `producer` to compute it.
    /// At most one caller runs `producer` for a given key at a time; other
    /// callers wait for that result instead of recomputing it.
    #[instrument(skip(self, producer))]
    pub fn get_or_compute(
        &self,
        key: CacheKey,
        producer: impl FnOnce() -> Result<Vec<u8>>,
    ) -> Result<CacheEntry> {
        loop {
            let mut guard = self.state.lock().unwrap();

            match guard.slots.get(&key) {
                Some(Slot::Ready(entry)) => {
                    guard.hits += 1;
                    let data = entry.data.clone();
                    guard
                        .slots
                        .entry(key)
                        .and_modify(|s| {
                            if let Slot::Ready(e) = s {
                                e.last_access = Instant::now();
                            }
                        });
                    return Ok(CacheEntry { data });
                }
                Some(Slot::InFlight { .. }) => {
                    // Another caller is producing this key; wait for it to
                    // finish (ready or removed-on-failure) and loop back
                    // around to pick up the result.
                    let (_g, _timeout) = self
                        .changed
                        .wait_timeout(guard, std::time::Duration::from_millis(200))
                        .unwrap();
                    continue;
                }
                None => {
                    guard.misses += 1;
                    let generation = guard.generation;
                    guard.generation += 1;
                    guard.slots.insert(key.clone(), Slot::InFlight { generation });
                    drop(guard);
                    break;
                }
            }
        }

        // We are the sole producer for `key`.
        let result = producer();

        let mut guard = self.state.lock().unwrap();
        match result {
            Ok(data) => {
                let data = Arc::new(data);
                let bytes = data.len();
                guard.slots.insert(
                    key.clone(),
                    Slot::Ready(StoredEntry {
                        data: data.clone(),
                        last_access: Instant::now(),
                    }),
                );
                guard.total_bytes += bytes;
                self.evict_to_cap(&mut guard);
                drop(guard);
                self.changed.notify_all();
                Ok(CacheEntry { data })
            }
            Err(e) => {
                guard.slots.remove(&key);
                drop(guard);
                self.changed.notify_all();
                Err(e)
            }
        }
    }

    fn evict_to_cap(&self, guard: &mut CacheState) {
        while guard.total_bytes > self.max_bytes {
            let lru_key = guard
                .slots
                .iter()
                .filter_map(|(k, s)| match s {
                    Slot::Ready(e) => Some((k.clone(), e.last_access)),
                    _ => None,
                })
                .min_by_key(|(_, last_access)| *last_access)
                .map(|(k, _)| k);

            match lru_key {
                Some(k) => {
                    if let Some(Slot::Ready(entry)) = guard.slots.remove(&k) {
                        guard.total_bytes -= entry.data.len();
                        debug!(bytes = entry.data.len(), "evicted cache entry");
                    }
                }
                None => break,
            }
        }
    }

    /// Removes every entry whose key carries `file_identity`, e.g. when the
    /// file's mtime has changed.
    pub fn invalidate(&self, file_identity: &str) {
        let mut guard = self.state.lock().unwrap();
        let to_remove: Vec<CacheKey> = guard
            .slots
            .keys()
            .filter(|k| k.file_identity == file_identity)
            .cloned()
            .collect();
        for k in to_remove {
            if let Some(Slot::Ready(entry)) = guard.slots.remove(&k) {
                guard.total_bytes -= entry.data.len();
            }
        }
    }

    pub fn clear(&self) {
        let mut guard = self.state.lock().unwrap();
        guard.slots.clear();
        guard.total_bytes = 0;
    }

    pub fn diagnostics(&self) -> CacheDiagnostics {
        let guard = self.state.lock().unwrap();
        CacheDiagnostics {
            entries: guard
                .slots
                .values()
                .filter(|s| matches!(s, Slot::Ready(_)))
                .count(),
            total_bytes: guard.total_bytes,
            hits: guard.hits,
            misses: guard.misses,
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CacheDiagnostics {
    pub entries: usize,
    pub total_bytes: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Convenience: wraps `NotFound`-style production failures into the typed
/// error the coordinator expects when a producer can't run at all.
pub fn not_found(msg: impl Into<String>) -> Error {
    Error::NotFound(msg.into())
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
    };

    use super::*;

    fn key(frame: u64) -> CacheKey {
        CacheKey {
            file_identity: "fixture.mov".to_string(),
            mtime: 0,
            frame_index: frame,
            out_width: 320,
            out_height: 240,
            pixel_format: PixelFormatKey(0),
        }
    }

    #[test]
    fn test_miss_then_hit() {
        let cache = FrameCache::new(1024 * 1024);
        let calls = AtomicUsize::new(0);
        let k = key(0);

        let r1 = cache
            .get_or_compute(k.clone(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![1, 2, 3])
            })
            .unwrap();
        assert_eq!(*r1.data, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let r2 = cache
            .get_or_compute(k, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![9, 9, 9])
            })
            .unwrap();
        assert_eq!(*r2.data, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_singleflight_dedups_concurrent_producers() {
        let cache = Arc::new(FrameCache::new(1024 * 1024));
        let calls = Arc::new(AtomicUsize::new(0));
        let k = key(1);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                let k = k.clone();
                thread::spawn(move || {
                    cache
                        .get_or_compute(k, || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(std::time::Duration::from_millis(50));
                            Ok(vec![7; 10])
                        })
                        .unwrap()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for r in results {
            assert_eq!(*r.data, vec![7; 10]);
        }
    }

    #[test]
    fn test_failed_producer_does_not_poison_key() {
        let cache = FrameCache::new(1024 * 1024);
        let k = key(2);

        let err = cache
            .get_or_compute(k.clone(), || Err(Error::DecodeFailed("boom".to_string())))
            .unwrap_err();
        assert!(matches!(err, Error::DecodeFailed(_)));

        let ok = cache.get_or_compute(k, || Ok(vec![5])).unwrap();
        assert_eq!(*ok.data, vec![5]);
    }

    #[test]
    fn test_eviction_respects_byte_cap() {
        let cache = FrameCache::new(25);
        for i in 0..5u64 {
            cache
                .get_or_compute(key(i), || Ok(vec![0u8; 10]))
                .unwrap();
        }
        let diag = cache.diagnostics();
        assert!(diag.total_bytes <= 25);
        assert!(diag.entries <= 2);
    }

    #[test]
    fn test_invalidate_removes_only_matching_file() {
        let cache = FrameCache::new(1024 * 1024);
        let mut other = key(0);
        other.file_identity = "other.mov".to_string();

        cache.get_or_compute(key(0), || Ok(vec![1])).unwrap();
        cache.get_or_compute(other.clone(), || Ok(vec![2])).unwrap();

        cache.invalidate("fixture.mov");

        assert!(cache.get(&key(0)).is_none());
        assert!(cache.get(&other).is_some());
    }
}
