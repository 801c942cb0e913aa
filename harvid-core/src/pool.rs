//! The decoder pool (component P): amortises the cost of opening files and
//! respects the non-reentrant nature of individual `Decoder`s, while
//! allowing multiple concurrent leases on different files (and, up to a
//! cap, on the same file) by instantiating independent `Decoder`s.
//!
//! A leased `Decoder` is removed from the pool's bookkeeping entirely and
//! owned by the `Lease` for the duration of the borrow; this keeps the
//! pool's internal state free of references that would outlive the lock.

use std::{
    sync::{Arc, Condvar, Mutex},
    time::{Duration, Instant},
};

use ffmpeg::format::Pixel;
use harvid_util::cancel::CancelToken;
use tracing::{debug, instrument};

use crate::{
    decoder::Decoder,
    error::{Error, Result},
};

struct Idle {
    path: String,
    decoder: Decoder,
    last_idle_at: Instant,
}

struct PoolState {
    idle: Vec<Idle>,
    /// One entry per currently-leased decoder, tracking which path it is
    /// bound to so `purge` can tell how many pending closes to register.
    busy_paths: Vec<String>,
    /// Paths with a busy decoder that should be closed instead of returned
    /// to `idle` on release, set by `purge`.
    pending_close: Vec<String>,
    open_count: usize,
    busy_count: usize,
}

/// Bounded multiset of `Decoder`s keyed by path.
pub struct DecoderPool {
    state: Mutex<PoolState>,
    not_busy: Condvar,
    max_decoders: usize,
    idle_cap: usize,
}

impl DecoderPool {
    pub fn new(max_decoders: usize, idle_cap: usize) -> Arc<Self> {
        assert!(max_decoders > 0);
        Arc::new(Self {
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                busy_paths: Vec::new(),
                pending_close: Vec::new(),
                open_count: 0,
                busy_count: 0,
            }),
            not_busy: Condvar::new(),
            max_decoders,
            idle_cap,
        })
    }

    /// Leases a `Decoder` bound to `path`, configured for `(out_w, out_h)`
    /// in `pixel_format`. Reuses an idle decoder already open on `path`
    /// when available; otherwise opens a new one if under `max_decoders`;
    /// otherwise blocks until a slot frees up or `cancel` fires.
    #[instrument(skip(self, cancel))]
    pub fn lease(
        self: &Arc<Self>,
        path: &str,
        pixel_format: Pixel,
        out_w: i32,
        out_h: i32,
        cancel: &CancelToken,
    ) -> Result<Lease> {
        loop {
            let mut guard = self.state.lock().unwrap();

            if let Some(pos) = guard.idle.iter().position(|s| s.path == path) {
                let idle = guard.idle.remove(pos);
                guard.busy_count += 1;
                guard.busy_paths.push(path.to_string());
                drop(guard);
                let mut decoder = idle.decoder;
                decoder.set_output_geometry(out_w, out_h);
                debug!(path, "reusing idle decoder");
                return Ok(Lease {
                    pool: self.clone(),
                    path: path.to_string(),
                    decoder: Some(decoder),
                });
            }

            if guard.open_count < self.max_decoders {
                guard.open_count += 1;
                guard.busy_count += 1;
                guard.busy_paths.push(path.to_string());
                drop(guard);
                let decoder = match Decoder::open(path, pixel_format) {
                    Ok(mut decoder) => {
                        decoder.set_output_geometry(out_w, out_h);
                        decoder
                    }
                    Err(e) => {
                        let mut guard = self.state.lock().unwrap();
                        guard.open_count -= 1;
                        guard.busy_count -= 1;
                        if let Some(pos) = guard.busy_paths.iter().position(|p| p == path) {
                            guard.busy_paths.remove(pos);
                        }
                        drop(guard);
                        self.not_busy.notify_all();
                        return Err(e);
                    }
                };
                debug!(path, "opened new decoder");
                return Ok(Lease {
                    pool: self.clone(),
                    path: path.to_string(),
                    decoder: Some(decoder),
                });
            }

            if cancel.is_cancelled() {
                return Err(Error::Internal("lease wait cancelled".to_string()));
            }

            // Re-check cancellation periodically rather than blocking forever
            // on notify alone, since cancellation is cooperative, not a
            // wakeup source for the condvar.
            let (_guard, _timeout) = self
                .not_busy
                .wait_timeout(guard, Duration::from_millis(200))
                .unwrap();
        }
    }

    fn release(&self, path: String, decoder: Decoder) {
        let mut guard = self.state.lock().unwrap();
        guard.busy_count -= 1;
        if let Some(pos) = guard.busy_paths.iter().position(|p| p == &path) {
            guard.busy_paths.remove(pos);
        }

        if let Some(pos) = guard.pending_close.iter().position(|p| p == &path) {
            guard.pending_close.remove(pos);
            guard.open_count -= 1;
            drop(decoder);
        } else {
            guard.idle.push(Idle {
                path,
                decoder,
                last_idle_at: Instant::now(),
            });
            self.evict_excess_idle(&mut guard);
        }

        drop(guard);
        self.not_busy.notify_all();
    }

    fn evict_excess_idle(&self, guard: &mut PoolState) {
        while guard.idle.len() > self.idle_cap {
            let lru = guard
                .idle
                .iter()
                .enumerate()
                .min_by_key(|(_, s)| s.last_idle_at)
                .map(|(i, _)| i);
            match lru {
                Some(i) => {
                    guard.idle.remove(i);
                    guard.open_count -= 1;
                }
                None => break,
            }
        }
    }

    /// Closes idle decoders open on `path`; busy ones are flagged so they
    /// close on release instead of returning to the idle set.
    pub fn purge(&self, path: &str) {
        let mut guard = self.state.lock().unwrap();
        let before = guard.idle.len();
        guard.idle.retain(|s| s.path != path);
        guard.open_count -= before - guard.idle.len();

        let busy_on_path = guard.busy_paths.iter().filter(|p| p.as_str() == path).count();
        for _ in 0..busy_on_path {
            guard.pending_close.push(path.to_string());
        }
    }

    pub fn diagnostics(&self) -> PoolDiagnostics {
        let guard = self.state.lock().unwrap();
        PoolDiagnostics {
            open_decoders: guard.open_count,
            busy_decoders: guard.busy_count,
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct PoolDiagnostics {
    pub open_decoders: usize,
    pub busy_decoders: usize,
}

/// An exclusive lease on a `Decoder`. Dropping it returns the decoder to
/// the pool's idle set (or closes it, if purged while leased).
pub struct Lease {
    pool: Arc<DecoderPool>,
    path: String,
    decoder: Option<Decoder>,
}

impl std::ops::Deref for Lease {
    type Target = Decoder;
    fn deref(&self) -> &Self::Target {
        self.decoder.as_ref().expect("decoder taken only on drop")
    }
}

impl std::ops::DerefMut for Lease {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.decoder.as_mut().expect("decoder taken only on drop")
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(decoder) = self.decoder.take() {
            self.pool.release(std::mem::take(&mut self.path), decoder);
        }
    }
}
