//! The request coordinator (component R): given a parsed frame request,
//! orchestrates the cache, pool, and decoder to produce a raster, and
//! exposes the small set of operations the HTTP layer calls into.

use std::{
    fs,
    sync::Arc,
    time::UNIX_EPOCH,
};

use ffmpeg::format::Pixel;
use harvid_util::cancel::CancelToken;
use serde::Serialize;
use tracing::instrument;

use crate::{
    cache::{CacheEntry, CacheKey, FrameCache, PixelFormatKey},
    decoder::picture_size,
    error::{Error, Result},
    pool::{DecoderPool, PoolDiagnostics},
    video_info::VideoInfo,
};

pub use crate::cache::CacheDiagnostics;

/// A single frame request as parsed by the HTTP layer.
#[derive(Debug, Clone)]
pub struct FrameRequest {
    pub path: String,
    pub frame: u64,
    pub out_width: i32,
    pub out_height: i32,
    pub pixel_format: Pixel,
}

#[derive(Clone)]
pub struct RenderedFrame {
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub pixel_format: Pixel,
}

#[derive(Debug, Serialize)]
pub struct Diagnostics {
    pub pool: PoolDiagnostics,
    pub cache: CacheDiagnostics,
}

/// Ties the pool and cache together behind the small API the HTTP handlers
/// call. Cheaply cloneable; intended to be shared as `axum` state.
#[derive(Clone)]
pub struct Coordinator {
    pool: Arc<DecoderPool>,
    cache: Arc<FrameCache>,
}

impl Coordinator {
    pub fn new(max_decoders: usize, idle_decoder_cap: usize, cache_max_bytes: usize) -> Self {
        Self {
            pool: DecoderPool::new(max_decoders, idle_decoder_cap),
            cache: Arc::new(FrameCache::new(cache_max_bytes)),
        }
    }

    /// Renders the requested frame, using the cache when possible and
    /// falling through to a leased decoder on a miss.
    #[instrument(skip(self, cancel))]
    pub fn render_frame(&self, req: &FrameRequest, cancel: &CancelToken) -> Result<RenderedFrame> {
        let metadata = fs::metadata(&req.path)
            .map_err(|e| Error::NotFound(format!("{}: {e}", req.path)))?;
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        // Resolve the output geometry against the source's intrinsic
        // aspect before building the cache key, so equivalent `(w, -1)` /
        // `(-1, h)` requests share one cache entry.
        let (resolved_w, resolved_h) = self.probe_output_size(req)?;

        let key = CacheKey {
            file_identity: req.path.clone(),
            mtime,
            frame_index: req.frame,
            out_width: resolved_w,
            out_height: resolved_h,
            pixel_format: PixelFormatKey::from(req.pixel_format),
        };

        let pool = self.pool.clone();
        let path = req.path.clone();
        let frame = req.frame;
        let out_w = req.out_width;
        let out_h = req.out_height;
        let pixel_format = req.pixel_format;
        let cancel = cancel.clone();

        let entry: CacheEntry = self.cache.get_or_compute(key, move || {
            let mut lease = pool.lease(&path, pixel_format, out_w, out_h, &cancel)?;
            let raster = lease.render(frame)?;
            Ok(raster.to_vec())
        })?;

        Ok(RenderedFrame {
            data: entry.data,
            width: resolved_w,
            height: resolved_h,
            pixel_format: req.pixel_format,
        })
    }

    /// Opens the file just far enough to report its geometry/duration, via
    /// a pooled lease (so repeated `/info` calls reuse an open decoder).
    #[instrument(skip(self))]
    pub fn file_info(&self, path: &str) -> Result<VideoInfo> {
        let cancel = CancelToken::new();
        let lease = self
            .pool
            .lease(path, Pixel::RGB24, -1, -1, &cancel)?;
        Ok(lease.info())
    }

    /// Resolves `(-1, ...)`/`(..., -1)` auto geometry against the source's
    /// intrinsic aspect ratio, so equivalent requests share one cache key.
    /// Both dimensions explicit skips the extra lease entirely.
    fn probe_output_size(&self, req: &FrameRequest) -> Result<(u32, u32)> {
        if req.out_width > 0 && req.out_height > 0 {
            return Ok((req.out_width as u32, req.out_height as u32));
        }
        let cancel = CancelToken::new();
        let lease = self
            .pool
            .lease(&req.path, req.pixel_format, req.out_width, req.out_height, &cancel)?;
        let info = lease.info();
        let (w, h) = info
            .geometry()
            .resolve_output_size(req.out_width, req.out_height);
        let _ = picture_size(req.pixel_format, w, h); // sanity: must not overflow
        Ok((w, h))
    }

    pub fn pool_info(&self) -> Diagnostics {
        Diagnostics {
            pool: self.pool.diagnostics(),
            cache: self.cache.diagnostics(),
        }
    }

    pub fn purge_cache(&self, path: Option<&str>) {
        match path {
            Some(p) => {
                self.cache.invalidate(p);
                self.pool.purge(p);
            }
            None => self.cache.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::test_support::synth_fixture;

    fn fixture(name: &str) -> String {
        synth_fixture(name, 64, 48, 25, 60).to_str().unwrap().to_string()
    }

    fn req(path: &str, frame: u64) -> FrameRequest {
        FrameRequest {
            path: path.to_string(),
            frame,
            out_width: 32,
            out_height: -1,
            pixel_format: Pixel::RGB24,
        }
    }

    #[test]
    fn test_render_frame_resolves_auto_geometry() {
        let coordinator = Coordinator::new(2, 2, 16 * 1024 * 1024);
        let path = fixture("coordinator_basic");
        let cancel = CancelToken::new();

        let frame = coordinator.render_frame(&req(&path, 5), &cancel).unwrap();
        assert_eq!(frame.width, 32);
        assert_eq!(frame.height, 24); // 64x48 source, half width keeps aspect
    }

    #[test]
    fn test_repeated_request_hits_cache() {
        let coordinator = Coordinator::new(2, 2, 16 * 1024 * 1024);
        let path = fixture("coordinator_cache");
        let cancel = CancelToken::new();

        coordinator.render_frame(&req(&path, 5), &cancel).unwrap();
        let before = coordinator.pool_info().cache.hits;
        coordinator.render_frame(&req(&path, 5), &cancel).unwrap();
        let after = coordinator.pool_info().cache.hits;
        assert!(after > before);
    }

    #[test]
    fn test_missing_file_reports_not_found() {
        let coordinator = Coordinator::new(2, 2, 16 * 1024 * 1024);
        let cancel = CancelToken::new();
        let err = coordinator
            .render_frame(&req("/no/such/file.mov", 0), &cancel)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(coordinator.pool_info().pool.open_decoders, 0);
    }

    #[test]
    fn test_concurrent_identical_requests_decode_once() {
        let coordinator = Arc::new(Coordinator::new(2, 2, 16 * 1024 * 1024));
        let path = Arc::new(fixture("coordinator_concurrent"));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let coordinator = coordinator.clone();
                let path = path.clone();
                thread::spawn(move || {
                    let cancel = CancelToken::new();
                    coordinator
                        .render_frame(&req(&path, 15), &cancel)
                        .unwrap()
                        .data
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let first = &results[0];
        for r in &results[1..] {
            assert_eq!(r, first);
        }
        assert_eq!(coordinator.pool_info().cache.misses, 1);
    }

    #[test]
    fn test_purge_cache_clears_entries() {
        let coordinator = Coordinator::new(2, 2, 16 * 1024 * 1024);
        let path = fixture("coordinator_purge");
        let cancel = CancelToken::new();

        coordinator.render_frame(&req(&path, 0), &cancel).unwrap();
        assert!(coordinator.pool_info().cache.entries > 0);

        coordinator.purge_cache(None);
        assert_eq!(coordinator.pool_info().cache.entries, 0);
    }
}
