use harvid_util::rational::Rational;
use serde::Serialize;

use crate::geometry::SourceGeometry;

/// How the decoder is allowed to seek within a given source. Chosen at
/// `open` time from the source's URL scheme; callers may override it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SeekMode {
    /// Seek to any frame at or before the target, accepting imprecision.
    Any,
    /// Seek only to keyframes at or before the target.
    Key,
    /// Seek backward when far from the target or already past it, else
    /// scan forward from the current position. The default for regular
    /// files.
    Continuous,
    /// Never seek; read forward only. The default for `http://` sources
    /// that cannot seek at all.
    Livestream,
}

impl SeekMode {
    /// Pick the default seek mode for a source, based on its path/URL.
    pub fn default_for_path(path: &str) -> Self {
        if path.starts_with("http://") || path.starts_with("https://") {
            SeekMode::Livestream
        } else {
            SeekMode::Continuous
        }
    }
}

/// Publicly reported metadata about an opened video, returned by
/// `Coordinator::file_info`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: f64,
    /// Sample (pixel) aspect ratio reported by the demuxer, `num/den`. Kept
    /// alongside `aspect_ratio` so `geometry()` can reconstruct the exact
    /// `SourceGeometry` the Decoder itself resolves output sizes against.
    pub sample_aspect_ratio: (i32, i32),
    pub frame_rate: Rational,
    pub drop_frame: bool,
    pub duration_seconds: f64,
    pub frame_count: u64,
    pub start_offset_frames: i64,
    pub seek_mode: SeekMode,
}

impl VideoInfo {
    pub fn geometry(&self) -> SourceGeometry {
        SourceGeometry {
            width: self.width,
            height: self.height,
            sample_aspect_ratio: self.sample_aspect_ratio,
        }
    }
}
