//! Output geometry resolution: turns a caller-requested `(w, h)` — either
//! of which may be `-1` meaning "auto" — into a concrete pixel size that
//! preserves the source's display aspect ratio.

/// Intrinsic geometry of an opened video, as reported by the demuxer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceGeometry {
    pub width: u32,
    pub height: u32,
    /// Sample (pixel) aspect ratio, `num/den`. `(0, 0)` or a non-positive
    /// ratio means "unknown": fall back to the plain `width/height` ratio.
    pub sample_aspect_ratio: (i32, i32),
}

impl SourceGeometry {
    pub fn aspect_ratio(&self) -> f64 {
        let sar = if self.sample_aspect_ratio.0 > 0 && self.sample_aspect_ratio.1 > 0 {
            self.sample_aspect_ratio.0 as f64 / self.sample_aspect_ratio.1 as f64
        } else {
            1.0
        };
        sar * self.width as f64 / self.height as f64
    }

    /// Resolve a requested `(w, h)` (either may be negative, meaning "auto")
    /// into a concrete, positive pixel size that preserves aspect ratio.
    pub fn resolve_output_size(&self, req_w: i32, req_h: i32) -> (u32, u32) {
        let aspect = self.aspect_ratio();
        match (req_w > 0, req_h > 0) {
            (true, true) => (req_w as u32, req_h as u32),
            (true, false) => {
                let h = (req_w as f64 / aspect).round().max(1.0) as u32;
                (req_w as u32, h)
            }
            (false, true) => {
                let w = (req_h as f64 * aspect).round().max(1.0) as u32;
                (w, req_h as u32)
            }
            (false, false) => (self.width, self.height),
        }
    }
}
