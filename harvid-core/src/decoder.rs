//! The random-access video frame decoder (component D).
//!
//! Owns one open container + codec and turns a requested frame index into a
//! decoded, scaled raster. The seek strategy below mirrors harvid's own
//! `my_seek_frame`/`ff_render`: forward-scan when the target is close and
//! ahead of the current position, backward-seek-to-keyframe otherwise, with
//! a hard bound on how far we'll scan forward before giving up.

use std::ops::{Deref, DerefMut};

use ffmpeg::{
    codec,
    format::{self, Pixel},
    media::Type,
    software::{scaling, scaling::flag::Flags},
    util::frame::video::Video as VideoFrame,
};
use harvid_util::rational::Rational;
use tracing::{debug, instrument, warn};

use crate::{
    error::{Error, Result},
    geometry::SourceGeometry,
    video_info::{SeekMode, VideoInfo},
    process_lock::codec_lock,
};

/// Forward-scan threshold: how close the last decoded position must be to a
/// requested timestamp, in frames, before we prefer scanning forward over
/// seeking backward to a keyframe. A cheap proxy for GOP size when the real
/// keyframe index is not available.
const FORWARD_SCAN_THRESHOLD_FRAMES: i64 = 32;

/// Hard bound on forward-scanned frames before we give up and reset to the
/// start of the stream. Protects against pathological seeks on VFR/broken
/// streams turning one request into an unbounded scan.
const MAX_CONT_FRAMES: u32 = 1000;

/// An open video file bound to exactly one Decoder instance at a time (see
/// `DecoderPool` for the exclusivity guarantee). Not `Send`-derived
/// automatically because of the scaler's raw pointer; wrapped explicitly.
pub struct Decoder {
    path: String,
    input: format::context::Input,
    video_stream_index: usize,
    decoder: ffmpeg::decoder::Video,
    scaler: Option<SendableSwsCtx>,

    geometry: SourceGeometry,
    time_base: Rational,
    frame_rate: Rational,
    duration_seconds: f64,
    frame_count: u64,
    start_offset_frames: i64,

    seek_mode: SeekMode,
    decode_pixel_format: Pixel,
    out_width: u32,
    out_height: u32,

    /// Stream-time position (in `time_base` units) of the last frame
    /// actually decoded. `None` before the first successful decode.
    last_decoded_timestamp: Option<i64>,
    /// Captured from the first keyframe of a livestream source; subtracted
    /// from all subsequent packet timestamps.
    livestream_pts_offset: Option<i64>,

    src_frame: VideoFrame,
    dst_frame: VideoFrame,
}

impl Decoder {
    /// Opens `path` and prepares for decoding. `decode_pixel_format` is the
    /// pixel format produced by the scaler (e.g. RGB24, or RGBA when the
    /// caller asked for `rgba` output).
    #[instrument(skip(decode_pixel_format))]
    pub fn open(path: &str, decode_pixel_format: Pixel) -> Result<Self> {
        let _guard = codec_lock().lock().unwrap();

        let input = format::input(&path).map_err(|e| Error::Unsupported(e.to_string()))?;
        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or_else(|| Error::Unsupported("no video stream".to_string()))?;
        let video_stream_index = stream.index();

        let parameters = stream.parameters();
        let codec_ctx = codec::Context::from_parameters(parameters)
            .map_err(|e| Error::Unsupported(e.to_string()))?;
        let decoder = codec_ctx
            .decoder()
            .video()
            .map_err(|e| Error::Unsupported(e.to_string()))?;

        let time_base = Rational::new(stream.time_base().0, stream.time_base().1);
        let declared_rate = {
            let (num, den) = (stream.avg_frame_rate().0, stream.avg_frame_rate().1);
            (num > 0 && den > 0).then(|| Rational::new(num, den))
        };
        let frame_rate = Rational::resolve(declared_rate, time_base);

        let duration_seconds = if stream.duration() > 0 {
            stream.duration() as f64 * time_base.as_f64()
        } else {
            input.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
        };

        let frame_count = if stream.frames() > 0 {
            stream.frames() as u64
        } else {
            (duration_seconds * frame_rate.as_f64()).max(0.0) as u64
        };

        let start_offset_frames = (stream.start_time().max(0) as f64
            * time_base.as_f64()
            * frame_rate.as_f64()) as i64;

        let geometry = SourceGeometry {
            width: decoder.width(),
            height: decoder.height(),
            sample_aspect_ratio: (
                decoder.aspect_ratio().numerator(),
                decoder.aspect_ratio().denominator(),
            ),
        };

        let seek_mode = SeekMode::default_for_path(path);

        debug!(
            width = geometry.width,
            height = geometry.height,
            frame_rate = frame_rate.as_f64(),
            frame_count,
            ?seek_mode,
            "opened video"
        );

        Ok(Self {
            path: path.to_string(),
            input,
            video_stream_index,
            decoder,
            scaler: None,
            geometry,
            time_base,
            frame_rate,
            duration_seconds,
            frame_count,
            start_offset_frames,
            seek_mode,
            decode_pixel_format,
            out_width: geometry.width,
            out_height: geometry.height,
            last_decoded_timestamp: None,
            livestream_pts_offset: None,
            src_frame: VideoFrame::empty(),
            dst_frame: VideoFrame::empty(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn seek_mode(&self) -> SeekMode {
        self.seek_mode
    }

    pub fn set_seek_mode(&mut self, mode: SeekMode) {
        self.seek_mode = mode;
    }

    pub fn info(&self) -> VideoInfo {
        VideoInfo {
            width: self.geometry.width,
            height: self.geometry.height,
            aspect_ratio: self.geometry.aspect_ratio(),
            sample_aspect_ratio: self.geometry.sample_aspect_ratio,
            frame_rate: self.frame_rate,
            drop_frame: self.frame_rate.is_drop_frame(),
            duration_seconds: self.duration_seconds,
            frame_count: self.frame_count,
            start_offset_frames: self.start_offset_frames,
            seek_mode: self.seek_mode,
        }
    }

    /// Buffer size in bytes for the current output geometry and pixel format.
    pub fn buffer_size(&self) -> usize {
        picture_size(self.decode_pixel_format, self.out_width, self.out_height)
    }

    /// Apply the aspect rules in §3: negative values auto-compute from the
    /// source aspect ratio. Changing geometry discards position state (see
    /// DESIGN.md open question (a)) since the scaler must be re-derived.
    pub fn set_output_geometry(&mut self, req_w: i32, req_h: i32) {
        let (w, h) = self.geometry.resolve_output_size(req_w, req_h);
        if w != self.out_width || h != self.out_height {
            self.out_width = w;
            self.out_height = h;
            self.scaler = None;
            self.last_decoded_timestamp = None;
        }
    }

    /// Seek + decode + scale the frame at `frame_index`. On unrecoverable
    /// failure (scan budget exhausted, or no timestamp on any scanned
    /// frame) returns `Err(Error::DecodeFailed)` per the propagation policy;
    /// the decoder remains usable afterwards (`seek_continuous` has already
    /// reset it to the start of the stream).
    #[instrument(skip(self))]
    pub fn render(&mut self, frame_index: u64) -> Result<&[u8]> {
        let ts = self.frame_index_to_timestamp(frame_index);

        self.seek_to(ts).map_err(|e| {
            warn!(frame_index, error = %e, "seek/decode failed");
            e
        })?;

        self.ensure_scaler()?;
        let scaler = self.scaler.as_mut().expect("scaler ensured above");
        scaler
            .run(&self.src_frame, &mut self.dst_frame)
            .map_err(|e| Error::DecodeFailed(e.to_string()))?;

        Ok(self.dst_frame.data(0))
    }

    fn frame_index_to_timestamp(&self, frame_index: u64) -> i64 {
        let seconds = (frame_index as i64 + self.start_offset_frames) as f64 / self.frame_rate.as_f64();
        (seconds * self.time_base.invert().as_f64()) as i64
    }

    fn tpf(&self) -> i64 {
        // One frame, in time_base units.
        (self.time_base.invert().as_f64() / self.frame_rate.as_f64()).max(1.0) as i64
    }

    /// Dispatches to the seek strategy selected by `self.seek_mode`, then
    /// decodes frames until one at or after `ts` is produced into
    /// `self.src_frame`.
    fn seek_to(&mut self, ts: i64) -> Result<()> {
        match self.seek_mode {
            SeekMode::Any => self.seek_keyframe(ts),
            SeekMode::Key => self.seek_keyframe(ts),
            SeekMode::Continuous => self.seek_continuous(ts),
            SeekMode::Livestream => self.read_forward_until(ts, true),
        }
    }

    /// Backward-seeks to the nearest keyframe at or before `ts`, then scans
    /// forward to the exact target. `ffmpeg-next`'s safe `Input::seek` wraps
    /// `avformat_seek_file` without exposing a caller-settable flags
    /// argument, so `AVSEEK_FLAG_ANY` (which `ffdecoder.c`'s `SEEK_ANY` path
    /// passes alongside `AVSEEK_FLAG_BACKWARD`) cannot be requested through
    /// it — every seek through this wrapper is backward-to-keyframe. `Any`
    /// and `Key` therefore share this implementation; the distinction
    /// collapses at the `ffmpeg-next` API boundary, not by an oversight.
    fn seek_keyframe(&mut self, ts: i64) -> Result<()> {
        let _guard = codec_lock().lock().unwrap();
        self.input
            .seek(ts, i64::MIN..ts)
            .map_err(|e| Error::DecodeFailed(e.to_string()))?;
        self.decoder.flush();
        drop(_guard);
        self.last_decoded_timestamp = None;
        self.decode_one_frame_at_or_after(ts, MAX_CONT_FRAMES)
    }

    fn seek_continuous(&mut self, ts: i64) -> Result<()> {
        let tpf = self.tpf();
        let needs_backward_seek = match self.last_decoded_timestamp {
            None => true,
            Some(last) => last >= ts || last + FORWARD_SCAN_THRESHOLD_FRAMES * tpf < ts,
        };

        if needs_backward_seek {
            let _guard = codec_lock().lock().unwrap();
            self.input
                .seek(ts, i64::MIN..ts)
                .map_err(|e| Error::DecodeFailed(e.to_string()))?;
            self.decoder.flush();
            drop(_guard);
            self.last_decoded_timestamp = None;
        }

        match self.decode_one_frame_at_or_after(ts, MAX_CONT_FRAMES) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Scan budget exhausted: full reset to the start and fail
                // this request; the decoder remains usable afterwards.
                self.reset_to_start()?;
                Err(Error::DecodeFailed(
                    "forward scan exceeded MAX_CONT_FRAMES".to_string(),
                ))
            }
        }
    }

    fn reset_to_start(&mut self) -> Result<()> {
        let _guard = codec_lock().lock().unwrap();
        self.input
            .seek(i64::MIN, i64::MIN..i64::MAX)
            .map_err(|e| Error::DecodeFailed(e.to_string()))?;
        self.decoder.flush();
        drop(_guard);
        self.last_decoded_timestamp = None;
        self.livestream_pts_offset = None;
        Ok(())
    }

    /// No seek call at all: read forward, recording the first keyframe's
    /// PTS as the livestream offset so the stream appears to start at zero.
    /// This is intentional (see DESIGN.md open question (b)) — some live
    /// sources cannot seek.
    fn read_forward_until(&mut self, ts: i64, _is_livestream: bool) -> Result<()> {
        self.decode_one_frame_at_or_after(ts, MAX_CONT_FRAMES)
    }

    /// Reads packets (decoding-and-discarding non-matching ones) until a
    /// decoded frame's timestamp is at or after `ts`, or `budget` finished
    /// frames have been produced without reaching it.
    fn decode_one_frame_at_or_after(&mut self, ts: i64, budget: u32) -> Result<()> {
        let mut scanned = 0u32;

        loop {
            let packet = match self.next_video_packet() {
                Some(p) => p,
                None => return Err(Error::DecodeFailed("end of stream".to_string())),
            };

            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }

            while self.decoder.receive_frame(&mut self.src_frame).is_ok() {
                scanned += 1;

                let raw_pts = self
                    .src_frame
                    .pts()
                    .or_else(|| packet.dts())
                    .ok_or_else(|| Error::DecodeFailed("frame has no pts or dts".to_string()))?;

                let pts = if self.seek_mode == SeekMode::Livestream {
                    let offset = *self.livestream_pts_offset.get_or_insert(raw_pts);
                    raw_pts - offset
                } else {
                    raw_pts
                };

                self.last_decoded_timestamp = Some(pts);

                if pts >= ts {
                    return Ok(());
                }

                if scanned >= budget {
                    return Err(Error::DecodeFailed(
                        "forward scan exceeded budget".to_string(),
                    ));
                }
            }
        }
    }

    fn next_video_packet(&mut self) -> Option<ffmpeg::codec::packet::Packet> {
        for (stream, packet) in self.input.packets() {
            if stream.index() == self.video_stream_index {
                return Some(packet);
            }
        }
        None
    }

    fn ensure_scaler(&mut self) -> Result<()> {
        if self.scaler.is_some() {
            return Ok(());
        }
        let ctx = scaling::Context::get(
            self.decoder.format(),
            self.decoder.width(),
            self.decoder.height(),
            self.decode_pixel_format,
            self.out_width,
            self.out_height,
            Flags::BICUBIC,
        )
        .map_err(|e| Error::Internal(e.to_string()))?;
        self.scaler = Some(SendableSwsCtx(ctx));
        Ok(())
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        let _guard = codec_lock().lock().unwrap();
        // `format::context::Input`'s own `Drop` performs `avformat_close_input`;
        // holding the process-wide lock here ensures that close races with no
        // concurrent open/close elsewhere in the process.
    }
}

/// Number of bytes a decoded picture of `(format, w, h)` occupies. Used both
/// to size cache entries and to pre-allocate empty-frame fallbacks.
pub fn picture_size(format: Pixel, width: u32, height: u32) -> usize {
    let bytes_per_pixel: usize = match format {
        Pixel::RGB24 => 3,
        Pixel::RGBA => 4,
        _ => 3,
    };
    width as usize * height as usize * bytes_per_pixel
}

/// `scaling::Context` is not `Send` because of an internal raw pointer, but
/// it contains no thread-affine state: it is safe to move between threads
/// as long as it is not used concurrently (our Decoder is always leased
/// exclusively, so this holds).
struct SendableSwsCtx(scaling::Context);

#[allow(clippy::non_send_fields_in_send_ty)]
unsafe impl Send for SendableSwsCtx {}

impl Deref for SendableSwsCtx {
    type Target = scaling::Context;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for SendableSwsCtx {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::synth_fixture;

    fn fixture() -> String {
        synth_fixture("decoder_basic", 64, 48, 25, 60)
            .to_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_open_reports_geometry_and_frame_count() {
        let path = fixture();
        let decoder = Decoder::open(&path, Pixel::RGB24).unwrap();
        let info = decoder.info();
        assert_eq!(info.width, 64);
        assert_eq!(info.height, 48);
        assert!(info.frame_count >= 1);
    }

    #[test]
    fn test_render_is_idempotent() {
        let path = fixture();
        let mut decoder = Decoder::open(&path, Pixel::RGB24).unwrap();
        decoder.set_output_geometry(64, 48);
        let first = decoder.render(10).unwrap().to_vec();
        let second = decoder.render(10).unwrap().to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn test_any_mode_matches_cold_decoder() {
        let path = fixture();

        let mut a = Decoder::open(&path, Pixel::RGB24).unwrap();
        a.set_seek_mode(SeekMode::Any);
        a.set_output_geometry(64, 48);
        let _ = a.render(0).unwrap();
        let _ = a.render(40).unwrap();
        let warm = a.render(20).unwrap().to_vec();

        let mut b = Decoder::open(&path, Pixel::RGB24).unwrap();
        b.set_seek_mode(SeekMode::Any);
        b.set_output_geometry(64, 48);
        let cold = b.render(20).unwrap().to_vec();

        assert_eq!(warm, cold);
    }

    #[test]
    fn test_continuous_mode_does_not_backward_seek_for_nearby_forward_frame() {
        let path = fixture();
        let mut decoder = Decoder::open(&path, Pixel::RGB24).unwrap();
        decoder.set_seek_mode(SeekMode::Continuous);
        decoder.set_output_geometry(64, 48);

        decoder.render(10).unwrap();
        let last_after_10 = decoder.last_decoded_timestamp;
        decoder.render(11).unwrap();
        // Forward, adjacent frame: position must have advanced, not reset.
        assert!(decoder.last_decoded_timestamp > last_after_10);
    }

    #[test]
    fn test_set_output_geometry_resizes_buffer() {
        let path = fixture();
        let mut decoder = Decoder::open(&path, Pixel::RGB24).unwrap();
        decoder.set_output_geometry(32, 24);
        assert_eq!(decoder.buffer_size(), picture_size(Pixel::RGB24, 32, 24));
    }
}
