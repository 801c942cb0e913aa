//! Synthesizes a tiny H.264/MP4 fixture at test time so decoder/pool/cache
//! tests don't depend on a checked-in binary asset, removing the need for
//! a real fixture file entirely.

use std::path::PathBuf;

use ffmpeg::{
    codec, encoder,
    format::{self, Pixel},
    software::{scaling, scaling::flag::Flags},
    util::frame::video::Video as VideoFrame,
    Rational,
};

/// Encodes a `width`x`height`, `fps` fps, `frame_count`-frame solid-colour
/// (cycling through a few flat colours so frames are distinguishable) H.264
/// video to a temp file and returns its path. The file is left on disk in
/// the OS temp dir; tests don't need to clean it up.
pub fn synth_fixture(
    name: &str,
    width: u32,
    height: u32,
    fps: u32,
    frame_count: u64,
) -> PathBuf {
    crate::init();

    let path = std::env::temp_dir().join(format!("harvid-core-test-{name}.mp4"));
    if path.exists() {
        return path;
    }

    let mut octx = format::output(&path).expect("open output muxer");
    let codec = encoder::find(codec::Id::H264).expect("h264 encoder available");
    let mut ost = octx
        .add_stream(codec)
        .expect("add video stream");
    let mut encoder_ctx = codec::Context::new_with_codec(codec)
        .encoder()
        .video()
        .expect("video encoder context");

    encoder_ctx.set_width(width);
    encoder_ctx.set_height(height);
    encoder_ctx.set_format(Pixel::YUV420P);
    encoder_ctx.set_time_base(Rational::new(1, fps as i32));
    ost.set_time_base(Rational::new(1, fps as i32));

    let mut encoder = encoder_ctx
        .open_as(codec)
        .expect("open h264 encoder");
    ost.set_parameters(&encoder);

    octx.write_header().expect("write mp4 header");

    let mut sws = scaling::Context::get(
        Pixel::RGB24,
        width,
        height,
        Pixel::YUV420P,
        width,
        height,
        Flags::BILINEAR,
    )
    .expect("scaler for fixture encode");

    let palette: [[u8; 3]; 4] = [[255, 0, 0], [0, 255, 0], [0, 0, 255], [255, 255, 0]];

    for i in 0..frame_count {
        let mut rgb = VideoFrame::new(Pixel::RGB24, width, height);
        let color = palette[(i as usize) % palette.len()];
        for chunk in rgb.data_mut(0).chunks_exact_mut(3) {
            chunk.copy_from_slice(&color);
        }

        let mut yuv = VideoFrame::empty();
        sws.run(&rgb, &mut yuv).expect("scale fixture frame");
        yuv.set_pts(Some(i as i64));

        encoder.send_frame(&yuv).expect("send frame to encoder");
        drain_packets(&mut encoder, &mut octx, ost.index());
    }

    encoder.send_eof().expect("flush encoder");
    drain_packets(&mut encoder, &mut octx, ost.index());
    octx.write_trailer().expect("write mp4 trailer");

    path
}

fn drain_packets(
    encoder: &mut encoder::Video,
    octx: &mut format::context::Output,
    stream_index: usize,
) {
    let mut packet = ffmpeg::Packet::empty();
    while encoder.receive_packet(&mut packet).is_ok() {
        packet.set_stream(stream_index);
        let _ = packet.write_interleaved(octx);
    }
}
