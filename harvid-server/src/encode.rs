//! Encodes a decoded raster into one of the response formats the query
//! string can request. `raw`/`rgb`/`rgba` pass the pixel bytes through
//! untouched; `jpg`/`png` go through the `image` crate; `ppm` is a direct
//! header + raster write with no external codec, same as harvid's own
//! PPM output path.

use std::io::Write;

use ffmpeg::format::Pixel;
use harvid_core::Error;
use image::{codecs::jpeg::JpegEncoder, codecs::png::PngEncoder, ColorType, ImageEncoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderFormat {
    Jpg,
    Png,
    Ppm,
    Raw,
}

impl RenderFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "jpg" | "jpeg" => Some(Self::Jpg),
            "png" => Some(Self::Png),
            "ppm" => Some(Self::Ppm),
            "raw" | "rgb" | "rgba" => Some(Self::Raw),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            RenderFormat::Jpg => "image/jpeg",
            RenderFormat::Png => "image/png",
            RenderFormat::Ppm => "image/x-portable-pixmap",
            RenderFormat::Raw => "application/octet-stream",
        }
    }
}

pub fn encode(
    format: RenderFormat,
    data: &[u8],
    width: u32,
    height: u32,
    pixel_format: Pixel,
) -> Result<Vec<u8>, Error> {
    let color = match pixel_format {
        Pixel::RGBA => ColorType::Rgba8,
        _ => ColorType::Rgb8,
    };

    match format {
        RenderFormat::Jpg => {
            let mut buf = Vec::new();
            JpegEncoder::new_with_quality(&mut buf, 90)
                .write_image(data, width, height, color)
                .map_err(|e| Error::Internal(e.to_string()))?;
            Ok(buf)
        }
        RenderFormat::Png => {
            let mut buf = Vec::new();
            PngEncoder::new(&mut buf)
                .write_image(data, width, height, color)
                .map_err(|e| Error::Internal(e.to_string()))?;
            Ok(buf)
        }
        RenderFormat::Ppm => encode_ppm(data, width, height, color),
        RenderFormat::Raw => Ok(data.to_vec()),
    }
}

fn encode_ppm(data: &[u8], width: u32, height: u32, color: ColorType) -> Result<Vec<u8>, Error> {
    if color != ColorType::Rgb8 {
        return Err(Error::Unsupported(
            "ppm output requires an rgb pixel format".to_string(),
        ));
    }
    let mut out = Vec::with_capacity(data.len() + 32);
    write!(out, "P6\n{width} {height}\n255\n").map_err(|e| Error::Internal(e.to_string()))?;
    out.extend_from_slice(data);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rgb_alias_maps_to_raw() {
        assert_eq!(RenderFormat::parse("rgb"), Some(RenderFormat::Raw));
        assert_eq!(RenderFormat::parse("rgba"), Some(RenderFormat::Raw));
    }

    #[test]
    fn test_parse_unknown_is_none() {
        assert_eq!(RenderFormat::parse("bogus"), None);
    }

    #[test]
    fn test_ppm_header_matches_dimensions() {
        let data = vec![0u8; 3 * 2 * 2];
        let out = encode(RenderFormat::Ppm, &data, 2, 2, Pixel::RGB24).unwrap();
        assert!(out.starts_with(b"P6\n2 2\n255\n"));
        assert_eq!(out.len(), "P6\n2 2\n255\n".len() + data.len());
    }

    #[test]
    fn test_raw_passes_through_unchanged() {
        let data = vec![1, 2, 3, 4];
        let out = encode(RenderFormat::Raw, &data, 1, 1, Pixel::RGBA).unwrap();
        assert_eq!(out, data);
    }
}
