//! Frame normalizer: undecoded bytes in, packed RGB8 `Frame` out.
//!
//! Decode failures are per-frame: the caller logs them and drops the frame.

use std::fmt;

use crate::frame::{EncodedFrame, Frame, PixelFormat};

/// Why a single frame could not be normalized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeError {
    Empty,
    DimensionsOverflow { width: u32, height: u32 },
    /// NV12 subsamples chroma 2x2, so both dimensions must be even.
    OddChromaGeometry { width: u32, height: u32 },
    LengthMismatch {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },
    Jpeg(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Empty => write!(f, "empty frame"),
            DecodeError::DimensionsOverflow { width, height } => {
                write!(f, "frame dimensions {}x{} overflow", width, height)
            }
            DecodeError::OddChromaGeometry { width, height } => {
                write!(f, "nv12 frame {}x{} has odd dimensions", width, height)
            }
            DecodeError::LengthMismatch {
                format,
                expected,
                actual,
            } => write!(
                f,
                "{} frame length mismatch: expected {}, got {}",
                format, expected, actual
            ),
            DecodeError::Jpeg(reason) => write!(f, "jpeg decode failed: {}", reason),
        }
    }
}

impl std::error::Error for DecodeError {}

pub fn normalize(encoded: &EncodedFrame) -> Result<Frame, DecodeError> {
    match encoded {
        EncodedFrame::Jpeg(bytes) => decode_jpeg(bytes),
        EncodedFrame::Raw {
            data,
            width,
            height,
            format,
        } => normalize_raw(data, *width, *height, *format),
    }
}

fn normalize_raw(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Frame, DecodeError> {
    if pixels.is_empty() {
        return Err(DecodeError::Empty);
    }
    if format == PixelFormat::Nv12 && (width % 2 != 0 || height % 2 != 0) {
        return Err(DecodeError::OddChromaGeometry { width, height });
    }
    let expected = format
        .frame_len(width, height)
        .ok_or(DecodeError::DimensionsOverflow { width, height })?;
    if pixels.len() != expected {
        return Err(DecodeError::LengthMismatch {
            format,
            expected,
            actual: pixels.len(),
        });
    }

    let rgb = match format {
        PixelFormat::Rgb24 => pixels.to_vec(),
        PixelFormat::Bgr24 => bgr_to_rgb(pixels),
        PixelFormat::Nv12 => nv12_to_rgb(pixels, width as usize, height as usize),
    };
    Frame::from_rgb(rgb, width, height).map_err(|_| DecodeError::DimensionsOverflow { width, height })
}

fn decode_jpeg(bytes: &[u8]) -> Result<Frame, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let image = image::load_from_memory_with_format(bytes, image::ImageFormat::Jpeg)
        .map_err(|e| DecodeError::Jpeg(e.to_string()))?;
    let rgb = image.into_rgb8();
    let (width, height) = rgb.dimensions();
    Frame::from_rgb(rgb.into_raw(), width, height)
        .map_err(|_| DecodeError::DimensionsOverflow { width, height })
}

fn bgr_to_rgb(pixels: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(pixels.len());
    for px in pixels.chunks_exact(3) {
        rgb.extend_from_slice(&[px[2], px[1], px[0]]);
    }
    rgb
}

fn nv12_to_rgb(pixels: &[u8], w: usize, h: usize) -> Vec<u8> {
    let y_plane = w * h;
    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(r);
            rgb[offset + 1] = clamp_to_u8(g);
            rgb[offset + 2] = clamp_to_u8(b);
        }
    }
    rgb
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> EncodedFrame {
        EncodedFrame::Raw {
            data,
            width,
            height,
            format,
        }
    }

    #[test]
    fn nv12_conversion_produces_gray() {
        let nv12 = [vec![128u8; 4], vec![128u8; 2]].concat();
        let frame = normalize(&raw(nv12, 2, 2, PixelFormat::Nv12)).unwrap();
        assert_eq!(frame.pixels(), &[128u8; 12][..]);
    }

    #[test]
    fn nv12_with_odd_dimensions_is_a_decode_error() {
        // 3x1 luma plus the 1-byte chroma tail `frame_len` allows.
        let err = normalize(&raw(vec![128u8; 4], 3, 1, PixelFormat::Nv12)).unwrap_err();
        assert_eq!(
            err,
            DecodeError::OddChromaGeometry {
                width: 3,
                height: 1
            }
        );
        assert!(normalize(&raw(vec![128u8; 3], 2, 1, PixelFormat::Nv12)).is_err());
    }

    #[test]
    fn bgr_is_swizzled_to_rgb() {
        let frame = normalize(&raw(vec![1, 2, 3, 4, 5, 6], 2, 1, PixelFormat::Bgr24)).unwrap();
        assert_eq!(frame.pixels(), &[3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn raw_length_mismatch_is_a_decode_error() {
        let err = normalize(&raw(vec![1u8; 9], 2, 2, PixelFormat::Rgb24)).unwrap_err();
        assert_eq!(
            err,
            DecodeError::LengthMismatch {
                format: PixelFormat::Rgb24,
                expected: 12,
                actual: 9
            }
        );
    }

    #[test]
    fn jpeg_geometry_comes_from_header() {
        let mut jpeg = Vec::new();
        let pixels = vec![200u8; 8 * 6 * 3];
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, 90)
            .encode(&pixels, 8, 6, image::ExtendedColorType::Rgb8)
            .unwrap();

        let frame = normalize(&EncodedFrame::Jpeg(jpeg)).unwrap();
        assert_eq!((frame.width, frame.height), (8, 6));
    }

    #[test]
    fn corrupt_jpeg_is_rejected() {
        let err = normalize(&EncodedFrame::Jpeg(vec![0xFF, 0xD8, 0x00, 0x01])).unwrap_err();
        assert!(matches!(err, DecodeError::Jpeg(_)));
        assert_eq!(normalize(&EncodedFrame::Jpeg(Vec::new())).unwrap_err(), DecodeError::Empty);
    }
}
