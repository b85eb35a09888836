use anyhow::{ensure, Context, Result};
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;

use crate::capture::VideoFrame;

/// Turns a frame into the string sent in the `image` field of a frame event
pub trait FrameEncoder: Send + Sync {
    fn encode(&self, frame: &VideoFrame) -> Result<String>;
}

/// JPEG data URL encoder (`data:image/jpeg;base64,...`)
///
/// The output can be assigned directly to an `<img src>` in the browser.
#[derive(Debug, Clone)]
pub struct DataUrlEncoder {
    quality: u8,
}

impl DataUrlEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for DataUrlEncoder {
    fn default() -> Self {
        Self::new(70)
    }
}

impl FrameEncoder for DataUrlEncoder {
    fn encode(&self, frame: &VideoFrame) -> Result<String> {
        let expected = frame.width as usize * frame.height as usize * VideoFrame::BYTES_PER_PIXEL;
        ensure!(
            frame.data.len() == expected,
            "frame buffer is {} bytes, expected {} for {}x{}",
            frame.data.len(),
            expected,
            frame.width,
            frame.height
        );

        let rgb = bgr_to_rgb(&frame.data);
        let mut jpeg = Vec::with_capacity(expected / 8);
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode(&rgb, frame.width, frame.height, ColorType::Rgb8)
            .context("Failed to encode frame as JPEG")?;

        Ok(format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&jpeg)
        ))
    }
}

fn bgr_to_rgb(bgr: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(bgr.len());
    for px in bgr.chunks_exact(3) {
        rgb.extend_from_slice(&[px[2], px[1], px[0]]);
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_jpeg_data_url() {
        let frame = VideoFrame::blank(16, 8);
        let url = DataUrlEncoder::default().encode(&frame).unwrap();

        let payload = url.strip_prefix("data:image/jpeg;base64,").unwrap();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .unwrap();
        // JPEG SOI marker
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn rejects_truncated_buffer() {
        let mut frame = VideoFrame::blank(4, 4);
        frame.data.truncate(10);
        assert!(DataUrlEncoder::default().encode(&frame).is_err());
    }

    #[test]
    fn swaps_red_and_blue() {
        assert_eq!(bgr_to_rgb(&[1, 2, 3, 4, 5, 6]), vec![3, 2, 1, 6, 5, 4]);
    }
}
