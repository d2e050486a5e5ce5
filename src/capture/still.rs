//! Immutable still frames and their encodings.

use std::fmt;
use std::time::SystemTime;

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageError};
use sha2::{Digest, Sha256};

use crate::analysis::data_url::{to_data_url, JPEG_MIME};
use crate::platform::{Frame, SourceId};

/// Default JPEG quality used for analysis uploads.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// A snapshot of one decoded frame.
///
/// Not `Clone`: a still is handed to at most one analysis call.
pub struct StillFrame {
    source_id: SourceId,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    captured_at: SystemTime,
}

impl fmt::Debug for StillFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StillFrame")
            .field("source_id", &self.source_id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

impl StillFrame {
    /// Build a still from packed RGB pixels.
    ///
    /// Returns `None` if a dimension is zero or `pixels` is not exactly
    /// `width * height * 3` bytes.
    pub fn from_rgb(
        source_id: SourceId,
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    ) -> Option<Self> {
        let expected = width as usize * height as usize * 3;
        if width == 0 || height == 0 || pixels.len() != expected {
            return None;
        }
        Some(Self {
            source_id,
            width,
            height,
            pixels,
            captured_at: SystemTime::now(),
        })
    }

    pub(crate) fn from_frame(source_id: SourceId, frame: Frame) -> Option<Self> {
        if !frame.is_decodable() {
            return None;
        }
        Self::from_rgb(source_id, frame.width, frame.height, frame.data)
    }

    pub fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Packed RGB pixels, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }

    /// Encode as baseline JPEG.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, ImageError> {
        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
        encoder.encode(&self.pixels, self.width, self.height, ExtendedColorType::Rgb8)?;
        Ok(out)
    }

    /// Encode as JPEG and wrap in a `data:image/jpeg;base64,` URL.
    pub fn to_data_url(&self, quality: u8) -> Result<String, ImageError> {
        Ok(to_data_url(JPEG_MIME, &self.encode_jpeg(quality)?))
    }

    /// Short SHA-256 of the pixel data, for log correlation.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.pixels);
        hex::encode(&digest[..6])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(width: u32, height: u32, value: u8) -> StillFrame {
        StillFrame::from_rgb(
            SourceId::from("cam"),
            width,
            height,
            vec![value; (width * height * 3) as usize],
        )
        .unwrap()
    }

    #[test]
    fn test_from_rgb_rejects_bad_buffers() {
        let id = SourceId::from("cam");
        assert!(StillFrame::from_rgb(id.clone(), 0, 10, vec![]).is_none());
        assert!(StillFrame::from_rgb(id.clone(), 2, 2, vec![0; 11]).is_none());
        assert!(StillFrame::from_rgb(id, 2, 2, vec![0; 12]).is_some());
    }

    #[test]
    fn test_encode_jpeg_produces_jpeg_magic() {
        let jpeg = gray(16, 8, 128).encode_jpeg(DEFAULT_JPEG_QUALITY).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_to_data_url_has_jpeg_header() {
        let url = gray(4, 4, 10).to_data_url(DEFAULT_JPEG_QUALITY).unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_fingerprint_depends_on_pixels() {
        let a = gray(4, 4, 10);
        let b = gray(4, 4, 11);
        assert_eq!(a.fingerprint().len(), 12);
        assert_eq!(a.fingerprint(), gray(4, 4, 10).fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
