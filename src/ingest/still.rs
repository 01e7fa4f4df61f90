//! User-selected still images (upload mode).
//!
//! The image is decoded once at selection time so its dimensions come from the
//! actual pixels; the original encoded bytes are what gets uploaded.

use std::path::Path;

use super::{decode_dims, CaptureError, CapturedFrame};
use crate::detect::SourceDims;

/// A decoded-and-validated image chosen by the user.
#[derive(Clone, Debug)]
pub struct SelectedImage {
    frame: CapturedFrame,
}

impl SelectedImage {
    /// Load an image from disk.
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        let bytes = std::fs::read(path).map_err(|source| CaptureError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Self::from_bytes(bytes, filename)
    }

    /// Wrap an in-memory image (e.g. one dropped onto the UI).
    pub fn from_bytes(bytes: Vec<u8>, filename: impl Into<String>) -> Result<Self, CaptureError> {
        let (dims, content_type) = decode_dims(&bytes)?;
        let frame = CapturedFrame::new(bytes, dims, content_type).with_filename(filename);
        Ok(Self { frame })
    }

    /// The frame to submit for inference.
    pub fn frame(&self) -> &CapturedFrame {
        &self.frame
    }

    pub fn dims(&self) -> SourceDims {
        self.frame.dims()
    }

    pub fn filename(&self) -> &str {
        self.frame.filename()
    }

    /// Decode to RGB for drawing annotations.
    pub fn to_rgb(&self) -> Result<image::RgbImage, CaptureError> {
        image::load_from_memory(self.frame.bytes())
            .map(|decoded| decoded.into_rgb8())
            .map_err(|e| CaptureError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 20, 30]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn dimensions_come_from_decoded_pixels() {
        let image = SelectedImage::from_bytes(png_bytes(80, 60), "face.png").unwrap();
        assert_eq!(image.dims(), SourceDims::new(80, 60));
        assert_eq!(image.frame().content_type(), "image/png");
        assert_eq!(image.filename(), "face.png");
    }

    #[test]
    fn corrupt_image_is_decode_error() {
        let mut bytes = png_bytes(8, 8);
        bytes.truncate(20);
        assert!(matches!(
            SelectedImage::from_bytes(bytes, "broken.png"),
            Err(CaptureError::Decode(_))
        ));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = SelectedImage::open(Path::new("/nonexistent/face.jpg")).unwrap_err();
        assert!(matches!(err, CaptureError::Read { .. }));
    }
}
